//! umux-pty: PTY process management for umux sessions.
//!
//! This crate owns the boundary to the operating system: spawning a child
//! program under a pseudo-terminal, shuttling bytes in and out, resizing,
//! signalling, and probing which process currently holds the foreground.
//!
//! # Architecture
//!
//! - [`PtyHandle`] — low-level PTY management (spawn, resize, kill); hands
//!   out its reader, writer, and child exactly once so they can be driven
//!   from dedicated threads.
//! - [`foreground_process`] — best-effort probe for the foreground process
//!   of a PTY session, used for shell-readiness detection.

pub mod probe;
pub mod pty;

pub use probe::{foreground_process, ForegroundProcess};
pub use pty::{default_shell, KillSignal, PtyError, PtyHandle};
