//! umux-core: the umux session engine.
//!
//! A programmatic terminal multiplexer for automated agents: long-lived
//! PTY sessions with bounded histories, typed key input, declarative wait
//! conditions under mandatory timeouts, and event-triggered hooks.
//!
//! # Architecture
//!
//! - [`Session`] — owns one PTY child, its output/input histories, a
//!   terminal engine, and the per-session event fan-out.
//! - [`wait_for`] — resolves a [`WaitRequest`] (pattern / screen / idle /
//!   ready / exit) against a session, exactly once, always bounded by a
//!   timeout.
//! - [`Registry`] — the keyed collection of sessions, the shared
//!   readiness poller, and the hook manager.
//! - [`History`] / [`keys`] / [`query`] — the leaf pieces: bounded line
//!   store, key codec, and the terminal-query auto-responder.
//!
//! Blocking PTY I/O runs on dedicated threads; everything else is
//! serialized per session through a single async pump task, so handlers
//! for one session never run in parallel.

pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod hooks;
mod ids;
pub mod keys;
pub mod log;
pub mod query;
pub mod registry;
pub mod session;
mod sync;
pub mod wait;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{RegistryEvent, SessionEvent};
pub use history::{History, MatchContext, SearchMatch};
pub use hooks::{HookInfo, HookManager, HookSpec};
pub use keys::{encode_key, encode_keys, KeyInput, KeySpec, ModifiedKey, NamedKey};
pub use registry::{Registry, SessionSelector};
pub use session::{Session, SessionInfo, SpawnOptions};
pub use wait::{wait_for, WaitOutcome, WaitReason, WaitRequest};

pub use umux_pty::{ForegroundProcess, KillSignal};
pub use umux_vt::{Capture, CaptureFormat, CursorShape, CursorState, EngineChoice};
