//! umux-vt: terminal state engines for umux.
//!
//! A session consumes terminal emulation through the narrow
//! [`TerminalEngine`] contract: feed bytes, resize, snapshot the visible
//! grid, read the cursor. Two implementations are provided:
//!
//! - [`AlacrittyEngine`] — full emulation over `alacritty_terminal`.
//! - [`GridEngine`] — a minimal plain-grid fallback the session swaps to
//!   (with bounded replay) when the primary fails.

pub mod alacritty;
pub mod engine;
pub mod fallback;

pub use alacritty::AlacrittyEngine;
pub use engine::{
    create_engine, create_fallback, Capture, CaptureFormat, CursorShape, CursorState,
    EngineChoice, EngineError, TerminalEngine,
};
pub use fallback::GridEngine;
