use serde::Serialize;

/// Output format of a screen capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// Visible viewport as plain text, trailing spaces trimmed per row.
    Text,
    /// Visible viewport with SGR and positioning sequences sufficient for
    /// a faithful redisplay.
    Ansi,
}

/// A snapshot of the visible terminal grid.
#[derive(Debug, Clone, Serialize)]
pub struct Capture {
    pub content: String,
    pub format: CaptureFormat,
    pub cols: u16,
    pub rows: u16,
}

/// Shape of the terminal cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorShape {
    Block,
    Underline,
    Bar,
    Hidden,
}

/// Current state of the cursor.
#[derive(Debug, Clone, Serialize)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub shape: CursorShape,
    pub visible: bool,
}

/// Error from a terminal engine write.
///
/// Engine failures never cross the session boundary: the session reacts by
/// swapping to the fallback engine and replaying recent output.
#[derive(Debug)]
pub struct EngineError(pub String);

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "terminal engine error: {}", self.0)
    }
}

impl std::error::Error for EngineError {}

/// Contract between a session and its terminal state model.
///
/// Both provided implementations apply bytes synchronously, so a `write`
/// that returns `Ok` guarantees the screen state reflects those bytes and
/// the session may emit its `Screen` event immediately after.
pub trait TerminalEngine: Send {
    /// Feed raw PTY output bytes into the terminal state machine.
    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError>;

    /// Resize the terminal grid.
    fn resize(&mut self, cols: u16, rows: u16);

    /// Snapshot the visible grid in the requested format.
    fn capture(&self, format: CaptureFormat) -> Capture;

    /// Current cursor position, shape, and visibility.
    fn cursor(&self) -> CursorState;
}

/// Which engine a session runs, and what happens when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineChoice {
    /// Alacritty-backed engine; swap to the fallback (with bounded replay)
    /// on any engine error.
    #[default]
    Primary,
    /// Alacritty-backed engine; errors are swallowed and no swap happens.
    PrimaryStrict,
    /// Run the minimal fallback grid engine from the start.
    FallbackOnly,
}

impl std::str::FromStr for EngineChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(EngineChoice::Primary),
            "primary-strict" => Ok(EngineChoice::PrimaryStrict),
            "fallback-only" | "fallback" => Ok(EngineChoice::FallbackOnly),
            other => Err(format!("unknown engine choice: {other}")),
        }
    }
}

/// Create the initial engine for a session.
pub fn create_engine(choice: EngineChoice, cols: u16, rows: u16) -> Box<dyn TerminalEngine> {
    match choice {
        EngineChoice::Primary | EngineChoice::PrimaryStrict => {
            Box::new(crate::alacritty::AlacrittyEngine::new(cols, rows))
        }
        EngineChoice::FallbackOnly => Box::new(crate::fallback::GridEngine::new(cols, rows)),
    }
}

/// Create the fallback engine a session swaps to after a primary failure.
pub fn create_fallback(cols: u16, rows: u16) -> Box<dyn TerminalEngine> {
    Box::new(crate::fallback::GridEngine::new(cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_choice_parse() {
        assert_eq!("primary".parse(), Ok(EngineChoice::Primary));
        assert_eq!("primary-strict".parse(), Ok(EngineChoice::PrimaryStrict));
        assert_eq!("fallback-only".parse(), Ok(EngineChoice::FallbackOnly));
        assert_eq!("Fallback".parse(), Ok(EngineChoice::FallbackOnly));
        assert!("xterm".parse::<EngineChoice>().is_err());
    }

    #[test]
    fn test_create_engine_dimensions() {
        for choice in [
            EngineChoice::Primary,
            EngineChoice::PrimaryStrict,
            EngineChoice::FallbackOnly,
        ] {
            let engine = create_engine(choice, 100, 30);
            let cap = engine.capture(CaptureFormat::Text);
            assert_eq!(cap.cols, 100);
            assert_eq!(cap.rows, 30);
        }
    }
}
