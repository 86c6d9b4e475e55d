//! Primary terminal engine over `alacritty_terminal`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags as CellFlags;
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi::{self, Color, CursorShape as AlacCursorShape, NamedColor};

use crate::engine::{Capture, CaptureFormat, CursorShape, CursorState, EngineError, TerminalEngine};

/// Event sink for the embedded terminal.
///
/// Device-status queries are answered upstream by the session's
/// auto-responder, so terminal events (including `PtyWrite`) are dropped
/// here rather than routed back to the PTY a second time.
#[derive(Clone)]
struct EventProxy;

impl EventListener for EventProxy {
    fn send_event(&self, _event: Event) {}
}

/// Dimensions helper for creating / resizing the terminal.
struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// Full-fidelity terminal engine backed by `alacritty_terminal::Term` and
/// its VTE state machine.
pub struct AlacrittyEngine {
    term: Term<EventProxy>,
    parser: ansi::Processor,
}

impl AlacrittyEngine {
    /// Create a new engine with the given dimensions.
    ///
    /// Uses 10,000 lines of scrollback history by default.
    pub fn new(cols: u16, rows: u16) -> Self {
        let config = Config {
            scrolling_history: 10_000,
            ..Config::default()
        };

        let size = TermSize {
            columns: cols as usize,
            screen_lines: rows as usize,
        };

        let term = Term::new(config, &size, EventProxy);

        Self {
            term,
            parser: ansi::Processor::new(),
        }
    }

    fn row_text(&self, row: usize) -> String {
        let grid = self.term.grid();
        let line = Line(row as i32);
        let mut text = String::new();
        for col in 0..self.term.columns() {
            let cell = &grid[line][Column(col)];
            if cell.flags.contains(CellFlags::WIDE_CHAR_SPACER) {
                continue;
            }
            text.push(cell.c);
        }
        text.truncate(text.trim_end().len());
        text
    }

    fn capture_text(&self) -> String {
        (0..self.term.screen_lines())
            .map(|row| self.row_text(row))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn capture_ansi(&self) -> String {
        let grid = self.term.grid();
        let mut out = String::from("\x1b[2J\x1b[H");
        let mut current_sgr = String::new();

        for row in 0..self.term.screen_lines() {
            if row > 0 {
                out.push_str("\r\n");
            }
            let line = Line(row as i32);
            // Trailing default-styled blanks carry no information.
            let mut last = 0;
            for col in 0..self.term.columns() {
                let cell = &grid[line][Column(col)];
                if cell.c != ' ' || sgr_sequence(&cell.fg, &cell.bg, cell.flags) != "" {
                    last = col + 1;
                }
            }
            for col in 0..last {
                let cell = &grid[line][Column(col)];
                if cell.flags.contains(CellFlags::WIDE_CHAR_SPACER) {
                    continue;
                }
                let sgr = sgr_sequence(&cell.fg, &cell.bg, cell.flags);
                if sgr != current_sgr {
                    out.push_str("\x1b[0m");
                    if !sgr.is_empty() {
                        out.push_str("\x1b[");
                        out.push_str(&sgr);
                        out.push('m');
                    }
                    current_sgr = sgr;
                }
                out.push(cell.c);
            }
        }

        let cursor = self.cursor();
        out.push_str("\x1b[0m");
        out.push_str(&format!("\x1b[{};{}H", cursor.row + 1, cursor.col + 1));
        out
    }
}

impl TerminalEngine for AlacrittyEngine {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let term = &mut self.term;
        let parser = &mut self.parser;
        catch_unwind(AssertUnwindSafe(|| {
            for byte in bytes {
                parser.advance(term, *byte);
            }
        }))
        .map_err(|_| EngineError("terminal state machine panicked".to_string()))
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        let size = TermSize {
            columns: cols as usize,
            screen_lines: rows as usize,
        };
        self.term.resize(size);
    }

    fn capture(&self, format: CaptureFormat) -> Capture {
        let content = match format {
            CaptureFormat::Text => self.capture_text(),
            CaptureFormat::Ansi => self.capture_ansi(),
        };
        Capture {
            content,
            format,
            cols: self.term.columns() as u16,
            rows: self.term.screen_lines() as u16,
        }
    }

    fn cursor(&self) -> CursorState {
        let content = self.term.renderable_content();
        let cursor = &content.cursor;

        let shape = match cursor.shape {
            AlacCursorShape::Block | AlacCursorShape::HollowBlock => CursorShape::Block,
            AlacCursorShape::Underline => CursorShape::Underline,
            AlacCursorShape::Beam => CursorShape::Bar,
            AlacCursorShape::Hidden => CursorShape::Hidden,
        };

        CursorState {
            row: cursor.point.line.0 as u16,
            col: cursor.point.column.0 as u16,
            shape,
            visible: cursor.shape != AlacCursorShape::Hidden,
        }
    }
}

/// Render a cell's attributes as SGR parameters, empty for default style.
fn sgr_sequence(fg: &Color, bg: &Color, flags: CellFlags) -> String {
    let mut params: Vec<String> = Vec::new();

    if flags.contains(CellFlags::BOLD) {
        params.push("1".to_string());
    }
    if flags.contains(CellFlags::DIM) {
        params.push("2".to_string());
    }
    if flags.contains(CellFlags::ITALIC) {
        params.push("3".to_string());
    }
    if flags.contains(CellFlags::UNDERLINE) {
        params.push("4".to_string());
    }
    if flags.contains(CellFlags::INVERSE) {
        params.push("7".to_string());
    }
    if flags.contains(CellFlags::STRIKEOUT) {
        params.push("9".to_string());
    }

    if let Some(code) = color_params(fg, true) {
        params.push(code);
    }
    if let Some(code) = color_params(bg, false) {
        params.push(code);
    }

    params.join(";")
}

/// SGR parameters selecting a foreground or background color, or `None`
/// for the default.
fn color_params(color: &Color, is_fg: bool) -> Option<String> {
    let base = if is_fg { 30 } else { 40 };
    let bright = if is_fg { 90 } else { 100 };
    match color {
        Color::Named(named) => {
            let idx = *named as usize;
            match named {
                NamedColor::Foreground | NamedColor::Background => None,
                _ if idx < 8 => Some(format!("{}", base + idx)),
                _ if idx < 16 => Some(format!("{}", bright + idx - 8)),
                _ => None,
            }
        }
        Color::Indexed(idx) => Some(format!("{};5;{}", if is_fg { 38 } else { 48 }, idx)),
        Color::Spec(rgb) => Some(format!(
            "{};2;{};{};{}",
            if is_fg { 38 } else { 48 },
            rgb.r,
            rgb.g,
            rgb.b
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_engine_dimensions() {
        let engine = AlacrittyEngine::new(80, 24);
        let cap = engine.capture(CaptureFormat::Text);
        assert_eq!(cap.cols, 80);
        assert_eq!(cap.rows, 24);
    }

    #[test]
    fn test_write_hello() {
        let mut engine = AlacrittyEngine::new(80, 24);
        engine.write(b"hello").unwrap();

        let cap = engine.capture(CaptureFormat::Text);
        let first = cap.content.lines().next().unwrap();
        assert_eq!(first, "hello");
    }

    #[test]
    fn test_text_capture_trims_trailing_spaces() {
        let mut engine = AlacrittyEngine::new(20, 4);
        engine.write(b"ab\r\ncd").unwrap();

        let cap = engine.capture(CaptureFormat::Text);
        assert_eq!(cap.content, "ab\ncd\n\n");
    }

    #[test]
    fn test_resize_engine() {
        let mut engine = AlacrittyEngine::new(80, 24);
        engine.resize(120, 40);
        let cap = engine.capture(CaptureFormat::Text);
        assert_eq!(cap.cols, 120);
        assert_eq!(cap.rows, 40);
    }

    #[test]
    fn test_cursor_position_after_write() {
        let mut engine = AlacrittyEngine::new(80, 24);
        engine.write(b"hello").unwrap();

        let cursor = engine.cursor();
        assert_eq!(cursor.row, 0);
        assert_eq!(cursor.col, 5);
        assert!(cursor.visible);
    }

    #[test]
    fn test_cursor_wraps_to_next_line() {
        let mut engine = AlacrittyEngine::new(10, 5);
        engine.write(b"0123456789AB").unwrap();

        let cursor = engine.cursor();
        assert_eq!(cursor.row, 1);
        assert_eq!(cursor.col, 2);
    }

    #[test]
    fn test_ansi_capture_carries_color() {
        let mut engine = AlacrittyEngine::new(40, 4);
        engine.write(b"\x1b[31mred\x1b[0m plain").unwrap();

        let cap = engine.capture(CaptureFormat::Ansi);
        assert!(cap.content.contains("\x1b[31m"), "capture: {:?}", cap.content);
        assert!(cap.content.contains("red"));
        assert!(cap.content.contains("plain"));
    }

    #[test]
    fn test_ansi_capture_positions_cursor() {
        let mut engine = AlacrittyEngine::new(40, 4);
        engine.write(b"x\r\ny").unwrap();

        let cap = engine.capture(CaptureFormat::Ansi);
        assert!(cap.content.starts_with("\x1b[2J\x1b[H"));
        assert!(cap.content.ends_with("\x1b[2;2H"), "capture: {:?}", cap.content);
    }

    #[test]
    fn test_scrolling_keeps_viewport() {
        let mut engine = AlacrittyEngine::new(10, 3);
        engine.write(b"1\r\n2\r\n3\r\n4\r\n5").unwrap();

        let cap = engine.capture(CaptureFormat::Text);
        assert_eq!(cap.content, "3\n4\n5");
    }
}
