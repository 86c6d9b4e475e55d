//! Minimal fallback grid engine.
//!
//! A deliberately small VT model driven by the `vte` parser: printable
//! text, C0 controls, cursor movement, and erase operations over a plain
//! character grid. It exists so a session can keep answering screen
//! queries after the primary engine fails; styling is not tracked, so an
//! ANSI capture from this engine carries positioning only.

use vte::{Params, Perform};

use crate::engine::{Capture, CaptureFormat, CursorShape, CursorState, EngineError, TerminalEngine};

const TAB_STOP: usize = 8;

/// Fallback terminal engine over a plain character grid.
pub struct GridEngine {
    parser: vte::Parser,
    grid: Grid,
}

struct Grid {
    cols: usize,
    rows: usize,
    cells: Vec<Vec<char>>,
    row: usize,
    col: usize,
    saved: Option<(usize, usize)>,
}

impl GridEngine {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            parser: vte::Parser::new(),
            grid: Grid::new(cols as usize, rows as usize),
        }
    }
}

impl TerminalEngine for GridEngine {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        for &byte in bytes {
            self.parser.advance(&mut self.grid, byte);
        }
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.grid.resize(cols as usize, rows as usize);
    }

    fn capture(&self, format: CaptureFormat) -> Capture {
        let text = self
            .grid
            .cells
            .iter()
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect::<Vec<_>>();

        let content = match format {
            CaptureFormat::Text => text.join("\n"),
            CaptureFormat::Ansi => format!(
                "\x1b[2J\x1b[H{}\x1b[{};{}H",
                text.join("\r\n"),
                self.grid.row + 1,
                self.grid.col + 1
            ),
        };

        Capture {
            content,
            format,
            cols: self.grid.cols as u16,
            rows: self.grid.rows as u16,
        }
    }

    fn cursor(&self) -> CursorState {
        CursorState {
            row: self.grid.row as u16,
            col: self.grid.col as u16,
            shape: CursorShape::Block,
            visible: true,
        }
    }
}

impl Grid {
    fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
            cells: vec![vec![' '; cols.max(1)]; rows.max(1)],
            row: 0,
            col: 0,
            saved: None,
        }
    }

    fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        for row in &mut self.cells {
            row.resize(cols, ' ');
        }
        self.cells.resize(rows, vec![' '; cols]);
        self.cols = cols;
        self.rows = rows;
        self.row = self.row.min(rows - 1);
        self.col = self.col.min(cols - 1);
    }

    fn line_feed(&mut self) {
        if self.row + 1 < self.rows {
            self.row += 1;
        } else {
            self.cells.remove(0);
            self.cells.push(vec![' '; self.cols]);
        }
    }

    fn clear_row(&mut self, row: usize, from: usize, to: usize) {
        for col in from..to.min(self.cols) {
            self.cells[row][col] = ' ';
        }
    }
}

impl Perform for Grid {
    fn print(&mut self, ch: char) {
        if self.col >= self.cols {
            self.col = 0;
            self.line_feed();
        }
        self.cells[self.row][self.col] = ch;
        self.col += 1;
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\x08' => self.col = self.col.saturating_sub(1),
            b'\t' => {
                let next = (self.col / TAB_STOP + 1) * TAB_STOP;
                self.col = next.min(self.cols - 1);
            }
            b'\n' => self.line_feed(),
            b'\r' => self.col = 0,
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        let arg = |idx: usize, default: usize| -> usize {
            params
                .iter()
                .nth(idx)
                .and_then(|p| p.first().copied())
                .map(|v: i64| v as usize)
                .filter(|v| *v != 0)
                .unwrap_or(default)
        };
        let mode = || -> usize {
            params
                .iter()
                .next()
                .and_then(|p| p.first().copied())
                .map(|v: i64| v as usize)
                .unwrap_or(0)
        };

        match action {
            'H' | 'f' => {
                self.row = (arg(0, 1) - 1).min(self.rows - 1);
                self.col = (arg(1, 1) - 1).min(self.cols - 1);
            }
            'A' => self.row = self.row.saturating_sub(arg(0, 1)),
            'B' => self.row = (self.row + arg(0, 1)).min(self.rows - 1),
            'C' => self.col = (self.col + arg(0, 1)).min(self.cols - 1),
            'D' => self.col = self.col.saturating_sub(arg(0, 1)),
            'G' => self.col = (arg(0, 1) - 1).min(self.cols - 1),
            'J' => match mode() {
                0 => {
                    let (row, col) = (self.row, self.col);
                    self.clear_row(row, col, self.cols);
                    for r in row + 1..self.rows {
                        self.clear_row(r, 0, self.cols);
                    }
                }
                1 => {
                    let (row, col) = (self.row, self.col);
                    for r in 0..row {
                        self.clear_row(r, 0, self.cols);
                    }
                    self.clear_row(row, 0, (col + 1).min(self.cols));
                }
                _ => {
                    for r in 0..self.rows {
                        self.clear_row(r, 0, self.cols);
                    }
                }
            },
            'K' => match mode() {
                0 => {
                    let (row, col) = (self.row, self.col);
                    self.clear_row(row, col, self.cols);
                }
                1 => {
                    let (row, col) = (self.row, self.col);
                    self.clear_row(row, 0, (col + 1).min(self.cols));
                }
                _ => {
                    let row = self.row;
                    self.clear_row(row, 0, self.cols);
                }
            },
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, byte: u8) {
        match byte {
            b'7' => self.saved = Some((self.row, self.col)),
            b'8' => {
                if let Some((row, col)) = self.saved {
                    self.row = row.min(self.rows - 1);
                    self.col = col.min(self.cols - 1);
                }
            }
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}
    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}
}
