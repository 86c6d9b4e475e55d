//! Bounded line-oriented history for session output and input.

use std::collections::VecDeque;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

/// A match returned by [`History::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    /// Zero-based line index.
    pub line: usize,
    /// Byte offset of the match within the line.
    pub column: usize,
    /// The matched text.
    pub text: String,
    pub context: MatchContext,
}

/// Up to two adjacent lines on each side of a match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchContext {
    pub before: String,
    pub after: String,
}

const CONTEXT_LINES: usize = 2;

/// Bounded FIFO of complete lines plus a partial-line accumulator.
///
/// Complete lines beyond `capacity` are evicted from the front; the
/// partial holds whatever followed the last newline. Appends never fail.
pub struct History {
    lines: VecDeque<String>,
    partial: String,
    capacity: usize,
    track_timestamps: bool,
    last_write: Option<Instant>,
}

impl History {
    pub fn new(capacity: usize, track_timestamps: bool) -> Self {
        Self {
            lines: VecDeque::new(),
            partial: String::new(),
            capacity: capacity.max(1),
            track_timestamps,
            last_write: None,
        }
    }

    /// Append raw data, completing a line at every newline.
    pub fn append(&mut self, data: &str) {
        let mut rest = data;
        while let Some(idx) = rest.find('\n') {
            self.partial.push_str(&rest[..idx]);
            let line = std::mem::take(&mut self.partial);
            self.lines.push_back(line);
            rest = &rest[idx + 1..];
        }
        self.partial.push_str(rest);

        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }

        if self.track_timestamps {
            self.last_write = Some(Instant::now());
        }
    }

    /// All retained content: complete lines plus the partial, if any.
    pub fn get_all(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        if !self.partial.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.partial);
        }
        out
    }

    /// Last `k` lines (the partial counts as a line when non-empty).
    pub fn tail(&self, k: usize) -> String {
        let elements = self.elements();
        let start = elements.len().saturating_sub(k);
        elements[start..].join("\n")
    }

    /// First `k` complete lines.
    pub fn head(&self, k: usize) -> String {
        self.lines
            .iter()
            .take(k)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Complete lines in `[a, b)`, clamped to the retained range.
    pub fn slice(&self, a: usize, b: usize) -> String {
        let b = b.min(self.lines.len());
        if a >= b {
            return String::new();
        }
        self.lines
            .iter()
            .skip(a)
            .take(b - a)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The trailing portion of the content, at most `max_bytes` long.
    ///
    /// Walks lines from the back, so the cost is bounded by `max_bytes`
    /// regardless of how much history is retained.
    pub fn tail_bytes(&self, max_bytes: usize) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut total = 0;

        if !self.partial.is_empty() {
            parts.push(&self.partial);
            total += self.partial.len();
        }
        for line in self.lines.iter().rev() {
            if total >= max_bytes {
                break;
            }
            parts.push(line);
            total += line.len() + 1;
        }
        parts.reverse();

        let joined = parts.join("\n");
        if joined.len() <= max_bytes {
            return joined;
        }
        let mut cut = joined.len() - max_bytes;
        while !joined.is_char_boundary(cut) {
            cut += 1;
        }
        joined[cut..].to_string()
    }

    /// Complete lines, plus one for a non-empty partial.
    pub fn line_count(&self) -> usize {
        self.lines.len() + usize::from(!self.partial.is_empty())
    }

    /// Timestamp of the most recent append, when tracking is enabled.
    pub fn last_write(&self) -> Option<Instant> {
        self.last_write
    }

    /// Per-line regex scan.
    ///
    /// With `global` set, every non-overlapping match per line is
    /// returned; otherwise only the first match per line.
    pub fn search(&self, pattern: &str, global: bool) -> Result<Vec<SearchMatch>> {
        let re = Regex::new(pattern).map_err(|e| Error::invalid_regex(pattern, &e))?;

        let elements = self.elements();
        let mut matches = Vec::new();
        for (idx, line) in elements.iter().enumerate() {
            if global {
                for m in re.find_iter(line) {
                    matches.push(self.search_match(&elements, idx, m));
                }
            } else if let Some(m) = re.find(line) {
                matches.push(self.search_match(&elements, idx, m));
            }
        }
        Ok(matches)
    }

    fn search_match(&self, elements: &[&str], idx: usize, m: regex::Match<'_>) -> SearchMatch {
        let before_start = idx.saturating_sub(CONTEXT_LINES);
        let after_end = (idx + 1 + CONTEXT_LINES).min(elements.len());
        SearchMatch {
            line: idx,
            column: m.start(),
            text: m.as_str().to_string(),
            context: MatchContext {
                before: elements[before_start..idx].join("\n"),
                after: elements[idx + 1..after_end].join("\n"),
            },
        }
    }

    fn elements(&self) -> Vec<&str> {
        let mut elements: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        if !self.partial.is_empty() {
            elements.push(&self.partial);
        }
        elements
    }
}
