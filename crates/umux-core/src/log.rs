//! Append-only JSONL sink, one file per session.
//!
//! Each line is a self-contained JSON record. Write failures drop the
//! record with a warning; they never reach the session's callers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing::warn;

/// Per-session JSONL log file, named `YYYY-MM-DD_<sessionId>.log.jsonl`.
pub struct SessionLog {
    file: File,
    session_id: String,
}

impl SessionLog {
    /// Open (or create) today's log file for a session under `dir`.
    pub fn open(dir: &Path, session_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let name = format!("{}_{}.log.jsonl", Utc::now().format("%Y-%m-%d"), session_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(name))?;
        Ok(Self {
            file,
            session_id: session_id.to_string(),
        })
    }

    pub fn record_spawn(&mut self, name: &str, cwd: &str) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "event": "spawn",
            "sessionId": self.session_id,
            "name": name,
            "cwd": cwd,
        }));
    }

    pub fn record_output(&mut self, data: &str) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "sessionId": self.session_id,
            "stream": "output",
            "data": data,
        }));
    }

    pub fn record_input_text(&mut self, data: &str) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "sessionId": self.session_id,
            "stream": "input",
            "kind": "text",
            "data": data,
        }));
    }

    pub fn record_input_key(&mut self, key: &str) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "sessionId": self.session_id,
            "stream": "input",
            "kind": "key",
            "key": key,
        }));
    }

    pub fn record_input_keys(&mut self, keys: &[String]) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "sessionId": self.session_id,
            "stream": "input",
            "kind": "keys",
            "keys": keys,
        }));
    }

    pub fn record_query_response(&mut self, note: &str) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "sessionId": self.session_id,
            "stream": "input",
            "kind": "terminal_query_response",
            "note": note,
        }));
    }

    pub fn record_exit(&mut self, exit_code: i32) {
        self.write(json!({
            "ts": Utc::now().to_rfc3339(),
            "event": "exit",
            "sessionId": self.session_id,
            "exitCode": exit_code,
        }));
    }

    fn write(&mut self, record: serde_json::Value) {
        let mut line = record.to_string();
        line.push('\n');
        if let Err(err) = self.file.write_all(line.as_bytes()) {
            warn!(session_id = %self.session_id, error = %err, "dropping JSONL record");
        }
    }
}
