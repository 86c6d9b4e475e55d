//! A PTY session: one child process, two histories, a terminal engine,
//! and a typed event fan-out.
//!
//! Output flows through a single async pump task per session, so history
//! appends, engine writes, and event emission for a chunk happen in a
//! fixed order and never interleave with another chunk. Blocking PTY
//! reads and the child `wait()` run on dedicated OS threads that feed the
//! pump through a bounded channel.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use umux_pty::{KillSignal, PtyHandle};
use umux_vt::{Capture, CaptureFormat, CursorState, EngineChoice, TerminalEngine};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::history::{History, SearchMatch};
use crate::ids;
use crate::keys::{self, KeyInput};
use crate::log::SessionLog;
use crate::query::QueryResponder;
use crate::sync::lock_or_recover as lock;

/// Sliding window of recent output replayed into the fallback engine
/// after a primary-engine failure.
const REPLAY_WINDOW: usize = 2 * 1024 * 1024;

/// Capacity of the reader-to-pump channel. Bounded so a child that
/// outruns the pump blocks in the reader thread instead of growing a
/// queue.
const PUMP_QUEUE: usize = 64;

/// How long the pump keeps draining output after the child has exited
/// but before the PTY has reported EOF.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Options for spawning a session.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Program string, split on whitespace for argv. Empty runs the
    /// configured default shell.
    pub command: String,
    pub cwd: Option<PathBuf>,
    /// Environment overlay merged over the parent environment.
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
    /// Human name; defaults to the session id.
    pub name: Option<String>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            command: String::new(),
            cwd: None,
            env: HashMap::new(),
            cols: 80,
            rows: 24,
            name: None,
        }
    }
}

impl SpawnOptions {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }
}

/// Serializable snapshot of a session for the transport boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub pid: Option<u32>,
    pub cwd: String,
    pub alive: bool,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub cols: u16,
    pub rows: u16,
}

struct EngineState {
    engine: Box<dyn TerminalEngine>,
    choice: EngineChoice,
    replay: Vec<u8>,
}

enum PumpMsg {
    Chunk(Vec<u8>),
    Eof,
    Exited(i32),
}

/// A live PTY session.
pub struct Session {
    id: String,
    name: String,
    pid: Option<u32>,
    cwd: PathBuf,
    created_at: DateTime<Utc>,
    alive: AtomicBool,
    exited: AtomicBool,
    disposed: AtomicBool,
    exit_code: Mutex<Option<i32>>,
    size: Mutex<(u16, u16)>,
    output: Mutex<History>,
    input: Mutex<History>,
    engine: Mutex<EngineState>,
    responder: Mutex<QueryResponder>,
    writer: Mutex<Box<dyn Write + Send>>,
    pty: Mutex<PtyHandle>,
    events: broadcast::Sender<SessionEvent>,
    log: Mutex<Option<SessionLog>>,
    input_logging: bool,
    log_terminal_queries: bool,
}

impl Session {
    /// Spawn a child under a fresh PTY and start the session's pump.
    ///
    /// Must be called from within a Tokio runtime; the output pump runs as
    /// a task on it.
    pub fn spawn(options: SpawnOptions, config: &Config) -> Result<Arc<Self>> {
        let command = if options.command.trim().is_empty() {
            config.default_shell.clone()
        } else {
            options.command.clone()
        };
        let cwd = options
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut handle = PtyHandle::spawn(
            &command,
            Some(&cwd),
            &options.env,
            options.cols,
            options.rows,
        )?;
        let reader = handle
            .take_reader()
            .ok_or_else(|| Error::Lifecycle("PTY reader unavailable".to_string()))?;
        let writer = handle
            .take_writer()
            .ok_or_else(|| Error::Lifecycle("PTY writer unavailable".to_string()))?;
        let child = handle
            .take_child()
            .ok_or_else(|| Error::Lifecycle("PTY child unavailable".to_string()))?;
        let pid = handle.pid();

        let id = ids::session_id();
        let name = options.name.clone().unwrap_or_else(|| id.clone());

        let log = config.log_dir.as_ref().and_then(|dir| {
            match SessionLog::open(dir, &id) {
                Ok(mut log) => {
                    log.record_spawn(&name, &cwd.to_string_lossy());
                    Some(log)
                }
                Err(err) => {
                    warn!(session_id = %id, error = %err, "failed to open JSONL log");
                    None
                }
            }
        });

        let engine = umux_vt::create_engine(config.engine, options.cols, options.rows);
        let (events, _) = broadcast::channel(1024);

        let session = Arc::new(Session {
            id: id.clone(),
            name,
            pid,
            cwd,
            created_at: Utc::now(),
            alive: AtomicBool::new(true),
            exited: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            size: Mutex::new((options.cols, options.rows)),
            output: Mutex::new(History::new(config.history_limit, true)),
            input: Mutex::new(History::new(config.history_limit, false)),
            engine: Mutex::new(EngineState {
                engine,
                choice: config.engine,
                replay: Vec::new(),
            }),
            responder: Mutex::new(QueryResponder::new()),
            writer: Mutex::new(writer),
            pty: Mutex::new(handle),
            events,
            log: Mutex::new(log),
            input_logging: config.input_logging,
            log_terminal_queries: config.log_terminal_queries,
        });

        let (tx, rx) = mpsc::channel::<PumpMsg>(PUMP_QUEUE);

        let reader_tx = tx.clone();
        std::thread::Builder::new()
            .name(format!("umux-io-{id}"))
            .spawn(move || read_loop(reader, reader_tx))
            .map_err(|e| Error::Lifecycle(format!("failed to start I/O thread: {e}")))?;

        std::thread::Builder::new()
            .name(format!("umux-exit-{id}"))
            .spawn(move || {
                let mut child = child;
                let code = child.wait().map(|s| s.exit_code() as i32).unwrap_or(-1);
                let _ = tx.blocking_send(PumpMsg::Exited(code));
            })
            .map_err(|e| Error::Lifecycle(format!("failed to start exit watcher: {e}")))?;

        tokio::spawn(pump(Arc::clone(&session), rx));

        info!(session_id = %session.id, pid = ?session.pid, command = %command, "session spawned");
        Ok(session)
    }

    // ========== Identity & lifecycle state ==========

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> Option<i32> {
        *lock(&self.exit_code)
    }

    pub fn size(&self) -> (u16, u16) {
        *lock(&self.size)
    }

    pub fn info(&self) -> SessionInfo {
        let (cols, rows) = self.size();
        SessionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            pid: self.pid,
            cwd: self.cwd.to_string_lossy().into_owned(),
            alive: self.is_alive(),
            exit_code: self.exit_code(),
            created_at: self.created_at,
            cols,
            rows,
        }
    }

    /// Subscribe to this session's event stream. Only events emitted
    /// after the call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ========== Input path ==========

    /// Write literal text to the PTY.
    pub fn send(&self, text: &str) -> Result<()> {
        self.ensure_alive()?;
        if self.input_logging {
            lock(&self.input).append(text);
            if let Some(log) = lock(&self.log).as_mut() {
                log.record_input_text(text);
            }
        }
        self.write_pty(text.as_bytes())
    }

    /// Encode and send one key. Encoding errors surface before any byte
    /// is written.
    pub fn send_key(&self, key: &KeyInput) -> Result<()> {
        self.ensure_alive()?;
        let bytes = keys::encode_key(key)?;
        if self.input_logging {
            let token = keys::history_token(key);
            lock(&self.input).append(&format!("{token}\n"));
            if let Some(log) = lock(&self.log).as_mut() {
                log.record_input_key(&token);
            }
        }
        self.write_pty(&bytes)
    }

    /// Encode and send a list of keys as one write.
    pub fn send_keys(&self, keys_list: &[KeyInput]) -> Result<()> {
        self.ensure_alive()?;
        let bytes = keys::encode_keys(keys_list)?;
        if self.input_logging {
            let tokens: Vec<String> = keys_list.iter().map(keys::history_token).collect();
            let mut input = lock(&self.input);
            for token in &tokens {
                input.append(&format!("{token}\n"));
            }
            drop(input);
            if let Some(log) = lock(&self.log).as_mut() {
                log.record_input_keys(&tokens);
            }
        }
        self.write_pty(&bytes)
    }

    /// Resize the PTY and the terminal engine.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.ensure_alive()?;
        lock(&self.pty).resize(cols, rows)?;
        lock(&self.engine).engine.resize(cols, rows);
        *lock(&self.size) = (cols, rows);
        Ok(())
    }

    /// Deliver a named signal (`SIGTERM`, `int`, ...) to the child.
    pub fn kill(&self, signal: &str) -> Result<()> {
        let sig = KillSignal::parse(signal)
            .ok_or_else(|| Error::Lifecycle(format!("unrecognized signal: {signal}")))?;
        lock(&self.pty).signal(sig)?;
        Ok(())
    }

    // ========== Screen & history queries ==========

    /// Snapshot the visible screen.
    pub fn capture(&self, format: CaptureFormat) -> Capture {
        lock(&self.engine).engine.capture(format)
    }

    /// Plain-text screen content.
    pub fn capture_text(&self) -> String {
        self.capture(CaptureFormat::Text).content
    }

    /// Current cursor state.
    pub fn cursor(&self) -> CursorState {
        lock(&self.engine).engine.cursor()
    }

    pub fn output_text(&self) -> String {
        lock(&self.output).get_all()
    }

    pub fn output_tail(&self, k: usize) -> String {
        lock(&self.output).tail(k)
    }

    pub fn output_head(&self, k: usize) -> String {
        lock(&self.output).head(k)
    }

    pub fn output_slice(&self, a: usize, b: usize) -> String {
        lock(&self.output).slice(a, b)
    }

    pub fn output_search(&self, pattern: &str, global: bool) -> Result<Vec<SearchMatch>> {
        lock(&self.output).search(pattern, global)
    }

    pub fn output_line_count(&self) -> usize {
        lock(&self.output).line_count()
    }

    /// Bounded trailing slice of the output, for scan tails and output
    /// snapshots.
    pub fn output_tail_bytes(&self, max_bytes: usize) -> String {
        lock(&self.output).tail_bytes(max_bytes)
    }

    /// Timestamp of the most recent output chunk.
    pub fn last_output_at(&self) -> Option<Instant> {
        lock(&self.output).last_write()
    }

    pub fn input_text(&self) -> String {
        lock(&self.input).get_all()
    }

    pub fn input_tail(&self, k: usize) -> String {
        lock(&self.input).tail(k)
    }

    // ========== Teardown ==========

    /// Kill the child if alive, close the log sink, and stop emitting
    /// events. The single teardown path.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.is_alive() {
            if let Err(err) = lock(&self.pty).kill() {
                warn!(session_id = %self.id, error = %err, "failed to kill child on dispose");
            }
        }
        *lock(&self.log) = None;
        debug!(session_id = %self.id, "session disposed");
    }

    // ========== Internals ==========

    fn ensure_alive(&self) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::Lifecycle(format!("session {} is not alive", self.id)));
        }
        Ok(())
    }

    fn write_pty(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| Error::Pty(e.into()))
    }

    fn emit(&self, event: SessionEvent) {
        if !self.disposed.load(Ordering::SeqCst) {
            let _ = self.events.send(event);
        }
    }

    /// Called by the registry's ready poller on a busy-to-idle transition.
    pub(crate) fn emit_ready(&self) {
        self.emit(SessionEvent::Ready);
    }

    /// Apply one output chunk: answer terminal queries, append history,
    /// feed the engine, then fan out `Output` and `Screen`.
    fn process_chunk(&self, data: &[u8]) {
        let (cols, rows) = self.size();

        let replies = lock(&self.responder).scan(data, cols, rows);
        for reply in replies {
            if let Err(err) = self.write_pty(&reply.reply) {
                warn!(
                    session_id = %self.id,
                    query = reply.query,
                    error = %err,
                    "failed to answer terminal query"
                );
                continue;
            }
            if self.log_terminal_queries {
                lock(&self.input).append(&format!("<reply:{}>\n", reply.query));
                if let Some(log) = lock(&self.log).as_mut() {
                    log.record_query_response(reply.query);
                }
            }
        }

        let text = String::from_utf8_lossy(data);
        lock(&self.output).append(&text);
        if let Some(log) = lock(&self.log).as_mut() {
            log.record_output(&text);
        }

        self.feed_engine(data, cols, rows);

        self.emit(SessionEvent::Output {
            data: data.to_vec(),
            ts: Utc::now(),
        });
        self.emit(SessionEvent::Screen);
    }

    fn feed_engine(&self, data: &[u8], cols: u16, rows: u16) {
        let mut state = lock(&self.engine);

        state.replay.extend_from_slice(data);
        if state.replay.len() > REPLAY_WINDOW {
            let excess = state.replay.len() - REPLAY_WINDOW;
            state.replay.drain(..excess);
        }

        if let Err(err) = state.engine.write(data) {
            if state.choice == EngineChoice::Primary {
                warn!(
                    session_id = %self.id,
                    error = %err,
                    "terminal engine failed, swapping to fallback"
                );
                let mut fallback = umux_vt::create_fallback(cols, rows);
                let _ = fallback.write(&state.replay);
                state.engine = fallback;
                state.choice = EngineChoice::FallbackOnly;
            } else {
                warn!(session_id = %self.id, error = %err, "terminal engine error ignored");
            }
        }
    }

    /// Final transition: record the exit code, flip `alive`, emit the
    /// single `Exit` event, close the log.
    fn finish(&self, code: Option<i32>) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        let code = code.unwrap_or(-1);
        *lock(&self.exit_code) = Some(code);
        self.alive.store(false, Ordering::SeqCst);
        if let Some(log) = lock(&self.log).as_mut() {
            log.record_exit(code);
        }
        *lock(&self.log) = None;
        self.emit(SessionEvent::Exit { code });
        info!(session_id = %self.id, exit_code = code, "session exited");
    }
}

/// Blocking PTY read loop on a dedicated thread.
fn read_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<PumpMsg>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(PumpMsg::Chunk(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            // The PTY reports an error (EIO) once the child side closes.
            Err(_) => break,
        }
    }
    let _ = tx.blocking_send(PumpMsg::Eof);
}

/// Per-session output pump.
///
/// Serializes chunk processing and orders the `Exit` event after the
/// final output chunk: once the child has exited, the pump keeps
/// draining until the reader reports EOF or a short grace period passes
/// (a grandchild may hold the PTY open).
async fn pump(session: Arc<Session>, mut rx: mpsc::Receiver<PumpMsg>) {
    let mut pending_exit: Option<i32> = None;
    let mut saw_eof = false;
    loop {
        let msg = if pending_exit.is_some() && !saw_eof {
            match tokio::time::timeout(EXIT_DRAIN_GRACE, rx.recv()).await {
                Ok(msg) => msg,
                Err(_) => break,
            }
        } else {
            rx.recv().await
        };
        match msg {
            Some(PumpMsg::Chunk(data)) => session.process_chunk(&data),
            Some(PumpMsg::Eof) => {
                saw_eof = true;
                if pending_exit.is_some() {
                    break;
                }
            }
            Some(PumpMsg::Exited(code)) => {
                pending_exit = Some(code);
                if saw_eof {
                    break;
                }
            }
            None => break,
        }
    }
    session.finish(pending_exit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NamedKey;

    fn test_config() -> Config {
        Config {
            default_shell: "/bin/sh".to_string(),
            ..Config::default()
        }
    }

    async fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if pred() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_spawn_captures_output() {
        let session = Session::spawn(SpawnOptions::command("echo hello"), &test_config()).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || session
                .output_text()
                .contains("hello"))
            .await,
            "output history should contain the echo, got: {:?}",
            session.output_text()
        );
    }

    #[tokio::test]
    async fn test_exit_records_code_and_liveness() {
        let session = Session::spawn(SpawnOptions::command("echo done"), &test_config()).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || !session.is_alive()).await,
            "session should die after echo exits"
        );
        assert_eq!(session.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_exit_event_fires_exactly_once() {
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();
        let mut rx = session.subscribe();
        session.send("exit 3\n").unwrap();

        let mut exits = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(SessionEvent::Exit { code })) => {
                    exits += 1;
                    assert_eq!(code, 3);
                    // alive and exit code are settled before subscribers run.
                    assert!(!session.is_alive());
                    assert_eq!(session.exit_code(), Some(3));
                }
                Ok(Ok(_)) => continue,
                Ok(Err(_)) | Err(_) => break,
            }
            // Allow a beat for any (erroneous) second emission.
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Ok(SessionEvent::Exit { .. })) => exits += 1,
                _ => break,
            }
        }
        assert_eq!(exits, 1);
    }

    #[tokio::test]
    async fn test_screen_event_follows_output() {
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();
        let mut rx = session.subscribe();
        session.send("echo ORDERED\n").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(SessionEvent::Output { data, .. }))
                    if String::from_utf8_lossy(&data).contains("ORDERED") =>
                {
                    // The very next event for this chunk must be Screen.
                    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                        Ok(Ok(SessionEvent::Screen)) => break,
                        other => panic!("expected Screen after Output, got {other:?}"),
                    }
                }
                Ok(Ok(_)) => continue,
                other => panic!("did not observe echoed output: {other:?}"),
            }
        }
        session.dispose();
    }

    #[tokio::test]
    async fn test_send_appends_input_history() {
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();
        session.send("echo input-test\n").unwrap();
        assert!(session.input_text().contains("echo input-test"));
        session.dispose();
    }

    #[tokio::test]
    async fn test_input_logging_disabled() {
        let config = Config {
            input_logging: false,
            ..test_config()
        };
        let session = Session::spawn(SpawnOptions::default(), &config).unwrap();
        session.send("echo hidden\n").unwrap();
        assert_eq!(session.input_text(), "");
        session.dispose();
    }

    #[tokio::test]
    async fn test_send_key_records_token() {
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();
        session.send("echo key-test").unwrap();
        session.send_key(&KeyInput::Named(NamedKey::Enter)).unwrap();

        assert!(session.input_text().contains("<Enter>"));
        assert!(
            wait_until(Duration::from_secs(5), || session
                .output_text()
                .contains("key-test"))
            .await,
            "Enter should have submitted the command"
        );
        session.dispose();
    }

    #[tokio::test]
    async fn test_send_to_dead_session_fails() {
        let session = Session::spawn(SpawnOptions::command("echo bye"), &test_config()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || !session.is_alive()).await);
        let err = session.send("late\n").unwrap_err();
        assert!(matches!(err, Error::Lifecycle(_)));
    }

    #[tokio::test]
    async fn test_capture_reflects_output() {
        let session =
            Session::spawn(SpawnOptions::command("echo screen-test"), &test_config()).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || session
                .capture_text()
                .contains("screen-test"))
            .await,
            "capture should show the echo, got: {:?}",
            session.capture_text()
        );
    }

    #[tokio::test]
    async fn test_resize_updates_info() {
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();
        session.resize(132, 50).unwrap();
        let info = session.info();
        assert_eq!((info.cols, info.rows), (132, 50));
        let cap = session.capture(CaptureFormat::Text);
        assert_eq!((cap.cols, cap.rows), (132, 50));
        session.dispose();
    }

    #[tokio::test]
    async fn test_query_responder_answers_live_child() {
        let reply_file = std::env::temp_dir().join(format!(
            "umux-query-reply-{}",
            uuid::Uuid::new_v4()
        ));
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();

        // The child asks for a cursor position report and captures the six
        // reply bytes the session injects into the PTY input.
        session
            .send(&format!(
                "stty raw -echo; printf '\\033[6n'; head -c 6 > {}; stty sane; echo QDONE\n",
                reply_file.display()
            ))
            .unwrap();

        assert!(
            wait_until(Duration::from_secs(5), || session
                .output_text()
                .contains("QDONE"))
            .await,
            "child should finish after receiving the reply, output: {:?}",
            session.output_text()
        );

        let reply = std::fs::read(&reply_file).unwrap_or_default();
        assert_eq!(reply, b"\x1b[1;1R".to_vec());
        // Synthetic replies go to the PTY input, never into output history.
        assert!(!session.output_text().contains("\x1b[1;1R"));

        std::fs::remove_file(&reply_file).ok();
        session.dispose();
    }

    #[tokio::test]
    async fn test_dispose_kills_child() {
        let session = Session::spawn(SpawnOptions::command("sleep 30"), &test_config()).unwrap();
        assert!(session.is_alive());
        session.dispose();
        assert!(
            wait_until(Duration::from_secs(5), || !session.is_alive()).await,
            "dispose should kill the child"
        );
    }

    #[tokio::test]
    async fn test_kill_named_signal() {
        let session = Session::spawn(SpawnOptions::command("sleep 30"), &test_config()).unwrap();
        session.kill("SIGTERM").unwrap();
        assert!(wait_until(Duration::from_secs(5), || !session.is_alive()).await);
    }

    #[tokio::test]
    async fn test_kill_unknown_signal() {
        let session = Session::spawn(SpawnOptions::command("sleep 30"), &test_config()).unwrap();
        let err = session.kill("SIGFROB").unwrap_err();
        assert!(matches!(err, Error::Lifecycle(_)));
        session.dispose();
    }

    #[tokio::test]
    async fn test_spawn_applies_env_overlay() {
        let mut options = SpawnOptions::default();
        options
            .env
            .insert("UMUX_SESSION_TEST".to_string(), "overlay".to_string());
        let session = Session::spawn(options, &test_config()).unwrap();
        session.send("echo $UMUX_SESSION_TEST\n").unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || session
                .output_text()
                .contains("overlay"))
            .await
        );
        session.dispose();
    }

    struct FailingEngine;

    impl TerminalEngine for FailingEngine {
        fn write(&mut self, _bytes: &[u8]) -> std::result::Result<(), umux_vt::EngineError> {
            Err(umux_vt::EngineError("induced failure".to_string()))
        }

        fn resize(&mut self, _cols: u16, _rows: u16) {}

        fn capture(&self, format: CaptureFormat) -> Capture {
            Capture {
                content: String::new(),
                format,
                cols: 0,
                rows: 0,
            }
        }

        fn cursor(&self) -> CursorState {
            CursorState {
                row: 0,
                col: 0,
                shape: umux_vt::CursorShape::Block,
                visible: true,
            }
        }
    }

    #[tokio::test]
    async fn test_engine_failure_swaps_to_fallback_with_replay() {
        let session = Session::spawn(SpawnOptions::default(), &test_config()).unwrap();
        session.send("echo before-swap\n").unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || session
                .output_text()
                .contains("before-swap"))
            .await
        );

        // Break the engine; the next chunk must trigger the swap.
        lock(&session.engine).engine = Box::new(FailingEngine);
        session.send("echo after-swap\n").unwrap();

        assert!(
            wait_until(Duration::from_secs(5), || session
                .capture_text()
                .contains("after-swap"))
            .await,
            "fallback engine should take over, capture: {:?}",
            session.capture_text()
        );
        assert_eq!(lock(&session.engine).choice, EngineChoice::FallbackOnly);
        // The replayed window carries output from before the failure.
        assert!(session.capture_text().contains("before-swap"));
        session.dispose();
    }

    #[tokio::test]
    async fn test_jsonl_sink_records_session_lifetime() {
        let dir = std::env::temp_dir().join(format!("umux-session-log-{}", uuid::Uuid::new_v4()));
        let config = Config {
            log_dir: Some(dir.clone()),
            ..test_config()
        };
        let session = Session::spawn(SpawnOptions::default(), &config).unwrap();
        session.send("echo logged\n").unwrap();
        session.send("exit\n").unwrap();
        assert!(wait_until(Duration::from_secs(5), || !session.is_alive()).await);

        let path = std::fs::read_dir(&dir)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with(&format!("_{}.log.jsonl", session.id())));

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records[0]["event"], "spawn");
        assert!(records
            .iter()
            .any(|r| r["stream"] == "input" && r["data"] == "echo logged\n"));
        assert!(records
            .iter()
            .any(|r| r["stream"] == "output"
                && r["data"].as_str().unwrap_or_default().contains("logged")));
        assert_eq!(records.last().unwrap()["event"], "exit");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_session_info_shape() {
        let session = Session::spawn(
            SpawnOptions {
                name: Some("worker".to_string()),
                ..SpawnOptions::default()
            },
            &test_config(),
        )
        .unwrap();
        let info = session.info();
        assert!(info.id.starts_with("sess-"));
        assert_eq!(info.name, "worker");
        assert!(info.alive);
        assert!(info.pid.is_some());
        assert_eq!(info.exit_code, None);

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("exitCode").is_some());
        assert!(json.get("createdAt").is_some());
        session.dispose();
    }
}
