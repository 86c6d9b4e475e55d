use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize,
};

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    IoError(std::io::Error),
    ResizeFailed(String),
    SignalFailed(String),
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::IoError(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::ResizeFailed(msg) => write!(f, "PTY resize failed: {msg}"),
            PtyError::SignalFailed(msg) => write!(f, "signal delivery failed: {msg}"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::IoError(err)
    }
}

/// Signals a caller may deliver to the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    Term,
    Kill,
    Int,
    Hup,
}

impl KillSignal {
    /// Parse a signal name such as `SIGTERM` or `term` (case-insensitive,
    /// `SIG` prefix optional). Returns `None` for unrecognized names.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(&name);
        match name {
            "TERM" => Some(KillSignal::Term),
            "KILL" => Some(KillSignal::Kill),
            "INT" => Some(KillSignal::Int),
            "HUP" => Some(KillSignal::Hup),
            _ => None,
        }
    }
}

/// Owns a portable-pty master pair, child process, reader, and writer.
///
/// The reader, writer, and child can each be taken out once so they can be
/// driven from dedicated threads without holding a handle lock. The handle
/// retains the master (for resize) and a child killer (for teardown).
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Option<Box<dyn Child + Send + Sync>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl PtyHandle {
    /// Spawn a new PTY running `command` with the given dimensions.
    ///
    /// The command string is split on whitespace: the first token is the
    /// program, the rest are its arguments. The child inherits the parent
    /// environment (portable-pty starts from an empty one), with `env`
    /// merged on top, `TERM` advertised as `xterm-256color`, and `cwd`
    /// applied when given.
    pub fn spawn(
        command: &str,
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
        cols: u16,
        rows: u16,
    ) -> Result<Self, PtyError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| PtyError::SpawnFailed("empty command".to_string()))?;

        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(parts);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn command: {e}")))?;
        let pid = child.process_id();
        let killer = child.clone_killer();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer: Some(writer),
            child: Some(child),
            killer,
            pid,
        })
    }

    /// The child's process id, if the platform reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Resize the PTY to new dimensions.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    /// Take the PTY output reader for a dedicated read thread.
    ///
    /// The reader blocks, so callers should drive it off the async runtime.
    /// Can only be taken once.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Take the PTY input writer. Can only be taken once.
    pub fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    /// Take ownership of the child process so a dedicated thread can block
    /// in `wait()` for its exit status. Can only be taken once.
    pub fn take_child(&mut self) -> Option<Box<dyn Child + Send + Sync>> {
        self.child.take()
    }

    /// Forcibly terminate the child process.
    pub fn kill(&mut self) -> Result<(), PtyError> {
        self.killer
            .kill()
            .map_err(|e| PtyError::SignalFailed(format!("{e}")))
    }

    /// Deliver a named signal to the child process.
    #[cfg(unix)]
    pub fn signal(&self, signal: KillSignal) -> Result<(), PtyError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self
            .pid
            .ok_or_else(|| PtyError::SignalFailed("child pid unknown".to_string()))?;
        let sig = match signal {
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
            KillSignal::Int => Signal::SIGINT,
            KillSignal::Hup => Signal::SIGHUP,
        };
        kill(Pid::from_raw(pid as i32), sig).map_err(|e| PtyError::SignalFailed(format!("{e}")))
    }

    #[cfg(not(unix))]
    pub fn signal(&self, _signal: KillSignal) -> Result<(), PtyError> {
        Err(PtyError::SignalFailed(
            "named signals are not supported on this platform".to_string(),
        ))
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
