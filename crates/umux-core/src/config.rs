use std::path::PathBuf;

use umux_vt::EngineChoice;

/// Engine-wide configuration.
///
/// Environment variables are read exactly once, in [`Config::from_env`];
/// nothing else in the engine touches the process environment at runtime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-session history capacity in complete lines.
    pub history_limit: usize,
    /// Program to run when `spawn` receives an empty command.
    pub default_shell: String,
    /// Directory for per-session JSONL logs; `None` disables the sink.
    pub log_dir: Option<PathBuf>,
    /// Record `send`/`send_key` input into history and the JSONL sink.
    pub input_logging: bool,
    /// Which terminal engine sessions run.
    pub engine: EngineChoice,
    /// Record synthetic terminal-query replies into the JSONL sink.
    pub log_terminal_queries: bool,
    /// Default wait timeout applied at the API boundary when a caller
    /// leaves `timeout_ms` unset.
    pub default_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_limit: 10_000,
            default_shell: umux_pty::default_shell(),
            log_dir: None,
            input_logging: true,
            engine: EngineChoice::default(),
            log_terminal_queries: false,
            default_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Build a config from `UMUX_*` environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(limit) = read_env("UMUX_HISTORY_LIMIT").and_then(|v| v.parse().ok()) {
            config.history_limit = limit;
        }
        if let Some(shell) = read_env("UMUX_DEFAULT_SHELL") {
            config.default_shell = shell;
        }
        if let Some(dir) = read_env("UMUX_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if read_env("UMUX_DISABLE_INPUT_LOGGING").is_some_and(|v| is_truthy(&v)) {
            config.input_logging = false;
        }
        if let Some(engine) = read_env("UMUX_ENGINE").and_then(|v| v.parse().ok()) {
            config.engine = engine;
        }
        if read_env("UMUX_LOG_TERMINAL_QUERIES").is_some_and(|v| is_truthy(&v)) {
            config.log_terminal_queries = true;
        }
        if let Some(ms) = read_env("UMUX_DEFAULT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.default_timeout_ms = ms;
        }

        config
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
