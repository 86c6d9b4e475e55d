//! Wait resolver: one-shot waits over a session's live event stream.
//!
//! A wait names conditions (output pattern, screen pattern, idle window,
//! readiness, exit) plus a mandatory timeout, and resolves exactly once
//! to a typed outcome. Timeouts and `not`-pattern rejections are
//! outcomes, not errors. All subscriptions and timers are scoped to the
//! resolving call, so a late event after resolution is simply dropped.

use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use umux_pty::foreground_process;

use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::session::Session;

/// Rolling scan-tail size for matching across chunk boundaries.
const SCAN_TAIL: usize = 8 * 1024;

/// Readiness poll cadence.
const READY_POLL: Duration = Duration::from_millis(100);

/// A wait request. At minimum `timeout_ms` must be positive; a request
/// with no other condition resolves as `timeout`.
#[derive(Debug, Clone, Default)]
pub struct WaitRequest {
    /// Resolve `pattern` when this regex matches session output.
    pub pattern: Option<String>,
    /// Resolve `screen` when this regex matches the visible screen.
    pub screen_pattern: Option<String>,
    /// Resolve `rejected` when this regex matches session output.
    /// Checked before `pattern` within each chunk.
    pub not: Option<String>,
    /// Resolve `idle` after this many milliseconds without output.
    pub idle_ms: Option<u64>,
    /// Resolve `exit` when the child exits.
    pub exit: bool,
    /// Resolve `ready` when the shell sits at its prompt (or is dead).
    pub ready: bool,
    /// Mandatory timeout.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitReason {
    Pattern,
    Screen,
    Ready,
    Idle,
    Exit,
    Timeout,
    Rejected,
}

/// Outcome of a resolved wait.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitOutcome {
    pub reason: WaitReason,
    /// `[matched text, capture 1, ...]` for pattern/screen resolutions.
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Bounded output snapshot observed during the wait.
    pub output: String,
    pub waited_ms: u64,
}

/// Resolve a wait against a session.
///
/// Pre-checks existing state first (`not`, `pattern`, `screen`, `ready`,
/// `exit`, in that order), then reacts to live events until the first
/// condition fires or the timeout expires.
pub async fn wait_for(session: &Session, request: &WaitRequest) -> Result<WaitOutcome> {
    if request.timeout_ms == 0 {
        return Err(Error::InvalidInput(
            "wait request needs a positive timeout".to_string(),
        ));
    }
    let pattern = compile(request.pattern.as_deref())?;
    let screen_pattern = compile(request.screen_pattern.as_deref())?;
    let not = compile(request.not.as_deref())?;

    let started = Instant::now();

    // Subscribe before the pre-checks: a chunk arriving between check and
    // subscription would otherwise be lost.
    let mut rx = session.subscribe();

    // Bounded scan tail. The session appends to history before emitting
    // `Output`, so re-reading the history tail on each event observes the
    // chunk exactly once while still catching matches that straddle chunk
    // boundaries.
    let mut tail = session.output_tail_bytes(SCAN_TAIL);

    // Pre-checks against state that exists before the wait.
    {
        let history = session.output_text();
        if let Some(re) = &not {
            if re.is_match(&history) {
                return Ok(finish(WaitReason::Rejected, None, None, &tail, started));
            }
        }
        if let Some(re) = &pattern {
            if let Some(caps) = re.captures(&history) {
                return Ok(finish(
                    WaitReason::Pattern,
                    Some(match_vec(&caps)),
                    None,
                    &tail,
                    started,
                ));
            }
        }
        if let Some(re) = &screen_pattern {
            let screen = session.capture_text();
            if let Some(caps) = re.captures(&screen) {
                return Ok(finish(
                    WaitReason::Screen,
                    Some(match_vec(&caps)),
                    None,
                    &tail,
                    started,
                ));
            }
        }
        if request.ready && session_is_ready(session).await {
            return Ok(finish(WaitReason::Ready, None, None, &tail, started));
        }
        if request.exit && !session.is_alive() {
            return Ok(finish(
                WaitReason::Exit,
                None,
                session.exit_code(),
                &tail,
                started,
            ));
        }
    }

    let timeout = tokio::time::sleep(Duration::from_millis(request.timeout_ms));
    tokio::pin!(timeout);

    let idle = request.idle_ms.map(Duration::from_millis);
    let idle_sleep = tokio::time::sleep(idle.unwrap_or(Duration::from_secs(86_400)));
    tokio::pin!(idle_sleep);

    let mut ready_tick = tokio::time::interval(READY_POLL);
    ready_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut events_open = true;
    loop {
        tokio::select! {
            biased;

            _ = &mut timeout => {
                return Ok(finish(WaitReason::Timeout, None, None, &tail, started));
            }

            ev = rx.recv(), if events_open => match ev {
                Ok(SessionEvent::Output { .. }) => {
                    tail = session.output_tail_bytes(SCAN_TAIL);
                    if let Some(re) = &not {
                        if re.is_match(&tail) {
                            return Ok(finish(WaitReason::Rejected, None, None, &tail, started));
                        }
                    }
                    if let Some(re) = &pattern {
                        if let Some(caps) = re.captures(&tail) {
                            return Ok(finish(
                                WaitReason::Pattern,
                                Some(match_vec(&caps)),
                                None,
                                &tail,
                                started,
                            ));
                        }
                    }
                    if let Some(window) = idle {
                        idle_sleep.as_mut().reset(tokio::time::Instant::now() + window);
                    }
                }
                Ok(SessionEvent::Screen) => {
                    if let Some(re) = &screen_pattern {
                        let screen = session.capture_text();
                        if let Some(caps) = re.captures(&screen) {
                            return Ok(finish(
                                WaitReason::Screen,
                                Some(match_vec(&caps)),
                                None,
                                &tail,
                                started,
                            ));
                        }
                    }
                }
                Ok(SessionEvent::Exit { code }) => {
                    if request.exit {
                        return Ok(finish(WaitReason::Exit, None, Some(code), &tail, started));
                    }
                    if request.ready {
                        // A dead shell has nothing in the foreground.
                        return Ok(finish(WaitReason::Ready, None, None, &tail, started));
                    }
                }
                Ok(SessionEvent::Ready) => {
                    if request.ready {
                        return Ok(finish(WaitReason::Ready, None, None, &tail, started));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "wait subscriber lagged, resynchronizing from history");
                    tail = session.output_tail_bytes(SCAN_TAIL);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    if !session.is_alive() {
                        if request.exit {
                            return Ok(finish(
                                WaitReason::Exit,
                                None,
                                session.exit_code(),
                                &tail,
                                started,
                            ));
                        }
                        if request.ready {
                            return Ok(finish(WaitReason::Ready, None, None, &tail, started));
                        }
                    }
                    events_open = false;
                }
            },

            _ = &mut idle_sleep, if idle.is_some() => {
                return Ok(finish(WaitReason::Idle, None, None, &tail, started));
            }

            _ = ready_tick.tick(), if request.ready => {
                if session_is_ready(session).await {
                    return Ok(finish(WaitReason::Ready, None, None, &tail, started));
                }
            }
        }
    }
}

/// Alive with nothing in the foreground, or not alive at all.
async fn session_is_ready(session: &Session) -> bool {
    if !session.is_alive() {
        return true;
    }
    let Some(pid) = session.pid() else {
        return true;
    };
    tokio::task::spawn_blocking(move || foreground_process(pid).is_none())
        .await
        .unwrap_or(false)
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| Regex::new(p).map_err(|e| Error::invalid_regex(p, &e)))
        .transpose()
}

fn match_vec(caps: &regex::Captures<'_>) -> Vec<String> {
    caps.iter()
        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect()
}

fn finish(
    reason: WaitReason,
    matched: Option<Vec<String>>,
    exit_code: Option<i32>,
    tail: &str,
    started: Instant,
) -> WaitOutcome {
    WaitOutcome {
        reason,
        matched,
        exit_code,
        output: tail.to_string(),
        waited_ms: started.elapsed().as_millis() as u64,
    }
}
