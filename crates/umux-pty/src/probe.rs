//! Best-effort foreground-process probe.
//!
//! Answers "what is the PTY session currently running?" by listing the
//! immediate children of the PTY leader (normally the shell) and picking
//! the first one whose `ps` state short form marks it as a member of the
//! foreground process group. A shell sitting at its prompt has no such
//! child, so the probe returns `None`, which the engine reads as "ready".

use std::time::Duration;

/// The process currently in the foreground of a PTY session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundProcess {
    pub pid: u32,
    pub command: String,
}

/// How long the probe waits for `ps` before giving up.
const PROBE_DEADLINE: Duration = Duration::from_millis(250);

/// Query the foreground process of the PTY session led by `leader_pid`.
///
/// Best-effort and bounded: any failure, including the deadline expiring,
/// collapses to `None`. Never panics.
#[cfg(unix)]
pub fn foreground_process(leader_pid: u32) -> Option<ForegroundProcess> {
    let (tx, rx) = std::sync::mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("umux-probe".to_string())
        .spawn(move || {
            let _ = tx.send(probe_via_ps(leader_pid));
        });
    if spawned.is_err() {
        return None;
    }
    rx.recv_timeout(PROBE_DEADLINE).ok().flatten()
}

#[cfg(not(unix))]
pub fn foreground_process(_leader_pid: u32) -> Option<ForegroundProcess> {
    None
}

#[cfg(unix)]
fn probe_via_ps(leader_pid: u32) -> Option<ForegroundProcess> {
    let output = std::process::Command::new("ps")
        .args(["-axo", "pid=,ppid=,stat=,comm="])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(pid) = fields.next().and_then(|f| f.parse::<u32>().ok()) else {
            continue;
        };
        let Some(ppid) = fields.next().and_then(|f| f.parse::<u32>().ok()) else {
            continue;
        };
        let Some(stat) = fields.next() else {
            continue;
        };
        if ppid != leader_pid || !stat.contains('+') {
            continue;
        }
        let command = fields.collect::<Vec<_>>().join(" ");
        return Some(ForegroundProcess { pid, command });
    }
    None
}
