//! Event-triggered shell hooks.
//!
//! A hook pairs a session id with a shell command and exactly one
//! trigger: an output-match regex, shell readiness, or child exit.
//! Commands run as independent, fire-and-forget OS processes; a failing
//! hook is logged and never disturbs the session.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::ids;
use crate::sync::lock_or_recover as lock;

/// Caller-facing hook description.
#[derive(Debug, Clone, Default)]
pub struct HookSpec {
    pub session_id: String,
    /// Shell command, run as `sh -c <command>`.
    pub command: String,
    /// Fire when this regex matches an output chunk.
    pub on_match: Option<String>,
    /// Fire on a busy-to-idle transition.
    pub on_ready: bool,
    /// Fire on child exit.
    pub on_exit: bool,
    /// Remove the hook after its first firing.
    pub once: bool,
}

#[derive(Debug)]
enum HookTrigger {
    OutputMatch(Regex),
    Ready,
    Exit,
}

struct Hook {
    id: String,
    session_id: String,
    command: String,
    trigger: HookTrigger,
    once: bool,
}

/// Serializable hook summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInfo {
    pub id: String,
    pub session_id: String,
    pub command: String,
    pub trigger: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub once: bool,
}

/// Unordered set of hooks keyed by id.
pub struct HookManager {
    hooks: Mutex<HashMap<String, Hook>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a hook. Exactly one trigger must be set; an output-match
    /// pattern is compiled here so a bad regex fails before registration.
    pub fn add(&self, spec: HookSpec) -> Result<String> {
        let trigger = match (&spec.on_match, spec.on_ready, spec.on_exit) {
            (Some(pattern), false, false) => HookTrigger::OutputMatch(
                Regex::new(pattern).map_err(|e| Error::invalid_regex(pattern, &e))?,
            ),
            (None, true, false) => HookTrigger::Ready,
            (None, false, true) => HookTrigger::Exit,
            _ => {
                return Err(Error::InvalidInput(
                    "hook needs exactly one trigger: onMatch, onReady, or onExit".to_string(),
                ))
            }
        };

        let id = ids::hook_id();
        lock(&self.hooks).insert(
            id.clone(),
            Hook {
                id: id.clone(),
                session_id: spec.session_id,
                command: spec.command,
                trigger,
                once: spec.once,
            },
        );
        Ok(id)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        lock(&self.hooks)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("hook {id}")))
    }

    pub fn list(&self) -> Vec<HookInfo> {
        let hooks = lock(&self.hooks);
        let mut infos: Vec<HookInfo> = hooks
            .values()
            .map(|hook| {
                let (trigger, pattern) = match &hook.trigger {
                    HookTrigger::OutputMatch(re) => ("match", Some(re.as_str().to_string())),
                    HookTrigger::Ready => ("ready", None),
                    HookTrigger::Exit => ("exit", None),
                };
                HookInfo {
                    id: hook.id.clone(),
                    session_id: hook.session_id.clone(),
                    command: hook.command.clone(),
                    trigger,
                    pattern,
                    once: hook.once,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// React to one session event: fire every matching hook and drop the
    /// `once` ones. `once` hooks are removed before their command spawns,
    /// so they fire at most once even under overlapping events.
    pub fn handle_event(&self, session_id: &str, event: &SessionEvent) {
        let mut to_fire: Vec<(String, String, &'static str, String)> = Vec::new();
        {
            let mut hooks = lock(&self.hooks);
            let mut fired_once: Vec<String> = Vec::new();
            for hook in hooks.values() {
                if hook.session_id != session_id {
                    continue;
                }
                let fire = match (&hook.trigger, event) {
                    (HookTrigger::OutputMatch(re), SessionEvent::Output { data, .. }) => {
                        let text = String::from_utf8_lossy(data);
                        re.find(&text)
                            .map(|m| ("match", m.as_str().to_string()))
                    }
                    (HookTrigger::Ready, SessionEvent::Ready) => Some(("ready", String::new())),
                    (HookTrigger::Exit, SessionEvent::Exit { .. }) => {
                        Some(("exit", String::new()))
                    }
                    _ => None,
                };
                if let Some((event_name, matched)) = fire {
                    to_fire.push((hook.id.clone(), hook.command.clone(), event_name, matched));
                    if hook.once {
                        fired_once.push(hook.id.clone());
                    }
                }
            }
            for id in fired_once {
                hooks.remove(&id);
            }
        }

        for (hook_id, command, event_name, matched) in to_fire {
            spawn_hook_command(session_id, &hook_id, &command, event_name, &matched);
        }
    }
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire-and-forget hook subprocess with the event env overlay.
fn spawn_hook_command(
    session_id: &str,
    hook_id: &str,
    command: &str,
    event_name: &'static str,
    matched: &str,
) {
    let spawned = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .env("UMUX_SESSION_ID", session_id)
        .env("UMUX_EVENT", event_name)
        .env("UMUX_MATCH", matched)
        .env("UMUX_HOOK_ID", hook_id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            let hook_id = hook_id.to_string();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) if !status.success() => {
                        debug!(hook_id = %hook_id, %status, "hook command failed");
                    }
                    Err(err) => {
                        debug!(hook_id = %hook_id, error = %err, "hook command did not run");
                    }
                    _ => {}
                }
            });
        }
        Err(err) => {
            warn!(hook_id = %hook_id, error = %err, "failed to spawn hook command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn output_event(data: &str) -> SessionEvent {
        SessionEvent::Output {
            data: data.as_bytes().to_vec(),
            ts: Utc::now(),
        }
    }

    fn marker_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("umux-hook-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_add_requires_exactly_one_trigger() {
        let hooks = HookManager::new();

        let none = hooks.add(HookSpec {
            session_id: "sess-x".to_string(),
            command: "true".to_string(),
            ..HookSpec::default()
        });
        assert!(matches!(none, Err(Error::InvalidInput(_))));

        let two = hooks.add(HookSpec {
            session_id: "sess-x".to_string(),
            command: "true".to_string(),
            on_ready: true,
            on_exit: true,
            ..HookSpec::default()
        });
        assert!(matches!(two, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_add_rejects_bad_regex() {
        let hooks = HookManager::new();
        let err = hooks.add(HookSpec {
            session_id: "sess-x".to_string(),
            command: "true".to_string(),
            on_match: Some("[broken".to_string()),
            ..HookSpec::default()
        });
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_remove_unknown_hook() {
        let hooks = HookManager::new();
        assert!(matches!(
            hooks.remove("hook-missing1"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_reports_triggers() {
        let hooks = HookManager::new();
        hooks
            .add(HookSpec {
                session_id: "sess-x".to_string(),
                command: "true".to_string(),
                on_match: Some("ERROR".to_string()),
                ..HookSpec::default()
            })
            .unwrap();
        hooks
            .add(HookSpec {
                session_id: "sess-x".to_string(),
                command: "true".to_string(),
                on_exit: true,
                once: true,
                ..HookSpec::default()
            })
            .unwrap();

        let infos = hooks.list();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().any(|i| i.trigger == "match"
            && i.pattern.as_deref() == Some("ERROR")));
        assert!(infos.iter().any(|i| i.trigger == "exit" && i.once));
    }

    #[tokio::test]
    async fn test_once_hook_removed_after_first_fire() {
        let hooks = HookManager::new();
        let id = hooks
            .add(HookSpec {
                session_id: "sess-x".to_string(),
                command: "true".to_string(),
                on_ready: true,
                once: true,
                ..HookSpec::default()
            })
            .unwrap();

        hooks.handle_event("sess-x", &SessionEvent::Ready);
        assert!(hooks.list().is_empty(), "once hook should be gone");

        // A second ready is a no-op; removing it again reports NotFound.
        hooks.handle_event("sess-x", &SessionEvent::Ready);
        assert!(matches!(hooks.remove(&id), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_output_hook_spawns_command_with_env() {
        let hooks = HookManager::new();
        let marker = marker_path();
        hooks
            .add(HookSpec {
                session_id: "sess-x".to_string(),
                command: format!("echo \"$UMUX_EVENT:$UMUX_MATCH\" >> {}", marker.display()),
                on_match: Some(r"ERROR \d+".to_string()),
                ..HookSpec::default()
            })
            .unwrap();

        hooks.handle_event("sess-x", &output_event("boot ok"));
        hooks.handle_event("sess-x", &output_event("saw ERROR 42 here"));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !marker.exists() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let content = std::fs::read_to_string(&marker).unwrap_or_default();
        assert_eq!(content.trim(), "match:ERROR 42");
        std::fs::remove_file(&marker).ok();
    }

    #[tokio::test]
    async fn test_hooks_filter_by_session() {
        let hooks = HookManager::new();
        let marker = marker_path();
        hooks
            .add(HookSpec {
                session_id: "sess-a".to_string(),
                command: format!("touch {}", marker.display()),
                on_exit: true,
                ..HookSpec::default()
            })
            .unwrap();

        hooks.handle_event("sess-b", &SessionEvent::Exit { code: 0 });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!marker.exists(), "hook for another session must not fire");

        hooks.handle_event("sess-a", &SessionEvent::Exit { code: 0 });
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !marker.exists() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(marker.exists());
        std::fs::remove_file(&marker).ok();
    }

    #[tokio::test]
    async fn test_failing_hook_is_swallowed() {
        let hooks = HookManager::new();
        hooks
            .add(HookSpec {
                session_id: "sess-x".to_string(),
                command: "exit 7".to_string(),
                on_ready: true,
                ..HookSpec::default()
            })
            .unwrap();
        // Must not panic or surface anywhere.
        hooks.handle_event("sess-x", &SessionEvent::Ready);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hooks.list().len(), 1);
    }
}
