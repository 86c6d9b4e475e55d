//! Session registry: the keyed collection of live sessions, the shared
//! readiness poller, and the hook fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use umux_pty::foreground_process;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::RegistryEvent;
use crate::hooks::{HookInfo, HookManager, HookSpec};
use crate::session::{Session, SessionInfo, SpawnOptions};
use crate::sync::lock_or_recover as lock;
use crate::wait::{wait_for, WaitOutcome, WaitRequest};

/// Cadence of the shared busy/idle poller.
const READY_POLL: Duration = Duration::from_millis(100);

/// Resolve a session by id or by exact name, never both at once.
#[derive(Debug, Clone, Default)]
pub struct SessionSelector {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Owns every session. Removing a session from the registry disposes it.
pub struct Registry {
    config: Config,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    hooks: Arc<HookManager>,
    events: broadcast::Sender<RegistryEvent>,
    poller: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Registry {
    /// Create a registry and start its readiness poller.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let registry = Arc::new(Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            hooks: Arc::new(HookManager::new()),
            events,
            poller: Mutex::new(None),
        });

        let handle = tokio::spawn(ready_poll_loop(Arc::downgrade(&registry)));
        *lock(&registry.poller) = Some(handle);
        registry
    }

    /// Spawn a session and register it.
    pub fn spawn(&self, options: SpawnOptions) -> Result<Arc<Session>> {
        let session = Session::spawn(options, &self.config)?;
        lock(&self.sessions).insert(session.id().to_string(), Arc::clone(&session));

        // Forward this session's events to the hook manager.
        let hooks = Arc::clone(&self.hooks);
        let mut rx = session.subscribe();
        let session_id = session.id().to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => hooks.handle_event(&session_id, &event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let _ = self.events.send(RegistryEvent::SessionCreated {
            session_id: session.id().to_string(),
        });
        Ok(session)
    }

    /// Look up a session by id.
    pub fn get(&self, id: &str) -> Result<Arc<Session>> {
        lock(&self.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Look up a session by exact name. On a collision the earliest
    /// created session wins; avoiding collisions is the caller's problem.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Session>> {
        lock(&self.sessions)
            .values()
            .filter(|s| s.name() == name)
            .min_by_key(|s| s.created_at())
            .cloned()
    }

    /// Resolve a selector carrying an id or a name, but not both.
    pub fn resolve(&self, selector: &SessionSelector) -> Result<Arc<Session>> {
        match (&selector.id, &selector.name) {
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "specify a session id or a name, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidInput("empty session selector".to_string())),
            (Some(id), None) => self.get(id),
            (None, Some(name)) => self
                .find_by_name(name)
                .ok_or_else(|| Error::NotFound(format!("session named {name:?}"))),
        }
    }

    /// Snapshot every registered session, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> =
            lock(&self.sessions).values().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// Dispose a session and remove it from the registry.
    pub fn destroy(&self, id: &str) -> Result<()> {
        let session = lock(&self.sessions)
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        session.dispose();
        let _ = self.events.send(RegistryEvent::SessionDestroyed {
            session_id: id.to_string(),
        });
        info!(session_id = %id, "session destroyed");
        Ok(())
    }

    /// Resolve a wait against a registered session. A request with no
    /// timeout gets the configured default.
    pub async fn wait(&self, session_id: &str, request: &WaitRequest) -> Result<WaitOutcome> {
        let session = self.get(session_id)?;
        let mut request = request.clone();
        if request.timeout_ms == 0 {
            request.timeout_ms = self.config.default_timeout_ms;
        }
        wait_for(&session, &request).await
    }

    // ========== Hooks ==========

    /// Register a hook. The target session must exist at registration;
    /// afterwards the hook holds only the id, so a destroyed session
    /// simply makes it a no-op.
    pub fn add_hook(&self, spec: HookSpec) -> Result<String> {
        if !lock(&self.sessions).contains_key(&spec.session_id) {
            return Err(Error::NotFound(format!("session {}", spec.session_id)));
        }
        self.hooks.add(spec)
    }

    pub fn remove_hook(&self, id: &str) -> Result<()> {
        self.hooks.remove(id)
    }

    pub fn list_hooks(&self) -> Vec<HookInfo> {
        self.hooks.list()
    }

    /// Subscribe to registry lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Dispose every session and stop the readiness poller.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
        let sessions: Vec<Arc<Session>> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.dispose();
        }
        debug!("registry shut down");
    }
}

/// Shared busy/idle poller.
///
/// Observes each session's foreground probe on a single cadence and
/// emits `Ready` on the session that transitioned from busy to idle.
/// Sessions seen for the first time seed silently.
async fn ready_poll_loop(registry: Weak<Registry>) {
    let mut tick = tokio::time::interval(READY_POLL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut busy_state: HashMap<String, bool> = HashMap::new();

    loop {
        tick.tick().await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        let sessions: Vec<Arc<Session>> =
            lock(&registry.sessions).values().cloned().collect();
        drop(registry);

        let mut seen = HashSet::new();
        for session in sessions {
            let id = session.id().to_string();
            seen.insert(id.clone());

            let busy = if !session.is_alive() {
                false
            } else {
                match session.pid() {
                    Some(pid) => {
                        tokio::task::spawn_blocking(move || foreground_process(pid).is_some())
                            .await
                            .unwrap_or(false)
                    }
                    None => false,
                }
            };

            match busy_state.insert(id, busy) {
                Some(true) if !busy => session.emit_ready(),
                _ => {}
            }
        }
        busy_state.retain(|id, _| seen.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEvent;
    use std::time::Instant;

    fn test_config() -> Config {
        Config {
            default_shell: "/bin/sh".to_string(),
            ..Config::default()
        }
    }

    fn marker_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("umux-registry-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_spawn_get_list_destroy() {
        let registry = Registry::new(test_config());

        let a = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();
        let b = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();
        assert_ne!(a.id(), b.id());

        assert_eq!(registry.get(a.id()).unwrap().id(), a.id());
        assert!(matches!(registry.get("sess-nope0000"), Err(Error::NotFound(_))));

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id());

        registry.destroy(a.id()).unwrap();
        assert!(registry.get(a.id()).is_err());
        assert!(matches!(registry.destroy(a.id()), Err(Error::NotFound(_))));

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_find_by_name_prefers_earliest() {
        let registry = Registry::new(test_config());
        let first = registry
            .spawn(SpawnOptions {
                command: "sleep 30".to_string(),
                name: Some("worker".to_string()),
                ..SpawnOptions::default()
            })
            .unwrap();
        let _second = registry
            .spawn(SpawnOptions {
                command: "sleep 30".to_string(),
                name: Some("worker".to_string()),
                ..SpawnOptions::default()
            })
            .unwrap();

        let found = registry.find_by_name("worker").unwrap();
        assert_eq!(found.id(), first.id());
        assert!(registry.find_by_name("nobody").is_none());

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_selector_validation() {
        let registry = Registry::new(test_config());
        let session = registry
            .spawn(SpawnOptions {
                command: "sleep 30".to_string(),
                name: Some("sel".to_string()),
                ..SpawnOptions::default()
            })
            .unwrap();

        let both = registry.resolve(&SessionSelector {
            id: Some(session.id().to_string()),
            name: Some("sel".to_string()),
        });
        assert!(matches!(both, Err(Error::InvalidInput(_))));

        let neither = registry.resolve(&SessionSelector::default());
        assert!(matches!(neither, Err(Error::InvalidInput(_))));

        let by_id = registry
            .resolve(&SessionSelector {
                id: Some(session.id().to_string()),
                name: None,
            })
            .unwrap();
        assert_eq!(by_id.id(), session.id());

        let by_name = registry
            .resolve(&SessionSelector {
                id: None,
                name: Some("sel".to_string()),
            })
            .unwrap();
        assert_eq!(by_name.id(), session.id());

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_destroy_disposes_session() {
        let registry = Registry::new(test_config());
        let session = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();
        let id = session.id().to_string();

        registry.destroy(&id).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_alive() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!session.is_alive(), "destroy should kill the child");
    }

    #[tokio::test]
    async fn test_registry_events() {
        let registry = Registry::new(test_config());
        let mut rx = registry.subscribe();

        let session = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();
        match rx.recv().await.unwrap() {
            RegistryEvent::SessionCreated { session_id } => {
                assert_eq!(session_id, session.id())
            }
            other => panic!("expected create event, got {other:?}"),
        }

        registry.destroy(session.id()).unwrap();
        match rx.recv().await.unwrap() {
            RegistryEvent::SessionDestroyed { session_id } => {
                assert_eq!(session_id, session.id())
            }
            other => panic!("expected destroy event, got {other:?}"),
        }

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_add_hook_requires_known_session() {
        let registry = Registry::new(test_config());
        let err = registry.add_hook(HookSpec {
            session_id: "sess-missing0".to_string(),
            command: "true".to_string(),
            on_ready: true,
            ..HookSpec::default()
        });
        assert!(matches!(err, Err(Error::NotFound(_))));
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_once_ready_hook_fires_single_time() {
        let registry = Registry::new(test_config());
        let session = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();
        let marker = marker_path();

        let hook_id = registry
            .add_hook(HookSpec {
                session_id: session.id().to_string(),
                command: format!("echo fired >> {}", marker.display()),
                on_ready: true,
                once: true,
                ..HookSpec::default()
            })
            .unwrap();

        // Trigger readiness twice; the hook must fire on the first only.
        session.emit_ready();
        session.emit_ready();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let content = std::fs::read_to_string(&marker).unwrap_or_default();
        assert_eq!(content.trim(), "fired", "hook fired more than once");
        assert!(registry.list_hooks().is_empty());
        assert!(matches!(
            registry.remove_hook(&hook_id),
            Err(Error::NotFound(_))
        ));

        std::fs::remove_file(&marker).ok();
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_exit_hook_fires() {
        let registry = Registry::new(test_config());
        let session = registry.spawn(SpawnOptions::default()).unwrap();
        let marker = marker_path();

        registry
            .add_hook(HookSpec {
                session_id: session.id().to_string(),
                command: format!("echo \"$UMUX_EVENT\" > {}", marker.display()),
                on_exit: true,
                ..HookSpec::default()
            })
            .unwrap();

        session.send("exit\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let content = std::fs::read_to_string(&marker).unwrap_or_default();
        assert_eq!(content.trim(), "exit");

        std::fs::remove_file(&marker).ok();
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_ready_poller_emits_on_busy_to_idle() {
        let registry = Registry::new(test_config());
        let session = registry.spawn(SpawnOptions::default()).unwrap();

        // Let the poller seed while the shell reaches its prompt.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let mut rx = session.subscribe();
        session.send("sleep 1\n").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
        let mut got_ready = false;
        while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            if matches!(event, SessionEvent::Ready) {
                got_ready = true;
                break;
            }
        }
        assert!(got_ready, "poller should emit Ready after the sleep ends");

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_wait_applies_default_timeout() {
        let registry = Registry::new(Config {
            default_timeout_ms: 150,
            ..test_config()
        });
        let session = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();

        // No timeout set by the caller; the configured default bounds it.
        let outcome = registry
            .wait(session.id(), &WaitRequest::default())
            .await
            .unwrap();
        assert_eq!(outcome.reason, crate::wait::WaitReason::Timeout);
        assert!(outcome.waited_ms >= 150);

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_disposes_everything() {
        let registry = Registry::new(test_config());
        let a = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();
        let b = registry.spawn(SpawnOptions::command("sleep 30")).unwrap();

        registry.shutdown();

        let deadline = Instant::now() + Duration::from_secs(5);
        while (a.is_alive() || b.is_alive()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(registry.list().is_empty());
    }
}
