use chrono::{DateTime, Utc};

/// Events fanned out by a session to its subscribers.
///
/// Within a session, events are dispatched in origination order: output
/// chunks in PTY read order, `Screen` after the `Output` of the same
/// chunk has been applied to the engine, `Exit` exactly once after the
/// final chunk.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A raw output chunk from the child.
    Output { data: Vec<u8>, ts: DateTime<Utc> },
    /// The engine has finished applying the current chunk.
    Screen,
    /// The session transitioned from busy to idle (shell at its prompt).
    Ready,
    /// The child exited. Fired exactly once.
    Exit { code: i32 },
}

/// Registry-level lifecycle notifications.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    SessionCreated { session_id: String },
    SessionDestroyed { session_id: String },
}
