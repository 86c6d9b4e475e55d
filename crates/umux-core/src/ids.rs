use uuid::Uuid;

/// `sess-` + 8 url-safe characters.
pub fn session_id() -> String {
    format!("sess-{}", token())
}

/// `hook-` + 8 url-safe characters.
pub fn hook_id() -> String {
    format!("hook-{}", token())
}

fn token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
