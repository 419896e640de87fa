use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Session school, used when a request carries no `schoolId`.
    pub school_id: Option<String>,
}

/// Per-request scope threaded into every store call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub school_id: String,
}
