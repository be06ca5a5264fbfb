use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One line of input: `{ "id", "method", "params" }`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Process-wide state; `db` is set once a workspace has been opened.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
