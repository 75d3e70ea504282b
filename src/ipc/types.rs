use std::collections::HashMap;
use std::path::PathBuf;

use gradegrid::{GradeEntrySession, GridConfig, SqliteStore};
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
    pub db: Option<SqliteStore>,
    pub config: GridConfig,
    pub sessions: HashMap<String, GradeEntrySession>,
}
