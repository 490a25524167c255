use std::path::PathBuf;

use crate::policy::ValidationPolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct AppState {
    pub policy: ValidationPolicy,
    pub policy_path: Option<PathBuf>,
}
