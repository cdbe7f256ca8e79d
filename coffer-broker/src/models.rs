use coffer_core::types::Expiry;
use serde::{Deserialize, Serialize};

/// Body shared by PUT and PATCH. `expires` is RFC 3339; leaving it out
/// of a PUT stores a secret that never expires, leaving it out of a
/// PATCH keeps the current expiry. A `signing_key` opts the record into
/// integrity signing under that key.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteSecretRequest {
    pub secret: serde_json::Value,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub signing_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecretResponse {
    pub secret: serde_json::Value,
    pub expires: Expiry,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub alive: bool,
    pub uptime: f64,
}
