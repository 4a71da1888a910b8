//! Lucida API Data Transfer Objects
//!
//! These types match what the Lucida web app sends and receives.
//! DO NOT use these types outside the lucida module.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/load?url=/api/fetch/stream/v2`
#[derive(Debug, Clone, Serialize)]
pub struct LoadRequest {
    pub account: Account,
    pub compat: String,
    pub downscale: String,
    pub handoff: bool,
    pub metadata: bool,
    pub private: bool,
    pub token: Token,
    pub upload: Upload,
    pub url: String,
}

impl LoadRequest {
    /// Request for the original-quality stream of `url`
    pub fn original_quality(url: &str, token: &str, expiry: Option<u64>) -> Self {
        Self {
            account: Account {
                id: "auto".to_string(),
                kind: "country".to_string(),
            },
            compat: "false".to_string(),
            downscale: "original".to_string(),
            handoff: true,
            metadata: true,
            private: true,
            token: Token {
                primary: token.to_string(),
                expiry,
            },
            upload: Upload {
                enabled: false,
                service: "pixeldrain".to_string(),
            },
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub primary: String,
    pub expiry: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub enabled: bool,
    pub service: String,
}

/// Response to the load request
#[derive(Debug, Clone, Deserialize)]
pub struct LoadResponse {
    #[serde(default)]
    pub success: bool,
    pub handoff: Option<String>,
    /// Worker subdomain that prepares the file
    pub server: Option<String>,
    pub error: Option<String>,
}

/// Response to `GET /api/fetch/request/{handoff}`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    /// "completed", "error", or an in-progress state
    pub status: String,
    pub message: Option<String>,
    pub progress: Option<Progress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
}
