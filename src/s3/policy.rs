//! Signed-POST policy documents
//!
//! The credentials service hands out the policy as base64-encoded JSON:
//!
//! ```json
//! {"expiration": "2030-01-01T00:00:00Z", "conditions": [{"bucket": "media"}, ...]}
//! ```
//!
//! Only the expiration is read, for diagnostics; S3 enforces the conditions and
//! the encoded string is what gets posted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Policy decoding errors
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Policy is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decoded signing policy
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyDocument {
    pub expiration: DateTime<Utc>,
}

impl PolicyDocument {
    pub fn decode(encoded: &str) -> Result<Self, PolicyError> {
        let raw = STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}
