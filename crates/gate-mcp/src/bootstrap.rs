// bootstrap.rs — HMAC-SHA256 proof verification for `gate_bootstrap_plan`,
// the exceptional tool that creates a workspace's first plan before any
// plan has been APPROVED to gate ordinary writes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::BootstrapError;

type HmacSha256 = Hmac<Sha256>;

const MAX_SKEW_SECS: i64 = 5 * 60;

/// The signed payload a bootstrap request carries alongside its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapPayload {
    #[serde(rename = "repoIdentifier")]
    pub repo_identifier: String,
    pub timestamp: i64,
    pub nonce: String,
    pub action: String,
}

impl BootstrapPayload {
    fn canonical_bytes(&self) -> Vec<u8> {
        // Field order is fixed so the signer and verifier agree byte-for-byte.
        format!(
            "{}|{}|{}|{}",
            self.repo_identifier, self.timestamp, self.nonce, self.action
        )
        .into_bytes()
    }
}

/// One-shot-per-workspace nonce tracking, persisted as a small JSON set
/// under `.atlas-gate/state/`.
pub struct NonceStore {
    path: PathBuf,
    seen: HashSet<String>,
}

impl NonceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BootstrapError> {
        let path = path.into();
        let seen = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashSet::new()
        };
        Ok(Self { path, seen })
    }

    fn save(&self) -> Result<(), BootstrapError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.seen).expect("nonce set is serializable");
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Record `nonce` as consumed. Fails if already present.
    pub fn consume(&mut self, nonce: &str) -> Result<(), BootstrapError> {
        if self.seen.contains(nonce) {
            return Err(BootstrapError::NonceReused {
                nonce: nonce.to_string(),
            });
        }
        self.seen.insert(nonce.to_string());
        self.save()
    }
}

/// Verify an HMAC-SHA256 signature (lowercase hex) over `payload` under
/// `secret`, then check timestamp skew. Does not consume the nonce — the
/// caller does that only after every other check has passed.
pub fn verify_signature(
    payload: &BootstrapPayload,
    signature_hex: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<(), BootstrapError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(&payload.canonical_bytes());

    let expected = hex_decode(signature_hex).ok_or(BootstrapError::SignatureInvalid)?;
    mac.verify_slice(&expected)
        .map_err(|_| BootstrapError::SignatureInvalid)?;

    let skew = (now.timestamp() - payload.timestamp).abs();
    if skew > MAX_SKEW_SECS {
        return Err(BootstrapError::TimestampSkew);
    }

    Ok(())
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

pub fn sign(payload: &BootstrapPayload, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(&payload.canonical_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn nonces_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".atlas-gate").join("state").join("nonces.json")
}
