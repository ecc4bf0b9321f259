// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session records and their HMAC signatures.
//!
//! A signature is `hex(HMAC-SHA256(secret, canonical_json(session)))`. The
//! canonical encoding sorts object keys, carries no whitespace and escapes
//! every character outside printable ASCII as `\uXXXX` (lowercase hex,
//! surrogate pairs above the BMP), so any holder of the secret can reproduce
//! it byte for byte.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use sha2::Sha256;
use std::fmt;
use std::io;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Issued credential. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub display_name: String,
    /// Epoch milliseconds.
    pub issued_at: u64,
    /// `issued_at + session_duration_ms`.
    pub expires_at: u64,
    pub session_id: String,
    pub roles: Vec<String>,
}

impl Session {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Wire artifact returned on a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSession {
    pub session: Session,
    pub signature: String,
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("session could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("signing key rejected: {0}")]
    InvalidKey(String),
}

/// Sorted-key, whitespace-free, ASCII-only JSON encoding of a session.
pub fn canonical_json(session: &Session) -> Result<Vec<u8>, SigningError> {
    let value = sort_keys(serde_json::to_value(session)?);
    let mut encoded = Vec::with_capacity(256);
    let mut serializer = serde_json::Serializer::with_formatter(&mut encoded, AsciiFormatter);
    value.serialize(&mut serializer)?;
    Ok(encoded)
}

/// Compact formatter (the trait defaults) that also escapes DEL and every
/// non-ASCII code point.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..index])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

// Rebuilds objects in key order so the result holds even with `preserve_order`.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// HMAC-SHA256 signer keyed with the deployment's session secret.
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, session: &Session) -> Result<HmacSha256, SigningError> {
        let payload = canonical_json(session)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        mac.update(&payload);
        Ok(mac)
    }

    /// Lowercase hex signature over the canonical encoding.
    pub fn sign(&self, session: &Session) -> Result<String, SigningError> {
        Ok(hex::encode(self.mac(session)?.finalize().into_bytes()))
    }

    pub fn sign_session(&self, session: Session) -> Result<SignedSession, SigningError> {
        let signature = self.sign(&session)?;
        Ok(SignedSession { session, signature })
    }

    /// Constant-time check of `signature` against a fresh HMAC of `session`.
    pub fn verify(&self, session: &Session, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        match self.mac(session) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(err) => {
                tracing::warn!(error = %err, "session signature could not be recomputed");
                false
            }
        }
    }
}

impl fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
