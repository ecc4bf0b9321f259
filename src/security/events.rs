// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Audit events for the authentication path.
//!
//! Session identifiers are masked before they are rendered. Passwords never
//! reach this module.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::utils::mask_sensitive;

/// Characters of a session ID kept visible in audit lines.
const SESSION_ID_VISIBLE: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub enum AuthEvent {
    /// A login attempt ended in a session
    LoginSucceeded {
        username: String,
        client_key: String,
        timestamp: DateTime<Utc>,
    },
    /// A login attempt was refused
    LoginRejected {
        reason: &'static str,
        /// Last stage passed before the rejection
        failed_after: &'static str,
        client_key: String,
        timestamp: DateTime<Utc>,
    },
    /// A session was recorded in the registry
    SessionIssued {
        session_id: String,
        username: String,
        expires_at_ms: u64,
    },
    /// A session was explicitly revoked
    SessionRevoked {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Expired sessions were pruned
    SessionsSwept { removed: usize, remaining: usize },
}

impl AuthEvent {
    /// Format event for the audit log
    pub fn to_audit_string(&self) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        match self {
            AuthEvent::LoginSucceeded { username, client_key, .. } => {
                format!("{} | LOGIN_SUCCEEDED | user={} client={}", timestamp, username, client_key)
            }
            AuthEvent::LoginRejected { reason, failed_after, client_key, .. } => {
                format!(
                    "{} | LOGIN_REJECTED | reason={} after={} client={}",
                    timestamp, reason, failed_after, client_key
                )
            }
            AuthEvent::SessionIssued { session_id, username, expires_at_ms } => {
                format!(
                    "{} | SESSION_ISSUED | session={} user={} expires_at={}",
                    timestamp,
                    mask_sensitive(session_id, SESSION_ID_VISIBLE),
                    username,
                    expires_at_ms
                )
            }
            AuthEvent::SessionRevoked { session_id, .. } => {
                format!(
                    "{} | SESSION_REVOKED | session={}",
                    timestamp,
                    mask_sensitive(session_id, SESSION_ID_VISIBLE)
                )
            }
            AuthEvent::SessionsSwept { removed, remaining } => {
                format!("{} | SESSIONS_SWEPT | removed={} remaining={}", timestamp, removed, remaining)
            }
        }
    }
}
