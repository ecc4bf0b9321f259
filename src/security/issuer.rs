// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session issuance.
//!
//! The only writer of new sessions. Each call sweeps expired registry entries
//! and records the new one in the same critical section.

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::security::credentials::UserProfile;
use crate::security::events::AuthEvent;
use crate::security::session::Session;
use crate::security::session_registry::{RegistryError, SessionRegistry};

/// Default session lifetime: 30 minutes.
pub const DEFAULT_SESSION_DURATION_MS: u64 = 30 * 60 * 1000;

/// Bytes of entropy in a session ID (hex-encoded to twice this length).
pub const SESSION_ID_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Cryptographically random, fixed-length, lowercase hex session ID.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct SessionIssuer {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    session_duration_ms: u64,
}

impl SessionIssuer {
    pub fn new(registry: Arc<SessionRegistry>, clock: Arc<dyn Clock>, session_duration_ms: u64) -> Self {
        Self {
            registry,
            clock,
            session_duration_ms,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn session_duration_ms(&self) -> u64 {
        self.session_duration_ms
    }

    /// Build a session for `username`, shadow it in the registry and return it.
    pub fn issue(&self, username: &str, profile: &UserProfile) -> Result<Session, IssueError> {
        let issued_at = self.clock.now_ms();
        let session = Session {
            username: username.to_string(),
            display_name: profile.display_name.clone(),
            issued_at,
            expires_at: issued_at.saturating_add(self.session_duration_ms),
            session_id: generate_session_id(),
            roles: profile.roles.clone(),
        };

        self.registry
            .sweep_and_insert(&session.session_id, &session.username, session.expires_at)?;

        let event = AuthEvent::SessionIssued {
            session_id: session.session_id.clone(),
            username: session.username.clone(),
            expires_at_ms: session.expires_at,
        };
        tracing::info!(target: "security::auth", "{}", event.to_audit_string());

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashSet;

    fn issuer(duration_ms: u64) -> (SessionIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let registry = Arc::new(SessionRegistry::new(clock.clone()));
        (SessionIssuer::new(registry, clock.clone(), duration_ms), clock)
    }

    fn profile() -> UserProfile {
        UserProfile::new("justin", "Justin", "00", &["operator", "commander"])
    }

    #[test]
    fn test_expiry_is_issued_plus_duration() {
        let (issuer, _clock) = issuer(DEFAULT_SESSION_DURATION_MS);
        let session = issuer.issue("justin", &profile()).unwrap();
        assert_eq!(session.issued_at, 1_700_000_000_000);
        assert_eq!(session.expires_at - session.issued_at, DEFAULT_SESSION_DURATION_MS);
        assert_eq!(session.display_name, "Justin");
        assert_eq!(session.roles, vec!["operator", "commander"]);
    }

    #[test]
    fn test_session_recorded_in_registry() {
        let (issuer, _clock) = issuer(1_000);
        let session = issuer.issue("justin", &profile()).unwrap();
        let entry = issuer.registry().get(&session.session_id).unwrap();
        assert_eq!(entry.username, "justin");
        assert_eq!(entry.expires_at, session.expires_at);
    }

    #[test]
    fn test_issue_sweeps_expired_first() {
        let (issuer, clock) = issuer(1_000);
        let first = issuer.issue("justin", &profile()).unwrap();
        clock.advance_ms(1_000);
        let second = issuer.issue("justin", &profile()).unwrap();
        assert!(issuer.registry().get(&first.session_id).is_none());
        assert!(issuer.registry().is_active(&second.session_id));
        assert_eq!(issuer.registry().len(), 1);
    }

    #[test]
    fn test_session_ids_fixed_length_and_unique() {
        let ids: HashSet<String> = (0..256).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 256);
        assert!(ids
            .iter()
            .all(|id| id.len() == SESSION_ID_BYTES * 2 && id.chars().all(|c| c.is_ascii_hexdigit())));
    }
}
