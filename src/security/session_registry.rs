// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server-side shadow table of issued sessions.
//!
//! An entry exists iff its session has not been revoked and has not yet been
//! swept. Expiry is cooperative: an entry past `expires_at` stays in the table
//! until the next sweep, but [`SessionRegistry::is_active`] already reports it
//! as inactive.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::clock::Clock;
use crate::security::events::AuthEvent;
use crate::security::locks::{resilient_read, resilient_write};

/// Registry-side view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub username: String,
    pub expires_at: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session id already present in registry")]
    Collision,
}

/// In-memory table of active sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Record a new session. Never overwrites an existing entry.
    pub fn insert(
        &self,
        session_id: &str,
        username: &str,
        expires_at: u64,
    ) -> Result<(), RegistryError> {
        let mut entries = resilient_write(&self.entries);
        if entries.contains_key(session_id) {
            return Err(RegistryError::Collision);
        }
        entries.insert(
            session_id.to_string(),
            RegistryEntry {
                username: username.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    /// Sweep, then insert, under one write lock.
    pub fn sweep_and_insert(
        &self,
        session_id: &str,
        username: &str,
        expires_at: u64,
    ) -> Result<usize, RegistryError> {
        let now = self.clock.now_ms();
        let mut entries = resilient_write(&self.entries);
        let removed = sweep_locked(&mut entries, now);
        if entries.contains_key(session_id) {
            return Err(RegistryError::Collision);
        }
        entries.insert(
            session_id.to_string(),
            RegistryEntry {
                username: username.to_string(),
                expires_at,
            },
        );
        Ok(removed)
    }

    /// Remove every entry whose `expires_at <= now`. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = resilient_write(&self.entries);
        sweep_locked(&mut entries, now)
    }

    /// Present and not yet past `expires_at`.
    pub fn is_active(&self, session_id: &str) -> bool {
        let now = self.clock.now_ms();
        resilient_read(&self.entries)
            .get(session_id)
            .is_some_and(|entry| entry.expires_at > now)
    }

    pub fn get(&self, session_id: &str) -> Option<RegistryEntry> {
        resilient_read(&self.entries).get(session_id).cloned()
    }

    /// Explicitly revoke a session. Returns false if it was not present.
    pub fn revoke(&self, session_id: &str) -> bool {
        let removed = resilient_write(&self.entries).remove(session_id).is_some();
        if removed {
            let event = AuthEvent::SessionRevoked {
                session_id: session_id.to_string(),
                timestamp: chrono::Utc::now(),
            };
            tracing::info!(target: "security::auth", "{}", event.to_audit_string());
        }
        removed
    }

    pub fn len(&self) -> usize {
        resilient_read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries not yet past `expires_at`.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now_ms();
        resilient_read(&self.entries)
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

fn sweep_locked(entries: &mut HashMap<String, RegistryEntry>, now: u64) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    let removed = before - entries.len();
    if removed > 0 {
        let event = AuthEvent::SessionsSwept {
            removed,
            remaining: entries.len(),
        };
        tracing::debug!(target: "security::auth", "{}", event.to_audit_string());
    }
    removed
}
