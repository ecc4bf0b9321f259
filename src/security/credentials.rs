// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Approved-user registry and credential verification.
//!
//! Passwords are checked as `hex(SHA-256(pepper || password))` against the
//! stored digest with a constant-time comparison. The unknown-user path hashes
//! and compares too, so both rejection paths do the same work.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Pepper the demo deployment's stored digests were produced with.
pub const DEFAULT_PEPPER: &str = "authyntic-pepper";

/// Compared against when the username is unknown. Same length as a real digest.
const DUMMY_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Opaque password. Never printed, never serialized.
#[derive(Clone, Default)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Lowercase hex SHA-256 of `pepper || password`.
pub fn hash_with_pepper(pepper: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pepper.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a username to its registry key.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Trim, lowercase and de-duplicate roles, keeping first-seen order.
pub fn normalize_roles<I, S>(roles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for role in roles {
        let role = role.as_ref().trim().to_lowercase();
        if !role.is_empty() && !normalized.contains(&role) {
            normalized.push(role);
        }
    }
    normalized
}

/// Identity record for an approved operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    /// Hex digest of `pepper || password`.
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn new(
        username: &str,
        display_name: impl Into<String>,
        password_hash: impl Into<String>,
        roles: &[&str],
    ) -> Self {
        Self {
            username: normalize_username(username),
            display_name: display_name.into(),
            password_hash: password_hash.into().to_lowercase(),
            roles: normalize_roles(roles),
        }
    }

    /// Build a profile from a plaintext password and the deployment pepper.
    pub fn with_password(
        username: &str,
        display_name: impl Into<String>,
        password: &str,
        pepper: &str,
        roles: &[&str],
    ) -> Self {
        Self::new(username, display_name, hash_with_pepper(pepper, password), roles)
    }

    fn normalized(mut self) -> Self {
        self.username = normalize_username(&self.username);
        self.password_hash = self.password_hash.trim().to_lowercase();
        self.roles = normalize_roles(&self.roles);
        self
    }
}

/// Immutable table of approved users keyed by lowercase username.
#[derive(Debug, Clone, Default)]
pub struct UserRegistry {
    users: HashMap<String, UserProfile>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The demo deployment's operators.
    pub fn builtin() -> Self {
        Self::new()
            .with_user(UserProfile::new(
                "justin",
                "Justin",
                "10e7c55132d3bad217aff235c6d4dce89803498cf7526426366922ed070aecb4",
                &["operator", "commander"],
            ))
            .with_user(UserProfile::new(
                "zach",
                "Zach",
                "42560c9c28e3a48b6b9915c3576ea0b9d271a873845ed5a42779205070f1b058",
                &["operator", "analyst"],
            ))
    }

    /// Add a profile; a later profile with the same username replaces the earlier one.
    pub fn with_user(mut self, profile: UserProfile) -> Self {
        let profile = profile.normalized();
        self.users.insert(profile.username.clone(), profile);
        self
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = UserProfile>) -> Self {
        profiles.into_iter().fold(Self::new(), Self::with_user)
    }

    /// Exact match on the normalized key.
    pub fn get(&self, username: &str) -> Option<&UserProfile> {
        self.users.get(&normalize_username(username))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Outcome of a credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted(UserProfile),
    UnknownUser,
    BadPassword,
}

impl Verification {
    pub fn accepted(&self) -> bool {
        matches!(self, Verification::Accepted(_))
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Verification::Accepted(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Peppered-hash password verifier over a [`UserRegistry`].
#[derive(Clone)]
pub struct CredentialVerifier {
    registry: Arc<UserRegistry>,
    pepper: String,
}

impl CredentialVerifier {
    pub fn new(registry: Arc<UserRegistry>, pepper: impl Into<String>) -> Self {
        Self {
            registry,
            pepper: pepper.into(),
        }
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    /// Check `password` for `username`. Pure function of registry and input.
    pub fn verify(&self, username: &str, password: &Password) -> Verification {
        let computed = hash_with_pepper(&self.pepper, password.expose());

        match self.registry.get(username) {
            Some(profile) => {
                if digests_match(&computed, &profile.password_hash) {
                    Verification::Accepted(profile.clone())
                } else {
                    Verification::BadPassword
                }
            }
            None => {
                // Burn the same comparison so both failures cost the same
                let _ = digests_match(&computed, DUMMY_DIGEST);
                Verification::UnknownUser
            }
        }
    }
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("users", &self.registry.len())
            .field("pepper", &"[REDACTED]")
            .finish()
    }
}

fn digests_match(computed: &str, stored: &str) -> bool {
    computed.as_bytes().ct_eq(stored.as_bytes()).into()
}
