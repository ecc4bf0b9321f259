// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Security primitives for the operator console login.
//!
//! ## Components
//!
//! - **Credentials**: peppered SHA-256 digests compared in constant time
//! - **CSRF**: double-submit token check (body field and `X-CSRF-Token` header)
//! - **Rate limiting**: sliding-window attempt counter per client key
//! - **Sessions**: random IDs, HMAC-SHA256 signatures over canonical JSON,
//!   and a server-side registry swept on every issuance
//! - **Audit logging**: every login outcome and session event is logged
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use authyntic::clock::SystemClock;
//! use authyntic::security::{SessionIssuer, SessionRegistry, SessionSigner, UserProfile};
//!
//! let clock = Arc::new(SystemClock);
//! let registry = Arc::new(SessionRegistry::new(clock.clone()));
//! let issuer = SessionIssuer::new(registry.clone(), clock, 30 * 60 * 1000);
//!
//! let profile = UserProfile::new("justin", "Justin", "00", &["operator"]);
//! let session = issuer.issue("justin", &profile).unwrap();
//! let signed = SessionSigner::new("secret").sign_session(session).unwrap();
//!
//! assert!(registry.is_active(&signed.session.session_id));
//! ```

pub mod cookie;
pub mod credentials;
pub mod csrf;
pub mod events;
pub mod issuer;
pub mod locks;
pub mod rate_limit;
pub mod session;
pub mod session_registry;

pub use cookie::{CookieBuilder, DEFAULT_COOKIE_NAME};
pub use credentials::{
    hash_with_pepper, CredentialVerifier, Password, UserProfile, UserRegistry, Verification,
    DEFAULT_PEPPER,
};
pub use csrf::{CsrfGuard, CSRF_HEADER};
pub use events::AuthEvent;
pub use issuer::{generate_session_id, IssueError, SessionIssuer, DEFAULT_SESSION_DURATION_MS};
pub use locks::{resilient_lock, resilient_read, resilient_write};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use session::{canonical_json, Session, SessionSigner, SignedSession, SigningError};
pub use session_registry::{RegistryEntry, RegistryError, SessionRegistry};
