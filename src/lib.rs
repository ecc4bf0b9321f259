// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! authyntic - Session login server for the operator console
//!
//! Turns a login attempt into a signed session, a server-side registry entry
//! and an `HttpOnly` cookie, or into a structured rejection:
//!
//! **Rate limit** -> **CSRF** -> **Input** -> **Credentials** -> **Session**
//!
//! # Core Modules
//!
//! - [`login`] - Login orchestration and the failure delay
//! - [`security`] - Credentials, CSRF, rate limiting, sessions and cookies
//! - [`server`] - HTTP server exposing `/api/session`
//! - [`config`] - Configuration file, environment and defaults
//! - [`errors`] - Client-facing rejections with reference codes
//! - [`clock`] - Wall-clock abstraction for deterministic tests

pub mod clock;
pub mod config;
pub mod errors;
pub mod login;
pub mod security;
pub mod server;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, Config, ConfigError, ServerConfig};
pub use errors::{AuthError, ErrorResponse};
pub use login::{LoginOrchestrator, LoginRequest, LoginState, LoginSuccess};
pub use security::{
    CookieBuilder, CredentialVerifier, CsrfGuard, RateLimitConfig, RateLimiter, Session,
    SessionIssuer, SessionRegistry, SessionSigner, SignedSession, UserProfile, UserRegistry,
};
pub use server::{AppState, Server};
