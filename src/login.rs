// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Login orchestration.
//!
//! A login attempt moves through a fixed sequence of checks:
//!
//! ```text
//! Received -> RateChecked -> CsrfChecked -> InputValidated
//!          -> CredentialsChecked -> SessionIssued
//! ```
//!
//! A failed check rejects the attempt; the `LOGIN_REJECTED` audit line names
//! the last stage it passed. Credential rejections
//! are held until a fixed delay has elapsed since the request was received,
//! so an unknown operator ID and a wrong password take the same time.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::security::cookie::CookieBuilder;
use crate::security::credentials::{
    normalize_username, CredentialVerifier, Password, UserRegistry, Verification,
};
use crate::security::csrf::CsrfGuard;
use crate::security::events::AuthEvent;
use crate::security::issuer::SessionIssuer;
use crate::security::rate_limit::RateLimiter;
use crate::security::session::{SessionSigner, SignedSession};
use crate::security::session_registry::SessionRegistry;

/// Last stage an attempt has passed in the login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Received,
    RateChecked,
    CsrfChecked,
    InputValidated,
    CredentialsChecked,
    SessionIssued,
}

impl LoginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginState::Received => "received",
            LoginState::RateChecked => "rate_checked",
            LoginState::CsrfChecked => "csrf_checked",
            LoginState::InputValidated => "input_validated",
            LoginState::CredentialsChecked => "credentials_checked",
            LoginState::SessionIssued => "session_issued",
        }
    }
}

/// Raw inbound request, as handed over by the HTTP layer.
#[derive(Debug, Clone, Copy)]
pub struct LoginRequest<'a> {
    /// Rate-limit key, usually the peer IP.
    pub client_key: &'a str,
    /// Value of the `X-CSRF-Token` header, if sent.
    pub csrf_header: Option<&'a str>,
    /// `None` when the transport could not deliver the body (too large or cut off).
    pub body: Option<&'a [u8]>,
}

/// JSON body of `POST /api/session`. Absent or null fields become empty.
#[derive(Debug, Default, Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, rename = "csrfToken")]
    csrf_token: Option<String>,
}

impl LoginPayload {
    /// Only a JSON object whose known fields are strings (or null) is accepted.
    pub fn parse(body: &[u8]) -> Result<Self, AuthError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| AuthError::MalformedPayload)?;
        if !value.is_object() {
            return Err(AuthError::MalformedPayload);
        }
        serde_json::from_value(value).map_err(|_| AuthError::MalformedPayload)
    }
}

/// A parsed attempt. The password never appears in Debug output.
#[derive(Debug)]
pub struct LoginAttempt {
    pub username: String,
    pub password: Password,
    pub csrf_token: String,
}

impl From<LoginPayload> for LoginAttempt {
    fn from(payload: LoginPayload) -> Self {
        Self {
            username: normalize_username(payload.username.as_deref().unwrap_or_default()),
            password: Password::new(payload.password.unwrap_or_default()),
            csrf_token: payload.csrf_token.unwrap_or_default(),
        }
    }
}

/// Successful login: the signed session and its `Set-Cookie` directive.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub signed: SignedSession,
    pub cookie: String,
}

#[derive(Debug)]
pub struct LoginOrchestrator {
    limiter: Arc<RateLimiter>,
    csrf: CsrfGuard,
    verifier: CredentialVerifier,
    issuer: SessionIssuer,
    signer: SessionSigner,
    cookies: CookieBuilder,
    clock: Arc<dyn Clock>,
    failure_delay: Duration,
}

impl LoginOrchestrator {
    pub fn new(
        limiter: Arc<RateLimiter>,
        verifier: CredentialVerifier,
        issuer: SessionIssuer,
        signer: SessionSigner,
        cookies: CookieBuilder,
        clock: Arc<dyn Clock>,
        failure_delay: Duration,
    ) -> Self {
        Self {
            limiter,
            csrf: CsrfGuard::new(),
            verifier,
            issuer,
            signer,
            cookies,
            clock,
            failure_delay,
        }
    }

    /// Wire every component from configuration around a shared clock.
    pub fn from_config(config: &AuthConfig, users: Arc<UserRegistry>, clock: Arc<dyn Clock>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit, clock.clone()));
        let registry = Arc::new(SessionRegistry::new(clock.clone()));
        Self::new(
            limiter,
            CredentialVerifier::new(users, config.pepper.clone()),
            SessionIssuer::new(registry, clock.clone(), config.session_duration_ms),
            SessionSigner::new(config.session_secret.as_bytes()),
            CookieBuilder::new(config.cookie_name.clone(), config.cookie_secure),
            clock,
            Duration::from_millis(config.failure_delay_ms),
        )
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        self.issuer.registry()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cookies(&self) -> &CookieBuilder {
        &self.cookies
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.signer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn failure_delay(&self) -> Duration {
        self.failure_delay
    }

    /// Run one attempt to completion.
    ///
    /// Credential rejections resolve no earlier than receipt plus the failure
    /// delay. No lock is held while waiting.
    pub async fn login(&self, request: LoginRequest<'_>) -> Result<LoginSuccess, AuthError> {
        let received_at = Instant::now();
        let mut state = LoginState::Received;

        match self.process(&request, &mut state) {
            Ok((success, username)) => {
                self.limiter.reset(request.client_key);
                let event = AuthEvent::LoginSucceeded {
                    username,
                    client_key: request.client_key.to_string(),
                    timestamp: chrono::Utc::now(),
                };
                tracing::info!(target: "security::auth", "{}", event.to_audit_string());
                Ok(success)
            }
            Err(err) => {
                let event = AuthEvent::LoginRejected {
                    reason: err.internal_reason(),
                    failed_after: state.as_str(),
                    client_key: request.client_key.to_string(),
                    timestamp: chrono::Utc::now(),
                };
                tracing::warn!(target: "security::auth", "{}", event.to_audit_string());

                if err.is_credential_failure() {
                    tokio::time::sleep_until(received_at + self.failure_delay).await;
                }
                Err(err)
            }
        }
    }

    /// Synchronous part of the sequence. `state` is left at the last stage passed.
    fn process(
        &self,
        request: &LoginRequest<'_>,
        state: &mut LoginState,
    ) -> Result<(LoginSuccess, String), AuthError> {
        // Admission records the strike, so later rejections need no extra register call.
        if !self.limiter.admit(request.client_key) {
            return Err(AuthError::RateLimited {
                retry_after_secs: self.limiter.retry_after_secs(request.client_key),
            });
        }
        *state = LoginState::RateChecked;

        let body = request.body.ok_or(AuthError::MalformedPayload)?;
        let attempt = LoginAttempt::from(LoginPayload::parse(body)?);

        if !self.csrf.check(Some(&attempt.csrf_token), request.csrf_header) {
            return Err(AuthError::CsrfMismatch);
        }
        *state = LoginState::CsrfChecked;

        if attempt.username.is_empty() || attempt.password.is_empty() {
            return Err(AuthError::MissingField);
        }
        *state = LoginState::InputValidated;

        let profile = match self.verifier.verify(&attempt.username, &attempt.password) {
            Verification::Accepted(profile) => profile,
            Verification::UnknownUser => return Err(AuthError::UnknownUser),
            Verification::BadPassword => return Err(AuthError::BadPassword),
        };
        *state = LoginState::CredentialsChecked;

        let session = self.issuer.issue(&attempt.username, &profile).map_err(|e| {
            tracing::error!(error = %e, "session issuance failed");
            AuthError::Internal
        })?;
        let signed = self.signer.sign_session(session).map_err(|e| {
            tracing::error!(error = %e, "session signing failed");
            AuthError::Internal
        })?;
        let cookie = self.cookies.build(
            &signed.session.session_id,
            signed.session.expires_at,
            self.clock.now_ms(),
        );
        *state = LoginState::SessionIssued;

        Ok((LoginSuccess { signed, cookie }, attempt.username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::credentials::{UserProfile, DEFAULT_PEPPER};
    use crate::security::rate_limit::RateLimitConfig;

    const NOW: u64 = 1_700_000_000_000;

    fn orchestrator(max_attempts: u32) -> (LoginOrchestrator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let config = AuthConfig {
            rate_limit: RateLimitConfig::new(max_attempts, 900),
            ..AuthConfig::default()
        };
        let users = Arc::new(UserRegistry::new().with_user(UserProfile::with_password(
            "justin",
            "Justin",
            "correct-horse",
            DEFAULT_PEPPER,
            &["operator", "commander"],
        )));
        (LoginOrchestrator::from_config(&config, users, clock.clone()), clock)
    }

    fn body(username: &str, password: &str, token: &str) -> Vec<u8> {
        serde_json::json!({"username": username, "password": password, "csrfToken": token})
            .to_string()
            .into_bytes()
    }

    fn request<'a>(body: &'a [u8], header: Option<&'a str>) -> LoginRequest<'a> {
        LoginRequest {
            client_key: "10.0.0.1",
            csrf_header: header,
            body: Some(body),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_login_issues_session() {
        let (login, _clock) = orchestrator(6);
        let body = body("  Justin ", "correct-horse", "tok");
        let success = login.login(request(&body, Some("tok"))).await.unwrap();

        let session = &success.signed.session;
        assert_eq!(session.username, "justin");
        assert_eq!(session.display_name, "Justin");
        assert_eq!(session.issued_at, NOW);
        assert_eq!(session.expires_at, NOW + 1_800_000);
        assert!(login.signer().verify(session, &success.signed.signature));
        assert!(login.sessions().is_active(&session.session_id));
        assert!(success
            .cookie
            .starts_with(&format!("authyntic_session={};", session.session_id)));
        assert!(success.cookie.contains("Max-Age=1800"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_rate_limit() {
        let (login, _clock) = orchestrator(2);
        let bad = body("justin", "wrong", "tok");
        let good = body("justin", "correct-horse", "tok");

        assert_eq!(
            login.login(request(&bad, Some("tok"))).await.unwrap_err(),
            AuthError::BadPassword
        );
        login.login(request(&good, Some("tok"))).await.unwrap();
        // bucket was cleared, so two more attempts are admitted
        assert!(login.login(request(&bad, Some("tok"))).await.is_err());
        assert_eq!(
            login.login(request(&good, Some("tok"))).await.map(|_| ()),
            Ok(())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_checked_before_anything_else() {
        let (login, _clock) = orchestrator(1);
        let bad = body("justin", "wrong", "tok");
        assert!(login.login(request(&bad, Some("tok"))).await.is_err());

        let err = login.login(request(b"not json", None)).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { retry_after_secs } if retry_after_secs > 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload() {
        let (login, _clock) = orchestrator(6);
        for raw in [&b"not json"[..], b"[\"a\",\"b\",\"c\"]", b"{\"username\": 5}"] {
            assert_eq!(
                login.login(request(raw, Some("tok"))).await.unwrap_err(),
                AuthError::MalformedPayload
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_body_counts_as_strike() {
        let (login, _clock) = orchestrator(1);
        let unreadable = LoginRequest {
            client_key: "10.0.0.1",
            csrf_header: Some("tok"),
            body: None,
        };
        assert_eq!(login.login(unreadable).await.unwrap_err(), AuthError::MalformedPayload);

        // the bucket is now full, so the next unreadable body is rate limited first
        assert!(matches!(
            login.login(unreadable).await.unwrap_err(),
            AuthError::RateLimited { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_csrf_checked_before_input() {
        let (login, _clock) = orchestrator(6);
        let empty = body("", "", "tok");
        assert_eq!(
            login.login(request(&empty, Some("other"))).await.unwrap_err(),
            AuthError::CsrfMismatch
        );
        assert_eq!(
            login.login(request(&empty, None)).await.unwrap_err(),
            AuthError::CsrfMismatch
        );
        assert_eq!(
            login.login(request(&empty, Some("tok"))).await.unwrap_err(),
            AuthError::MissingField
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_failures_wait_out_delay() {
        let (login, _clock) = orchestrator(6);
        for (user, expected) in [
            ("nobody", AuthError::UnknownUser),
            ("justin", AuthError::BadPassword),
        ] {
            let started = Instant::now();
            let raw = body(user, "wrong", "tok");
            let err = login.login(request(&raw, Some("tok"))).await.unwrap_err();
            assert_eq!(err, expected);
            assert!(started.elapsed() >= login.failure_delay());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_credential_failures_do_not_wait() {
        let (login, _clock) = orchestrator(6);
        let started = Instant::now();
        let _ = login.login(request(b"{}", Some("x"))).await;
        assert!(started.elapsed() < login.failure_delay());
    }

    #[test]
    fn test_rejection_reports_last_stage_passed() {
        let (login, _clock) = orchestrator(2);
        let stage_after = |raw: &[u8], header: Option<&str>| {
            let mut state = LoginState::Received;
            let result = login.process(&request(raw, header), &mut state);
            assert!(result.is_err());
            state
        };

        assert_eq!(stage_after(&body("justin", "pw", "tok"), Some("x")), LoginState::RateChecked);
        assert_eq!(stage_after(&body("justin", "wrong", "tok"), Some("tok")), LoginState::InputValidated);
        // bucket full
        assert_eq!(stage_after(b"{}", Some("tok")), LoginState::Received);
        assert_eq!(LoginState::InputValidated.as_str(), "input_validated");
    }

    #[test]
    fn test_attempt_debug_hides_password() {
        let attempt = LoginAttempt::from(LoginPayload {
            username: Some("Justin".into()),
            password: Some("hunter2".into()),
            csrf_token: None,
        });
        assert_eq!(attempt.username, "justin");
        assert!(!format!("{:?}", attempt).contains("hunter2"));
    }
}
