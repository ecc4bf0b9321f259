// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-facing rejections for the authentication path.
//!
//! Every rejection is caught at the login boundary and rendered as a JSON
//! body with a reference code for support tracking:
//!
//! ```json
//! {"error":"Access denied. Credentials invalid.","code":"invalid_credentials",
//!  "reference":"ERR-20250101-A3F8K2","status":401}
//! ```
//!
//! `UnknownUser` and `BadPassword` keep distinct internal reasons for the
//! audit log but share one external code and status.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// ERROR REFERENCE CODE GENERATION
// =============================================================================

/// Generate a unique error reference code.
/// Format: ERR-YYYYMMDD-XXXXXX (e.g., ERR-20240115-A3F8K2)
pub fn generate_reference_code() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();
    let random: String = (0..6)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect();
    format!("ERR-{}-{}", date, random)
}

// =============================================================================
// REJECTION TAXONOMY
// =============================================================================

/// Why a login attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Body is not a JSON object of strings
    #[error("Invalid request payload.")]
    MalformedPayload,

    /// Body and header CSRF tokens missing or different
    #[error("The security token for this session is invalid or missing. Reload the page and try again.")]
    CsrfMismatch,

    /// Username or password blank
    #[error("Enter both your authorized operator ID and access phrase.")]
    MissingField,

    #[error("Access denied. The supplied operator ID is not recognized.")]
    UnknownUser,

    #[error("Access denied. The supplied credentials are invalid.")]
    BadPassword,

    /// Too many attempts inside the window
    #[error("Too many authentication attempts. Try again later.")]
    RateLimited { retry_after_secs: u64 },

    /// Session could not be issued; never carries internal details
    #[error("Unable to establish a secure session. Try again.")]
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedPayload | AuthError::CsrfMismatch | AuthError::MissingField => {
                StatusCode::BAD_REQUEST
            }
            AuthError::UnknownUser | AuthError::BadPassword => StatusCode::UNAUTHORIZED,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code shown to clients.
    pub fn external_code(&self) -> &'static str {
        match self {
            AuthError::MalformedPayload => "malformed_payload",
            AuthError::CsrfMismatch => "csrf_invalid",
            AuthError::MissingField => "missing_field",
            AuthError::UnknownUser | AuthError::BadPassword => "invalid_credentials",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Internal => "internal_error",
        }
    }

    /// Code written to the audit log only.
    pub fn internal_reason(&self) -> &'static str {
        match self {
            AuthError::MalformedPayload => "malformed_payload",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::MissingField => "missing_field",
            AuthError::UnknownUser => "unknown_user",
            AuthError::BadPassword => "bad_password",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Internal => "internal_error",
        }
    }

    /// Failures that wait out the fixed delay before answering.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, AuthError::UnknownUser | AuthError::BadPassword)
    }
}

/// JSON body for a rejection.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub reference: String,
    pub status: u16,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let reference = generate_reference_code();

        tracing::debug!(
            reference = %reference,
            code = self.external_code(),
            "rejecting request"
        );

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.external_code(),
            reference,
            status: status.as_u16(),
        };
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"An unexpected error occurred","code":"internal_error","reference":"ERR-FALLBACK","status":500}"#
                .to_string()
        });

        let mut response = (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response();

        if let AuthError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_code_format() {
        let code = generate_reference_code();
        assert!(code.starts_with("ERR-"));
        assert_eq!(code.len(), 19);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::MalformedPayload.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::CsrfMismatch.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::UnknownUser.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::BadPassword.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::RateLimited { retry_after_secs: 5 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_credential_failures_share_external_code() {
        assert_eq!(
            AuthError::UnknownUser.external_code(),
            AuthError::BadPassword.external_code()
        );
        assert_ne!(
            AuthError::UnknownUser.internal_reason(),
            AuthError::BadPassword.internal_reason()
        );
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = AuthError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
