// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Double-submit CSRF check.
//!
//! The token is opaque here: the page that rendered the login form minted it.
//! A request passes only if the body copy and the `X-CSRF-Token` header copy
//! are both present, non-blank and byte-equal.

use subtle::ConstantTimeEq;

use crate::utils::non_empty_trimmed;

/// Header carrying the second copy of the token.
pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfGuard;

impl CsrfGuard {
    pub fn new() -> Self {
        Self
    }

    /// Returns true iff both copies are non-empty after trimming and equal.
    pub fn check(&self, body_token: Option<&str>, header_token: Option<&str>) -> bool {
        let (Some(body), Some(header)) = (non_empty_trimmed(body_token), non_empty_trimmed(header_token))
        else {
            return false;
        };
        body.as_bytes().ct_eq(header.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_tokens_pass() {
        assert!(CsrfGuard.check(Some("abc"), Some("abc")));
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert!(CsrfGuard.check(Some(" abc\n"), Some("abc ")));
    }

    #[test]
    fn test_mismatch_fails() {
        assert!(!CsrfGuard.check(Some("abc"), Some("abd")));
        assert!(!CsrfGuard.check(Some("abc"), Some("abcd")));
    }

    #[test]
    fn test_empty_pair_fails() {
        assert!(!CsrfGuard.check(Some(""), Some("")));
        assert!(!CsrfGuard.check(Some("   "), Some("   ")));
    }

    #[test]
    fn test_missing_header_fails() {
        assert!(!CsrfGuard.check(Some("abc"), None));
        assert!(!CsrfGuard.check(None, Some("abc")));
        assert!(!CsrfGuard.check(None, None));
    }
}
