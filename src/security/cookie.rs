// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session cookie directives.
//!
//! The cookie value is the opaque session ID, never the signed payload.
//! `HttpOnly`, `Path=/` and `SameSite=Strict` are always set; `Secure` follows
//! configuration and must be on whenever the site is served over TLS.

use chrono::{DateTime, Utc};

/// Default cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "authyntic_session";

/// RFC 1123 date as used by the `Expires` attribute.
const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone)]
pub struct CookieBuilder {
    name: String,
    secure: bool,
}

impl CookieBuilder {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    /// `Set-Cookie` value for `session_id`, valid until `expires_at_ms`.
    ///
    /// `Max-Age` is the whole seconds remaining at `now_ms`.
    pub fn build(&self, session_id: &str, expires_at_ms: u64, now_ms: u64) -> String {
        let max_age = expires_at_ms.saturating_sub(now_ms) / 1000;
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}; Expires={}",
            self.name,
            session_id,
            max_age,
            format_expires(expires_at_ms)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Directive that removes the session cookie from the browser.
    pub fn clear(&self) -> String {
        let mut cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Expires={}",
            self.name,
            format_expires(0)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Pull this builder's cookie out of a `Cookie` request header.
    pub fn read<'a>(&self, cookie_header: &'a str) -> Option<&'a str> {
        cookie_header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == self.name)
                .then(|| value.trim())
                .filter(|value| !value.is_empty())
        })
    }
}

impl Default for CookieBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME, false)
    }
}

fn format_expires(epoch_ms: u64) -> String {
    let millis = i64::try_from(epoch_ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(millis)
        .or_else(|| DateTime::<Utc>::from_timestamp_millis(0))
        .map(|dt| dt.format(RFC1123_FORMAT).to_string())
        .unwrap_or_else(|| "Thu, 01 Jan 1970 00:00:00 GMT".to_string())
}
