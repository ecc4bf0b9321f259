// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for authyntic.

/// Mask a sensitive string (session IDs, peppers, signing secrets) for logging.
///
/// Shows only the first `visible_prefix` characters and replaces the rest with "...".
///
/// # Examples
///
/// ```
/// use authyntic::utils::mask_sensitive;
///
/// let session_id = "3f9c1a7be0d24c55a1f0e9d8c7b6a5f4";
/// assert_eq!(mask_sensitive(session_id, 6), "3f9c1a...");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() <= visible_prefix {
        // short values are hidden entirely
        return "...".to_string();
    }

    let prefix: String = input.chars().take(visible_prefix).collect();
    format!("{}...", prefix)
}

/// Trim a header or body value and drop it when nothing is left.
pub fn non_empty_trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
