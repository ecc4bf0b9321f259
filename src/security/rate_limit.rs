// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sliding-window rate limiting for login attempts.
//!
//! Each client key owns a bucket of attempt timestamps. A bucket is pruned on
//! every read so that every remaining timestamp `t` satisfies
//! `now - t < window`. Empty buckets are removed from the map.
//!
//! # Thread Safety
//!
//! All buckets live behind one `Mutex`. Prune-then-check-then-append runs as a
//! single critical section in [`RateLimiter::admit`], so concurrent attempts
//! from one key can never be admitted past `max_attempts`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::security::locks::resilient_lock;

/// Sweep every bucket once per this many admissions.
const CLEANUP_INTERVAL: u64 = 64;

/// Window and threshold for the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one window (>= 1).
    pub max_attempts: u32,
    /// Length of the trailing window in seconds (>= 1).
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            window_secs: 15 * 60,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window_secs,
        }
    }

    fn window_ms(&self) -> u64 {
        self.window_secs.saturating_mul(1000)
    }
}

/// Per-client sliding-window attempt counter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, VecDeque<u64>>>,
    admissions: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buckets: Mutex::new(HashMap::new()),
            admissions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// True iff the pruned bucket holds fewer than `max_attempts` timestamps.
    pub fn allow(&self, client_key: &str) -> bool {
        let now = self.clock.now_ms();
        let mut buckets = resilient_lock(&self.buckets);
        let count = self.pruned_len(&mut buckets, client_key, now);
        count < self.config.max_attempts as usize
    }

    /// Record one attempt at the current time.
    pub fn register(&self, client_key: &str) {
        let now = self.clock.now_ms();
        let mut buckets = resilient_lock(&self.buckets);
        let bucket = buckets.entry(client_key.to_string()).or_default();
        prune(bucket, now, self.config.window_ms());
        bucket.push_back(now);
    }

    /// Forget every attempt for `client_key`.
    pub fn reset(&self, client_key: &str) {
        resilient_lock(&self.buckets).remove(client_key);
    }

    /// Check and register in one critical section.
    ///
    /// Returns false without recording anything when the key is already at
    /// the ceiling; otherwise records the attempt and returns true.
    pub fn admit(&self, client_key: &str) -> bool {
        let now = self.clock.now_ms();
        let mut buckets = resilient_lock(&self.buckets);

        let count = self.admissions.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % CLEANUP_INTERVAL == 0 {
            let removed = self.cleanup_locked(&mut buckets, now);
            tracing::debug!(removed, "rate limiter cleanup");
        }

        let bucket = buckets.entry(client_key.to_string()).or_default();
        prune(bucket, now, self.config.window_ms());
        if bucket.len() >= self.config.max_attempts as usize {
            return false;
        }
        bucket.push_back(now);
        true
    }

    /// Seconds until the oldest recorded attempt leaves the window.
    ///
    /// Zero when the key is not currently limited.
    pub fn retry_after_secs(&self, client_key: &str) -> u64 {
        let now = self.clock.now_ms();
        let mut buckets = resilient_lock(&self.buckets);
        if self.pruned_len(&mut buckets, client_key, now) < self.config.max_attempts as usize {
            return 0;
        }
        let oldest = buckets
            .get(client_key)
            .and_then(|bucket| bucket.front().copied())
            .unwrap_or(now);
        let remaining_ms = self
            .config
            .window_ms()
            .saturating_sub(now.saturating_sub(oldest));
        remaining_ms.div_ceil(1000).max(1)
    }

    /// Drop stale timestamps everywhere and remove empty buckets.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut buckets = resilient_lock(&self.buckets);
        self.cleanup_locked(&mut buckets, now)
    }

    /// Number of keys with a non-empty bucket at the last prune.
    pub fn tracked_keys(&self) -> usize {
        resilient_lock(&self.buckets).len()
    }

    fn pruned_len(&self, buckets: &mut HashMap<String, VecDeque<u64>>, key: &str, now: u64) -> usize {
        let Some(bucket) = buckets.get_mut(key) else {
            return 0;
        };
        prune(bucket, now, self.config.window_ms());
        let len = bucket.len();
        if len == 0 {
            buckets.remove(key);
        }
        len
    }

    fn cleanup_locked(&self, buckets: &mut HashMap<String, VecDeque<u64>>, now: u64) -> usize {
        let window_ms = self.config.window_ms();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            prune(bucket, now, window_ms);
            !bucket.is_empty()
        });
        before - buckets.len()
    }
}

fn prune(bucket: &mut VecDeque<u64>, now: u64, window_ms: u64) {
    while let Some(&oldest) = bucket.front() {
        if now.saturating_sub(oldest) >= window_ms {
            bucket.pop_front();
        } else {
            break;
        }
    }
}
