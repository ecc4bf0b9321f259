// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resilient Lock Helpers
//!
//! The rate limiter and the session registry must keep answering even if a
//! handler panicked while holding their lock. These helpers recover the guard
//! from a poisoned lock instead of propagating the panic, and log the event
//! as a critical security condition.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::{Mutex, RwLock};
//! use authyntic::security::locks::{resilient_lock, resilient_read, resilient_write};
//!
//! let buckets = Mutex::new(Vec::<u64>::new());
//! resilient_lock(&buckets).push(1);
//!
//! let table = RwLock::new(0usize);
//! *resilient_write(&table) += 1;
//! assert_eq!(*resilient_read(&table), 1);
//! ```

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a mutex, recovering from poisoning if necessary.
#[inline]
pub fn resilient_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_MUTEX",
                "CRITICAL: Mutex was poisoned. Recovering data. \
                 A handler previously panicked while holding this lock."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a read lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_READ",
                "CRITICAL: RwLock was poisoned during read acquisition. Recovering data."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_WRITE",
                "CRITICAL: RwLock was poisoned during write acquisition. Recovering data."
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_resilient_lock_poisoned() {
        let lock = Arc::new(Mutex::new(vec![1u64]));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.lock().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        let mut guard = resilient_lock(&lock);
        guard.push(2);
        assert_eq!(*guard, vec![1, 2]);
    }

    #[test]
    fn test_resilient_write_poisoned() {
        let lock = Arc::new(RwLock::new(42));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.write().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        *resilient_write(&lock) = 100;
        assert_eq!(*resilient_read(&lock), 100);
    }
}
