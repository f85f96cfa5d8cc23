//! Per-vault mutual exclusion
//!
//! Every mutating operation holds a [`LockGuard`] for its whole duration,
//! including the calls it makes into the pool and token contracts. A
//! collaborator that calls back into the vault finds the lock taken and gets
//! [`Error::ReentrancyViolation`] instead of blocking.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct ReentrancyLock {
    held: AtomicBool,
}

impl ReentrancyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, failing immediately if it is already held
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| Error::ReentrancyViolation)?;
        Ok(LockGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the lock on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a ReentrancyLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails() {
        let lock = ReentrancyLock::new();
        let _guard = lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(lock.acquire(), Err(Error::ReentrancyViolation)));
    }

    #[test]
    fn test_released_on_drop() {
        let lock = ReentrancyLock::new();
        {
            let _guard = lock.acquire().unwrap();
        }
        assert!(!lock.is_held());
        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(lock: &ReentrancyLock) -> Result<()> {
            let _guard = lock.acquire()?;
            Err(Error::InvalidAmount)
        }

        let lock = ReentrancyLock::new();
        assert!(failing(&lock).is_err());
        assert!(!lock.is_held());
    }
}
