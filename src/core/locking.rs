//! Per-resource exclusive locking for concurrent task execution.
//!
//! The lock table prevents race conditions when multiple coordinators or
//! workers touch the same files. Locks are process-local and in-memory;
//! there is no cross-process coordination here.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::core::errors::{ForemanError, Result};

/// How long a waiter sleeps between re-checks when no release wakes it.
/// Bounded so that expired records are observed without a release event.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// A single exclusive lock record with optional expiry tracking.
///
/// `token` identifies the acquisition that created the record, so a stale
/// guard whose lock was taken over after expiry cannot release the new
/// holder's record.
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub resource_key: String,
    pub acquired_at: Instant,
    pub expiry: Option<Duration>,
    token: u64,
}

impl LockRecord {
    fn new(resource_key: String, expiry: Option<Duration>, token: u64) -> Self {
        Self {
            resource_key,
            acquired_at: Instant::now(),
            expiry,
            token,
        }
    }

    /// A record with no expiry never expires.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => self.acquired_at.elapsed() > expiry,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct TableInner {
    records: DashMap<String, LockRecord>,
    released: Notify,
    next_token: std::sync::atomic::AtomicU64,
}

impl TableInner {
    fn mint_token(&self) -> u64 {
        self.next_token
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

/// Process-local registry of exclusive per-resource locks.
///
/// Explicitly constructed and injectable: every coordinator and every test
/// receives its own instance (or a shared clone), no global singleton.
/// Cloning is cheap and clones share the same underlying table.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    inner: Arc<TableInner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire an exclusive lock on `key`, waiting up to `timeout`.
    ///
    /// The key is normalized to a canonical absolute path string, so
    /// `"a.txt"` and `"./a.txt"` contend for the same lock. An existing
    /// record that has expired is purged and the caller takes over
    /// immediately rather than waiting out the full timeout.
    ///
    /// The returned [`LockGuard`] releases the lock on drop, on every exit
    /// path of the enclosing scope. This is the only form production code
    /// should use; bare [`release`](Self::release) exists for cleanup
    /// utilities and tests.
    ///
    /// # Errors
    ///
    /// [`ForemanError::LockTimeout`] if the lock is still held (and live)
    /// when `timeout` elapses.
    pub async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
        expiry: Option<Duration>,
    ) -> Result<LockGuard> {
        let normalized = normalize_key(key);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(token) = self.try_insert(&normalized, expiry) {
                debug!(key = %normalized, "acquired lock");
                return Ok(LockGuard {
                    table: self.clone(),
                    key: normalized,
                    token,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ForemanError::LockTimeout {
                    key: normalized,
                    timeout,
                });
            }

            // Wake on release, or re-check at the retry interval so an
            // expired record never holds us past its expiry. A missed
            // notification costs at most one interval.
            let wait = RETRY_INTERVAL.min(deadline - now);
            let _ = tokio::time::timeout(wait, self.inner.released.notified()).await;
        }
    }

    /// Atomic per-key check-and-insert: succeeds when the slot is free or
    /// the current record has expired. Returns the new record's token.
    fn try_insert(&self, normalized: &str, expiry: Option<Duration>) -> Option<u64> {
        let token = self.inner.mint_token();
        match self.inner.records.entry(normalized.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    debug!(key = %normalized, "replacing expired lock");
                    occupied.insert(LockRecord::new(normalized.to_string(), expiry, token));
                    Some(token)
                } else {
                    None
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockRecord::new(normalized.to_string(), expiry, token));
                Some(token)
            }
        }
    }

    /// Release the lock on `key`.
    ///
    /// Releasing a key with no record is a logged no-op, not an error:
    /// double-release during cleanup-on-error paths is expected.
    pub fn release(&self, key: &str) {
        let normalized = normalize_key(key);
        if self.inner.records.remove(&normalized).is_some() {
            debug!(key = %normalized, "released lock");
            self.inner.released.notify_waiters();
        } else {
            warn!(key = %normalized, "attempted to release lock that is not held");
        }
    }

    /// True iff a live (non-expired) record exists for `key`.
    ///
    /// An expired record found here is purged as a side effect.
    pub fn is_locked(&self, key: &str) -> bool {
        let normalized = normalize_key(key);
        if self
            .inner
            .records
            .remove_if(&normalized, |_, record| record.is_expired())
            .is_some()
        {
            self.inner.released.notify_waiters();
            return false;
        }
        self.inner.records.contains_key(&normalized)
    }

    /// Sweep out every expired record. Optional maintenance; correctness
    /// does not depend on it because acquisition purges lazily.
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .inner
            .records
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self
                .inner
                .records
                .remove_if(&key, |_, record| record.is_expired())
                .is_some()
            {
                debug!(key = %key, "cleaned up expired lock");
                removed += 1;
            }
        }
        if removed > 0 {
            self.inner.released.notify_waiters();
        }
        removed
    }

    /// Number of records currently registered (live or not yet purged).
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }
}

/// Scoped acquisition: releases the lock when dropped, on every exit path
/// (normal return, early `?`, panic unwind, future cancellation).
#[derive(Debug)]
pub struct LockGuard {
    table: LockTable,
    key: String,
    token: u64,
}

impl LockGuard {
    /// The normalized resource key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Only remove our own record: an explicit release or an expiry
        // takeover may have replaced it with someone else's.
        let removed = self
            .table
            .inner
            .records
            .remove_if(&self.key, |_, record| record.token == self.token);
        if removed.is_some() {
            debug!(key = %self.key, "released lock (guard drop)");
            self.table.inner.released.notify_waiters();
        }
    }
}

/// Lexically normalize a key to an absolute path string. No filesystem
/// access, so locking a path that does not exist yet is deterministic.
fn normalize_key(key: &str) -> String {
    let path = Path::new(key);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_relative_and_dot_segments() {
        let cwd = std::env::current_dir().unwrap();
        let plain = normalize_key("a.txt");
        let dotted = normalize_key("./a.txt");
        assert_eq!(plain, dotted);
        assert!(plain.starts_with(&cwd.to_string_lossy().into_owned()));

        let parent = normalize_key("/tmp/sub/../a.txt");
        assert_eq!(parent, "/tmp/a.txt");
    }

    #[test]
    fn record_without_expiry_never_expires() {
        let record = LockRecord::new("k".into(), None, 0);
        assert!(!record.is_expired());
        let expired = LockRecord {
            acquired_at: Instant::now() - Duration::from_secs(10),
            ..LockRecord::new("k".into(), Some(Duration::from_millis(1)), 1)
        };
        assert!(expired.is_expired());
    }

    #[tokio::test]
    async fn guard_drop_releases() {
        let table = LockTable::new();
        let guard = table
            .acquire("guarded.txt", Duration::from_millis(100), None)
            .await
            .unwrap();
        assert!(table.is_locked("guarded.txt"));
        drop(guard);
        assert!(!table.is_locked("guarded.txt"));
    }
}
