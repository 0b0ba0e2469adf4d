//! Keyed table of pending asynchronous requests.
//!
//! A request is registered under a key before the outbound action is sent.
//! The matching inbound event later settles it through [`CorrelationRegistry::resolve`]
//! or [`CorrelationRegistry::reject`]; if nothing arrives within the deadline
//! it settles with [`Error::Timeout`].
//!
//! The deadline is fixed at registration. An entry past its deadline is
//! expired by the next registry access or by the waiting side's timer,
//! whichever comes first, and a reply arriving after it is dropped.
//!
//! Settlement ownership is decided by removal from the table: whichever of
//! resolve, reject, expiry or the timer removes the entry first settles it,
//! and the others become no-ops.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    tokio::{sync::oneshot, time::Instant},
    tracing::{debug, instrument, warn},
};

use crate::{Error, Result};

struct PendingEntry<T> {
    entry_id: u64,
    created_at: Instant,
    timeout: Duration,
    tx: oneshot::Sender<Result<T>>,
}

impl<T> PendingEntry<T> {
    fn deadline(&self) -> Instant {
        self.created_at + self.timeout
    }

    /// Settle with [`Error::Timeout`].
    fn expire(self, key: String) {
        warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "request timed out");
        let _ = self.tx.send(Err(Error::Timeout {
            key,
            timeout: self.timeout,
        }));
    }
}

struct RegistryInner<T> {
    name: &'static str,
    /// std Mutex: every access is a short synchronous map operation and is
    /// never held across an `.await`.
    pending: Mutex<HashMap<String, PendingEntry<T>>>,
    next_entry_id: AtomicU64,
}

impl<T> RegistryInner<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry<T>>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let overdue: Vec<String> = pending
            .iter()
            .filter(|(_, entry)| entry.deadline() <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in overdue {
            if let Some(entry) = pending.remove(&key) {
                entry.expire(key);
            }
        }
        pending
    }

    /// Remove `key` only if it still belongs to `entry_id`.
    fn remove_if_current(&self, key: &str, entry_id: u64) -> Option<PendingEntry<T>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.get(key).is_some_and(|e| e.entry_id == entry_id) {
            pending.remove(key)
        } else {
            None
        }
    }
}

/// Pending-request table for one kind of reply value.
pub struct CorrelationRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for CorrelationRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> CorrelationRegistry<T> {
    /// `name` only labels log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                name,
                pending: Mutex::new(HashMap::new()),
                next_entry_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a pending request under `key`.
    ///
    /// Fails with [`Error::AlreadyPending`] when `key` is already waiting; the
    /// existing entry is left untouched.
    #[instrument(skip(self, key), fields(registry = self.inner.name, key = tracing::field::Empty))]
    pub fn register(&self, key: impl Into<String>, timeout: Duration) -> Result<Pending<T>> {
        let key = key.into();
        tracing::Span::current().record("key", key.as_str());
        let (tx, rx) = oneshot::channel();
        let entry_id = self.inner.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let created_at = Instant::now();
        {
            let mut pending = self.inner.lock();
            if pending.contains_key(&key) {
                warn!("request already pending, refusing duplicate");
                return Err(Error::AlreadyPending { key });
            }
            pending.insert(key.clone(), PendingEntry {
                entry_id,
                created_at,
                timeout,
                tx,
            });
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "request registered");
        Ok(Pending {
            key,
            entry_id,
            timeout,
            deadline: created_at + timeout,
            rx: Some(rx),
            registry: Some(Arc::clone(&self.inner)),
            cleanup: None,
        })
    }

    /// Settle `key` successfully. Returns `false` (and does nothing) when no
    /// request is pending under `key` or its deadline has passed.
    #[instrument(skip(self, value), fields(registry = self.inner.name))]
    pub fn resolve(&self, key: &str, value: T) -> bool {
        self.settle(key, Ok(value))
    }

    /// Settle `key` with an error. Returns `false` when nothing is pending.
    #[instrument(skip(self), fields(registry = self.inner.name))]
    pub fn reject(&self, key: &str, error: Error) -> bool {
        self.settle(key, Err(error))
    }

    fn settle(&self, key: &str, outcome: Result<T>) -> bool {
        let mut pending = self.inner.lock();
        let Some(entry) = pending.remove(key) else {
            debug!("no pending request, dropping");
            return false;
        };
        debug!(
            age_ms = entry.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "request settled"
        );
        // Sent under the lock so a timer that loses the removal race is
        // guaranteed to find the outcome already in the channel.
        entry.tx.send(outcome).is_ok()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        let pending = self.inner.lock();
        pending.contains_key(key)
    }

    /// Keys currently waiting, in no particular order.
    pub fn pending_keys(&self) -> Vec<String> {
        let pending = self.inner.lock();
        pending.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let pending = self.inner.lock();
        pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered request that settles exactly once.
///
/// Dropping it without awaiting [`Pending::wait`] withdraws the request from
/// its registry.
#[must_use = "a pending request does nothing unless waited on"]
pub struct Pending<T> {
    key: String,
    entry_id: u64,
    timeout: Duration,
    deadline: Instant,
    rx: Option<oneshot::Receiver<Result<T>>>,
    registry: Option<Arc<RegistryInner<T>>>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Pending<T> {
    /// A value that is already settled, for backends that know the outcome
    /// without waiting.
    pub fn ready(key: impl Into<String>, outcome: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self {
            key: key.into(),
            entry_id: 0,
            timeout: Duration::ZERO,
            deadline: Instant::now(),
            rx: Some(rx),
            registry: None,
            cleanup: None,
        }
    }

    /// Run `cleanup` once this value is settled or dropped, e.g. to release
    /// a one-shot event subscription that will never fire after a timeout.
    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the settlement, at most until the deadline fixed at
    /// registration. The timer is dropped as soon as the request is resolved
    /// or rejected.
    pub async fn wait(mut self) -> Result<T> {
        let Some(mut rx) = self.rx.take() else {
            return Err(Error::Cancelled {
                key: self.key.clone(),
            });
        };

        if self.registry.is_none() {
            return rx.await.unwrap_or_else(|_| {
                Err(Error::Cancelled {
                    key: self.key.clone(),
                })
            });
        }

        match tokio::time::timeout_at(self.deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Cancelled {
                key: self.key.clone(),
            }),
            Err(_) => {
                if self.withdraw() {
                    warn!(key = %self.key, "request timed out");
                    Err(Error::Timeout {
                        key: self.key.clone(),
                        timeout: self.timeout,
                    })
                } else {
                    // Settled concurrently with the timer; the winner's
                    // outcome is already in the channel.
                    rx.try_recv().unwrap_or_else(|_| {
                        Err(Error::Cancelled {
                            key: self.key.clone(),
                        })
                    })
                }
            },
        }
    }

    fn withdraw(&self) -> bool {
        self.registry
            .as_ref()
            .and_then(|r| r.remove_if_current(&self.key, self.entry_id))
            .is_some()
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        if self.withdraw() {
            debug!(key = %self.key, "pending request dropped before settling");
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
