//! Generic TTL cache with single-flight coalescing.
//!
//! Each upstream client sits behind its own [`TtlCache`], parameterized by
//! key shape and TTL. `get_or_compute` guarantees at most one concurrent
//! producer per key; every waiter receives a clone of the same value or
//! the same error. Errors are never cached — only values outlive the call.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use aeris_common::Result;
use tokio::sync::watch;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    inflight: HashMap<K, watch::Receiver<Option<Result<V>>>>,
}

enum Claim<V> {
    Hit(V),
    Wait(watch::Receiver<Option<Result<V>>>),
    Lead(watch::Sender<Option<Result<V>>>),
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if present. Expired entries are evicted
    /// lazily on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value directly, refreshing its TTL.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// All fresh values, in no particular order.
    pub fn values(&self) -> Vec<V> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .values()
            .filter(|entry| entry.inserted_at.elapsed() <= self.ttl)
            .map(|entry| entry.value.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries; returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        before - inner.entries.len()
    }

    /// Coalesced lookup-or-produce.
    ///
    /// On a miss, the first caller becomes the producer; concurrent
    /// callers for the same key wait on its outcome instead of issuing a
    /// parallel compute. If the producer is cancelled mid-flight, one of
    /// the waiters takes over.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let tx = loop {
            match self.claim(&key) {
                Claim::Hit(value) => return Ok(value),
                Claim::Wait(mut rx) => {
                    let outcome = loop {
                        let current = rx.borrow_and_update().clone();
                        if let Some(result) = current {
                            break Some(result);
                        }
                        if rx.changed().await.is_err() {
                            // Producer abandoned without publishing; retry
                            // the claim and possibly become the producer.
                            break None;
                        }
                    };
                    if let Some(result) = outcome {
                        return result;
                    }
                }
                Claim::Lead(tx) => break tx,
            }
        };

        // Producer path. The guard releases the in-flight slot if this
        // future is dropped before completion, so waiters can take over.
        let mut guard = InflightGuard {
            inner: &self.inner,
            key: Some(key.clone()),
        };
        let result = compute().await;
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.inflight.remove(&key);
            if let Ok(value) = &result {
                inner.entries.insert(
                    key,
                    Entry {
                        value: value.clone(),
                        inserted_at: Instant::now(),
                    },
                );
            }
        }
        guard.disarm();
        let _ = tx.send(Some(result.clone()));
        result
    }

    fn claim(&self, key: &K) -> Claim<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                return Claim::Hit(entry.value.clone());
            }
            Some(_) => {
                inner.entries.remove(key);
            }
            None => {}
        }
        if let Some(rx) = inner.inflight.get(key) {
            return Claim::Wait(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        inner.inflight.insert(key.clone(), rx);
        Claim::Lead(tx)
    }
}

struct InflightGuard<'a, K, V>
where
    K: Eq + Hash,
{
    inner: &'a Mutex<Inner<K, V>>,
    key: Option<K>,
}

impl<K, V> InflightGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn disarm(&mut self) {
        self.key = None;
    }
}

impl<K, V> Drop for InflightGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut inner) = self.inner.lock() {
                inner.inflight.remove(&key);
            }
        }
    }
}
