//! Counter store backends for rate limiting.
//!
//! A counter is a per-key integer with a window TTL, incrementable
//! atomically. Two backends: a process-local map (always available, lost on
//! restart) and a Redis-compatible shared cache for multi-instance
//! deployments, which relies on the cache's native atomic `INCR`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use mockall::automock;
use redis::aio::ConnectionManager;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

/// State of a counter after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    /// Total hits recorded in the current window, this one included.
    pub hits: u64,

    /// When the window expires and the counter resets.
    pub reset_at: Timestamp,
}

#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("cache backend error")]
    Backend(#[from] redis::RedisError),
}

/// Atomic per-key counter with a TTL window.
#[automock]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key`, arming the window TTL on the first
    /// hit. Increments are never rolled back.
    ///
    /// `now` anchors window arithmetic for clock-injected backends; the
    /// shared-cache backend keys expiry off the cache server's clock.
    async fn increment(
        &self,
        key: &str,
        window: SignedDuration,
        now: Timestamp,
    ) -> Result<WindowCounter, CounterStoreError>;
}

#[derive(Debug, Clone, Copy)]
struct LocalWindow {
    count: u64,
    expires_at: Timestamp,
}

/// Process-local counter store.
#[derive(Debug, Default)]
pub struct LocalCounterStore {
    windows: Mutex<FxHashMap<String, LocalWindow>>,
}

impl LocalCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every window that elapsed before `now`.
    ///
    /// Called opportunistically when the map grows; keeps sustained traffic
    /// from many distinct keys from pinning dead entries forever.
    pub fn purge_expired(&self, now: Timestamp) {
        self.lock().retain(|_, window| window.expires_at > now);
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, LocalWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

const PURGE_THRESHOLD: usize = 4096;

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn increment(
        &self,
        key: &str,
        window: SignedDuration,
        now: Timestamp,
    ) -> Result<WindowCounter, CounterStoreError> {
        let mut windows = self.lock();

        if windows.len() >= PURGE_THRESHOLD {
            windows.retain(|_, window| window.expires_at > now);
        }

        let entry = windows
            .entry(key.to_owned())
            .and_modify(|entry| {
                // An elapsed window resets lazily on the next increment.
                if entry.expires_at <= now {
                    entry.count = 0;
                    entry.expires_at = now.saturating_add(window).unwrap_or(Timestamp::MAX);
                }
            })
            .or_insert_with(|| LocalWindow {
                count: 0,
                expires_at: now.saturating_add(window).unwrap_or(Timestamp::MAX),
            });

        entry.count += 1;

        Ok(WindowCounter {
            hits: entry.count,
            reset_at: entry.expires_at,
        })
    }
}

/// Shared-cache counter store over Redis-compatible backends.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect and verify the backend with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be built or the backend is
    /// unreachable.
    pub async fn connect(url: &str) -> Result<Self, CounterStoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        let mut conn = connection.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;

        debug!("connected to shared counter cache");

        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(
        &self,
        key: &str,
        window: SignedDuration,
        now: Timestamp,
    ) -> Result<WindowCounter, CounterStoreError> {
        let mut conn = self.connection.clone();

        let hits: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;

        if hits == 1 {
            let window_ms = u64::try_from(window.as_millis().max(0)).unwrap_or(u64::MAX);

            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window_ms)
                .query_async::<i64>(&mut conn)
                .await?;
        }

        let ttl_ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;

        let reset_at = if ttl_ms > 0 {
            now.saturating_add(SignedDuration::from_millis(ttl_ms))
                .unwrap_or(Timestamp::MAX)
        } else {
            now.saturating_add(window).unwrap_or(Timestamp::MAX)
        };

        Ok(WindowCounter { hits, reset_at })
    }
}
