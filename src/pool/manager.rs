//! Destination-keyed connection pool
//!
//! One mutex guards every destination's idle list and counters; it is held
//! only for push/pop and bookkeeping, never across an `.await`. Callers that
//! find a destination exhausted wait on that destination's [`Notify`],
//! signalled by release and bounded by the configured acquire timeout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionFactory};
use super::entry::PoolEntry;
use super::health::sanitize;
use super::key::DestinationKey;
use crate::config::{ClientOptions, Config, PoolConfig};

/// Error types for connection pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(
        "Could not fetch a free connection to {key} within {waited:?}; consider enlarging the pool"
    )]
    Timeout { key: DestinationKey, waited: Duration },
}

/// Statistics for one destination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Managed connections ever created
    pub created: usize,

    /// Connections currently idle in the pool
    pub idle: usize,

    /// Managed connections currently checked out
    pub in_use: usize,

    /// Checkouts served from the idle list
    pub reused: u64,

    /// Stale transports reset by the health check
    pub resets: u64,

    /// Throwaway connections handed out past capacity
    pub overflow: u64,

    /// Returned connections closed because the idle list was full
    pub discarded: u64,
}

impl<C> From<&PoolEntry<C>> for PoolStats {
    fn from(entry: &PoolEntry<C>) -> Self {
        Self {
            created: entry.created(),
            idle: entry.idle_len(),
            in_use: entry.in_use(),
            reused: entry.reused(),
            resets: entry.resets(),
            overflow: entry.overflow(),
            discarded: entry.discarded(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkout {
    /// Counted against capacity and stored back on release
    Managed,
    /// Created past capacity under never-block; closed on release
    Overflow,
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    options: ClientOptions,
    max_size: usize,
    entries: Mutex<HashMap<DestinationKey, PoolEntry<F::Connection>>>,
}

/// A capacity slot taken for a connection the factory has yet to build.
///
/// Dropped without [`commit`](Self::commit) (the factory panicked), it gives
/// the slot back and wakes a waiter.
struct Reservation<'a, F: ConnectionFactory> {
    pool: &'a PoolInner<F>,
    key: &'a DestinationKey,
}

impl<F: ConnectionFactory> Reservation<'_, F> {
    fn commit(self) {
        std::mem::forget(self);
    }
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if let Some(entry) = self.pool.entries.lock().get_mut(self.key) {
            entry.cancel_reserve();
            entry.notify_released();
        }
        warn!(key = %self.key, "Connection factory failed, slot released");
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn released(&self, key: &DestinationKey) -> Arc<Notify> {
        self.entries.lock().entry(key.clone()).or_default().released()
    }

    fn try_checkout(self: &Arc<Self>, key: &DestinationKey) -> Option<Pooled<F>> {
        let (kind, idle) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_default();

            if let Some(conn) = entry.pop_idle() {
                debug!(key = %key, idle = entry.idle_len(), "Reusing connection");
                (Checkout::Managed, Some(conn))
            } else if entry.try_reserve(self.max_size) {
                debug!(key = %key, created = entry.created(), "Creating new connection");
                (Checkout::Managed, None)
            } else if self.config.never_block {
                entry.record_overflow();
                debug!(
                    key = %key,
                    max_size = self.max_size,
                    "Pool exhausted, creating overflow connection"
                );
                (Checkout::Overflow, None)
            } else {
                return None;
            }
        };

        let conn = match idle {
            Some(mut conn) => {
                if sanitize(key, &mut conn) {
                    if let Some(entry) = self.entries.lock().get_mut(key) {
                        entry.record_reset();
                    }
                }
                conn
            }
            None if kind == Checkout::Managed => {
                let reservation = Reservation { pool: &**self, key };
                let conn = self.factory.create(key, &self.options);
                reservation.commit();
                conn
            }
            None => self.factory.create(key, &self.options),
        };

        Some(Pooled {
            conn: Some(conn),
            key: key.clone(),
            kind,
            pool: Arc::clone(self),
        })
    }

    fn check_in(&self, key: &DestinationKey, mut conn: F::Connection, kind: Checkout) {
        if kind == Checkout::Overflow {
            debug!(key = %key, "Closing overflow connection");
            conn.close();
            return;
        }

        let reset = sanitize(key, &mut conn);

        let rejected = {
            let mut entries = self.entries.lock();
            match entries.get_mut(key) {
                Some(entry) => {
                    if reset {
                        entry.record_reset();
                    }
                    let rejected = entry.push_idle(conn, self.max_size).err();
                    if rejected.is_none() {
                        entry.notify_released();
                    }
                    rejected
                }
                None => Some(conn),
            }
        };

        match rejected {
            Some(mut conn) => {
                warn!(key = %key, "Idle list full or destination unknown, closing returned connection");
                conn.close();
            }
            None => debug!(key = %key, "Returned connection to pool"),
        }
    }

    fn drain_idle(entries: &mut HashMap<DestinationKey, PoolEntry<F::Connection>>) -> Vec<F::Connection> {
        entries
            .values_mut()
            .flat_map(|entry| entry.drain_idle().collect::<Vec<_>>())
            .collect()
    }
}

impl<F: ConnectionFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        for mut conn in Self::drain_idle(self.entries.get_mut()) {
            conn.close();
        }
    }
}

/// A checked-out connection.
///
/// Dereferences to the underlying connection. Dropping it returns the
/// connection to the pool (or closes it, for overflow connections), so a
/// release happens on every exit path including panics and cancellation.
pub struct Pooled<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    key: DestinationKey,
    kind: Checkout,
    pool: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Pooled<F> {
    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    /// Whether this is a throwaway connection created past capacity
    pub fn is_overflow(&self) -> bool {
        self.kind == Checkout::Overflow
    }
}

impl<F: ConnectionFactory> Deref for Pooled<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("not dropped")
    }
}

impl<F: ConnectionFactory> DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("not dropped")
    }
}

impl<F: ConnectionFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(&self.key, conn, self.kind);
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pooled<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("key", &self.key)
            .field("overflow", &self.is_overflow())
            .finish()
    }
}

/// Connection pool keyed by destination.
///
/// Cloning is cheap; clones share the same state.
pub struct ConnectionPool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a new connection pool
    pub fn new(factory: F, config: PoolConfig, options: ClientOptions) -> Self {
        let max_size = config.effective_max_size();
        Self {
            inner: Arc::new(PoolInner {
                factory,
                config,
                options,
                max_size,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(factory: F, config: &Config) -> Self {
        Self::new(factory, config.pool.clone(), config.client.clone())
    }

    /// Check out a connection for `key`.
    ///
    /// Prefers the most recently returned idle connection, then creates a new
    /// one while under capacity. When exhausted it either hands out an
    /// overflow connection (`never_block`) or waits for a release until the
    /// acquire timeout passes.
    pub async fn acquire(&self, key: &DestinationKey) -> Result<Pooled<F>, PoolError> {
        let started = Instant::now();
        // Too large to represent means no deadline at all
        let deadline = started.checked_add(self.inner.config.acquire_timeout);
        let released = self.inner.released(key);

        loop {
            // Registered before checking so a release in between is not missed
            let notified = released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(conn) = self.inner.try_checkout(key) {
                return Ok(conn);
            }

            let Some(deadline) = deadline else {
                notified.await;
                continue;
            };

            if Instant::now() >= deadline {
                let waited = started.elapsed();
                warn!(
                    key = %key,
                    waited_ms = waited.as_millis() as u64,
                    max_size = self.inner.max_size,
                    "Could not fetch a free connection in time"
                );
                return Err(PoolError::Timeout {
                    key: key.clone(),
                    waited,
                });
            }

            // Either a release woke us or the deadline passed; re-check both
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    /// Return a connection to the pool. Same as dropping the guard.
    pub fn release(&self, conn: Pooled<F>) {
        drop(conn);
    }

    /// Run `f` with a connection for `key`, releasing it afterwards.
    ///
    /// The result of `f` is passed through untouched; the only error the
    /// pool adds is an acquire timeout, before `f` runs.
    pub async fn run<T, E, Func>(&self, key: &DestinationKey, f: Func) -> Result<T, E>
    where
        Func: AsyncFnOnce(&mut F::Connection) -> Result<T, E>,
        E: From<PoolError>,
    {
        let mut conn = self.acquire(key).await?;
        f(&mut *conn).await
    }

    /// Get statistics for a specific destination
    pub fn stats(&self, key: &DestinationKey) -> Option<PoolStats> {
        let entries = self.inner.entries.lock();
        entries.get(key).map(PoolStats::from)
    }

    /// Get statistics for all destinations
    pub fn all_stats(&self) -> HashMap<DestinationKey, PoolStats> {
        let entries = self.inner.entries.lock();
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), PoolStats::from(entry)))
            .collect()
    }

    /// Drop the transport of every idle connection across all destinations.
    ///
    /// The handles stay pooled and reconnect on their next use, so capacity
    /// is unaffected. Returns the number of connections reset.
    pub fn close_idle(&self) -> usize {
        let mut entries = self.inner.entries.lock();
        let mut closed = 0;
        for entry in entries.values_mut() {
            for conn in entry.idle_mut() {
                conn.reset();
                closed += 1;
            }
        }
        drop(entries);

        if closed > 0 {
            debug!(closed, "Closed idle transports");
        }
        closed
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Per-destination capacity in effect
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }
}
