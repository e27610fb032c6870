//! Per-destination bookkeeping

use std::sync::Arc;
use tokio::sync::Notify;

/// Idle connections and capacity accounting for one destination key.
///
/// `idle.len() <= created <= max_size` holds at all times. `created` never
/// decreases once a reserved slot has produced a connection.
pub(crate) struct PoolEntry<C> {
    /// Most recently returned connection last (LIFO)
    idle: Vec<C>,

    /// Connections ever created for this key, overflow ones excluded
    created: usize,

    /// Managed connections currently checked out
    in_use: usize,

    reused: u64,
    resets: u64,
    overflow: u64,
    discarded: u64,

    /// Wakes callers waiting for this destination only
    released: Arc<Notify>,
}

impl<C> Default for PoolEntry<C> {
    fn default() -> Self {
        Self {
            idle: Vec::new(),
            created: 0,
            in_use: 0,
            reused: 0,
            resets: 0,
            overflow: 0,
            discarded: 0,
            released: Arc::new(Notify::new()),
        }
    }
}

impl<C> PoolEntry<C> {
    /// Take the most recently returned idle connection
    pub(crate) fn pop_idle(&mut self) -> Option<C> {
        let conn = self.idle.pop()?;
        self.reused += 1;
        self.in_use += 1;
        Some(conn)
    }

    /// Reserve a slot for a new managed connection if capacity allows
    pub(crate) fn try_reserve(&mut self, max_size: usize) -> bool {
        if self.created >= max_size {
            return false;
        }
        self.created += 1;
        self.in_use += 1;
        true
    }

    /// Give back a slot taken by [`try_reserve`](Self::try_reserve) whose
    /// connection was never created
    pub(crate) fn cancel_reserve(&mut self) {
        self.created = self.created.saturating_sub(1);
        self.in_use = self.in_use.saturating_sub(1);
    }

    /// Store a returned managed connection, or hand it back when the idle
    /// list is already full
    pub(crate) fn push_idle(&mut self, conn: C, max_size: usize) -> Result<(), C> {
        self.in_use = self.in_use.saturating_sub(1);
        if self.idle.len() >= max_size {
            self.discarded += 1;
            return Err(conn);
        }
        self.idle.push(conn);
        Ok(())
    }

    pub(crate) fn drain_idle(&mut self) -> std::vec::Drain<'_, C> {
        self.idle.drain(..)
    }

    pub(crate) fn idle_mut(&mut self) -> std::slice::IterMut<'_, C> {
        self.idle.iter_mut()
    }

    pub(crate) fn released(&self) -> Arc<Notify> {
        Arc::clone(&self.released)
    }

    pub(crate) fn notify_released(&self) {
        self.released.notify_one();
    }

    pub(crate) fn record_overflow(&mut self) {
        self.overflow += 1;
    }

    pub(crate) fn record_reset(&mut self) {
        self.resets += 1;
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn created(&self) -> usize {
        self.created
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    pub(crate) fn reused(&self) -> u64 {
        self.reused
    }

    pub(crate) fn resets(&self) -> u64 {
        self.resets
    }

    pub(crate) fn overflow(&self) -> u64 {
        self.overflow
    }

    pub(crate) fn discarded(&self) -> u64 {
        self.discarded
    }
}
