//! Destination-keyed connection pooling
//!
//! This module provides:
//! - Destination key normalization (scheme + host + port)
//! - Bounded per-destination pools with blocking acquisition and timeout
//! - A never-block overflow policy for exhausted destinations
//! - Health checking of idle connections before reuse

pub mod connection;
mod entry;
mod health;
pub mod key;
pub mod manager;

pub use connection::{Connection, ConnectionFactory};
pub use key::{DestinationKey, KeyError};
pub use manager::{ConnectionPool, PoolError, PoolStats, Pooled};
