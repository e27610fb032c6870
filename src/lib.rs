//! hostpool - destination-keyed pool of outbound HTTP connections

pub mod config;
pub mod http;
pub mod pool;

pub use config::{ClientOptions, Config, PoolConfig};
pub use http::{HttpConnection, HttpConnectionFactory, HttpError};
pub use pool::{Connection, ConnectionFactory, ConnectionPool, DestinationKey, PoolError, Pooled};
