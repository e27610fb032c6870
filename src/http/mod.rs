//! HTTP/1.1 client connections managed by the pool
//!
//! - Lazily dialed transports (no I/O until the first request)
//! - TLS via native-tls for https destinations
//! - Keep-alive reuse of one transport across requests
//! - Transport errors and inactivity expiry surfaced to the health check

pub mod connection;
pub mod connector;

pub use connection::HttpConnection;
pub use connector::HttpConnectionFactory;

use crate::config::Config;
use crate::pool::{ConnectionPool, DestinationKey, PoolError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from issuing requests over an [`HttpConnection`]
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Failed to connect to {key}: {source}")]
    Connect {
        key: DestinationKey,
        #[source]
        source: BoxError,
    },

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTPS through a proxy is not supported: {0}")]
    ProxyTunnel(DestinationKey),

    #[error("Failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ConnectionPool<HttpConnectionFactory> {
    /// Pool of HTTP connections configured from `config`
    pub fn http(config: &Config) -> Result<Self, HttpError> {
        let factory = HttpConnectionFactory::new(&config.client)?;
        Ok(Self::from_config(factory, config))
    }
}
