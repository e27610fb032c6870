//! Connection factory sharing one TCP/TLS connector across destinations

use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use native_tls::TlsConnector;
use std::time::Duration;
use tracing::warn;

use super::{HttpConnection, HttpError};
use crate::config::ClientOptions;
use crate::pool::{ConnectionFactory, DestinationKey};

const TCP_KEEPALIVE: Duration = Duration::from_secs(90);

/// Creates [`HttpConnection`]s sharing one TCP/TLS connector
#[derive(Clone)]
pub struct HttpConnectionFactory {
    connector: HttpsConnector<HttpConnector>,
}

impl HttpConnectionFactory {
    pub fn new(options: &ClientOptions) -> Result<Self, HttpError> {
        let mut http = HttpConnector::new();
        http.set_nodelay(options.nodelay);
        http.enforce_http(false);
        http.set_keepalive(Some(TCP_KEEPALIVE));
        if !options.connect_timeout.is_zero() {
            http.set_connect_timeout(Some(options.connect_timeout));
        }

        let tls = if options.tls.insecure {
            warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            TlsConnector::new()?
        };

        Ok(Self {
            connector: HttpsConnector::from((http, tls.into())),
        })
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    type Connection = HttpConnection;

    fn create(&self, key: &DestinationKey, options: &ClientOptions) -> HttpConnection {
        HttpConnection::new(key.clone(), options.clone(), self.connector.clone())
    }
}
