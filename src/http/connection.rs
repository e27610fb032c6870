//! Lazily dialed keep-alive HTTP/1.1 connection to one destination

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderValue, CONNECTION, HOST};
use hyper::{Request, Response, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use std::future::poll_fn;
use std::time::Instant;
use tokio::task::JoinHandle;
use tower_service::Service;
use tracing::debug;

use super::HttpError;
use crate::config::ClientOptions;
use crate::pool::{Connection, DestinationKey};

/// A keep-alive HTTP/1.1 client handle bound to one destination.
///
/// The transport is dialed on the first [`send`](Self::send) and re-dialed
/// after it was closed or reset.
pub struct HttpConnection {
    key: DestinationKey,
    options: ClientOptions,
    connector: HttpsConnector<HttpConnector>,
    sender: Option<SendRequest<Full<Bytes>>>,
    driver: Option<JoinHandle<()>>,
    last_used: Instant,
    requests: u64,
    connects: u64,
}

impl HttpConnection {
    pub(crate) fn new(
        key: DestinationKey,
        options: ClientOptions,
        connector: HttpsConnector<HttpConnector>,
    ) -> Self {
        Self {
            key,
            options,
            connector,
            sender: None,
            driver: None,
            last_used: Instant::now(),
            requests: 0,
            connects: 0,
        }
    }

    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    /// Whether a live transport is currently attached
    pub fn is_connected(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Requests completed over this handle
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Transports established over this handle's lifetime
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Send a request to this connection's destination.
    ///
    /// The request URI only contributes its path and query; scheme and
    /// authority come from the destination key.
    pub async fn send(&mut self, request: Request<Full<Bytes>>) -> Result<Response<Incoming>, HttpError> {
        let request = self.prepare(request)?;

        let mut sender = match self.sender.take() {
            Some(sender) if !sender.is_closed() => sender,
            _ => self.connect().await?,
        };

        sender.ready().await?;
        let response = sender.send_request(request).await?;

        self.sender = Some(sender);
        self.last_used = Instant::now();
        self.requests += 1;
        Ok(response)
    }

    fn prepare(&self, mut request: Request<Full<Bytes>>) -> Result<Request<Full<Bytes>>, HttpError> {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let target = match &self.options.proxy {
            Some(_) if self.key.is_secure() => return Err(HttpError::ProxyTunnel(self.key.clone())),
            // absolute-form for proxies
            Some(_) => format!("{}{}", self.key, path),
            None => path.to_string(),
        };
        *request.uri_mut() = target
            .parse::<Uri>()
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;

        let headers = request.headers_mut();
        if !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&self.key.authority())
                .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
            headers.insert(HOST, host);
        }
        if !self.options.keepalive {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        Ok(request)
    }

    fn dial_uri(&self) -> Result<Uri, HttpError> {
        let target = match &self.options.proxy {
            Some(_) if self.key.is_secure() => return Err(HttpError::ProxyTunnel(self.key.clone())),
            Some(proxy) => format!("http://{}:{}", proxy.host, proxy.port),
            None => self.key.to_string(),
        };
        target
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidRequest(e.to_string()))
    }

    async fn connect(&mut self) -> Result<SendRequest<Full<Bytes>>, HttpError> {
        self.drop_transport();

        let uri = self.dial_uri()?;
        let mut connector = self.connector.clone();
        let io = async {
            poll_fn(|cx| connector.poll_ready(cx)).await?;
            connector.call(uri).await
        }
        .await
        .map_err(|source| HttpError::Connect {
            key: self.key.clone(),
            source,
        })?;

        let (sender, conn) = http1::handshake(io).await?;

        let key = self.key.clone();
        self.driver = Some(tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(key = %key, error = %e, "HTTP connection error");
            }
        }));

        self.connects += 1;
        debug!(key = %self.key, connects = self.connects, "Established transport");
        Ok(sender)
    }

    fn expired(&self) -> bool {
        let timeout = self.options.inactivity_timeout;
        !timeout.is_zero() && self.last_used.elapsed() >= timeout
    }

    fn drop_transport(&mut self) {
        self.sender = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Connection for HttpConnection {
    fn is_errored(&self) -> bool {
        match &self.sender {
            Some(sender) => sender.is_closed() || self.expired(),
            None => false,
        }
    }

    fn reset(&mut self) {
        // reconnects lazily on the next send
        self.drop_transport();
    }

    fn close(&mut self) {
        self.drop_transport();
    }
}
