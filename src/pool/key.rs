//! Destination keys
//!
//! A key identifies one remote endpoint (scheme + host + optional port).
//! Path, query and fragment never take part in it, so every resource on the
//! same host shares one pool entry.

use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid destination URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Destination URL has no host: {0}")]
    MissingHost(String),

    #[error("Unsupported destination scheme: {0}")]
    UnsupportedScheme(String),
}

/// Normalized `scheme://host[:port]` identifier of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    scheme: String,
    host: String,
    /// Explicit port; `None` when it equals the scheme default
    port: Option<u16>,
}

impl DestinationKey {
    /// Normalize a URL into a key. Idempotent on its own output.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let url = Url::parse(input.trim()).map_err(|e| KeyError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(KeyError::UnsupportedScheme(scheme.to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| KeyError::MissingHost(input.to_string()))?;

        // `Url::port` already hides a port equal to the scheme default
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port: url.port(),
        })
    }

    /// Key for a request described by its connection parts
    pub fn from_parts(secure: bool, host: &str, port: Option<u16>) -> Result<Self, KeyError> {
        let scheme = if secure { "https" } else { "http" };
        match port {
            Some(port) => Self::parse(&format!("{}://{}:{}", scheme, host, port)),
            None => Self::parse(&format!("{}://{}", scheme, host)),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host as it appears in a URL (IPv6 literals keep their brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(if self.is_secure() { 443 } else { 80 })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// `host[:port]`, suitable for a Host header
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

impl FromStr for DestinationKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
