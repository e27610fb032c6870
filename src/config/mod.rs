use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pool sizing and acquisition policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of connections ever created per destination
    #[serde(default = "default_max_size", alias = "pool_size")]
    pub max_size: usize,

    /// How long `acquire` may wait for a connection (seconds)
    #[serde(
        default = "default_acquire_timeout",
        alias = "pool_timeout",
        alias = "wait_timeout",
        alias = "blocking_timeout",
        with = "duration_secs"
    )]
    pub acquire_timeout: Duration,

    /// Hand out throwaway connections instead of waiting when exhausted
    #[serde(default = "default_never_block")]
    pub never_block: bool,
}

fn default_max_size() -> usize {
    5
}

fn default_acquire_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_never_block() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            acquire_timeout: default_acquire_timeout(),
            never_block: default_never_block(),
        }
    }
}

impl PoolConfig {
    /// Per-destination cap, never below one
    pub fn effective_max_size(&self) -> usize {
        self.max_size.max(1)
    }
}

/// Forward proxy used for plain http destinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyOptions {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Skip certificate and hostname verification
    #[serde(default)]
    pub insecure: bool,
}

/// Options handed to the connection factory for every connection it creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Idle time after which a connection's transport expires (0 = never)
    #[serde(default, with = "duration_secs")]
    pub inactivity_timeout: Duration,

    /// Timeout for establishing the transport (0 = none)
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    #[serde(default = "default_true")]
    pub keepalive: bool,

    #[serde(default = "default_true")]
    pub nodelay: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyOptions>,

    #[serde(default)]
    pub tls: TlsOptions,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::ZERO,
            connect_timeout: default_connect_timeout(),
            keepalive: true,
            nodelay: true,
            proxy: None,
            tls: TlsOptions::default(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub client: ClientOptions,
}

/// Durations written as (fractional) seconds, e.g. `0.5`
mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    let secs: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} is not a number of seconds: {:?}", name, value))?;
    Duration::try_from_secs_f64(secs).with_context(|| format!("{} is out of range: {}", name, secs))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{} is not a boolean: {:?}", name, other),
    }
}

fn parse_proxy(value: &str) -> Result<ProxyOptions> {
    let (host, port) = value
        .trim()
        .rsplit_once(':')
        .with_context(|| format!("HOSTPOOL_PROXY must be host:port, got {:?}", value))?;
    if host.is_empty() {
        anyhow::bail!("HOSTPOOL_PROXY has an empty host");
    }
    let port = port
        .parse()
        .with_context(|| format!("HOSTPOOL_PROXY has an invalid port: {:?}", port))?;
    Ok(ProxyOptions {
        host: host.to_string(),
        port,
    })
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// Every variable is optional; unset ones keep their defaults:
/// - HOSTPOOL_POOL_SIZE
/// - HOSTPOOL_POOL_TIMEOUT (seconds, fractional allowed)
/// - HOSTPOOL_NEVER_BLOCK
/// - HOSTPOOL_INACTIVITY_TIMEOUT (seconds)
/// - HOSTPOOL_CONNECT_TIMEOUT (seconds)
/// - HOSTPOOL_PROXY (host:port)
/// - HOSTPOOL_INSECURE_TLS
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::default();

    if let Ok(size) = std::env::var("HOSTPOOL_POOL_SIZE") {
        config.pool.max_size = size
            .trim()
            .parse()
            .with_context(|| format!("HOSTPOOL_POOL_SIZE is not a number: {:?}", size))?;
    }

    if let Ok(timeout) = std::env::var("HOSTPOOL_POOL_TIMEOUT") {
        config.pool.acquire_timeout = parse_secs("HOSTPOOL_POOL_TIMEOUT", &timeout)?;
    }

    if let Ok(never_block) = std::env::var("HOSTPOOL_NEVER_BLOCK") {
        config.pool.never_block = parse_bool("HOSTPOOL_NEVER_BLOCK", &never_block)?;
    }

    if let Ok(timeout) = std::env::var("HOSTPOOL_INACTIVITY_TIMEOUT") {
        config.client.inactivity_timeout = parse_secs("HOSTPOOL_INACTIVITY_TIMEOUT", &timeout)?;
    }

    if let Ok(timeout) = std::env::var("HOSTPOOL_CONNECT_TIMEOUT") {
        config.client.connect_timeout = parse_secs("HOSTPOOL_CONNECT_TIMEOUT", &timeout)?;
    }

    if let Ok(proxy) = std::env::var("HOSTPOOL_PROXY") {
        config.client.proxy = Some(parse_proxy(&proxy)?);
    }

    if let Ok(insecure) = std::env::var("HOSTPOOL_INSECURE_TLS") {
        config.client.tls.insecure = parse_bool("HOSTPOOL_INSECURE_TLS", &insecure)?;
    }

    Ok(config)
}

/// Load configuration from a YAML file when a path is given, otherwise from
/// the environment
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
pool:
  pool_size: 10
  pool_timeout: 0.25
  never_block: false

client:
  inactivity_timeout: 30
  connect_timeout: 2.5
  keepalive: false
  proxy:
    host: proxy.internal
    port: 3128
  tls:
    insecure: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.pool.max_size, 10);
        assert_eq!(config.pool.acquire_timeout, Duration::from_millis(250));
        assert!(!config.pool.never_block);

        assert_eq!(config.client.inactivity_timeout, Duration::from_secs(30));
        assert_eq!(config.client.connect_timeout, Duration::from_millis(2500));
        assert!(!config.client.keepalive);
        assert!(config.client.nodelay);
        assert_eq!(
            config.client.proxy,
            Some(ProxyOptions {
                host: "proxy.internal".to_string(),
                port: 3128
            })
        );
        assert!(config.client.tls.insecure);
    }

    #[test]
    fn test_default_values() {
        let config: Config = serde_yaml::from_str("pool: {}\n").unwrap();

        assert_eq!(config.pool.max_size, 5);
        assert_eq!(config.pool.acquire_timeout, Duration::from_millis(500));
        assert!(config.pool.never_block);
        assert_eq!(config.client.inactivity_timeout, Duration::ZERO);
        assert_eq!(config.client.connect_timeout, Duration::from_secs(10));
        assert!(config.client.proxy.is_none());
        assert!(!config.client.tls.insecure);
    }

    #[test]
    fn test_rust_field_names_accepted() {
        let yaml = "pool:\n  max_size: 3\n  acquire_timeout: 1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pool.max_size, 3);
        assert_eq!(config.pool.acquire_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_wait_timeout_aliases() {
        let config: Config = serde_yaml::from_str("pool:\n  wait_timeout: 2\n").unwrap();
        assert_eq!(config.pool.acquire_timeout, Duration::from_secs(2));

        let config: Config = serde_yaml::from_str("pool:\n  blocking_timeout: 0.1\n").unwrap();
        assert_eq!(config.pool.acquire_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let yaml = "pool:\n  pool_timeout: -1\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_effective_max_size_floor() {
        let config = PoolConfig {
            max_size: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_max_size(), 1);
        assert_eq!(PoolConfig::default().effective_max_size(), 5);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_secs("X", "0.05").unwrap(), Duration::from_millis(50));
        assert!(parse_secs("X", "soon").is_err());
        assert!(parse_bool("X", "Yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());

        let proxy = parse_proxy("10.0.0.1:8080").unwrap();
        assert_eq!(proxy.host, "10.0.0.1");
        assert_eq!(proxy.port, 8080);
        assert!(parse_proxy("no-port").is_err());
        assert!(parse_proxy(":8080").is_err());
    }
}
