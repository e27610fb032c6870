//! Example demonstrating destination-keyed connection pooling
//!
//! This example shows how to:
//! 1. Load pool and client settings from a YAML file or HOSTPOOL_* variables
//! 2. Issue requests through `run`, which returns the connection afterwards
//! 3. Monitor per-destination pool statistics
//!
//! Usage: cargo run --example pool_usage -- [URL...] [--config FILE]

use anyhow::Result;
use bytes::Bytes;
use futures::future::join_all;
use hostpool::{ConnectionPool, DestinationKey, HttpConnection, HttpError};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pool_usage=info,hostpool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = args.remove(i + 1);
            args.remove(i);
            Some(path)
        }
        _ => None,
    };
    if args.is_empty() {
        args = vec![
            "http://example.com".to_string(),
            "http://example.com/index.html".to_string(),
            "https://www.rust-lang.org".to_string(),
        ];
    }

    let config = hostpool::config::load_config(config_path.as_deref())?;
    info!(
        max_size = config.pool.max_size,
        acquire_timeout_ms = config.pool.acquire_timeout.as_millis() as u64,
        never_block = config.pool.never_block,
        "Loaded pool configuration"
    );

    let pool = ConnectionPool::http(&config)?;

    let targets = args
        .iter()
        .map(|url| Ok((DestinationKey::parse(url)?, path_of(url))))
        .collect::<Result<Vec<_>>>()?;

    // Fire every request twice, concurrently, to exercise reuse and waiting
    let calls = targets.iter().chain(targets.iter()).map(|(key, path)| {
        let pool = &pool;
        async move {
            let outcome = pool
                .run(key, async |conn: &mut HttpConnection| {
                    let request = Request::get(path.as_str())
                        .header("user-agent", "hostpool-demo")
                        .body(Full::new(Bytes::new()))
                        .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
                    let response = conn.send(request).await?;
                    let status = response.status();
                    let body = response.into_body().collect().await?.to_bytes();
                    Ok::<_, HttpError>((status, body.len()))
                })
                .await;
            (key, outcome)
        }
    });

    for (key, outcome) in join_all(calls).await {
        match outcome {
            Ok((status, len)) => info!(key = %key, status = %status, bytes = len, "Request done"),
            Err(e) => warn!(key = %key, error = %e, "Request failed"),
        }
    }

    println!("\nPool statistics:");
    for (key, stats) in pool.all_stats() {
        println!(
            "  {}: created={} idle={} in_use={} reused={} resets={} overflow={} discarded={}",
            key,
            stats.created,
            stats.idle,
            stats.in_use,
            stats.reused,
            stats.resets,
            stats.overflow,
            stats.discarded
        );
    }

    let closed = pool.close_idle();
    info!(closed, "Closed idle transports");

    Ok(())
}

/// Path and query of `url`, or "/" when it has none
fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => "/".to_string(),
    }
}
