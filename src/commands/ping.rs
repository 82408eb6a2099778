//! Ping command - liveness check only

use crate::config::Config;
use crate::connection::ConnectionEstablisher;
use crate::error::Result;
use crate::store::Connector;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingInfo {
    pub db: String,
    pub host: String,
    pub port: u16,
    pub reachable: bool,
    pub timeout_ms: u64,
    pub elapsed_ms: u64,
}

/// Probe the configured database without registering a primary connection
pub async fn cmd_ping<C: Connector>(connector: &C, config: &Config) -> Result<PingInfo> {
    let establisher = ConnectionEstablisher::new(connector)
        .with_liveness_timeout(config.liveness.timeout());

    let started = Instant::now();
    let reachable = establisher.check_liveness(&config.db).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    Ok(PingInfo {
        db: config.db.name.clone(),
        host: config.db.connection.host.clone(),
        port: config.db.connection.port,
        reachable,
        timeout_ms: config.liveness.timeout_ms,
        elapsed_ms,
    })
}

pub fn print_ping(info: &PingInfo) {
    if info.reachable {
        println!(
            "✓ {}:{} is reachable ({} ms)",
            info.host, info.port, info.elapsed_ms
        );
    } else {
        println!(
            "✗ {}:{} is unreachable (gave up after {} ms, timeout {} ms)",
            info.host, info.port, info.elapsed_ms, info.timeout_ms
        );
    }
}
