//! One-shot endpoint resolution: hostname and port to an ordered address
//! list.

use std::net::SocketAddr;

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{Error, Result};

/// Resolves `host:port` into the ordered endpoint list used for connection
/// failover. The list is immutable once returned.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|err| {
            debug!(host, error = %err, "hostname resolution failed");
            Error::ResolutionFailed { host: host.to_string() }
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::ResolutionFailed { host: host.to_string() });
    }
    Ok(addrs)
}
