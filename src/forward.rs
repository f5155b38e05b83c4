use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::pipe::{PipeStats, pipe};

/// Dials `remote_addr` and relays `inbound` through it until either side ends.
///
/// `inbound` is owned by this call, so it is closed on every return path,
/// including a failed dial.
#[tracing::instrument(skip(inbound))]
pub async fn forward(
    inbound: TcpStream,
    client_addr: SocketAddr,
    remote_addr: &str,
) -> Result<PipeStats> {
    debug!(target_addr = %remote_addr, "Attempting to connect to target server");
    let outbound = TcpStream::connect(remote_addr)
        .await
        .with_context(|| format!("Failed to connect to target {remote_addr}"))?;

    info!(target_addr = %remote_addr, "Forwarding started");

    let stats = pipe(inbound, outbound).await;

    info!(
        target_addr = %remote_addr,
        client_to_upstream = stats.client_to_upstream,
        upstream_to_client = stats.upstream_to_client,
        reason = %stats.end,
        "Forwarding ended"
    );
    Ok(stats)
}
