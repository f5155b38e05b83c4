use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, split};
use tracing::debug;

use crate::stream::{ChunkReader, ReadEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Upstream => f.write_str("upstream"),
        }
    }
}

/// Why a pipe stopped relaying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeEnd {
    /// Reading from this side hit end-of-stream or a read error.
    Closed(Side),
    /// Writing to this side failed.
    WriteFailed(Side),
}

impl fmt::Display for PipeEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(side) => write!(f, "{side} closed"),
            Self::WriteFailed(side) => write!(f, "write to {side} failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
    pub end: PipeEnd,
}

/// Copies chunks from `source` into `sink` until the source ends or a write fails.
async fn relay<W>(
    source: &mut ChunkReader,
    sink: &mut W,
    from: Side,
    to: Side,
    relayed: &mut u64,
) -> PipeEnd
where
    W: AsyncWrite + Unpin,
{
    loop {
        match source.next().await {
            ReadEvent::Data(chunk) => {
                debug!(bytes = chunk.len(), %from, %to, "Forwarding data");
                if let Err(e) = sink.write_all(&chunk).await {
                    debug!(error = %e, bytes = chunk.len(), %to, "Failed to write");
                    return PipeEnd::WriteFailed(to);
                }
                *relayed += chunk.len() as u64;
            }
            ReadEvent::End => return PipeEnd::Closed(from),
        }
    }
}

/// Relays bytes between `client` and `upstream` until either side ends.
///
/// Each direction keeps its own byte order; the two directions are
/// independent apart from sharing termination. Both streams are shut down and
/// dropped before this returns, whichever side ended the pipe.
pub async fn pipe<C, U>(client: C, upstream: U) -> PipeStats
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_reader, mut client_writer) = split(client);
    let (upstream_reader, mut upstream_writer) = split(upstream);

    let mut from_client = ChunkReader::spawn(client_reader);
    let mut from_upstream = ChunkReader::spawn(upstream_reader);

    let mut client_to_upstream = 0u64;
    let mut upstream_to_client = 0u64;

    // Each direction drains its own reader, so a stalled write never blocks the other one
    let client_leg = relay(
        &mut from_client,
        &mut upstream_writer,
        Side::Client,
        Side::Upstream,
        &mut client_to_upstream,
    );
    let upstream_leg = relay(
        &mut from_upstream,
        &mut client_writer,
        Side::Upstream,
        Side::Client,
        &mut upstream_to_client,
    );

    let end = tokio::select! {
        end = client_leg => end,
        end = upstream_leg => end,
    };

    // Aborting the readers releases the read halves, including one still parked on an idle peer
    drop(from_client);
    drop(from_upstream);
    client_writer.shutdown().await.ok();
    upstream_writer.shutdown().await.ok();

    PipeStats {
        client_to_upstream,
        upstream_to_client,
        end,
    }
}
