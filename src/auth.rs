use std::{
    collections::HashSet,
    net::IpAddr,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::stream::BUFFER_SIZE;

/// Client IPs that have presented the shared secret.
///
/// Shared by every connection task. An IP, once trusted, stays trusted for
/// the lifetime of the process.
#[derive(Debug, Default)]
pub struct TrustedIps {
    ips: Mutex<HashSet<IpAddr>>,
}

impl TrustedIps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.lock().contains(&ip)
    }

    /// Returns `true` if the IP was not trusted before.
    pub fn trust(&self, ip: IpAddr) -> bool {
        self.lock().insert(ip)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<IpAddr>> {
        // The set only grows, so a guard recovered from a poisoned lock is still consistent
        self.ips.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Trusted,
    Rejected,
}

/// Checks whether `secret` appears contiguously anywhere in `frame`.
#[must_use]
pub fn contains_secret(frame: &[u8], secret: &[u8]) -> bool {
    if secret.is_empty() {
        return true;
    }
    frame.windows(secret.len()).any(|window| window == secret)
}

/// Challenges an unseen client for the shared secret.
///
/// Reads a single frame of up to [`BUFFER_SIZE`] bytes and trusts `ip` if the
/// frame contains `secret`. The connection is closed either way and the frame
/// is discarded; a trusted client reconnects to be forwarded.
#[tracing::instrument(skip(stream, secret, trusted))]
pub async fn authenticate<S>(
    mut stream: S,
    ip: IpAddr,
    secret: &str,
    trusted: &TrustedIps,
) -> AuthOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut frame = [0u8; BUFFER_SIZE];

    let outcome = match stream.read(&mut frame).await {
        Ok(n) if n > 0 && contains_secret(&frame[..n], secret.as_bytes()) => {
            let newly_trusted = trusted.trust(ip);
            info!(newly_trusted, "Authentication succeeded");
            AuthOutcome::Trusted
        }
        Ok(n) => {
            warn!(bytes = n, "Authentication failed: secret not presented");
            AuthOutcome::Rejected
        }
        Err(e) => {
            warn!(error = %e, "Authentication failed: could not read frame");
            AuthOutcome::Rejected
        }
    };

    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to shut down authentication connection");
    }
    outcome
}
