use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::auth::{TrustedIps, authenticate};
use crate::config::Config;
use crate::forward::forward;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Authenticate,
    Forward,
}

/// Unseen clients are challenged only while a secret is configured.
#[must_use]
pub fn route(auth_enabled: bool, trusted: bool) -> Route {
    if auth_enabled && !trusted {
        Route::Authenticate
    } else {
        Route::Forward
    }
}

pub struct Server {
    config: Arc<Config>,
    trusted: Arc<TrustedIps>,
}

impl Server {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            trusted: Arc::new(TrustedIps::new()),
        }
    }

    #[must_use]
    pub fn trusted_ips(&self) -> Arc<TrustedIps> {
        Arc::clone(&self.trusted)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = &self.config.listen_addr;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to address {addr}"))
    }

    /// Accepts connections forever, handling each one on its own task.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, client_addr)) => {
                    info!(client_addr = %client_addr, "Accepted connection");
                    self.dispatch(stream, client_addr);
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, client_addr: SocketAddr) {
        let ip = client_addr.ip();
        let decision = route(self.config.auth_enabled(), self.trusted.is_trusted(ip));
        let config = Arc::clone(&self.config);
        let trusted = Arc::clone(&self.trusted);

        tokio::spawn(async move {
            match decision {
                Route::Authenticate => {
                    let secret = config.secret.as_deref().unwrap_or_default();
                    authenticate(stream, ip, secret, &trusted).await;
                }
                Route::Forward => {
                    if let Err(e) = forward(stream, client_addr, &config.remote_addr).await {
                        let reason = format!("{e:#}");
                        error!(
                            client_addr = %client_addr,
                            target_addr = %config.remote_addr,
                            error = %reason,
                            "Connection failed"
                        );
                    }
                }
            }
        });
    }
}
