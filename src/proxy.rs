//! The broker.
//!
//! One process, three sockets: a frontend ROUTER bound for clients, a
//! backend DEALER bound for workers, and the management REP socket. The
//! loop shuttles complete multipart messages between frontend and
//! backend without ever inspecting payload bytes; the ROUTER's identity
//! framing routes each reply to exactly the client that issued the
//! matching request, and the DEALER fair-queues requests across
//! connected workers.

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeromq::prelude::*;
use zeromq::{DealerSocket, RepSocket, RouterSocket};

use crate::config::ProxyConfig;
use crate::mgmt;
use crate::transport::TransportError;

/// The broker with its sockets bound.
pub struct Proxy {
    config: ProxyConfig,
    frontend: RouterSocket,
    backend: DealerSocket,
    mgmt_socket: RepSocket,
}

impl Proxy {
    /// Bind the frontend, backend and management sockets.
    ///
    /// # Errors
    /// Returns an error when any endpoint cannot be bound.
    pub async fn bind(config: ProxyConfig) -> Result<Self, TransportError> {
        let mut frontend = RouterSocket::new();
        frontend.bind(&config.frontend).await?;
        info!(endpoint = %config.frontend, "frontend (ROUTER) bound, clients connect here");

        let mut backend = DealerSocket::new();
        backend.bind(&config.backend).await?;
        info!(endpoint = %config.backend, "backend (DEALER) bound, workers connect here");

        let mgmt_socket = mgmt::bind(&config.mgmt).await?;

        Ok(Self {
            config,
            frontend,
            backend,
            mgmt_socket,
        })
    }

    /// The management status record for this process.
    #[must_use]
    pub fn status(config: &ProxyConfig) -> Value {
        json!({
            "success": 0,
            "msg": "vqd proxy status",
            "result": {
                "status": "running",
                "role": "proxy",
                "mgmt": config.mgmt,
                "frontend": config.frontend,
                "backend": config.backend,
            },
        })
    }

    /// Run the proxy until shutdown is requested via the management
    /// plane or the provided channel.
    pub async fn run(
        self,
        shutdown_tx: watch::Sender<bool>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let Self {
            config,
            mut frontend,
            mut backend,
            mgmt_socket,
        } = self;

        let mgmt_config = config.clone();
        let mgmt_shutdown_rx = shutdown_rx.clone();
        let mgmt_task = tokio::spawn(async move {
            mgmt::serve(
                mgmt_socket,
                move || Self::status(&mgmt_config),
                shutdown_tx,
                mgmt_shutdown_rx,
            )
            .await;
        });

        info!("proxy is ready and running");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                received = frontend.recv() => match received {
                    Ok(message) => {
                        debug!(frames = message.iter().count(), "frontend -> backend");
                        if let Err(e) = backend.send(message).await {
                            warn!(error = %e, "backend send failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "frontend recv failed"),
                },
                received = backend.recv() => match received {
                    Ok(message) => {
                        debug!(frames = message.iter().count(), "backend -> frontend");
                        // A dead identity means the client gave up and
                        // closed its socket; the reply is discarded.
                        if let Err(e) = frontend.send(message).await {
                            debug!(error = %e, "frontend send failed, dropping reply");
                        }
                    }
                    Err(e) => warn!(error = %e, "backend recv failed"),
                },
            }
        }

        info!("proxy is shutting down");
        mgmt_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_role_and_endpoints() {
        let config = ProxyConfig::default();
        let status = Proxy::status(&config);
        assert_eq!(status["success"], 0);
        assert_eq!(status["result"]["role"], "proxy");
        assert_eq!(status["result"]["frontend"], config.frontend);
        assert_eq!(status["result"]["backend"], config.backend);
    }
}
