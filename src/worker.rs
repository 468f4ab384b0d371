//! Workers and the worker manager.
//!
//! The manager reads the credential store once, binds the management
//! socket and fans out N worker tasks. Each worker owns a DEALER socket
//! connected to the broker backend plus one [`Session`] per enabled
//! endpoint, and processes one request at a time to completion: a single
//! upstream session must never be driven by two requests concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use zeromq::prelude::*;
use zeromq::DealerSocket;

use crate::config::WorkerConfig;
use crate::db;
use crate::helpers::HelperTable;
use crate::mgmt;
use crate::models::Endpoint;
use crate::protocol::{
    MSG_INCORRECT_TASK, MSG_INVALID_MESSAGE, MSG_MISSING_METHOD, MSG_UNKNOWN_HOST,
    MSG_UNKNOWN_METHOD, TaskReply, TaskRequest,
};
use crate::registry::registry;
use crate::session::Session;
use crate::transport::{Envelope, TransportError};
use crate::vim::rest::RestClient;
use crate::vim::{Client, VimResult};

/// Creates upstream clients for registered endpoints.
pub trait ClientFactory: Send + Sync {
    /// Build a client for one endpoint.
    ///
    /// # Errors
    /// Returns an error when the client cannot be constructed.
    fn create(&self, endpoint: &Endpoint) -> VimResult<Box<dyn Client>>;
}

/// The production factory: REST clients over HTTPS.
pub struct RestClientFactory;

impl ClientFactory for RestClientFactory {
    fn create(&self, endpoint: &Endpoint) -> VimResult<Box<dyn Client>> {
        Ok(Box::new(RestClient::new(
            endpoint.host.as_str(),
            endpoint.user.as_str(),
            endpoint.pwd.as_str(),
        )?))
    }
}

/// One worker: a session map plus the loaded helpers.
pub struct Worker {
    sessions: HashMap<String, Session>,
    helpers: HelperTable,
}

impl Worker {
    /// Build an empty worker with the given helpers.
    #[must_use]
    pub fn new(helpers: HelperTable) -> Self {
        Self {
            sessions: HashMap::new(),
            helpers,
        }
    }

    /// Build a worker with one session per endpoint.
    #[must_use]
    pub fn from_endpoints(
        endpoints: &[Endpoint],
        factory: &dyn ClientFactory,
        helpers: HelperTable,
    ) -> Self {
        let mut worker = Self::new(helpers);
        for endpoint in endpoints {
            match factory.create(endpoint) {
                Ok(client) => {
                    info!(host = %endpoint.host, "created session for endpoint");
                    worker.add_session(Session::new(endpoint.host.as_str(), client));
                }
                Err(e) => warn!(host = %endpoint.host, error = %e, "cannot create session"),
            }
        }
        worker
    }

    /// Register a session under its host name.
    pub fn add_session(&mut self, session: Session) {
        self.sessions.insert(session.host().to_owned(), session);
    }

    /// Process one raw request payload into its wire reply.
    pub async fn process_payload(&mut self, payload: &[u8]) -> String {
        let Ok(request) = TaskRequest::from_bytes(payload) else {
            warn!("invalid client message received, will be ignored");
            return TaskReply::error(MSG_INVALID_MESSAGE).to_wire();
        };
        let reply = self.execute(&request).await;
        self.helpers.apply(&request, &reply)
    }

    /// Validate and dispatch one decoded request.
    pub async fn execute(&mut self, request: &TaskRequest) -> TaskReply {
        debug!(method = ?request.method, hostname = ?request.hostname, "processing client request");

        let Some(method) = request.method.as_deref() else {
            return TaskReply::error(MSG_MISSING_METHOD);
        };
        let Some(task) = registry().lookup(method) else {
            return TaskReply::error(MSG_UNKNOWN_METHOD);
        };

        let session = match request.hostname.as_deref() {
            Some(hostname) => self.sessions.get_mut(hostname),
            None => None,
        };
        let Some(session) = session else {
            return TaskReply::error(MSG_UNKNOWN_HOST);
        };

        if !task.validate(request) {
            return TaskReply::error(MSG_INCORRECT_TASK);
        }

        if let Err(e) = session.ensure_connected().await {
            return TaskReply::error(format!("Cannot connect to {}: {e}", session.host()));
        }

        task.run(session, request).await
    }

    /// Disconnect every session.
    pub async fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.disconnect().await;
        }
    }
}

/// One worker task: receive envelopes from the broker backend, process,
/// reply to the same identity.
///
/// # Errors
/// Returns an error when the broker endpoint cannot be connected.
pub async fn run_worker(
    mut worker: Worker,
    proxy_endpoint: String,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let mut socket = DealerSocket::new();
    socket.connect(&proxy_endpoint).await?;
    info!(endpoint = %proxy_endpoint, "worker connected to broker backend");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            received = socket.recv() => {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "worker recv failed");
                        continue;
                    }
                };
                let envelope = match Envelope::parse(&message) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed envelope");
                        continue;
                    }
                };
                let wire = worker.process_payload(&envelope.payload).await;
                if let Err(e) = socket.send(envelope.reply(Bytes::from(wire))).await {
                    warn!(error = %e, "worker reply send failed");
                }
            }
        }
    }

    info!("worker is shutting down");
    worker.shutdown().await;
    Ok(())
}

/// Deadline for worker tasks to finish after shutdown is signalled.
const SHUTDOWN_JOIN_DEADLINE: Duration = Duration::from_secs(3);

/// The management status record for a worker manager.
#[must_use]
pub fn manager_status(config: &WorkerConfig, concurrency: usize, helpers: &[String]) -> Value {
    json!({
        "success": 0,
        "msg": "vqd worker status",
        "result": {
            "status": "running",
            "role": "worker",
            "mgmt": config.mgmt,
            "proxy": config.proxy,
            "db": config.db,
            "concurrency": concurrency,
            "helpers": helpers,
        },
    })
}

/// Run the worker manager: load endpoints, spawn workers, serve the
/// management plane, and join everything on shutdown.
///
/// # Errors
/// Returns an error on unrecoverable startup conditions: unreadable
/// credential store, no enabled endpoints, or an unbindable management
/// socket.
pub async fn run_manager(
    config: WorkerConfig,
    factory: Arc<dyn ClientFactory>,
    shutdown_tx: watch::Sender<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("starting worker manager");

    let mut conn = db::establish(&config.db)
        .await
        .with_context(|| format!("cannot open credential store {}", config.db))?;
    db::run_migrations(&mut conn)
        .await
        .context("cannot migrate credential store")?;
    let endpoints = db::get_endpoints(&mut conn, true)
        .await
        .context("cannot read credential store")?;
    drop(conn);

    if endpoints.is_empty() {
        anyhow::bail!("no registered or enabled vSphere endpoints found");
    }

    let mgmt_socket = mgmt::bind(&config.mgmt).await?;

    let concurrency = config.effective_concurrency();
    let helper_names = config.helper_names();
    let loaded_helpers = HelperTable::load(&helper_names).names();
    info!(concurrency, "starting worker tasks");

    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        let worker = Worker::from_endpoints(
            &endpoints,
            factory.as_ref(),
            HelperTable::load(&helper_names),
        );
        let proxy_endpoint = config.proxy.clone();
        let rx = shutdown_rx.clone();
        workers.spawn(run_worker(worker, proxy_endpoint, rx));
    }

    let status_config = config.clone();
    let mgmt_shutdown_rx = shutdown_rx.clone();
    let mgmt_task = tokio::spawn(async move {
        mgmt::serve(
            mgmt_socket,
            move || manager_status(&status_config, concurrency, &loaded_helpers),
            shutdown_tx,
            mgmt_shutdown_rx,
        )
        .await;
    });

    info!("worker manager is ready and running");
    let _ = shutdown_rx.changed().await;

    info!("worker manager is shutting down");
    let join_all = async {
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "worker task failed"),
                Err(e) => warn!(error = %e, "worker task panicked"),
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_JOIN_DEADLINE, join_all).await.is_err() {
        warn!("workers did not stop in time, aborting them");
        workers.abort_all();
    }
    mgmt_task.abort();
    Ok(())
}
