//! The per-process management plane.
//!
//! Both the broker and the worker manager bind a REP socket answering
//! two requests: `{"method": "status"}` returns a role-specific status
//! record, and `{"method": "shutdown"}` raises the process termination
//! flag and acknowledges. Anything else gets an error reply.

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{info, warn};
use zeromq::prelude::*;
use zeromq::{RepSocket, ZmqMessage};

use crate::transport::TransportError;

/// Decode one management request and produce its reply.
///
/// Returns the reply plus whether a shutdown was requested.
#[must_use]
pub fn process_request<F>(payload: &[u8], status: F) -> (Value, bool)
where
    F: FnOnce() -> Value,
{
    let Ok(request) = serde_json::from_slice::<Value>(payload) else {
        return (json!({"success": 1, "msg": "Invalid message received"}), false);
    };
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return (json!({"success": 1, "msg": "Missing method name"}), false);
    };
    match method {
        "status" => (status(), false),
        "shutdown" => {
            info!("received shutdown request on management interface");
            (
                json!({"success": 0, "msg": "Shutdown time has arrived"}),
                true,
            )
        }
        _ => (
            json!({"success": 1, "msg": "Unknown method name received"}),
            false,
        ),
    }
}

/// Bind the management REP socket.
///
/// # Errors
/// Returns an error when the endpoint cannot be bound.
pub async fn bind(endpoint: &str) -> Result<RepSocket, TransportError> {
    let mut socket = RepSocket::new();
    socket.bind(endpoint).await?;
    info!(endpoint = %endpoint, "management socket bound");
    Ok(socket)
}

/// Serve management requests until a shutdown is requested or observed.
///
/// `status` is invoked per request so the reply reflects live state.
pub async fn serve<F>(
    mut socket: RepSocket,
    status: F,
    shutdown_tx: watch::Sender<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    F: Fn() -> Value + Send,
{
    loop {
        let message: ZmqMessage = tokio::select! {
            received = socket.recv() => match received {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "management recv failed");
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        };

        let payload = message
            .iter()
            .last()
            .map(|frame| frame.to_vec())
            .unwrap_or_default();
        let (reply, shutdown) = process_request(&payload, &status);
        let wire = reply.to_string();
        if let Err(e) = socket.send(wire.into()).await {
            warn!(error = %e, "management reply failed");
            break;
        }
        if shutdown {
            let _ = shutdown_tx.send(true);
            break;
        }
    }
}
