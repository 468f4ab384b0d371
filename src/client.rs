//! The request client.
//!
//! A REQ socket with bounded retries: send one request, wait up to the
//! per-attempt timeout for the reply, and on timeout throw the socket
//! away and start over with a fresh one — a half-open REQ socket cannot
//! be reused. After the last attempt the client gives up and returns a
//! synthesized error reply; duplicate delivery is possible and fine,
//! every served operation is read-only.

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, warn};
use zeromq::prelude::*;
use zeromq::ReqSocket;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default number of attempts.
pub const DEFAULT_RETRIES: u32 = 3;

/// A retrying request/reply client for the broker and management
/// endpoints.
#[derive(Debug, Clone)]
pub struct QueryClient {
    endpoint: String,
    timeout: Duration,
    retries: u32,
}

impl QueryClient {
    /// Build a client for `endpoint` with the default timeout and retry
    /// count.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the number of attempts.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Send `payload` and return the reply payload.
    ///
    /// Always returns a string: when every attempt times out the
    /// returned payload is the JSON error reply
    /// `{"success": 1, "msg": "Did not receive response, aborting..."}`.
    pub async fn run(&self, payload: &str) -> String {
        debug!(endpoint = %self.endpoint, timeout = ?self.timeout, retries = self.retries, "sending request");

        for attempt in 1..=self.retries {
            match self.attempt(payload).await {
                Some(reply) => return reply,
                None => {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        "did not receive response, retrying"
                    );
                }
            }
        }

        warn!(endpoint = %self.endpoint, "did not receive response, aborting");
        json!({"success": 1, "msg": "Did not receive response, aborting..."}).to_string()
    }

    /// One attempt over a fresh socket. `None` means the attempt failed
    /// and the socket was discarded.
    async fn attempt(&self, payload: &str) -> Option<String> {
        let mut socket = ReqSocket::new();
        if let Err(e) = timeout(self.timeout, socket.connect(&self.endpoint))
            .await
            .ok()?
        {
            debug!(endpoint = %self.endpoint, error = %e, "connect failed");
            return None;
        }
        timeout(self.timeout, socket.send(payload.into()))
            .await
            .ok()?
            .ok()?;
        let reply = timeout(self.timeout, socket.recv()).await.ok()?.ok()?;

        // The payload is the last frame; any leading delimiter frames
        // belong to the socket envelope.
        let frame = reply.iter().last()?;
        Some(String::from_utf8_lossy(frame).into_owned())
    }
}
