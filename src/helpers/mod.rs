//! Reply formatters.
//!
//! A request may name a `helper` to post-process the reply into an
//! alternative string representation before it goes on the wire. The
//! worker resolves the configured helper names against the built-in
//! table at startup; a request naming an unloaded helper, a reply with
//! `success != 0`, or any formatter failure all fall back to the plain
//! JSON serialization of the reply.

mod zabbix;

pub use self::zabbix::{CZabbixHelper, ZabbixHelper};

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::{TaskReply, TaskRequest};

/// Failures inside a formatter. These never reach the client: the
/// worker falls back to the JSON reply.
#[derive(Debug, Error)]
pub enum HelperError {
    /// The helper does not know how to process the requested method.
    #[error("do not know how to process {0} method")]
    UnsupportedMethod(String),
    /// The request or reply lacks a field the helper depends on.
    #[error("missing {0}")]
    MissingField(&'static str),
}

/// A reply formatter.
pub trait Helper: Send + Sync {
    /// Transform a successful reply into its wire representation.
    ///
    /// # Errors
    /// Returns an error when the reply cannot be represented; the caller
    /// falls back to JSON.
    fn run(&self, request: &TaskRequest, reply: &TaskReply) -> Result<String, HelperError>;
}

/// Resolve one built-in helper by name.
#[must_use]
pub fn builtin(name: &str) -> Option<Box<dyn Helper>> {
    match name {
        "zabbix" => Some(Box::new(ZabbixHelper)),
        "zabbix-c" => Some(Box::new(CZabbixHelper)),
        _ => None,
    }
}

/// The helpers loaded by a worker.
#[derive(Default)]
pub struct HelperTable {
    helpers: HashMap<String, Box<dyn Helper>>,
}

impl HelperTable {
    /// Resolve the configured helper names. Unknown names are logged
    /// and skipped.
    #[must_use]
    pub fn load(names: &[String]) -> Self {
        let mut helpers = HashMap::new();
        for name in names {
            match builtin(name) {
                Some(helper) => {
                    info!(helper = %name, "helper loaded");
                    helpers.insert(name.clone(), helper);
                }
                None => warn!(helper = %name, "unknown helper, skipping"),
            }
        }
        Self { helpers }
    }

    /// The loaded helper names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.helpers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Produce the wire payload for a reply, applying the requested
    /// helper when one is loaded.
    #[must_use]
    pub fn apply(&self, request: &TaskRequest, reply: &TaskReply) -> String {
        let Some(helper) = request.helper.as_deref().and_then(|n| self.helpers.get(n)) else {
            return reply.to_wire();
        };
        // Formatters only reformat successful replies.
        if !reply.is_success() {
            return reply.to_wire();
        }
        match helper.run(request, reply) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "helper failed, falling back to JSON reply");
                reply.to_wire()
            }
        }
    }
}
