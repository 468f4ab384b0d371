//! Wire payload types for task requests and replies.
//!
//! Every client request and worker reply crosses the broker as a UTF-8
//! JSON object. The request is a sparse record: only `method` and
//! `hostname` are universally required, and each task names the
//! additional keys it needs. Unknown keys are ignored on decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single result record: an ordered mapping of property path to value.
pub type Record = serde_json::Map<String, Value>;

/// Reply message when the payload cannot be decoded as a JSON object.
pub const MSG_INVALID_MESSAGE: &str = "Invalid message received";
/// Reply message when the request carries no `method` key.
pub const MSG_MISSING_METHOD: &str = "Missing method name";
/// Reply message when `method` names no registered task.
pub const MSG_UNKNOWN_METHOD: &str = "Unknown method name requested";
/// Reply message when `hostname` names no configured vSphere endpoint.
pub const MSG_UNKNOWN_HOST: &str = "Unknown or missing vSphere host requested";
/// Reply message when a task-required key is absent from the request.
pub const MSG_INCORRECT_TASK: &str = "Incorrect task request received";

/// A client task request.
///
/// `method` and `hostname` are modelled as optional so that a missing key
/// surfaces as a well-formed error reply instead of a decode failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskRequest {
    /// Name of the registered task to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Identifier of the upstream vSphere endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Target managed-object identifier (object name, or datastore URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Property paths to collect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    /// Task-specific disambiguator, e.g. a guest disk mount path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// In-guest username for guest-operation tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// In-guest password for guest-operation tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Performance counter in `group.name.unit.rollup` form.
    #[serde(rename = "counter-name", skip_serializing_if = "Option::is_none")]
    pub counter_name: Option<String>,
    /// Historical performance interval name, e.g. "Past day".
    #[serde(rename = "perf-interval", skip_serializing_if = "Option::is_none")]
    pub perf_interval: Option<String>,
    /// Maximum number of performance samples to retrieve.
    #[serde(rename = "max-sample", skip_serializing_if = "Option::is_none")]
    pub max_sample: Option<u32>,
    /// Performance metric device instance, e.g. "vmnic0".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Name of the formatter to post-process the reply with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper: Option<String>,
}

impl TaskRequest {
    /// Decode a request from raw payload bytes.
    ///
    /// # Errors
    /// Returns the underlying decode error when the payload is not a JSON
    /// object of the expected shape.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// The requested property paths, or an empty slice when absent.
    #[must_use]
    pub fn property_paths(&self) -> &[String] {
        self.properties.as_deref().unwrap_or_default()
    }
}

/// The per-task vocabulary of request keys a task may require beyond
/// `method` and `hostname`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKey {
    /// The `name` key.
    Name,
    /// The `properties` key.
    Properties,
    /// The `key` key.
    Key,
    /// The `username` key.
    Username,
    /// The `password` key.
    Password,
    /// The `counter-name` key.
    CounterName,
    /// The `perf-interval` key.
    PerfInterval,
}

impl RequestKey {
    /// Whether the request carries this key.
    #[must_use]
    pub fn is_present(self, request: &TaskRequest) -> bool {
        match self {
            Self::Name => request.name.is_some(),
            Self::Properties => request.properties.is_some(),
            Self::Key => request.key.is_some(),
            Self::Username => request.username.is_some(),
            Self::Password => request.password.is_some(),
            Self::CounterName => request.counter_name.is_some(),
            Self::PerfInterval => request.perf_interval.is_some(),
        }
    }
}

/// A worker reply.
///
/// `success` is `0` on success and non-zero on error; `msg` carries the
/// human-readable status. Successful task replies place their payload in
/// `result` as an ordered sequence of records so that formatters can
/// treat every reply uniformly.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TaskReply {
    /// Zero on success, non-zero on error.
    pub success: i32,
    /// Human-readable status message.
    pub msg: String,
    /// Result records, present on successful data-bearing replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Record>>,
    /// Error chain of a failed task, present on unexpected failures only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl TaskReply {
    /// Build a successful reply carrying result records.
    #[must_use]
    pub fn ok(msg: impl Into<String>, result: Vec<Record>) -> Self {
        Self {
            success: 0,
            msg: msg.into(),
            result: Some(result),
            traceback: None,
        }
    }

    /// Build an error reply with the given message.
    #[must_use]
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: 1,
            msg: msg.into(),
            result: None,
            traceback: None,
        }
    }

    /// Whether the reply reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success == 0
    }

    /// Serialize the reply to its JSON wire form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        // A reply built from these types always serializes; fall back to a
        // hand-written error object rather than panicking in the daemon.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"success\": 1, \"msg\": \"Cannot serialize result: {e}\"}}")
        })
    }
}
