//! The upstream vSphere capability.
//!
//! The daemon treats the vSphere API as an opaque capability behind the
//! [`Client`] trait: property-collector views and retrieval, the
//! performance-manager call cluster, and a handful of service-instance
//! lookups. The production implementation in [`rest`] speaks the vSphere
//! JSON protocol over HTTPS; tests script the trait directly.

pub mod rest;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::Record;
use self::types::{
    EntityMetric, GuestAuth, MoKind, MoRef, ObjectContent, PerfCounterInfo, PerfInterval,
    PerfMetricId, PerfQuerySpec, ProviderSummary, VsanHostStatus,
};

/// Errors reported by an upstream client.
#[derive(Debug, Error)]
pub enum VimError {
    /// The session is not authenticated (expired or never established).
    #[error("not authenticated")]
    NotAuthenticated,
    /// The authenticated session lacks the privilege for the call.
    #[error("no permission")]
    NoPermission,
    /// The upstream endpoint returned a fault.
    #[error("{fault}: {msg}")]
    Fault {
        /// Upstream fault discriminator, e.g. `InvalidArgument`.
        fault: String,
        /// Fault message.
        msg: String,
    },
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The upstream response could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// The upstream response violated the expected protocol shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result alias for upstream calls.
pub type VimResult<T> = Result<T, VimError>;

/// An authenticated connection to one vSphere endpoint.
///
/// Implementations are owned exclusively by a single worker session and
/// are never shared across concurrent requests, so every method takes
/// `&mut self`.
#[async_trait]
pub trait Client: Send {
    /// Establish the upstream session.
    async fn connect(&mut self) -> VimResult<()>;

    /// Tear down the upstream session.
    async fn disconnect(&mut self) -> VimResult<()>;

    /// Whether the client currently holds an established session.
    fn connected(&self) -> bool;

    /// The service-instance `about` record.
    async fn about(&mut self) -> VimResult<Record>;

    /// The latest event registered on the endpoint.
    async fn latest_event(&mut self) -> VimResult<Value>;

    /// The currently established upstream API sessions.
    async fn session_list(&mut self) -> VimResult<Vec<Value>>;

    /// Create a container view over the whole inventory, scoped to the
    /// given object kinds. The view must be destroyed by the caller.
    async fn create_container_view(&mut self, kinds: &[MoKind]) -> VimResult<MoRef>;

    /// Create a list view covering exactly the given objects. The view
    /// must be destroyed by the caller.
    async fn create_list_view(&mut self, objs: &[MoRef]) -> VimResult<MoRef>;

    /// Destroy a previously created view.
    async fn destroy_view(&mut self, view: &MoRef) -> VimResult<()>;

    /// Collect `paths` for every object of type `kind` reachable from
    /// `view`. An empty path set collects all properties.
    async fn retrieve_properties(
        &mut self,
        view: &MoRef,
        kind: MoKind,
        paths: &[String],
    ) -> VimResult<Vec<ObjectContent>>;

    /// Query the performance-provider capabilities of an entity.
    async fn query_provider_summary(&mut self, entity: &MoRef) -> VimResult<ProviderSummary>;

    /// Query the metrics available for an entity at an interval.
    async fn query_available_metrics(
        &mut self,
        entity: &MoRef,
        interval_id: Option<i32>,
    ) -> VimResult<Vec<PerfMetricId>>;

    /// The full performance counter catalog.
    async fn query_perf_counters(&mut self) -> VimResult<Vec<PerfCounterInfo>>;

    /// The configured historical statistics intervals.
    async fn query_historical_intervals(&mut self) -> VimResult<Vec<PerfInterval>>;

    /// Run a performance query.
    async fn query_perf(&mut self, spec: &PerfQuerySpec) -> VimResult<Vec<EntityMetric>>;

    /// List the processes running inside a virtual machine's guest.
    async fn list_guest_processes(
        &mut self,
        vm: &MoRef,
        auth: &GuestAuth,
    ) -> VimResult<Vec<Value>>;

    /// Query the vSAN status of a host's vSAN system object.
    async fn query_vsan_host_status(&mut self, vsan_system: &MoRef) -> VimResult<VsanHostStatus>;
}
