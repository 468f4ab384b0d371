//! Data types shared with the upstream vSphere API.
//!
//! Property values are carried as loosely-typed [`serde_json::Value`]s:
//! the daemon never interprets them beyond routing and formatting, and a
//! managed-object reference embedded in a property value keeps its wire
//! shape (`{"type": ..., "value": ...}`) so that handlers can chase
//! relationships with follow-up collections.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::Record;

/// A managed-object reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoRef {
    /// Managed-object type name, e.g. `HostSystem`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque object identifier, e.g. `host-42`.
    pub value: String,
}

impl MoRef {
    /// Build a reference from a kind and identifier.
    #[must_use]
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Managed-object kinds addressed by the task catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoKind {
    /// A datacenter.
    Datacenter,
    /// A cluster of compute resources.
    ClusterComputeResource,
    /// A hypervisor host.
    HostSystem,
    /// A virtual machine.
    VirtualMachine,
    /// A datastore.
    Datastore,
    /// A network.
    Network,
    /// A resource pool.
    ResourcePool,
}

impl MoKind {
    /// The upstream type name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datacenter => "Datacenter",
            Self::ClusterComputeResource => "ClusterComputeResource",
            Self::HostSystem => "HostSystem",
            Self::VirtualMachine => "VirtualMachine",
            Self::Datastore => "Datastore",
            Self::Network => "Network",
            Self::ResourcePool => "ResourcePool",
        }
    }
}

impl fmt::Display for MoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object returned by a property collection round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectContent {
    /// The object the properties belong to.
    pub obj: MoRef,
    /// Collected property paths and their values.
    pub props: Record,
}

/// Summary of the performance statistics a provider supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    /// Whether real-time (current) statistics are available.
    pub current_supported: bool,
    /// Whether aggregated historical statistics are available.
    pub summary_supported: bool,
    /// Real-time refresh rate in seconds.
    pub refresh_rate: i32,
}

/// Identifies one metric: a counter and a device instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfMetricId {
    /// Numeric counter identifier.
    pub counter_id: i32,
    /// Device instance, empty for the aggregate.
    pub instance: String,
}

/// Label/summary/key triple describing one facet of a counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDescription {
    /// Human-readable label.
    pub label: String,
    /// Human-readable summary.
    pub summary: String,
    /// Programmatic key.
    pub key: String,
}

/// A performance counter definition from the upstream catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfCounterInfo {
    /// Numeric counter identifier.
    pub key: i32,
    /// Counter name facet.
    pub name_info: ElementDescription,
    /// Counter group facet.
    pub group_info: ElementDescription,
    /// Counter unit facet.
    pub unit_info: ElementDescription,
    /// Rollup type, e.g. `average`.
    pub rollup_type: String,
    /// Statistics type, e.g. `rate`.
    pub stats_type: String,
    /// Collection level.
    pub level: i32,
    /// Per-device collection level.
    pub per_device_level: i32,
}

impl PerfCounterInfo {
    /// The dotted `group.name.unit.rollup` form used on the external
    /// interface.
    #[must_use]
    pub fn dotted_name(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.group_info.key, self.name_info.key, self.unit_info.key, self.rollup_type
        )
    }
}

/// A historical statistics interval configured on the upstream host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfInterval {
    /// Whether the interval is enabled.
    pub enabled: bool,
    /// Interval key.
    pub key: i32,
    /// Retention length in seconds.
    pub length: i64,
    /// Statistics level.
    pub level: Option<i32>,
    /// Interval name, e.g. "Past day".
    pub name: String,
    /// Sampling period in seconds.
    pub sampling_period: i32,
}

/// A performance query specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfQuerySpec {
    /// Entity to query.
    pub entity: MoRef,
    /// Maximum number of samples to return.
    pub max_sample: u32,
    /// Metrics to retrieve.
    pub metric_id: Vec<PerfMetricId>,
    /// Sampling interval identifier.
    pub interval_id: i32,
}

/// Timing information for one collected sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSampleInfo {
    /// Sampling interval of this sample in seconds.
    pub interval: i32,
    /// Sample timestamp.
    pub timestamp: DateTime<Utc>,
}

/// A series of values for a single metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfMetricSeries {
    /// The metric the series belongs to.
    pub id: PerfMetricId,
    /// One value per entry in the matching sample-info sequence.
    pub value: Vec<i64>,
}

/// Collected metrics for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetric {
    /// The queried entity.
    pub entity: MoRef,
    /// Timing information, index-aligned with each series.
    pub sample_info: Vec<PerfSampleInfo>,
    /// The collected series.
    pub value: Vec<PerfMetricSeries>,
}

/// Credentials for authenticating inside a guest operating system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestAuth {
    /// Guest username.
    pub username: String,
    /// Guest password.
    pub password: String,
}

/// vSAN cluster membership status of a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsanHostStatus {
    /// Cluster UUID.
    pub uuid: String,
    /// Node UUID of the host.
    pub node_uuid: String,
    /// Health summary string.
    pub health: String,
}

/// Decode a property value as a single managed-object reference.
#[must_use]
pub fn value_as_mo_ref(value: &Value) -> Option<MoRef> {
    serde_json::from_value(value.clone()).ok()
}

/// Decode a property value as a sequence of managed-object references.
///
/// Returns an empty vector when the value is not an array of references.
#[must_use]
pub fn value_as_mo_refs(value: &Value) -> Vec<MoRef> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}
