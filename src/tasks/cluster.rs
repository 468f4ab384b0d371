//! Cluster tasks.

use super::{
    discover_objects, get_object_properties, lookup_perf_metric_get, lookup_perf_metric_info,
    object_alarm_get, seeded_properties,
};
use crate::protocol::TaskRequest;
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::MoKind;

/// `cluster.discover` — all clusters on the endpoint.
pub(crate) async fn discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::ClusterComputeResource).await
}

/// `cluster.get` — properties of one cluster.
pub(crate) async fn get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name"]);
    get_object_properties(
        session,
        properties,
        MoKind::ClusterComputeResource,
        "name",
        &name,
        false,
    )
    .await
}

/// `cluster.alarm.get` — triggered alarms of one cluster.
pub(crate) async fn alarm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    object_alarm_get(session, MoKind::ClusterComputeResource, "name", &name).await
}

/// `cluster.perf.metric.get` — performance samples for one cluster.
/// Clusters provide historical statistics only, so a `perf-interval` is
/// required.
pub(crate) async fn perf_metric_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_get(session, MoKind::ClusterComputeResource, "name", request).await
}

/// `cluster.perf.metric.info` — metrics available for one cluster.
pub(crate) async fn perf_metric_info(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_info(session, MoKind::ClusterComputeResource, "name", request).await
}
