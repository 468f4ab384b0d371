//! Datacenter tasks.

use super::{
    discover_objects, get_object_properties, lookup_perf_metric_get, lookup_perf_metric_info,
    object_alarm_get, seeded_properties,
};
use crate::protocol::TaskRequest;
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::MoKind;

/// `datacenter.discover` — all datacenters on the endpoint.
pub(crate) async fn discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::Datacenter).await
}

/// `datacenter.get` — properties of one datacenter.
pub(crate) async fn get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name"]);
    get_object_properties(session, properties, MoKind::Datacenter, "name", &name, false).await
}

/// `datacenter.alarm.get` — triggered alarms of one datacenter.
pub(crate) async fn alarm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    object_alarm_get(session, MoKind::Datacenter, "name", &name).await
}

/// `datacenter.perf.metric.get` — performance samples for one
/// datacenter. Datacenters provide historical statistics only, so a
/// `perf-interval` is required.
pub(crate) async fn perf_metric_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_get(session, MoKind::Datacenter, "name", request).await
}

/// `datacenter.perf.metric.info` — metrics available for one datacenter.
pub(crate) async fn perf_metric_info(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_info(session, MoKind::Datacenter, "name", request).await
}
