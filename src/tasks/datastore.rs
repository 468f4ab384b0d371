//! Datastore tasks.
//!
//! Datastores are addressed by their `info.url` (the `ds:///vmfs/...`
//! form) rather than by display name, which is not unique across
//! datacenters.

use serde_json::Value;
use tracing::info;

use super::{
    collect_from_refs, discover_objects, first_record, get_object_properties,
    lookup_perf_metric_get, lookup_perf_metric_info, object_alarm_get, seeded_properties,
};
use crate::protocol::{TaskReply, TaskRequest};
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::{MoKind, value_as_mo_ref, value_as_mo_refs};

/// `datastore.discover` — all datastores on the endpoint.
pub(crate) async fn discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::Datastore).await
}

/// `datastore.get` — properties of one datastore.
pub(crate) async fn get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let url = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name", "info.url"]);
    get_object_properties(session, properties, MoKind::Datastore, "info.url", &url, false).await
}

/// `datastore.alarm.get` — triggered alarms of one datastore.
pub(crate) async fn alarm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let url = request.name.clone().unwrap_or_default();
    object_alarm_get(session, MoKind::Datastore, "info.url", &url).await
}

/// `datastore.host.get` — the hosts a datastore is mounted on.
pub(crate) async fn host_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let url = request.name.clone().unwrap_or_default();
    info!(host = %session.host(), datastore = %url, "getting hosts using datastore");

    let data = get_object_properties(
        session,
        vec!["host".to_owned()],
        MoKind::Datastore,
        "info.url",
        &url,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    // The `host` property is a list of host mounts; the host reference
    // sits under each mount's `key`.
    let refs: Vec<_> = props
        .get("host")
        .and_then(Value::as_array)
        .map(|mounts| {
            mounts
                .iter()
                .filter_map(|mount| mount.get("key").and_then(value_as_mo_ref))
                .collect()
        })
        .unwrap_or_default();
    let records = collect_from_refs(session, &refs, MoKind::HostSystem, &["name"]).await?;

    Ok(TaskReply::ok("Successfully discovered objects", records))
}

/// `datastore.vm.get` — the virtual machines using a datastore.
pub(crate) async fn vm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let url = request.name.clone().unwrap_or_default();
    info!(host = %session.host(), datastore = %url, "getting virtual machines using datastore");

    let data = get_object_properties(
        session,
        vec!["vm".to_owned()],
        MoKind::Datastore,
        "info.url",
        &url,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let refs = props.get("vm").map(value_as_mo_refs).unwrap_or_default();
    let records = collect_from_refs(session, &refs, MoKind::VirtualMachine, &["name"]).await?;

    Ok(TaskReply::ok("Successfully discovered objects", records))
}

/// `datastore.perf.metric.get` — performance samples for one datastore.
pub(crate) async fn perf_metric_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_get(session, MoKind::Datastore, "info.url", request).await
}

/// `datastore.perf.metric.info` — metrics available for one datastore.
pub(crate) async fn perf_metric_info(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_info(session, MoKind::Datastore, "info.url", request).await
}
