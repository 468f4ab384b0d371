//! Host system tasks.

use serde_json::Value;
use tracing::debug;

use super::{
    collect_from_refs, discover_objects, entity_perf_metric_get, first_record,
    get_object_properties, lookup_perf_metric_info, object_alarm_get, object_datastore_get,
    seeded_properties,
};
use crate::protocol::{Record, TaskReply, TaskRequest};
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::{MoKind, value_as_mo_ref, value_as_mo_refs};

/// `host.discover` — all hosts on the endpoint.
pub(crate) async fn discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::HostSystem).await
}

/// `host.get` — properties of one host.
pub(crate) async fn get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name"]);
    get_object_properties(session, properties, MoKind::HostSystem, "name", &name, false).await
}

/// `host.alarm.get` — triggered alarms of one host.
pub(crate) async fn alarm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    object_alarm_get(session, MoKind::HostSystem, "name", &name).await
}

/// `host.perf.metric.get` — performance samples for one host.
///
/// Hosts only report statistics while powered on and connected; both
/// states are checked before querying.
pub(crate) async fn perf_metric_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();

    let data = get_object_properties(
        session,
        vec![
            "runtime.powerState".to_owned(),
            "runtime.connectionState".to_owned(),
        ],
        MoKind::HostSystem,
        "name",
        &name,
        true,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    if props.get("runtime.powerState").and_then(Value::as_str) != Some("poweredOn") {
        return Ok(TaskReply::error(
            "Host is not powered on, cannot get performance metrics",
        ));
    }
    if props.get("runtime.connectionState").and_then(Value::as_str) != Some("connected") {
        return Ok(TaskReply::error(
            "Host is not connected, cannot get performance metrics",
        ));
    }

    let Some(entity) = props.get("obj").and_then(value_as_mo_ref) else {
        return Ok(TaskReply::error(format!("Cannot find object: {name}")));
    };
    entity_perf_metric_get(session, &entity, &name, request).await
}

/// `host.perf.metric.info` — metrics available for one host.
pub(crate) async fn perf_metric_info(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_info(session, MoKind::HostSystem, "name", request).await
}

/// `host.cluster.get` — the cluster a host is a member of.
pub(crate) async fn cluster_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), object = %name, "getting cluster name for host");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "parent".to_owned()],
        MoKind::HostSystem,
        "name",
        &name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    // Standalone hosts are parented by a plain compute resource; only a
    // cluster parent has a name worth reporting.
    let parent = props.get("parent").and_then(value_as_mo_ref);
    let cluster = match parent {
        Some(parent) if parent.kind == MoKind::ClusterComputeResource.as_str() => {
            collect_from_refs(
                session,
                std::slice::from_ref(&parent),
                MoKind::ClusterComputeResource,
                &["name"],
            )
            .await?
            .into_iter()
            .next()
            .and_then(|mut record| record.remove("name"))
            .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    };

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert("cluster".into(), cluster);

    Ok(TaskReply::ok(
        "Successfully retrieved properties",
        vec![result],
    ))
}

/// `host.vm.get` — the virtual machines running on one host.
pub(crate) async fn vm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), object = %name, "getting virtual machines on host");

    let data = get_object_properties(
        session,
        vec!["vm".to_owned()],
        MoKind::HostSystem,
        "name",
        &name,
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

/// `host.net.get` — the networks available on one host.
pub(crate) async fn net_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), object = %name, "getting networks available on host");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "network".to_owned()],
        MoKind::HostSystem,
        "name",
        &name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let refs = props.get("network").map(value_as_mo_refs).unwrap_or_default();
    let networks = collect_from_refs(session, &refs, MoKind::Network, &["name"]).await?;

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert(
        "network".into(),
        Value::Array(networks.into_iter().map(Value::Object).collect()),
    );

    Ok(TaskReply::ok(
        "Successfully discovered objects",
        vec![result],
    ))
}

/// `host.datastore.get` — the datastores used by one host.
pub(crate) async fn datastore_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    object_datastore_get(session, MoKind::HostSystem, &name).await
}
