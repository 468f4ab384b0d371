//! Network tasks.

use serde_json::Value;
use tracing::debug;

use super::{
    collect_from_refs, discover_objects, first_record, get_object_properties, seeded_properties,
};
use crate::protocol::{Record, TaskReply, TaskRequest};
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::{MoKind, value_as_mo_refs};

/// `net.discover` — all networks on the endpoint.
pub(crate) async fn net_discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::Network).await
}

/// `net.get` — properties of one network.
pub(crate) async fn net_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name"]);
    get_object_properties(session, properties, MoKind::Network, "name", &name, false).await
}

/// `net.host.get` — the hosts attached to one network.
pub(crate) async fn net_host_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), network = %name, "getting hosts using network");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "host".to_owned()],
        MoKind::Network,
        "name",
        &name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let refs = props.get("host").map(value_as_mo_refs).unwrap_or_default();
    let hosts = collect_from_refs(session, &refs, MoKind::HostSystem, &["name"]).await?;

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert("host".into(), Value::Array(hosts.into_iter().map(Value::Object).collect()));

    Ok(TaskReply::ok(
        "Successfully discovered objects",
        vec![result],
    ))
}

/// `net.vm.get` — the virtual machines attached to one network.
pub(crate) async fn net_vm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), network = %name, "getting virtual machines using network");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "vm".to_owned()],
        MoKind::Network,
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
    let vms = collect_from_refs(session, &refs, MoKind::VirtualMachine, &["name"]).await?;

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert("vm".into(), Value::Array(vms.into_iter().map(Value::Object).collect()));

    Ok(TaskReply::ok(
        "Successfully discovered objects",
        vec![result],
    ))
}
