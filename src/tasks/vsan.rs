//! vSAN tasks.

use serde_json::Value;
use tracing::info;

use super::{first_record, get_object_properties};
use crate::protocol::{Record, TaskReply, TaskRequest};
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::{MoKind, value_as_mo_ref};

/// `vsan.health.get` — the vSAN cluster health state of one host.
///
/// The host must be powered on and connected; the status itself comes
/// from the host's vSAN system object.
pub(crate) async fn health_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    info!(host = %session.host(), object = %name, "retrieving vSAN health state");

    let data = get_object_properties(
        session,
        vec![
            "name".to_owned(),
            "runtime.powerState".to_owned(),
            "runtime.connectionState".to_owned(),
            "configManager.vsanSystem".to_owned(),
        ],
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

    if props.get("runtime.powerState").and_then(Value::as_str) != Some("poweredOn") {
        return Ok(TaskReply::error(
            "Host is not powered on, cannot get VSAN health state",
        ));
    }
    if props.get("runtime.connectionState").and_then(Value::as_str) != Some("connected") {
        return Ok(TaskReply::error(
            "Host is not connected, cannot get VSAN health state",
        ));
    }

    let Some(vsan_system) = props.get("configManager.vsanSystem").and_then(value_as_mo_ref)
    else {
        return Ok(TaskReply::error(format!(
            "Host {name} has no vSAN system configured"
        )));
    };
    let status = session.vsan_host_status(&vsan_system).await?;

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert("uuid".into(), Value::String(status.uuid));
    result.insert("nodeUuid".into(), Value::String(status.node_uuid));
    result.insert("health".into(), Value::String(status.health));

    Ok(TaskReply::ok(
        "Successfully retrieved object properties",
        vec![result],
    ))
}
