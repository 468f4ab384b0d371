//! Virtual machine tasks.
//!
//! The guest-facing operations (`vm.disk.*`, `vm.guest.net.get`,
//! `vm.process.get`) depend on VMware Tools running inside the guest;
//! they surface missing tooling as error replies rather than upstream
//! faults.

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
use crate::vim::types::{GuestAuth, MoKind, value_as_mo_ref, value_as_mo_refs};

/// `vm.discover` — all virtual machines on the endpoint.
pub(crate) async fn discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::VirtualMachine).await
}

/// `vm.get` — properties of one virtual machine.
pub(crate) async fn get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name"]);
    get_object_properties(
        session,
        properties,
        MoKind::VirtualMachine,
        "name",
        &name,
        false,
    )
    .await
}

/// `vm.alarm.get` — triggered alarms of one virtual machine.
pub(crate) async fn alarm_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    object_alarm_get(session, MoKind::VirtualMachine, "name", &name).await
}

/// `vm.perf.metric.get` — performance samples for one virtual machine.
///
/// Statistics are only reported for powered-on, connected machines.
pub(crate) async fn perf_metric_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();

    let data = get_object_properties(
        session,
        vec![
            "runtime.powerState".to_owned(),
            "runtime.connectionState".to_owned(),
        ],
        MoKind::VirtualMachine,
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
            "VM is not powered on, cannot get performance metrics",
        ));
    }
    if props.get("runtime.connectionState").and_then(Value::as_str) != Some("connected") {
        return Ok(TaskReply::error(
            "VM is not connected, cannot get performance metrics",
        ));
    }

    let Some(entity) = props.get("obj").and_then(value_as_mo_ref) else {
        return Ok(TaskReply::error(format!("Cannot find object: {name}")));
    };
    entity_perf_metric_get(session, &entity, &name, request).await
}

/// `vm.perf.metric.info` — metrics available for one virtual machine.
pub(crate) async fn perf_metric_info(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    lookup_perf_metric_info(session, MoKind::VirtualMachine, "name", request).await
}

/// Fetch a guest-reported array property of one virtual machine along
/// with its name.
async fn guest_array_property(
    session: &mut Session,
    name: &str,
    property: &str,
) -> Result<Result<(Value, Vec<Value>), TaskReply>, crate::registry::TaskError> {
    let data = get_object_properties(
        session,
        vec!["name".to_owned(), property.to_owned()],
        MoKind::VirtualMachine,
        "name",
        name,
        false,
    )
    .await?;
    let mut props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(Err(reply)),
    };
    let vm_name = props.remove("name").unwrap_or(Value::Null);
    let entries = props
        .remove(property)
        .and_then(|value| match value {
            Value::Array(entries) => Some(entries),
            _ => None,
        })
        .unwrap_or_default();
    Ok(Ok((vm_name, entries)))
}

/// Project each guest entry down to the requested properties, filling
/// gaps with `"(null)"` the way the upstream tools report absent fields.
fn project_guest_entries(entries: &[Value], properties: &[String]) -> Vec<Value> {
    entries
        .iter()
        .map(|entry| {
            let mut record = Record::new();
            for property in properties {
                let value = entry
                    .get(property)
                    .cloned()
                    .unwrap_or_else(|| Value::String("(null)".to_owned()));
                record.insert(property.clone(), value);
            }
            Value::Object(record)
        })
        .collect()
}

/// `vm.disk.discover` — guest disks of one virtual machine.
pub(crate) async fn disk_discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "discovering guest disks");

    let (vm_name, disks) = match guest_array_property(session, &name, "guest.disk").await? {
        Ok(found) => found,
        Err(reply) => return Ok(reply),
    };

    let properties = seeded_properties(request, &["diskPath"]);
    let mut result = Record::new();
    result.insert("name".into(), vm_name);
    result.insert(
        "disk".into(),
        Value::Array(project_guest_entries(&disks, &properties)),
    );

    Ok(TaskReply::ok(
        "Successfully discovered objects",
        vec![result],
    ))
}

/// `vm.disk.get` — one guest disk of a virtual machine, selected by the
/// `key` mount path. Without a `key` the full discovery result is
/// returned.
pub(crate) async fn disk_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "getting guest disk info");

    let data = disk_discover(session, request).await?;
    if !data.is_success() {
        return Ok(data);
    }
    let Some(disk_path) = request.key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(data);
    };

    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };
    let disk = props
        .get("disk")
        .and_then(Value::as_array)
        .and_then(|disks| {
            disks
                .iter()
                .find(|d| d.get("diskPath").and_then(Value::as_str) == Some(disk_path))
        })
        .cloned();

    let Some(disk) = disk else {
        return Ok(TaskReply::error(format!(
            "Unable to find guest disk {disk_path}"
        )));
    };

    let mut result = Record::new();
    result.insert("name".into(), Value::String(name));
    result.insert("disk".into(), disk);

    Ok(TaskReply::ok(
        "Successfully retrieved properties",
        vec![result],
    ))
}

/// `vm.guest.net.get` — guest network adapters of one virtual machine.
pub(crate) async fn guest_net_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "discovering guest network adapters");

    let (vm_name, adapters) = match guest_array_property(session, &name, "guest.net").await? {
        Ok(found) => found,
        Err(reply) => return Ok(reply),
    };

    let properties = seeded_properties(request, &["network"]);
    let mut result = Record::new();
    result.insert("name".into(), vm_name);
    result.insert(
        "net".into(),
        Value::Array(project_guest_entries(&adapters, &properties)),
    );

    Ok(TaskReply::ok(
        "Successfully retrieved properties",
        vec![result],
    ))
}

/// `vm.net.get` — the networks a virtual machine is attached to.
pub(crate) async fn net_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "getting networks for virtual machine");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "network".to_owned()],
        MoKind::VirtualMachine,
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

/// The per-snapshot projection reported by `vm.snapshot.get`.
fn flatten_snapshot(snapshot: &Value) -> Record {
    let field = |key: &str| snapshot.get(key).cloned().unwrap_or(Value::Null);
    let mut record = Record::new();
    record.insert("createTime".into(), field("createTime"));
    record.insert("description".into(), field("description"));
    record.insert("id".into(), field("id"));
    record.insert("name".into(), field("name"));
    record.insert("quiesced".into(), field("quiesced"));
    record.insert("state".into(), field("state"));
    record
}

/// `vm.snapshot.get` — the snapshots of one virtual machine.
pub(crate) async fn snapshot_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "getting snapshots for virtual machine");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "snapshot".to_owned()],
        MoKind::VirtualMachine,
        "name",
        &name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let roots = props
        .get("snapshot")
        .and_then(|s| s.get("rootSnapshotList"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if roots.is_empty() {
        return Ok(TaskReply::error(format!("No snapshots found for: {name}")));
    }

    let mut result = Vec::new();
    for root in &roots {
        result.push(flatten_snapshot(root));
        if let Some(children) = root.get("childSnapshotList").and_then(Value::as_array) {
            for child in children {
                result.push(flatten_snapshot(child));
            }
        }
    }

    Ok(TaskReply::ok("Successfully retrieved snapshots", result))
}

/// `vm.host.get` — the host a virtual machine is running on.
pub(crate) async fn host_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "getting host for virtual machine");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "runtime.host".to_owned()],
        MoKind::VirtualMachine,
        "name",
        &name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let host_name = match props.get("runtime.host").and_then(value_as_mo_ref) {
        Some(host_ref) => collect_from_refs(
            session,
            std::slice::from_ref(&host_ref),
            MoKind::HostSystem,
            &["name"],
        )
        .await?
        .into_iter()
        .next()
        .and_then(|mut record| record.remove("name"))
        .unwrap_or(Value::Null),
        None => Value::Null,
    };

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert("host".into(), host_name);

    Ok(TaskReply::ok(
        "Successfully retrieved object properties",
        vec![result],
    ))
}

/// `vm.datastore.get` — the datastores used by one virtual machine.
pub(crate) async fn datastore_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    object_datastore_get(session, MoKind::VirtualMachine, &name).await
}

/// `vm.process.get` — processes running in the guest.
///
/// Requires VMware Tools running in the guest and non-empty in-guest
/// credentials.
pub(crate) async fn process_get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "getting guest processes");

    let data = get_object_properties(
        session,
        vec!["name".to_owned(), "guest.toolsRunningStatus".to_owned()],
        MoKind::VirtualMachine,
        "name",
        &name,
        true,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    if props.get("guest.toolsRunningStatus").and_then(Value::as_str) != Some("guestToolsRunning") {
        return Ok(TaskReply::error(format!(
            "{name} is not running VMware Tools"
        )));
    }

    let username = request.username.clone().unwrap_or_default();
    let password = request.password.clone().unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Ok(TaskReply::error(format!(
            "Need username and password for authentication in guest system {name}"
        )));
    }

    let Some(vm_ref) = props.get("obj").and_then(value_as_mo_ref) else {
        return Ok(TaskReply::error(format!("Cannot find object {name}")));
    };
    let auth = GuestAuth { username, password };
    let processes = match session.guest_processes(&vm_ref, &auth).await {
        Ok(processes) => processes,
        Err(e) => {
            return Ok(TaskReply::error(format!("Cannot get guest processes: {e}")));
        }
    };

    let properties = seeded_properties(request, &["cmdLine"]);
    let result = project_guest_entries(&processes, &properties)
        .into_iter()
        .map(super::as_record)
        .collect();

    Ok(TaskReply::ok("Successfully retrieved properties", result))
}

/// Properties required to derive the CPU usage percentage.
const CPU_USAGE_PROPERTIES: [&str; 5] = [
    "name",
    "runtime.host",
    "summary.quickStats.overallCpuUsage",
    "config.hardware.numCoresPerSocket",
    "config.hardware.numCPU",
];

/// `vm.cpu.usage.percent` — CPU usage of one virtual machine as a
/// percentage of the capacity of its current host.
pub(crate) async fn cpu_usage_percent(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    debug!(host = %session.host(), vm = %name, "getting CPU usage percentage");

    let properties: Vec<String> = CPU_USAGE_PROPERTIES.iter().map(|&p| p.to_owned()).collect();
    let data = get_object_properties(
        session,
        properties,
        MoKind::VirtualMachine,
        "name",
        &name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    // Older endpoints do not always return every requested property;
    // fail the task rather than computing from partial data.
    if !CPU_USAGE_PROPERTIES.iter().all(|p| props.contains_key(*p)) {
        return Ok(TaskReply::error("Unable to retrieve required properties"));
    }

    let host_hz = match props.get("runtime.host").and_then(value_as_mo_ref) {
        Some(host_ref) => collect_from_refs(
            session,
            std::slice::from_ref(&host_ref),
            MoKind::HostSystem,
            &["hardware.cpuInfo.hz"],
        )
        .await?
        .into_iter()
        .next()
        .and_then(|record| record.get("hardware.cpuInfo.hz").and_then(Value::as_f64)),
        None => None,
    };

    let usage_mhz = props
        .get("summary.quickStats.overallCpuUsage")
        .and_then(Value::as_f64);
    let cores_per_socket = props
        .get("config.hardware.numCoresPerSocket")
        .and_then(Value::as_f64);
    let num_cpu = props.get("config.hardware.numCPU").and_then(Value::as_f64);

    let (Some(host_hz), Some(usage_mhz), Some(cores_per_socket), Some(num_cpu)) =
        (host_hz, usage_mhz, cores_per_socket, num_cpu)
    else {
        return Ok(TaskReply::error("Unable to retrieve required properties"));
    };
    let capacity_hz = host_hz * cores_per_socket * num_cpu;
    if capacity_hz == 0.0 {
        return Ok(TaskReply::error("Unable to retrieve required properties"));
    }

    // The quick-stats usage is reported in MHz.
    let usage = usage_mhz * 1_048_576.0 / capacity_hz * 100.0;

    let mut result = Record::new();
    result.insert("name".into(), props.get("name").cloned().unwrap_or(Value::Null));
    result.insert("vm.cpu.usage.percent".into(), Value::from(usage));

    Ok(TaskReply::ok(
        "Successfully retrieved properties",
        vec![result],
    ))
}
