//! Zabbix-oriented reply formatting.
//!
//! Discovery-style replies are rewritten into the Zabbix low-level
//! discovery shape: every record key becomes a macro of the form
//! `{#VSPHERE.<METHOD>.<KEY>}` where `<METHOD>` is the task name minus
//! its trailing segment, uppercased. Single-object replies collapse to
//! the bare value of the first requested property so one monitored item
//! stores one value.

use serde_json::{Map, Value, json};

use super::{Helper, HelperError};
use crate::protocol::{TaskReply, TaskRequest};

/// How one method's reply is represented.
#[derive(Debug, Clone, Copy)]
enum Mode {
    /// The first requested property of the last result record.
    ItemValue,
    /// Low-level discovery data from all result records.
    LldData,
    /// Low-level discovery data from the nested `disk` list.
    VmDiskDiscover,
    /// The first requested property of the nested `disk` record.
    VmDiskGet,
    /// The number of matching guest processes.
    VmProcessGet,
}

fn mode_for(method: &str) -> Option<Mode> {
    let mode = match method {
        "about" | "event.latest" | "datacenter.get" | "datacenter.perf.metric.get"
        | "cluster.get" | "cluster.perf.metric.get" | "host.get" | "host.cluster.get"
        | "host.perf.metric.get" | "vm.get" | "vm.host.get" | "vm.cpu.usage.percent"
        | "vm.perf.metric.get" | "datastore.get" | "datastore.perf.metric.get"
        | "vsan.health.get" => Mode::ItemValue,
        "session.get" | "datacenter.discover" | "datacenter.alarm.get"
        | "datacenter.perf.metric.info" | "cluster.alarm.get" | "cluster.discover"
        | "cluster.perf.metric.info" | "host.alarm.get" | "host.discover" | "host.vm.get"
        | "host.datastore.get" | "host.perf.metric.info" | "vm.alarm.get" | "vm.discover"
        | "vm.datastore.get" | "vm.perf.metric.info" | "vm.snapshot.get"
        | "datastore.alarm.get" | "datastore.discover" | "datastore.host.get"
        | "datastore.vm.get" | "datastore.perf.metric.info" => Mode::LldData,
        "vm.disk.discover" => Mode::VmDiskDiscover,
        "vm.disk.get" => Mode::VmDiskGet,
        "vm.process.get" => Mode::VmProcessGet,
        _ => return None,
    };
    Some(mode)
}

/// Rewrite one record's keys into `{#<PREFIX>.<KEY>}` macros.
fn to_macros(prefix: &str, record: &Map<String, Value>) -> Value {
    let rewritten: Map<String, Value> = record
        .iter()
        .map(|(key, value)| {
            (
                format!("{{#VSPHERE.{prefix}.{}}}", key.to_uppercase()),
                value.clone(),
            )
        })
        .collect();
    Value::Object(rewritten)
}

/// The task name minus its trailing segment, uppercased.
fn method_prefix(method: &str) -> String {
    let segments: Vec<&str> = method.split('.').collect();
    segments[..segments.len().saturating_sub(1)]
        .join(".")
        .to_uppercase()
}

fn result_records(reply: &TaskReply) -> Result<&Vec<Map<String, Value>>, HelperError> {
    reply
        .result
        .as_ref()
        .ok_or(HelperError::MissingField("result"))
}

fn first_property(request: &TaskRequest) -> Result<&str, HelperError> {
    request
        .property_paths()
        .first()
        .map(String::as_str)
        .ok_or(HelperError::MissingField("properties"))
}

/// The disk payload nested in `vm.disk.*` replies.
fn disk_payload(reply: &TaskReply) -> Result<&Value, HelperError> {
    result_records(reply)?
        .first()
        .and_then(|record| record.get("disk"))
        .ok_or(HelperError::MissingField("disk"))
}

/// The Zabbix formatter.
pub struct ZabbixHelper;

impl ZabbixHelper {
    fn format(request: &TaskRequest, reply: &TaskReply) -> Result<String, HelperError> {
        let method = request
            .method
            .as_deref()
            .ok_or(HelperError::MissingField("method"))?;
        let mode =
            mode_for(method).ok_or_else(|| HelperError::UnsupportedMethod(method.to_owned()))?;

        let rendered = match mode {
            Mode::ItemValue => {
                let property = first_property(request)?;
                let value = result_records(reply)?
                    .last()
                    .and_then(|record| record.get(property))
                    .cloned()
                    .unwrap_or(Value::Null);
                value.to_string()
            }
            Mode::LldData => {
                let prefix = method_prefix(method);
                let data: Vec<Value> = result_records(reply)?
                    .iter()
                    .map(|record| to_macros(&prefix, record))
                    .collect();
                json!({ "data": data }).to_string()
            }
            Mode::VmDiskDiscover => {
                // Disk discovery macros carry the entity prefix only.
                let prefix = method
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .to_uppercase();
                let disks = disk_payload(reply)?;
                let data: Vec<Value> = disks
                    .as_array()
                    .map(|disks| {
                        disks
                            .iter()
                            .filter_map(Value::as_object)
                            .map(|disk| to_macros(&prefix, disk))
                            .collect()
                    })
                    .unwrap_or_default();
                json!({ "data": data }).to_string()
            }
            Mode::VmDiskGet => {
                let property = first_property(request)?;
                let value = disk_payload(reply)?
                    .get(property)
                    .cloned()
                    .unwrap_or(Value::Null);
                value.to_string()
            }
            Mode::VmProcessGet => {
                let processes = result_records(reply)?;
                let count = match request.key.as_deref().filter(|k| !k.is_empty()) {
                    Some(needle) => processes
                        .iter()
                        .filter(|process| {
                            process
                                .get("cmdLine")
                                .and_then(Value::as_str)
                                .is_some_and(|cmd| cmd.contains(needle))
                        })
                        .count(),
                    None => processes.len(),
                };
                count.to_string()
            }
        };
        Ok(rendered)
    }
}

impl Helper for ZabbixHelper {
    fn run(&self, request: &TaskRequest, reply: &TaskReply) -> Result<String, HelperError> {
        Self::format(request, reply)
    }
}

/// The Zabbix formatter for C clients: identical output, NUL-terminated
/// so fixed-buffer readers find the end of the payload.
pub struct CZabbixHelper;

impl Helper for CZabbixHelper {
    fn run(&self, request: &TaskRequest, reply: &TaskReply) -> Result<String, HelperError> {
        let mut wire = ZabbixHelper::format(request, reply)?;
        wire.push('\0');
        Ok(wire)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::protocol::Record;

    fn request(method: &str) -> TaskRequest {
        TaskRequest {
            method: Some(method.to_string()),
            hostname: Some("vc01".to_string()),
            ..TaskRequest::default()
        }
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[rstest]
    #[case("datastore.discover", "DATASTORE")]
    #[case("host.vm.get", "HOST.VM")]
    #[case("datacenter.perf.metric.info", "DATACENTER.PERF.METRIC")]
    fn lld_macro_prefix_drops_the_last_segment(#[case] method: &str, #[case] prefix: &str) {
        assert_eq!(method_prefix(method), prefix);
    }

    #[test]
    fn lld_data_rewrites_every_key() {
        let reply = TaskReply::ok(
            "ok",
            vec![record(&[
                ("name", json!("ds1")),
                ("info.url", json!("ds:///vmfs/volumes/1/")),
            ])],
        );
        let wire = ZabbixHelper
            .run(&request("datastore.discover"), &reply)
            .unwrap();
        let parsed: Value = serde_json::from_str(&wire).unwrap();
        let entry = &parsed["data"][0];
        assert_eq!(entry["{#VSPHERE.DATASTORE.NAME}"], "ds1");
        assert_eq!(
            entry["{#VSPHERE.DATASTORE.INFO.URL}"],
            "ds:///vmfs/volumes/1/"
        );
        assert_eq!(entry.as_object().unwrap().len(), 2);
    }

    #[test]
    fn item_value_takes_first_property_of_last_record() {
        let mut req = request("host.get");
        req.properties = Some(vec!["summary.quickStats.overallCpuUsage".to_string()]);
        let reply = TaskReply::ok(
            "ok",
            vec![record(&[
                ("name", json!("h1")),
                ("summary.quickStats.overallCpuUsage", json!(421)),
            ])],
        );
        assert_eq!(ZabbixHelper.run(&req, &reply).unwrap(), "421");
    }

    #[test]
    fn item_value_without_properties_is_an_error() {
        let reply = TaskReply::ok("ok", vec![record(&[("name", json!("h1"))])]);
        assert!(matches!(
            ZabbixHelper.run(&request("host.get"), &reply),
            Err(HelperError::MissingField("properties"))
        ));
    }

    #[test]
    fn vm_disk_discover_uses_entity_prefix() {
        let reply = TaskReply::ok(
            "ok",
            vec![record(&[
                ("name", json!("vm01")),
                (
                    "disk",
                    json!([{"diskPath": "/", "capacity": 1024}, {"diskPath": "/var"}]),
                ),
            ])],
        );
        let wire = ZabbixHelper
            .run(&request("vm.disk.discover"), &reply)
            .unwrap();
        let parsed: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed["data"][0]["{#VSPHERE.VM.DISKPATH}"], "/");
        assert_eq!(parsed["data"][0]["{#VSPHERE.VM.CAPACITY}"], 1024);
        assert_eq!(parsed["data"][1]["{#VSPHERE.VM.DISKPATH}"], "/var");
    }

    #[test]
    fn vm_disk_get_returns_the_selected_property() {
        let mut req = request("vm.disk.get");
        req.properties = Some(vec!["freeSpace".to_string()]);
        let reply = TaskReply::ok(
            "ok",
            vec![record(&[
                ("name", json!("vm01")),
                ("disk", json!({"diskPath": "/var", "freeSpace": 2048})),
            ])],
        );
        assert_eq!(ZabbixHelper.run(&req, &reply).unwrap(), "2048");
    }

    #[test]
    fn vm_process_get_counts_matching_processes() {
        let reply = TaskReply::ok(
            "ok",
            vec![
                record(&[("cmdLine", json!("/usr/sbin/sshd -D"))]),
                record(&[("cmdLine", json!("/usr/bin/python server.py"))]),
                record(&[("cmdLine", json!("sshd: worker"))]),
            ],
        );
        let all = ZabbixHelper.run(&request("vm.process.get"), &reply).unwrap();
        assert_eq!(all, "3");

        let mut filtered = request("vm.process.get");
        filtered.key = Some("sshd".to_string());
        assert_eq!(ZabbixHelper.run(&filtered, &reply).unwrap(), "2");
    }

    #[test]
    fn unsupported_method_is_an_error() {
        let reply = TaskReply::ok("ok", Vec::new());
        assert!(matches!(
            ZabbixHelper.run(&request("perf.interval.info"), &reply),
            Err(HelperError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn c_variant_is_nul_terminated() {
        let reply = TaskReply::ok("ok", vec![record(&[("name", json!("h1"))])]);
        let wire = CZabbixHelper.run(&request("host.discover"), &reply).unwrap();
        assert!(wire.ends_with('\0'));
    }
}
