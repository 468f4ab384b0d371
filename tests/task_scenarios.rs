//! Task scenarios against a scripted upstream inventory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::str_to_string)]

mod common;

use serde_json::{Value, json};

use common::{MockClient, MockState, counter};
use vqd::helpers::HelperTable;
use vqd::protocol::{TaskReply, TaskRequest};
use vqd::session::Session;
use vqd::vim::types::{
    EntityMetric, MoKind, MoRef, PerfInterval, PerfMetricId, PerfMetricSeries, PerfSampleInfo,
    ProviderSummary,
};
use vqd::worker::Worker;

fn request(value: Value) -> TaskRequest {
    serde_json::from_value(value).expect("request fixture")
}

fn worker_for(state_setup: impl FnOnce(&mut MockState)) -> (Worker, std::sync::Arc<std::sync::Mutex<MockState>>) {
    let (session, state) = session_for(state_setup);
    let mut worker = Worker::new(HelperTable::default());
    worker.add_session(session);
    (worker, state)
}

fn session_for(
    state_setup: impl FnOnce(&mut MockState),
) -> (Session, std::sync::Arc<std::sync::Mutex<MockState>>) {
    let (session, state) = MockClient::session("vc01");
    state_setup(&mut state.lock().unwrap());
    (session, state)
}

async fn run(worker: &mut Worker, value: Value) -> TaskReply {
    worker.execute(&request(value)).await
}

#[tokio::test]
async fn discovery_returns_one_record_per_object_with_names() {
    let (mut worker, state) = worker_for(|s| {
        s.add_object(MoKind::HostSystem, "host-1", &[("name", json!("h1"))]);
        s.add_object(MoKind::HostSystem, "host-2", &[("name", json!("h2"))]);
        s.add_object(MoKind::VirtualMachine, "vm-1", &[("name", json!("vm01"))]);
    });

    let reply = run(&mut worker, json!({"method": "host.discover", "hostname": "vc01"})).await;
    assert_eq!(reply.success, 0);
    let result = reply.result.expect("result");
    assert_eq!(result.len(), 2);
    for record in &result {
        assert!(record.contains_key("name"));
    }
    assert_eq!(state.lock().unwrap().live_views(), 0);
}

#[tokio::test]
async fn alarm_records_carry_exactly_the_seven_keys() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                (
                    "triggeredAlarmState",
                    json!([{
                        "key": "alarm-1",
                        "alarm": {"info": {"name": "HighCPU"}},
                        "time": "2024-01-01T00:00:00Z",
                        "entity": {"name": "h1"},
                        "acknowledged": false,
                        "overallStatus": "red",
                        "acknowledgedByUser": "",
                    }]),
                ),
            ],
        );
    });

    let reply = run(
        &mut worker,
        json!({"method": "host.alarm.get", "hostname": "vc01", "name": "h1"}),
    )
    .await;
    assert_eq!(reply.success, 0);
    let result = reply.result.expect("result");
    assert_eq!(result.len(), 1);
    let alarm = &result[0];
    let keys: Vec<_> = alarm.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "key",
            "info",
            "time",
            "entity",
            "acknowledged",
            "overallStatus",
            "acknowledgedByUser"
        ]
    );
    assert_eq!(alarm["key"], json!("alarm-1"));
    assert_eq!(alarm["info"], json!("HighCPU"));
    assert_eq!(alarm["time"], json!("2024-01-01T00:00:00Z"));
    assert_eq!(alarm["entity"], json!("h1"));
    assert_eq!(alarm["acknowledged"], json!(false));
    assert_eq!(alarm["overallStatus"], json!("red"));
    assert_eq!(alarm["acknowledgedByUser"], json!(""));
}

#[tokio::test]
async fn historical_only_provider_requires_an_interval() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(MoKind::Datacenter, "dc-1", &[("name", json!("dc01"))]);
        s.summaries.insert(
            "dc-1".to_string(),
            ProviderSummary {
                current_supported: false,
                summary_supported: true,
                refresh_rate: -1,
            },
        );
    });

    // datacenter.perf.metric.get requires perf-interval up front, so the
    // guard is exercised through a host-shaped entity instead.
    let (mut host_worker, _s) = worker_for(|s| {
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                ("runtime.powerState", json!("poweredOn")),
                ("runtime.connectionState", json!("connected")),
            ],
        );
        s.summaries.insert(
            "host-1".to_string(),
            ProviderSummary {
                current_supported: false,
                summary_supported: true,
                refresh_rate: -1,
            },
        );
    });
    let reply = run(
        &mut host_worker,
        json!({
            "method": "host.perf.metric.get",
            "hostname": "vc01",
            "name": "h1",
            "counter-name": "cpu.usage.percent.average",
        }),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(
        reply.msg,
        "No historical performance interval provided for entity h1"
    );

    // The datacenter variant with the interval present but unknown.
    let reply = run(
        &mut worker,
        json!({
            "method": "datacenter.perf.metric.get",
            "hostname": "vc01",
            "name": "dc01",
            "counter-name": "cpu.usage.percent.average",
            "perf-interval": "Past year",
        }),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(reply.msg, "Historical interval Past year does not exists");
}

#[tokio::test]
async fn perf_samples_flatten_with_dotted_counter_names() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                ("runtime.powerState", json!("poweredOn")),
                ("runtime.connectionState", json!("connected")),
            ],
        );
        s.summaries.insert(
            "host-1".to_string(),
            ProviderSummary {
                current_supported: true,
                summary_supported: true,
                refresh_rate: 20,
            },
        );
        s.counters = vec![counter(125, "net", "usage", "kiloBytesPerSecond", "average")];
        s.perf_data = vec![EntityMetric {
            entity: MoRef::new("HostSystem", "host-1"),
            sample_info: vec![
                PerfSampleInfo {
                    interval: 20,
                    timestamp: "2024-01-01T00:00:00Z".parse().expect("timestamp"),
                },
                PerfSampleInfo {
                    interval: 20,
                    timestamp: "2024-01-01T00:00:20Z".parse().expect("timestamp"),
                },
            ],
            value: vec![PerfMetricSeries {
                id: PerfMetricId {
                    counter_id: 125,
                    instance: "vmnic0".to_string(),
                },
                value: vec![100, 200],
            }],
        }];
    });

    let reply = run(
        &mut worker,
        json!({
            "method": "host.perf.metric.get",
            "hostname": "vc01",
            "name": "h1",
            "counter-name": "net.usage.kiloBytesPerSecond.average",
            "instance": "vmnic0",
            "max-sample": 2,
        }),
    )
    .await;
    assert_eq!(reply.success, 0, "{}", reply.msg);
    let result = reply.result.expect("result");
    assert_eq!(result.len(), 2);
    assert_eq!(
        result[0]["counterId"],
        json!("net.usage.kiloBytesPerSecond.average")
    );
    assert_eq!(result[0]["instance"], json!("vmnic0"));
    assert_eq!(result[0]["value"], json!(100));
    assert_eq!(result[1]["value"], json!(200));
    assert_eq!(result[0]["interval"], json!(20));
}

#[tokio::test]
async fn unknown_counter_name_is_rejected() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                ("runtime.powerState", json!("poweredOn")),
                ("runtime.connectionState", json!("connected")),
            ],
        );
        s.summaries.insert(
            "host-1".to_string(),
            ProviderSummary {
                current_supported: true,
                summary_supported: true,
                refresh_rate: 20,
            },
        );
    });

    let reply = run(
        &mut worker,
        json!({
            "method": "host.perf.metric.get",
            "hostname": "vc01",
            "name": "h1",
            "counter-name": "no.such.counter.average",
        }),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(reply.msg, "Unknown performance counter requested");
}

#[tokio::test]
async fn powered_off_host_cannot_serve_metrics() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                ("runtime.powerState", json!("poweredOff")),
                ("runtime.connectionState", json!("disconnected")),
            ],
        );
    });

    let reply = run(
        &mut worker,
        json!({
            "method": "host.perf.metric.get",
            "hostname": "vc01",
            "name": "h1",
            "counter-name": "cpu.usage.percent.average",
        }),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(
        reply.msg,
        "Host is not powered on, cannot get performance metrics"
    );
}

#[tokio::test]
async fn historical_interval_resolves_to_its_sampling_period() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(MoKind::Datacenter, "dc-1", &[("name", json!("dc01"))]);
        s.summaries.insert(
            "dc-1".to_string(),
            ProviderSummary {
                current_supported: false,
                summary_supported: true,
                refresh_rate: -1,
            },
        );
        s.intervals = vec![PerfInterval {
            enabled: true,
            key: 1,
            length: 86400,
            level: Some(1),
            name: "Past day".to_string(),
            sampling_period: 300,
        }];
        s.counters = vec![counter(6, "cpu", "usage", "percent", "average")];
        s.perf_data = Vec::new();
    });

    let reply = run(
        &mut worker,
        json!({
            "method": "datacenter.perf.metric.get",
            "hostname": "vc01",
            "name": "dc01",
            "counter-name": "cpu.usage.percent.average",
            "perf-interval": "Past day",
        }),
    )
    .await;
    assert_eq!(reply.success, 0, "{}", reply.msg);
    assert_eq!(reply.result, Some(Vec::new()));
}

#[tokio::test]
async fn datastores_are_addressed_by_info_url() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::Datastore,
            "ds-1",
            &[
                ("name", json!("datastore1")),
                ("info.url", json!("ds:///vmfs/volumes/5190e2a7/")),
                ("summary.capacity", json!(1099511627776_i64)),
            ],
        );
    });

    let reply = run(
        &mut worker,
        json!({
            "method": "datastore.get",
            "hostname": "vc01",
            "name": "ds:///vmfs/volumes/5190e2a7/",
            "properties": ["summary.capacity"],
        }),
    )
    .await;
    assert_eq!(reply.success, 0, "{}", reply.msg);
    let result = reply.result.expect("result");
    assert_eq!(result[0]["name"], json!("datastore1"));
    assert_eq!(result[0]["summary.capacity"], json!(1099511627776_i64));

    let miss = run(
        &mut worker,
        json!({
            "method": "datastore.get",
            "hostname": "vc01",
            "name": "ds:///vmfs/volumes/unknown/",
            "properties": ["summary.capacity"],
        }),
    )
    .await;
    assert_eq!(miss.success, 1);
    assert_eq!(miss.msg, "Cannot find object ds:///vmfs/volumes/unknown/");
}

#[tokio::test]
async fn about_defaults_to_full_name_only() {
    let (mut worker, _state) = worker_for(|s| {
        s.about.insert("fullName".to_string(), json!("VMware vCenter Server 8.0.2"));
        s.about.insert("apiVersion".to_string(), json!("8.0.2.0"));
    });

    let reply = run(&mut worker, json!({"method": "about", "hostname": "vc01"})).await;
    let result = reply.result.expect("result");
    let keys: Vec<_> = result[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["fullName"]);

    let reply = run(
        &mut worker,
        json!({
            "method": "about",
            "hostname": "vc01",
            "properties": ["apiVersion", "osType"],
        }),
    )
    .await;
    let result = reply.result.expect("result");
    assert_eq!(result[0]["apiVersion"], json!("8.0.2.0"));
    // Unknown about fields are reported as "(null)".
    assert_eq!(result[0]["osType"], json!("(null)"));
}

#[tokio::test]
async fn guest_disk_selection_by_mount_path() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::VirtualMachine,
            "vm-1",
            &[
                ("name", json!("vm01")),
                (
                    "guest.disk",
                    json!([
                        {"diskPath": "/", "capacity": 10, "freeSpace": 5},
                        {"diskPath": "/var", "capacity": 20, "freeSpace": 7},
                    ]),
                ),
            ],
        );
    });

    // Without a key the full discovery is returned.
    let reply = run(
        &mut worker,
        json!({"method": "vm.disk.get", "hostname": "vc01", "name": "vm01"}),
    )
    .await;
    assert_eq!(reply.success, 0);
    let disks = reply.result.expect("result")[0]["disk"].clone();
    assert_eq!(disks.as_array().map(Vec::len), Some(2));

    // With a key only the matching disk comes back.
    let reply = run(
        &mut worker,
        json!({
            "method": "vm.disk.get",
            "hostname": "vc01",
            "name": "vm01",
            "key": "/var",
            "properties": ["capacity", "freeSpace"],
        }),
    )
    .await;
    assert_eq!(reply.success, 0);
    let record = &reply.result.expect("result")[0];
    assert_eq!(record["disk"]["diskPath"], json!("/var"));
    assert_eq!(record["disk"]["capacity"], json!(20));

    let miss = run(
        &mut worker,
        json!({
            "method": "vm.disk.get",
            "hostname": "vc01",
            "name": "vm01",
            "key": "/opt",
        }),
    )
    .await;
    assert_eq!(miss.success, 1);
    assert_eq!(miss.msg, "Unable to find guest disk /opt");
}

#[tokio::test]
async fn guest_process_listing_requires_running_tools_and_credentials() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::VirtualMachine,
            "vm-1",
            &[
                ("name", json!("vm01")),
                ("guest.toolsRunningStatus", json!("guestToolsNotRunning")),
            ],
        );
    });
    let reply = run(
        &mut worker,
        json!({
            "method": "vm.process.get",
            "hostname": "vc01",
            "name": "vm01",
            "username": "root",
            "password": "secret",
        }),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(reply.msg, "vm01 is not running VMware Tools");

    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::VirtualMachine,
            "vm-1",
            &[
                ("name", json!("vm01")),
                ("guest.toolsRunningStatus", json!("guestToolsRunning")),
            ],
        );
        s.guest_processes = vec![
            json!({"cmdLine": "/usr/sbin/sshd -D", "pid": 4242}),
            json!({"cmdLine": "/usr/bin/crond", "pid": 77}),
        ];
    });

    // Present but empty credentials are rejected before the guest call.
    let reply = run(
        &mut worker,
        json!({
            "method": "vm.process.get",
            "hostname": "vc01",
            "name": "vm01",
            "username": "",
            "password": "",
        }),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(
        reply.msg,
        "Need username and password for authentication in guest system vm01"
    );

    let reply = run(
        &mut worker,
        json!({
            "method": "vm.process.get",
            "hostname": "vc01",
            "name": "vm01",
            "username": "root",
            "password": "secret",
            "properties": ["pid"],
        }),
    )
    .await;
    assert_eq!(reply.success, 0, "{}", reply.msg);
    let result = reply.result.expect("result");
    assert_eq!(result.len(), 2);
    assert_eq!(result[0]["cmdLine"], json!("/usr/sbin/sshd -D"));
    assert_eq!(result[0]["pid"], json!(4242));
}

#[tokio::test]
async fn cross_entity_get_resolves_names_through_list_views() {
    let (mut worker, state) = worker_for(|s| {
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                (
                    "vm",
                    json!([
                        {"type": "VirtualMachine", "value": "vm-1"},
                        {"type": "VirtualMachine", "value": "vm-2"},
                    ]),
                ),
            ],
        );
        s.add_object(MoKind::VirtualMachine, "vm-1", &[("name", json!("vm01"))]);
        s.add_object(MoKind::VirtualMachine, "vm-2", &[("name", json!("vm02"))]);
        s.add_object(MoKind::VirtualMachine, "vm-3", &[("name", json!("vm03"))]);
    });

    let reply = run(
        &mut worker,
        json!({"method": "host.vm.get", "hostname": "vc01", "name": "h1"}),
    )
    .await;
    assert_eq!(reply.success, 0, "{}", reply.msg);
    let result = reply.result.expect("result");
    // Only the two machines referenced by the host, not vm-3.
    let names: Vec<_> = result.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("vm01"), json!("vm02")]);
    assert_eq!(state.lock().unwrap().live_views(), 0);
}

#[tokio::test]
async fn snapshot_tree_is_flattened_one_level_deep() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::VirtualMachine,
            "vm-1",
            &[
                ("name", json!("vm01")),
                (
                    "snapshot",
                    json!({
                        "rootSnapshotList": [{
                            "createTime": "2024-01-01T00:00:00Z",
                            "description": "before upgrade",
                            "id": 1,
                            "name": "pre-upgrade",
                            "quiesced": false,
                            "state": "poweredOff",
                            "childSnapshotList": [{
                                "createTime": "2024-01-02T00:00:00Z",
                                "description": "",
                                "id": 2,
                                "name": "mid-upgrade",
                                "quiesced": false,
                                "state": "poweredOn",
                            }],
                        }],
                    }),
                ),
            ],
        );
    });

    let reply = run(
        &mut worker,
        json!({"method": "vm.snapshot.get", "hostname": "vc01", "name": "vm01"}),
    )
    .await;
    assert_eq!(reply.success, 0);
    let result = reply.result.expect("result");
    assert_eq!(result.len(), 2);
    assert_eq!(result[0]["name"], json!("pre-upgrade"));
    assert_eq!(result[1]["name"], json!("mid-upgrade"));

    let (mut bare_worker, _state) = worker_for(|s| {
        s.add_object(MoKind::VirtualMachine, "vm-2", &[("name", json!("vm02"))]);
    });
    let reply = run(
        &mut bare_worker,
        json!({"method": "vm.snapshot.get", "hostname": "vc01", "name": "vm02"}),
    )
    .await;
    assert_eq!(reply.success, 1);
    assert_eq!(reply.msg, "No snapshots found for: vm02");
}

#[tokio::test]
async fn cpu_usage_percent_is_derived_from_host_frequency() {
    let (mut worker, _state) = worker_for(|s| {
        s.add_object(
            MoKind::VirtualMachine,
            "vm-1",
            &[
                ("name", json!("vm01")),
                ("runtime.host", json!({"type": "HostSystem", "value": "host-1"})),
                ("summary.quickStats.overallCpuUsage", json!(100)),
                ("config.hardware.numCoresPerSocket", json!(1)),
                ("config.hardware.numCPU", json!(1)),
            ],
        );
        s.add_object(
            MoKind::HostSystem,
            "host-1",
            &[
                ("name", json!("h1")),
                ("hardware.cpuInfo.hz", json!(104_857_600_i64)),
            ],
        );
    });

    let reply = run(
        &mut worker,
        json!({"method": "vm.cpu.usage.percent", "hostname": "vc01", "name": "vm01"}),
    )
    .await;
    assert_eq!(reply.success, 0, "{}", reply.msg);
    let result = reply.result.expect("result");
    assert_eq!(result[0]["vm.cpu.usage.percent"], json!(100.0));
}

#[tokio::test]
async fn helper_is_applied_to_the_wire_payload() {
    let (session, _state) = session_for(|s| {
        s.add_object(MoKind::HostSystem, "host-1", &[("name", json!("h1"))]);
    });
    let mut worker = Worker::new(HelperTable::load(&["zabbix".to_string()]));
    worker.add_session(session);

    let payload = json!({
        "method": "host.discover",
        "hostname": "vc01",
        "helper": "zabbix",
    })
    .to_string();
    let wire = worker.process_payload(payload.as_bytes()).await;
    let parsed: Value = serde_json::from_str(&wire).expect("wire JSON");
    assert_eq!(parsed["data"][0]["{#VSPHERE.HOST.NAME}"], json!("h1"));
}
