//! Shared test scaffolding: a scripted upstream client with a real view
//! lifecycle, so task scenarios can run against a fake inventory.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::str_to_string)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use vqd::protocol::Record;
use vqd::session::Session;
use vqd::vim::types::{
    EntityMetric, GuestAuth, MoKind, MoRef, ObjectContent, PerfCounterInfo, PerfInterval,
    PerfMetricId, PerfQuerySpec, ProviderSummary, VsanHostStatus,
};
use vqd::vim::{Client, VimError, VimResult};

/// One scripted managed object.
pub struct MockObject {
    pub kind: MoKind,
    pub mor: MoRef,
    pub props: Record,
}

/// Shared scripted upstream state, observable from the test after the
/// client moves into a session.
#[derive(Default)]
pub struct MockState {
    pub objects: Vec<MockObject>,
    pub counters: Vec<PerfCounterInfo>,
    pub intervals: Vec<PerfInterval>,
    pub summaries: HashMap<String, ProviderSummary>,
    pub metrics: Vec<PerfMetricId>,
    pub perf_data: Vec<EntityMetric>,
    pub guest_processes: Vec<Value>,
    pub vsan_status: Option<VsanHostStatus>,
    pub about: Record,
    pub latest_event: Value,
    pub api_sessions: Vec<Value>,
    pub connects: usize,
    views: HashMap<String, Option<Vec<MoRef>>>,
    next_view: usize,
}

impl MockState {
    /// Add an object with a name plus extra properties.
    pub fn add_object(&mut self, kind: MoKind, id: &str, props: &[(&str, Value)]) {
        let record: Record = props
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        self.objects.push(MockObject {
            kind,
            mor: MoRef::new(kind.as_str(), id),
            props: record,
        });
    }

    /// Outstanding (created but not destroyed) views.
    pub fn live_views(&self) -> usize {
        self.views.len()
    }
}

/// A scripted [`Client`] over shared [`MockState`].
pub struct MockClient {
    pub state: Arc<Mutex<MockState>>,
    pub fail_connect: Option<String>,
    connected: bool,
}

impl MockClient {
    pub fn new(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            fail_connect: None,
            connected: false,
        }
    }

    /// A connected session named `host` over fresh shared state.
    pub fn session(host: &str) -> (Session, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let session = Session::new(host, Box::new(Self::new(Arc::clone(&state))));
        (session, state)
    }
}

fn project(props: &Record, paths: &[String]) -> Record {
    if paths.is_empty() {
        return props.clone();
    }
    let mut projected = Record::new();
    for path in paths {
        if let Some(value) = props.get(path) {
            projected.insert(path.clone(), value.clone());
        }
    }
    projected
}

#[async_trait]
impl Client for MockClient {
    async fn connect(&mut self) -> VimResult<()> {
        if let Some(reason) = &self.fail_connect {
            return Err(VimError::Protocol(reason.clone()));
        }
        self.state.lock().unwrap().connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> VimResult<()> {
        self.connected = false;
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected
    }

    async fn about(&mut self) -> VimResult<Record> {
        Ok(self.state.lock().unwrap().about.clone())
    }

    async fn latest_event(&mut self) -> VimResult<Value> {
        Ok(self.state.lock().unwrap().latest_event.clone())
    }

    async fn session_list(&mut self) -> VimResult<Vec<Value>> {
        Ok(self.state.lock().unwrap().api_sessions.clone())
    }

    async fn create_container_view(&mut self, _kinds: &[MoKind]) -> VimResult<MoRef> {
        let mut state = self.state.lock().unwrap();
        state.next_view += 1;
        let id = format!("view-{}", state.next_view);
        state.views.insert(id.clone(), None);
        Ok(MoRef::new("ContainerView", id))
    }

    async fn create_list_view(&mut self, objs: &[MoRef]) -> VimResult<MoRef> {
        let mut state = self.state.lock().unwrap();
        state.next_view += 1;
        let id = format!("view-{}", state.next_view);
        state.views.insert(id.clone(), Some(objs.to_vec()));
        Ok(MoRef::new("ListView", id))
    }

    async fn destroy_view(&mut self, view: &MoRef) -> VimResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .views
            .remove(&view.value)
            .map(|_| ())
            .ok_or_else(|| VimError::Protocol(format!("unknown view {}", view.value)))
    }

    async fn retrieve_properties(
        &mut self,
        view: &MoRef,
        kind: MoKind,
        paths: &[String],
    ) -> VimResult<Vec<ObjectContent>> {
        let state = self.state.lock().unwrap();
        let scope = state
            .views
            .get(&view.value)
            .ok_or_else(|| VimError::Protocol(format!("unknown view {}", view.value)))?;
        let contents = state
            .objects
            .iter()
            .filter(|object| object.kind == kind)
            .filter(|object| match scope {
                Some(refs) => refs.iter().any(|r| r.value == object.mor.value),
                None => true,
            })
            .map(|object| ObjectContent {
                obj: object.mor.clone(),
                props: project(&object.props, paths),
            })
            .collect();
        Ok(contents)
    }

    async fn query_provider_summary(&mut self, entity: &MoRef) -> VimResult<ProviderSummary> {
        self.state
            .lock()
            .unwrap()
            .summaries
            .get(&entity.value)
            .cloned()
            .ok_or_else(|| VimError::Fault {
                fault: "InvalidArgument".to_string(),
                msg: format!("no provider summary for {}", entity.value),
            })
    }

    async fn query_available_metrics(
        &mut self,
        _entity: &MoRef,
        _interval_id: Option<i32>,
    ) -> VimResult<Vec<PerfMetricId>> {
        Ok(self.state.lock().unwrap().metrics.clone())
    }

    async fn query_perf_counters(&mut self) -> VimResult<Vec<PerfCounterInfo>> {
        Ok(self.state.lock().unwrap().counters.clone())
    }

    async fn query_historical_intervals(&mut self) -> VimResult<Vec<PerfInterval>> {
        Ok(self.state.lock().unwrap().intervals.clone())
    }

    async fn query_perf(&mut self, _spec: &PerfQuerySpec) -> VimResult<Vec<EntityMetric>> {
        Ok(self.state.lock().unwrap().perf_data.clone())
    }

    async fn list_guest_processes(
        &mut self,
        _vm: &MoRef,
        _auth: &GuestAuth,
    ) -> VimResult<Vec<Value>> {
        Ok(self.state.lock().unwrap().guest_processes.clone())
    }

    async fn query_vsan_host_status(&mut self, _vsan_system: &MoRef) -> VimResult<VsanHostStatus> {
        self.state
            .lock()
            .unwrap()
            .vsan_status
            .clone()
            .ok_or_else(|| VimError::Protocol("no vsan status scripted".to_string()))
    }
}

/// A performance counter catalog entry for tests.
pub fn counter(key: i32, group: &str, name: &str, unit: &str, rollup: &str) -> PerfCounterInfo {
    use vqd::vim::types::ElementDescription;
    let desc = |k: &str| ElementDescription {
        label: k.to_string(),
        summary: k.to_string(),
        key: k.to_string(),
    };
    PerfCounterInfo {
        key,
        name_info: desc(name),
        group_info: desc(group),
        unit_info: desc(unit),
        rollup_type: rollup.to_string(),
        stats_type: "rate".to_string(),
        level: 1,
        per_device_level: 3,
    }
}
