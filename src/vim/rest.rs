//! reqwest-backed [`Client`] speaking the vSphere JSON protocol.
//!
//! vSphere 8 exposes the Web Services API as JSON over HTTPS at
//! `/sdk/vim25/<release>/<type>/<moid>/<method>`, authenticated with the
//! `vmware-api-session-id` header. This module implements the subset the
//! task catalog needs: session management, view creation, property
//! collection and the performance-manager calls.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Client, VimError, VimResult};
use super::types::{
    EntityMetric, GuestAuth, MoKind, MoRef, ObjectContent, PerfCounterInfo, PerfInterval,
    PerfMetricId, PerfQuerySpec, ProviderSummary, VsanHostStatus,
};
use crate::protocol::Record;

/// API release the endpoint paths are versioned with.
const VIM_RELEASE: &str = "8.0.2.0";

/// Session header used by the vSphere JSON protocol.
const SESSION_HEADER: &str = "vmware-api-session-id";

/// Well-known service-instance singleton identifiers.
mod moid {
    pub const SERVICE_INSTANCE: &str = "ServiceInstance";
    pub const SESSION_MANAGER: &str = "SessionManager";
    pub const VIEW_MANAGER: &str = "ViewManager";
    pub const PROPERTY_COLLECTOR: &str = "propertyCollector";
    pub const PERF_MANAGER: &str = "PerfMgr";
    pub const EVENT_MANAGER: &str = "EventManager";
    pub const GUEST_PROCESS_MANAGER: &str = "guestOperationsProcessManager";
    pub const ROOT_FOLDER: &str = "group-d1";
}

/// A vSphere endpoint client over the JSON protocol.
pub struct RestClient {
    host: String,
    username: String,
    password: String,
    http: reqwest::Client,
    session_key: Option<String>,
}

#[derive(Deserialize)]
struct WireDynamicProperty {
    name: String,
    val: Value,
}

#[derive(Deserialize)]
struct WireObjectContent {
    obj: MoRef,
    #[serde(default, rename = "propSet")]
    prop_set: Vec<WireDynamicProperty>,
}

#[derive(Deserialize)]
struct WireRetrieveResult {
    #[serde(default)]
    objects: Vec<WireObjectContent>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct WireFault {
    #[serde(default)]
    faultstring: String,
}

impl RestClient {
    /// Build a client for one endpoint.
    ///
    /// Certificate verification is disabled: vCenter installations
    /// commonly run with self-signed certificates.
    ///
    /// # Errors
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> VimResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            http,
            session_key: None,
        })
    }

    fn url(&self, type_name: &str, moid: &str, method: &str) -> String {
        format!(
            "https://{}/sdk/vim25/{VIM_RELEASE}/{type_name}/{moid}/{method}",
            self.host
        )
    }

    /// Invoke one managed-object method and decode the response body.
    async fn invoke(
        &mut self,
        type_name: &str,
        moid: &str,
        method: &str,
        body: Value,
    ) -> VimResult<Value> {
        let mut request = self
            .http
            .post(self.url(type_name, moid, method))
            .json(&body);
        if let Some(key) = &self.session_key {
            request = request.header(SESSION_HEADER, key.as_str());
        }
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // The session expired behind our back; force a reconnect on
            // the next request.
            self.session_key = None;
            return Err(VimError::NotAuthenticated);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(VimError::NoPermission);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let msg = serde_json::from_str::<WireFault>(&text)
                .map(|f| f.faultstring)
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(text);
            return Err(VimError::Fault {
                fault: format!("HTTP {}", status.as_u16()),
                msg,
            });
        }

        let session_key = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if let Some(key) = session_key {
            self.session_key = Some(key);
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Collect properties of a single managed object, without a view.
    async fn collect_single(&mut self, obj: &MoRef, paths: &[&str]) -> VimResult<Record> {
        let spec = json!({
            "specSet": [{
                "objectSet": [{"obj": obj, "skip": false}],
                "propSet": [{
                    "type": obj.kind,
                    "all": false,
                    "pathSet": paths,
                }],
            }],
            "options": {},
        });
        let raw = self
            .invoke(
                "PropertyCollector",
                moid::PROPERTY_COLLECTOR,
                "RetrievePropertiesEx",
                spec,
            )
            .await?;
        let result: Option<WireRetrieveResult> = serde_json::from_value(raw)?;
        let mut record = Record::new();
        if let Some(result) = result {
            for object in result.objects {
                for prop in object.prop_set {
                    record.insert(prop.name, prop.val);
                }
            }
        }
        Ok(record)
    }

    fn require_property(record: &mut Record, path: &str) -> VimResult<Value> {
        record
            .remove(path)
            .ok_or_else(|| VimError::Protocol(format!("missing property {path}")))
    }
}

#[async_trait]
impl Client for RestClient {
    async fn connect(&mut self) -> VimResult<()> {
        debug!(host = %self.host, "logging in to vSphere endpoint");
        self.session_key = None;
        let body = json!({
            "userName": self.username,
            "password": self.password,
        });
        self.invoke("SessionManager", moid::SESSION_MANAGER, "Login", body)
            .await?;
        if self.session_key.is_none() {
            return Err(VimError::Protocol(
                "login response carried no session key".into(),
            ));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> VimResult<()> {
        if self.session_key.is_none() {
            return Ok(());
        }
        debug!(host = %self.host, "logging out from vSphere endpoint");
        let result = self
            .invoke(
                "SessionManager",
                moid::SESSION_MANAGER,
                "Logout",
                json!({}),
            )
            .await;
        self.session_key = None;
        if let Err(e) = result {
            warn!(host = %self.host, error = %e, "logout failed");
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.session_key.is_some()
    }

    async fn about(&mut self) -> VimResult<Record> {
        let instance = MoRef::new("ServiceInstance", moid::SERVICE_INSTANCE);
        let mut record = self.collect_single(&instance, &["content.about"]).await?;
        let about = Self::require_property(&mut record, "content.about")?;
        serde_json::from_value(about).map_err(Into::into)
    }

    async fn latest_event(&mut self) -> VimResult<Value> {
        let manager = MoRef::new("EventManager", moid::EVENT_MANAGER);
        let mut record = self.collect_single(&manager, &["latestEvent"]).await?;
        Self::require_property(&mut record, "latestEvent")
    }

    async fn session_list(&mut self) -> VimResult<Vec<Value>> {
        let manager = MoRef::new("SessionManager", moid::SESSION_MANAGER);
        let mut record = self.collect_single(&manager, &["sessionList"]).await?;
        let sessions = Self::require_property(&mut record, "sessionList")?;
        serde_json::from_value(sessions).map_err(Into::into)
    }

    async fn create_container_view(&mut self, kinds: &[MoKind]) -> VimResult<MoRef> {
        let body = json!({
            "container": MoRef::new("Folder", moid::ROOT_FOLDER),
            "type": kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "recursive": true,
        });
        let raw = self
            .invoke("ViewManager", moid::VIEW_MANAGER, "CreateContainerView", body)
            .await?;
        serde_json::from_value(raw).map_err(Into::into)
    }

    async fn create_list_view(&mut self, objs: &[MoRef]) -> VimResult<MoRef> {
        let body = json!({ "obj": objs });
        let raw = self
            .invoke("ViewManager", moid::VIEW_MANAGER, "CreateListView", body)
            .await?;
        serde_json::from_value(raw).map_err(Into::into)
    }

    async fn destroy_view(&mut self, view: &MoRef) -> VimResult<()> {
        let (kind, value) = (view.kind.clone(), view.value.clone());
        self.invoke(&kind, &value, "DestroyView", json!({})).await?;
        Ok(())
    }

    async fn retrieve_properties(
        &mut self,
        view: &MoRef,
        kind: MoKind,
        paths: &[String],
    ) -> VimResult<Vec<ObjectContent>> {
        let spec = json!({
            "specSet": [{
                "objectSet": [{
                    "obj": view,
                    "skip": true,
                    "selectSet": [{
                        "_typeName": "TraversalSpec",
                        "name": "traverseEntities",
                        "path": "view",
                        "skip": false,
                        "type": view.kind,
                    }],
                }],
                "propSet": [{
                    "type": kind.as_str(),
                    "all": paths.is_empty(),
                    "pathSet": paths,
                }],
            }],
            "options": {},
        });
        let raw = self
            .invoke(
                "PropertyCollector",
                moid::PROPERTY_COLLECTOR,
                "RetrievePropertiesEx",
                spec,
            )
            .await?;
        let mut result: Option<WireRetrieveResult> = serde_json::from_value(raw)?;

        let mut contents = Vec::new();
        while let Some(page) = result.take() {
            for object in page.objects {
                let mut props = Record::new();
                for prop in object.prop_set {
                    props.insert(prop.name, prop.val);
                }
                contents.push(ObjectContent {
                    obj: object.obj,
                    props,
                });
            }
            let Some(token) = page.token else { break };
            let raw = self
                .invoke(
                    "PropertyCollector",
                    moid::PROPERTY_COLLECTOR,
                    "ContinueRetrievePropertiesEx",
                    json!({ "token": token }),
                )
                .await?;
            result = serde_json::from_value(raw)?;
        }
        Ok(contents)
    }

    async fn query_provider_summary(&mut self, entity: &MoRef) -> VimResult<ProviderSummary> {
        let raw = self
            .invoke(
                "PerformanceManager",
                moid::PERF_MANAGER,
                "QueryPerfProviderSummary",
                json!({ "entity": entity }),
            )
            .await?;
        serde_json::from_value(raw).map_err(Into::into)
    }

    async fn query_available_metrics(
        &mut self,
        entity: &MoRef,
        interval_id: Option<i32>,
    ) -> VimResult<Vec<PerfMetricId>> {
        let mut body = json!({ "entity": entity });
        if let (Some(interval), Value::Object(map)) = (interval_id, &mut body) {
            map.insert("intervalId".into(), json!(interval));
        }
        let raw = self
            .invoke(
                "PerformanceManager",
                moid::PERF_MANAGER,
                "QueryAvailablePerfMetric",
                body,
            )
            .await?;
        if raw.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(raw).map_err(Into::into)
    }

    async fn query_perf_counters(&mut self) -> VimResult<Vec<PerfCounterInfo>> {
        let manager = MoRef::new("PerformanceManager", moid::PERF_MANAGER);
        let mut record = self.collect_single(&manager, &["perfCounter"]).await?;
        let counters = Self::require_property(&mut record, "perfCounter")?;
        serde_json::from_value(counters).map_err(Into::into)
    }

    async fn query_historical_intervals(&mut self) -> VimResult<Vec<PerfInterval>> {
        let manager = MoRef::new("PerformanceManager", moid::PERF_MANAGER);
        let mut record = self
            .collect_single(&manager, &["historicalInterval"])
            .await?;
        let intervals = Self::require_property(&mut record, "historicalInterval")?;
        serde_json::from_value(intervals).map_err(Into::into)
    }

    async fn query_perf(&mut self, spec: &PerfQuerySpec) -> VimResult<Vec<EntityMetric>> {
        let raw = self
            .invoke(
                "PerformanceManager",
                moid::PERF_MANAGER,
                "QueryPerf",
                json!({ "querySpec": [spec] }),
            )
            .await?;
        if raw.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(raw).map_err(Into::into)
    }

    async fn list_guest_processes(
        &mut self,
        vm: &MoRef,
        auth: &GuestAuth,
    ) -> VimResult<Vec<Value>> {
        let body = json!({
            "vm": vm,
            "auth": {
                "_typeName": "NamePasswordAuthentication",
                "interactiveSession": false,
                "username": auth.username,
                "password": auth.password,
            },
        });
        let raw = self
            .invoke(
                "GuestProcessManager",
                moid::GUEST_PROCESS_MANAGER,
                "ListProcessesInGuest",
                body,
            )
            .await?;
        if raw.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(raw).map_err(Into::into)
    }

    async fn query_vsan_host_status(&mut self, vsan_system: &MoRef) -> VimResult<VsanHostStatus> {
        let (kind, value) = (vsan_system.kind.clone(), vsan_system.value.clone());
        let raw = self.invoke(&kind, &value, "QueryHostStatus", json!({})).await?;
        serde_json::from_value(raw).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_client_starts_disconnected() {
        let client = RestClient::new("vc01.example.org", "svc", "secret").unwrap();
        assert!(!client.connected());
    }

    #[test]
    fn endpoint_urls_are_versioned() {
        let client = RestClient::new("vc01", "svc", "secret").unwrap();
        assert_eq!(
            client.url("ViewManager", "ViewManager", "CreateContainerView"),
            format!("https://vc01/sdk/vim25/{VIM_RELEASE}/ViewManager/ViewManager/CreateContainerView")
        );
    }

    #[test]
    fn retrieve_result_tolerates_missing_objects() {
        let page: WireRetrieveResult = serde_json::from_value(json!({"token": null})).unwrap();
        assert!(page.objects.is_empty());
        assert!(page.token.is_none());
    }
}
