//! Per-endpoint vSphere sessions.
//!
//! A worker owns one [`Session`] per configured upstream host. The
//! session wraps the upstream [`Client`], tracks connection state for the
//! reconnect-on-demand policy, and caches the performance counter and
//! historical interval catalogs on first access.
//!
//! Views returned by [`Session::container_view`] and
//! [`Session::list_view`] are scoped to the current call: callers destroy
//! them before returning, including on error paths.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::protocol::Record;
use crate::vim::types::{
    EntityMetric, GuestAuth, MoKind, MoRef, PerfCounterInfo, PerfInterval, PerfMetricId,
    PerfQuerySpec, ProviderSummary, VsanHostStatus,
};
use crate::vim::{Client, VimResult};

/// A long-lived session to one vSphere endpoint.
pub struct Session {
    host: String,
    client: Box<dyn Client>,
    perf_counters: Option<Vec<PerfCounterInfo>>,
    perf_intervals: Option<Vec<PerfInterval>>,
}

impl Session {
    /// Wrap an upstream client for the given host.
    #[must_use]
    pub fn new(host: impl Into<String>, client: Box<dyn Client>) -> Self {
        Self {
            host: host.into(),
            client,
            perf_counters: None,
            perf_intervals: None,
        }
    }

    /// The upstream host this session talks to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the underlying client holds an established connection.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.client.connected()
    }

    /// Make sure the session is connected, reconnecting when needed.
    ///
    /// # Errors
    /// Returns the connect error; the session is left disconnected and
    /// the next request will retry.
    pub async fn ensure_connected(&mut self) -> VimResult<()> {
        if self.client.connected() {
            return Ok(());
        }
        info!(host = %self.host, "session not connected, reconnecting");
        // Drop any half-open state before dialing again.
        self.client.disconnect().await.ok();
        self.client.connect().await
    }

    /// Tear the session down.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            warn!(host = %self.host, error = %e, "disconnect failed");
        }
    }

    /// Create a container view rooted at the inventory root, scoped to
    /// the given managed-object kinds.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn container_view(&mut self, kinds: &[MoKind]) -> VimResult<MoRef> {
        self.client.create_container_view(kinds).await
    }

    /// Create a list view covering exactly the given objects.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn list_view(&mut self, objs: &[MoRef]) -> VimResult<MoRef> {
        self.client.create_list_view(objs).await
    }

    /// Destroy a view. Failures are logged, not propagated: the view is
    /// dead to the caller either way.
    pub async fn destroy_view(&mut self, view: MoRef) {
        if let Err(e) = self.client.destroy_view(&view).await {
            warn!(host = %self.host, view = %view.value, error = %e, "failed to destroy view");
        }
    }

    /// Collect `paths` for every object of type `kind` reachable from
    /// `view`. With `include_mors` the object reference is added to each
    /// record under the key `obj`. An empty path set collects every
    /// property.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn collect_properties(
        &mut self,
        view: &MoRef,
        kind: MoKind,
        paths: &[String],
        include_mors: bool,
    ) -> VimResult<Vec<Record>> {
        debug!(host = %self.host, kind = %kind, "collecting properties");
        if paths.is_empty() {
            warn!(
                host = %self.host,
                kind = %kind,
                "retrieving all properties for objects, this might take a while"
            );
        }
        let contents = self.client.retrieve_properties(view, kind, paths).await?;
        let mut records = Vec::with_capacity(contents.len());
        for content in contents {
            let mut record = content.props;
            if include_mors {
                record.insert("obj".into(), serde_json::to_value(&content.obj)?);
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Find the first object of type `kind` whose `property` equals
    /// `value`. Linear in the inventory size.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn get_object_by_property(
        &mut self,
        kind: MoKind,
        property: &str,
        value: &str,
    ) -> VimResult<Option<MoRef>> {
        let view = self.container_view(&[kind]).await?;
        let result = self
            .client
            .retrieve_properties(&view, kind, &[property.to_owned()])
            .await;
        self.destroy_view(view).await;
        let contents = result?;
        Ok(contents
            .into_iter()
            .find(|content| {
                content
                    .props
                    .get(property)
                    .and_then(Value::as_str)
                    .is_some_and(|v| v == value)
            })
            .map(|content| content.obj))
    }

    /// The cached performance counter catalog.
    ///
    /// # Errors
    /// Returns any upstream failure while populating the cache.
    pub async fn perf_counters(&mut self) -> VimResult<&[PerfCounterInfo]> {
        if self.perf_counters.is_none() {
            debug!(host = %self.host, "loading performance counter catalog");
            self.perf_counters = Some(self.client.query_perf_counters().await?);
        }
        Ok(self.perf_counters.as_deref().unwrap_or_default())
    }

    /// The cached historical interval list.
    ///
    /// # Errors
    /// Returns any upstream failure while populating the cache.
    pub async fn perf_intervals(&mut self) -> VimResult<&[PerfInterval]> {
        if self.perf_intervals.is_none() {
            debug!(host = %self.host, "loading historical interval list");
            self.perf_intervals = Some(self.client.query_historical_intervals().await?);
        }
        Ok(self.perf_intervals.as_deref().unwrap_or_default())
    }

    /// Translate a dotted `group.name.unit.rollup` counter name to its
    /// catalog entry.
    ///
    /// # Errors
    /// Returns any upstream failure while populating the cache.
    pub async fn counter_by_name(&mut self, name: &str) -> VimResult<Option<PerfCounterInfo>> {
        Ok(self
            .perf_counters()
            .await?
            .iter()
            .find(|c| c.dotted_name() == name)
            .cloned())
    }

    /// Translate a numeric counter id to its catalog entry.
    ///
    /// # Errors
    /// Returns any upstream failure while populating the cache.
    pub async fn counter_by_id(&mut self, id: i32) -> VimResult<Option<PerfCounterInfo>> {
        Ok(self
            .perf_counters()
            .await?
            .iter()
            .find(|c| c.key == id)
            .cloned())
    }

    /// Query the performance-provider capabilities of an entity.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn provider_summary(&mut self, entity: &MoRef) -> VimResult<ProviderSummary> {
        self.client.query_provider_summary(entity).await
    }

    /// Query the metrics available for an entity at an interval.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn available_metrics(
        &mut self,
        entity: &MoRef,
        interval_id: Option<i32>,
    ) -> VimResult<Vec<PerfMetricId>> {
        self.client.query_available_metrics(entity, interval_id).await
    }

    /// Run a performance query.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn query_perf(&mut self, spec: &PerfQuerySpec) -> VimResult<Vec<EntityMetric>> {
        self.client.query_perf(spec).await
    }

    /// The service-instance `about` record.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn about(&mut self) -> VimResult<Record> {
        self.client.about().await
    }

    /// The latest event registered on the endpoint.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn latest_event(&mut self) -> VimResult<Value> {
        self.client.latest_event().await
    }

    /// The established upstream API sessions.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn session_list(&mut self) -> VimResult<Vec<Value>> {
        self.client.session_list().await
    }

    /// List processes running inside a virtual machine's guest.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn guest_processes(
        &mut self,
        vm: &MoRef,
        auth: &GuestAuth,
    ) -> VimResult<Vec<Value>> {
        self.client.list_guest_processes(vm, auth).await
    }

    /// Query the vSAN status of a host's vSAN system object.
    ///
    /// # Errors
    /// Returns any upstream failure.
    pub async fn vsan_host_status(&mut self, vsan_system: &MoRef) -> VimResult<VsanHostStatus> {
        self.client.query_vsan_host_status(vsan_system).await
    }
}
