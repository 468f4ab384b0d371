//! The process-global task registry.
//!
//! Every read operation the daemon serves is registered here at startup:
//! a task name, the request keys the handler requires beyond `method` and
//! `hostname`, and the handler itself. The registry is immutable once
//! built; lookup is by name. Unexpected handler failures are converted
//! into error replies centrally so that no request can crash a worker.

use std::collections::HashMap;
use std::error::Error as _;
use std::sync::LazyLock;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

use crate::protocol::{RequestKey, TaskReply, TaskRequest};
use crate::session::Session;
use crate::tasks;
use crate::vim::VimError;

/// An unexpected failure escaping a task handler.
///
/// Domain-level conditions (object not found, missing preconditions) are
/// expressed as error replies by the handlers themselves; this type only
/// carries failures the handler did not account for.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Upstream call failure.
    #[error(transparent)]
    Vim(#[from] VimError),
    /// Result serialization failure.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a task handler invocation.
pub type TaskOutcome = Result<TaskReply, TaskError>;

/// A registered task handler.
pub type TaskHandler =
    for<'a> fn(&'a mut Session, &'a TaskRequest) -> BoxFuture<'a, TaskOutcome>;

/// A task descriptor: name, required request keys, handler.
pub struct TaskDef {
    /// Registered task name, e.g. `host.discover`.
    pub name: &'static str,
    /// Request keys the handler requires beyond `method` and `hostname`.
    pub required: &'static [RequestKey],
    /// The handler.
    pub handler: TaskHandler,
}

impl TaskDef {
    /// Whether the request carries every key this task requires.
    #[must_use]
    pub fn validate(&self, request: &TaskRequest) -> bool {
        self.required.iter().all(|key| key.is_present(request))
    }

    /// Run the handler, converting any escaping error into an error
    /// reply carrying the error chain.
    pub async fn run(&self, session: &mut Session, request: &TaskRequest) -> TaskReply {
        match (self.handler)(session, request).await {
            Ok(reply) => reply,
            Err(e) => {
                let traceback = error_chain(&e);
                warn!(task = self.name, error = %traceback, "task failed");
                TaskReply {
                    success: 1,
                    msg: format!("Task {} failed", self.name),
                    result: None,
                    traceback: Some(traceback),
                }
            }
        }
    }
}

/// Render an error and its source chain as a single string.
fn error_chain(error: &TaskError) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// The immutable name → descriptor table.
pub struct TaskRegistry {
    tasks: HashMap<&'static str, TaskDef>,
}

/// Wrap an `async fn(&mut Session, &TaskRequest) -> TaskOutcome` handler
/// into the boxed-future form the registry stores.
macro_rules! handler {
    ($f:path) => {{
        fn wrapper<'a>(
            session: &'a mut Session,
            request: &'a TaskRequest,
        ) -> BoxFuture<'a, TaskOutcome> {
            Box::pin($f(session, request))
        }
        wrapper as TaskHandler
    }};
}

/// Register one task: name, required keys, handler path.
macro_rules! task {
    ($registry:expr, $name:literal, [$($key:ident),*], $f:path) => {
        $registry.register(TaskDef {
            name: $name,
            required: &[$(RequestKey::$key),*],
            handler: handler!($f),
        });
    };
}

impl TaskRegistry {
    fn empty() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Add a descriptor to the table. Later registrations of the same
    /// name replace earlier ones; the built-in catalog has no duplicates.
    pub fn register(&mut self, def: TaskDef) {
        self.tasks.insert(def.name, def);
    }

    /// Look a task up by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    /// All registered task names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tasks.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Build the complete built-in task catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let mut r = Self::empty();

        task!(r, "about", [], tasks::system::about);
        task!(r, "event.latest", [], tasks::system::event_latest);
        task!(r, "session.get", [], tasks::system::session_get);
        task!(r, "perf.metric.info", [], tasks::system::perf_metric_info);
        task!(r, "perf.interval.info", [], tasks::system::perf_interval_info);

        task!(r, "net.discover", [], tasks::network::net_discover);
        task!(r, "net.get", [Name], tasks::network::net_get);
        task!(r, "net.host.get", [Name], tasks::network::net_host_get);
        task!(r, "net.vm.get", [Name], tasks::network::net_vm_get);

        task!(r, "datacenter.discover", [], tasks::datacenter::discover);
        task!(r, "datacenter.get", [Name, Properties], tasks::datacenter::get);
        task!(r, "datacenter.alarm.get", [Name], tasks::datacenter::alarm_get);
        task!(
            r,
            "datacenter.perf.metric.get",
            [Name, CounterName, PerfInterval],
            tasks::datacenter::perf_metric_get
        );
        task!(
            r,
            "datacenter.perf.metric.info",
            [],
            tasks::datacenter::perf_metric_info
        );

        task!(r, "cluster.discover", [], tasks::cluster::discover);
        task!(r, "cluster.get", [Name, Properties], tasks::cluster::get);
        task!(r, "cluster.alarm.get", [Name], tasks::cluster::alarm_get);
        task!(
            r,
            "cluster.perf.metric.get",
            [Name, CounterName, PerfInterval],
            tasks::cluster::perf_metric_get
        );
        task!(
            r,
            "cluster.perf.metric.info",
            [],
            tasks::cluster::perf_metric_info
        );

        task!(r, "resource.pool.discover", [], tasks::resourcepool::discover);
        task!(
            r,
            "resource.pool.get",
            [Name, Properties],
            tasks::resourcepool::get
        );

        task!(r, "host.discover", [], tasks::host::discover);
        task!(r, "host.get", [Name, Properties], tasks::host::get);
        task!(r, "host.alarm.get", [Name], tasks::host::alarm_get);
        task!(
            r,
            "host.perf.metric.get",
            [Name, CounterName],
            tasks::host::perf_metric_get
        );
        task!(r, "host.perf.metric.info", [Name], tasks::host::perf_metric_info);
        task!(r, "host.cluster.get", [Name], tasks::host::cluster_get);
        task!(r, "host.vm.get", [Name], tasks::host::vm_get);
        task!(r, "host.net.get", [Name], tasks::host::net_get);
        task!(r, "host.datastore.get", [Name], tasks::host::datastore_get);

        task!(r, "vm.discover", [], tasks::vm::discover);
        task!(r, "vm.get", [Name, Properties], tasks::vm::get);
        task!(r, "vm.alarm.get", [Name], tasks::vm::alarm_get);
        task!(
            r,
            "vm.perf.metric.get",
            [Name, CounterName],
            tasks::vm::perf_metric_get
        );
        task!(r, "vm.perf.metric.info", [], tasks::vm::perf_metric_info);
        task!(r, "vm.disk.discover", [Name], tasks::vm::disk_discover);
        task!(r, "vm.disk.get", [Name], tasks::vm::disk_get);
        task!(r, "vm.guest.net.get", [Name], tasks::vm::guest_net_get);
        task!(r, "vm.net.get", [Name], tasks::vm::net_get);
        task!(r, "vm.snapshot.get", [Name], tasks::vm::snapshot_get);
        task!(r, "vm.host.get", [Name], tasks::vm::host_get);
        task!(r, "vm.datastore.get", [Name], tasks::vm::datastore_get);
        task!(
            r,
            "vm.process.get",
            [Name, Username, Password],
            tasks::vm::process_get
        );
        task!(r, "vm.cpu.usage.percent", [Name], tasks::vm::cpu_usage_percent);

        task!(r, "datastore.discover", [], tasks::datastore::discover);
        task!(r, "datastore.get", [Name, Properties], tasks::datastore::get);
        task!(r, "datastore.alarm.get", [Name], tasks::datastore::alarm_get);
        task!(r, "datastore.host.get", [Name], tasks::datastore::host_get);
        task!(r, "datastore.vm.get", [Name], tasks::datastore::vm_get);
        task!(
            r,
            "datastore.perf.metric.get",
            [Name, CounterName],
            tasks::datastore::perf_metric_get
        );
        task!(
            r,
            "datastore.perf.metric.info",
            [Name],
            tasks::datastore::perf_metric_info
        );

        task!(r, "vsan.health.get", [Name], tasks::vsan::health_get);

        r
    }
}

static REGISTRY: LazyLock<TaskRegistry> = LazyLock::new(TaskRegistry::builtin);

/// The shared, immutable task registry.
#[must_use]
pub fn registry() -> &'static TaskRegistry {
    &REGISTRY
}
