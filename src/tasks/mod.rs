//! The catalog of read-only vSphere operations.
//!
//! Every task is a thin composition over the session primitives and
//! reduces to one of a handful of templates: discover all objects of a
//! kind, fetch one object's properties, flatten its triggered alarms,
//! chase a relationship property into a second collection, or query the
//! performance manager. The templates live here; the per-entity modules
//! supply the kind, the lookup property and any task-specific shaping.

pub mod cluster;
pub mod datacenter;
pub mod datastore;
pub mod host;
pub mod network;
pub mod resourcepool;
pub mod system;
pub mod vm;
pub mod vsan;

use serde_json::Value;
use tracing::{debug, info};

use crate::protocol::{Record, TaskReply, TaskRequest};
use crate::registry::{TaskError, TaskOutcome};
use crate::session::Session;
use crate::vim::VimError;
use crate::vim::types::{MoKind, MoRef, PerfMetricId, PerfQuerySpec, value_as_mo_refs};

/// Build the property path set for a collection: the task's defaults
/// followed by whatever the request asks for on top.
pub(crate) fn seeded_properties(request: &TaskRequest, defaults: &[&str]) -> Vec<String> {
    let mut properties: Vec<String> = defaults.iter().map(|&p| p.to_owned()).collect();
    properties.extend(request.property_paths().iter().cloned());
    properties
}

/// Coerce a JSON value into a record, dropping anything that is not an
/// object.
pub(crate) fn as_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Walk a nested path into a JSON value.
pub(crate) fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Discover all objects of `kind`, collecting `properties` for each.
pub(crate) async fn discover_objects(
    session: &mut Session,
    properties: Vec<String>,
    kind: MoKind,
) -> TaskOutcome {
    info!(host = %session.host(), kind = %kind, "discovering managed objects");

    let view = session.container_view(&[kind]).await?;
    let collected = session
        .collect_properties(&view, kind, &properties, false)
        .await;
    session.destroy_view(view).await;

    match collected {
        Ok(records) => Ok(TaskReply::ok("Successfully discovered objects", records)),
        Err(e) => Ok(TaskReply::error(format!("Cannot collect properties: {e}"))),
    }
}

/// Fetch `properties` for the single object of `kind` whose `property`
/// equals `value`.
pub(crate) async fn get_object_properties(
    session: &mut Session,
    properties: Vec<String>,
    kind: MoKind,
    property: &str,
    value: &str,
    include_mors: bool,
) -> TaskOutcome {
    info!(
        host = %session.host(),
        kind = %kind,
        object = %value,
        "retrieving properties for managed object"
    );

    let obj = match session.get_object_by_property(kind, property, value).await {
        Ok(Some(obj)) => obj,
        Ok(None) => return Ok(TaskReply::error(format!("Cannot find object {value}"))),
        Err(e) => return Ok(TaskReply::error(format!("Cannot collect properties: {e}"))),
    };

    let view = session.list_view(std::slice::from_ref(&obj)).await?;
    let collected = session
        .collect_properties(&view, kind, &properties, include_mors)
        .await;
    session.destroy_view(view).await;

    match collected {
        Ok(records) => Ok(TaskReply::ok(
            "Successfully retrieved object properties",
            records,
        )),
        Err(e) => Ok(TaskReply::error(format!("Cannot collect properties: {e}"))),
    }
}

/// Collect `paths` for an explicit set of already-known objects.
pub(crate) async fn collect_from_refs(
    session: &mut Session,
    refs: &[MoRef],
    kind: MoKind,
    paths: &[&str],
) -> Result<Vec<Record>, TaskError> {
    let paths: Vec<String> = paths.iter().map(|&p| p.to_owned()).collect();
    let view = session.list_view(refs).await?;
    let collected = session.collect_properties(&view, kind, &paths, false).await;
    session.destroy_view(view).await;
    Ok(collected?)
}

/// Fetch the first record of a get-one reply, or pass the error reply
/// through.
pub(crate) fn first_record(reply: TaskReply) -> Result<Record, TaskReply> {
    if !reply.is_success() {
        return Err(reply);
    }
    reply
        .result
        .and_then(|mut records| {
            if records.is_empty() {
                None
            } else {
                Some(records.remove(0))
            }
        })
        .ok_or_else(|| TaskReply::error("Unable to retrieve required properties"))
}

/// The datastores available to one managed object: find it by name,
/// read its `datastore` property, then collect `name` and `info.url`
/// for every referenced datastore.
pub(crate) async fn object_datastore_get(
    session: &mut Session,
    kind: MoKind,
    name: &str,
) -> TaskOutcome {
    debug!(host = %session.host(), kind = %kind, object = %name, "getting datastores for object");

    let data = get_object_properties(
        session,
        vec!["datastore".to_owned()],
        kind,
        "name",
        name,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let refs = props
        .get("datastore")
        .map(value_as_mo_refs)
        .unwrap_or_default();
    let records =
        collect_from_refs(session, &refs, MoKind::Datastore, &["name", "info.url"]).await?;

    Ok(TaskReply::ok("Successfully discovered objects", records))
}

/// The seven-key flattening of one triggered alarm state.
fn flatten_alarm(alarm: &Value) -> Record {
    let field = |path: &[&str]| nested(alarm, path).cloned().unwrap_or(Value::Null);
    let mut record = Record::new();
    record.insert("key".into(), field(&["key"]));
    record.insert("info".into(), field(&["alarm", "info", "name"]));
    record.insert("time".into(), field(&["time"]));
    record.insert("entity".into(), field(&["entity", "name"]));
    record.insert("acknowledged".into(), field(&["acknowledged"]));
    record.insert("overallStatus".into(), field(&["overallStatus"]));
    record.insert("acknowledgedByUser".into(), field(&["acknowledgedByUser"]));
    record
}

/// Triggered alarms for the single object of `kind` identified by
/// `property == value`.
pub(crate) async fn object_alarm_get(
    session: &mut Session,
    kind: MoKind,
    property: &str,
    value: &str,
) -> TaskOutcome {
    debug!(host = %session.host(), kind = %kind, object = %value, "retrieving alarms");

    let data = get_object_properties(
        session,
        vec!["triggeredAlarmState".to_owned()],
        kind,
        property,
        value,
        false,
    )
    .await?;
    let props = match first_record(data) {
        Ok(props) => props,
        Err(reply) => return Ok(reply),
    };

    let result = props
        .get("triggeredAlarmState")
        .and_then(Value::as_array)
        .map(|alarms| alarms.iter().map(flatten_alarm).collect())
        .unwrap_or_default();

    Ok(TaskReply::ok("Successfully retrieved alarms", result))
}

/// Metrics available for a performance provider, optionally filtered by
/// a requested counter name.
pub(crate) async fn entity_perf_metric_info(
    session: &mut Session,
    entity: &MoRef,
    entity_name: &str,
    counter_name: Option<&str>,
) -> TaskOutcome {
    let requested = match counter_name {
        Some(name) => match session.counter_by_name(name).await? {
            Some(counter) => Some(counter),
            None => return Ok(TaskReply::error("Unknown performance counter requested")),
        },
        None => None,
    };

    let summary = session.provider_summary(entity).await?;
    debug!(
        host = %session.host(),
        entity = %entity_name,
        current = summary.current_supported,
        historical = summary.summary_supported,
        "queried provider summary"
    );

    let interval_id = summary
        .current_supported
        .then_some(summary.refresh_rate);
    let metrics = match session.available_metrics(entity, interval_id).await {
        Ok(metrics) => metrics,
        Err(e @ VimError::Fault { .. }) => {
            return Ok(TaskReply::error(format!(
                "Cannot retrieve performance metrics for {entity_name}: {e}"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let mut result = Vec::new();
    for metric in metrics {
        if let Some(counter) = &requested {
            if metric.counter_id != counter.key {
                continue;
            }
        }
        // Translate numeric counter ids into the dotted name form used
        // on the external interface; ids absent from the catalog keep
        // their numeric form.
        let counter_id = match session.counter_by_id(metric.counter_id).await? {
            Some(counter) => Value::String(counter.dotted_name()),
            None => Value::from(metric.counter_id),
        };
        let mut record = Record::new();
        record.insert("counterId".into(), counter_id);
        record.insert("instance".into(), Value::String(metric.instance));
        result.push(record);
    }

    Ok(TaskReply::ok(
        "Successfully retrieved performance metrics",
        result,
    ))
}

/// Collect performance samples for a provider entity.
///
/// Real-time providers default to their refresh rate; historical-only
/// providers require a named interval. A named interval always takes
/// precedence and is resolved against the endpoint's interval list.
pub(crate) async fn entity_perf_metric_get(
    session: &mut Session,
    entity: &MoRef,
    entity_name: &str,
    request: &TaskRequest,
) -> TaskOutcome {
    let Some(counter_name) = request.counter_name.as_deref() else {
        return Ok(TaskReply::error("Unknown performance counter requested"));
    };
    info!(
        host = %session.host(),
        entity = %entity_name,
        counter = %counter_name,
        "retrieving performance metric"
    );

    let summary = session.provider_summary(entity).await?;
    let interval_name = request.perf_interval.as_deref();

    if !summary.current_supported && interval_name.is_none() {
        return Ok(TaskReply::error(format!(
            "No historical performance interval provided for entity {entity_name}"
        )));
    }

    let interval_id = match interval_name {
        Some(name) => {
            let intervals = session.perf_intervals().await?;
            match intervals.iter().find(|i| i.name == name) {
                Some(interval) => interval.sampling_period,
                None => {
                    return Ok(TaskReply::error(format!(
                        "Historical interval {name} does not exists"
                    )));
                }
            }
        }
        None => summary.refresh_rate,
    };

    let Some(counter) = session.counter_by_name(counter_name).await? else {
        return Ok(TaskReply::error("Unknown performance counter requested"));
    };

    let spec = PerfQuerySpec {
        entity: entity.clone(),
        max_sample: request.max_sample.unwrap_or(1).max(1),
        metric_id: vec![PerfMetricId {
            counter_id: counter.key,
            instance: request.instance.clone().unwrap_or_default(),
        }],
        interval_id,
    };
    let data = session.query_perf(&spec).await?;

    let mut result = Vec::new();
    for entity_metric in data {
        for series in &entity_metric.value {
            for (sample, value) in entity_metric.sample_info.iter().zip(&series.value) {
                let mut record = Record::new();
                record.insert("interval".into(), Value::from(sample.interval));
                record.insert(
                    "timestamp".into(),
                    Value::String(sample.timestamp.to_rfc3339()),
                );
                record.insert("counterId".into(), Value::String(counter_name.to_owned()));
                record.insert("instance".into(), Value::String(series.id.instance.clone()));
                record.insert("value".into(), Value::from(*value));
                result.push(record);
            }
        }
    }

    Ok(TaskReply::ok(
        "Successfully retrieved performance metrics",
        result,
    ))
}

/// Resolve an entity by a lookup property, then delegate to the perf
/// metric-get template.
pub(crate) async fn lookup_perf_metric_get(
    session: &mut Session,
    kind: MoKind,
    property: &str,
    request: &TaskRequest,
) -> TaskOutcome {
    let Some(name) = request.name.as_deref() else {
        return Ok(TaskReply::error("Cannot find object"));
    };
    let Some(entity) = session.get_object_by_property(kind, property, name).await? else {
        return Ok(TaskReply::error(format!("Cannot find object: {name}")));
    };
    entity_perf_metric_get(session, &entity, name, request).await
}

/// Resolve an entity by a lookup property, then delegate to the perf
/// metric-info template.
pub(crate) async fn lookup_perf_metric_info(
    session: &mut Session,
    kind: MoKind,
    property: &str,
    request: &TaskRequest,
) -> TaskOutcome {
    let Some(name) = request.name.as_deref() else {
        return Ok(TaskReply::error("Cannot find object"));
    };
    let Some(entity) = session.get_object_by_property(kind, property, name).await? else {
        return Ok(TaskReply::error(format!("Cannot find object {name}")));
    };
    entity_perf_metric_info(session, &entity, name, request.counter_name.as_deref()).await
}
