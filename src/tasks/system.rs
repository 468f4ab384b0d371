//! Endpoint-level tasks: service information, events, API sessions and
//! the performance catalogs.

use serde_json::Value;
use tracing::info;

use super::as_record;
use crate::protocol::{Record, TaskReply, TaskRequest};
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::VimError;

/// `about` — service-instance information.
///
/// With no `properties` in the request only `fullName` is returned.
pub(crate) async fn about(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    info!(host = %session.host(), "retrieving vSphere about information");

    let default_properties = ["fullName".to_owned()];
    let properties: &[String] = match request.property_paths() {
        [] => &default_properties,
        paths => paths,
    };
    let about = session.about().await?;

    let mut record = Record::new();
    for property in properties {
        let value = about
            .get(property)
            .cloned()
            .unwrap_or_else(|| Value::String("(null)".to_owned()));
        record.insert(property.clone(), value);
    }

    Ok(TaskReply::ok(
        "Successfully retrieved properties",
        vec![record],
    ))
}

/// `event.latest` — the most recent event registered on the endpoint.
pub(crate) async fn event_latest(session: &mut Session, _request: &TaskRequest) -> TaskOutcome {
    info!(host = %session.host(), "retrieving latest registered event");

    let event = session.latest_event().await?;
    let message = event
        .get("fullFormattedMessage")
        .cloned()
        .unwrap_or(Value::Null);

    let mut record = Record::new();
    record.insert("event".into(), message);

    Ok(TaskReply::ok("Successfully retrieved event", vec![record]))
}

/// Session properties reported by `session.get`.
const SESSION_PROPERTIES: [&str; 8] = [
    "key",
    "userName",
    "fullName",
    "loginTime",
    "lastActiveTime",
    "ipAddress",
    "userAgent",
    "callCount",
];

/// `session.get` — the API sessions established on the endpoint.
pub(crate) async fn session_get(session: &mut Session, _request: &TaskRequest) -> TaskOutcome {
    info!(host = %session.host(), "retrieving established sessions");

    let sessions = match session.session_list().await {
        Ok(sessions) => sessions,
        Err(VimError::NoPermission) => {
            return Ok(TaskReply::error(
                "No permissions to view established sessions",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let result = sessions
        .iter()
        .map(|entry| {
            let mut record = Record::new();
            for property in SESSION_PROPERTIES {
                let value = entry.get(property).cloned().unwrap_or(Value::Null);
                record.insert(property.to_owned(), value);
            }
            record
        })
        .collect();

    Ok(TaskReply::ok("Successfully retrieved sessions", result))
}

/// `perf.metric.info` — the full performance counter catalog.
pub(crate) async fn perf_metric_info(session: &mut Session, _request: &TaskRequest) -> TaskOutcome {
    info!(host = %session.host(), "retrieving supported performance counters");

    let counters = session.perf_counters().await?.to_vec();
    let result = counters
        .iter()
        .map(|counter| as_record(serde_json::to_value(counter).unwrap_or(Value::Null)))
        .collect();

    Ok(TaskReply::ok(
        "Successfully retrieved performance metrics info",
        result,
    ))
}

/// `perf.interval.info` — the configured historical intervals.
pub(crate) async fn perf_interval_info(
    session: &mut Session,
    _request: &TaskRequest,
) -> TaskOutcome {
    info!(host = %session.host(), "retrieving performance historical intervals");

    let intervals = session.perf_intervals().await?.to_vec();
    let result = intervals
        .iter()
        .map(|interval| as_record(serde_json::to_value(interval).unwrap_or(Value::Null)))
        .collect();

    Ok(TaskReply::ok(
        "Successfully retrieved performance historical intervals",
        result,
    ))
}
