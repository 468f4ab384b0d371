//! Resource pool tasks.

use super::{discover_objects, get_object_properties, seeded_properties};
use crate::protocol::TaskRequest;
use crate::registry::TaskOutcome;
use crate::session::Session;
use crate::vim::types::MoKind;

/// `resource.pool.discover` — all resource pools on the endpoint.
pub(crate) async fn discover(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let properties = seeded_properties(request, &["name"]);
    discover_objects(session, properties, MoKind::ResourcePool).await
}

/// `resource.pool.get` — properties of one resource pool.
pub(crate) async fn get(session: &mut Session, request: &TaskRequest) -> TaskOutcome {
    let name = request.name.clone().unwrap_or_default();
    let properties = seeded_properties(request, &["name"]);
    get_object_properties(session, properties, MoKind::ResourcePool, "name", &name, false).await
}
