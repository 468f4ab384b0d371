//! Endpoint record helpers.

use diesel::prelude::*;
use diesel::result::QueryResult;
use diesel_async::RunQueryDsl;

use super::connection::DbConnection;
use crate::models::{Endpoint, NewEndpoint};

/// Fetch registered endpoints, optionally restricted to enabled ones.
///
/// # Errors
/// Returns any error produced by the underlying query.
pub async fn get_endpoints(
    conn: &mut DbConnection,
    only_enabled: bool,
) -> QueryResult<Vec<Endpoint>> {
    use crate::schema::hosts::dsl::{enabled, hosts};
    if only_enabled {
        hosts
            .filter(enabled.eq(1))
            .load::<Endpoint>(conn)
            .await
    } else {
        hosts.load::<Endpoint>(conn).await
    }
}

/// Register an endpoint, replacing any existing row for the same host.
///
/// # Errors
/// Returns any error produced by the insertion query.
pub async fn add_update_endpoint(
    conn: &mut DbConnection,
    endpoint: &NewEndpoint<'_>,
) -> QueryResult<usize> {
    use crate::schema::hosts::dsl::hosts;
    diesel::replace_into(hosts).values(endpoint).execute(conn).await
}

/// Flip the enabled flag of one endpoint.
///
/// # Errors
/// Returns any error produced by the update query.
pub async fn set_endpoint_enabled(
    conn: &mut DbConnection,
    name: &str,
    value: bool,
) -> QueryResult<usize> {
    use crate::schema::hosts::dsl::{enabled, host, hosts};
    diesel::update(hosts.filter(host.eq(name)))
        .set(enabled.eq(i32::from(value)))
        .execute(conn)
        .await
}

/// Remove an endpoint.
///
/// # Errors
/// Returns any error produced by the delete query.
pub async fn remove_endpoint(conn: &mut DbConnection, name: &str) -> QueryResult<usize> {
    use crate::schema::hosts::dsl::{host, hosts};
    diesel::delete(hosts.filter(host.eq(name))).execute(conn).await
}
