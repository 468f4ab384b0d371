//! Diesel ORM models for the credential store.
//!
//! One row per upstream vSphere endpoint: the host name workers route
//! requests by, the credentials used to establish the session, and an
//! enabled flag so endpoints can be parked without deleting them.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A registered vSphere endpoint.
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::hosts)]
pub struct Endpoint {
    /// Endpoint host name, unique.
    pub host: String,
    /// Username for the upstream session.
    pub user: String,
    /// Password for the upstream session.
    pub pwd: String,
    /// Non-zero when workers should create a session for this endpoint.
    pub enabled: i32,
}

impl Endpoint {
    /// Whether workers should create a session for this endpoint.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }
}

/// Parameters for registering or updating an endpoint.
#[derive(Insertable, Deserialize)]
#[diesel(table_name = crate::schema::hosts)]
pub struct NewEndpoint<'a> {
    /// Endpoint host name.
    pub host: &'a str,
    /// Username for the upstream session.
    pub user: &'a str,
    /// Password for the upstream session.
    pub pwd: &'a str,
    /// Non-zero to enable the endpoint.
    pub enabled: i32,
}
