//! The credential store.
//!
//! A small sqlite database with one table: registered vSphere endpoints
//! and the credentials workers use to establish sessions. Workers read
//! it once at startup; the `vqd endpoint` subcommands administer it.

mod connection;
mod endpoints;

pub use self::connection::{DbConnection, MIGRATIONS, establish, run_migrations};
pub use self::endpoints::{
    add_update_endpoint, get_endpoints, remove_endpoint, set_endpoint_enabled,
};
