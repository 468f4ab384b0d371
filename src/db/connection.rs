//! Connection helpers for the credential store.

use std::error::Error as StdError;

use diesel::result::{Error as DieselError, QueryResult};
use diesel::sqlite::SqliteConnection;
use diesel_async::AsyncConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

/// Embedded credential-store migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Connection type for credential-store access.
pub type DbConnection = SyncConnectionWrapper<SqliteConnection>;

/// Open a connection to the credential store at `database_url`.
///
/// # Errors
/// Returns any connection error reported by Diesel.
pub async fn establish(database_url: &str) -> diesel::ConnectionResult<DbConnection> {
    DbConnection::establish(database_url).await
}

/// Run any pending embedded migrations.
///
/// # Errors
/// Returns any error produced by Diesel while running migrations.
pub async fn run_migrations(conn: &mut DbConnection) -> QueryResult<()> {
    conn.spawn_blocking(|c| {
        if let Ok(false) = c.has_pending_migration(MIGRATIONS) {
            return Ok(());
        }
        info!("applying pending credential store migrations");
        c.run_pending_migrations(MIGRATIONS)
            .map(|_| ())
            .map_err(|e: Box<dyn StdError + Send + Sync>| DieselError::SerializationError(e))
    })
    .await
}
