//! Connection pool and migrations.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{Error, Result};

/// Migrations compiled from the `migrations/` directory.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Applies pragmas to every pooled connection.
#[derive(Debug, Clone, Copy)]
struct Pragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for Pragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA busy_timeout = 5000")
            .execute(conn)
            .and_then(|_| diesel::sql_query("PRAGMA foreign_keys = ON").execute(conn))
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open a pool for `database_url` and bring the schema up to date.
///
/// `:memory:` databases are private to a connection, so the pool is pinned
/// to a single connection for them.
///
/// # Errors
///
/// Returns an error if the pool cannot be built or a migration fails.
pub fn open(database_url: &str) -> Result<DbPool> {
    let max_size = if database_url == ":memory:" { 1 } else { 4 };
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(Pragmas))
        .build(ConnectionManager::<SqliteConnection>::new(database_url))
        .map_err(|e| Error::Connection(e.to_string()))?;

    let mut conn = pool.get().map_err(|e| Error::Connection(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Database(e.to_string()))?;
    drop(conn);
    Ok(pool)
}
