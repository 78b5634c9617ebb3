#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database connection, queries, and migrations for dd-node.
//!
//! Uses `switchy_database` for raw parameterised SQL and `switchy_schema`
//! for embedded SQL migrations. `PostGIS` geometries are exchanged as
//! `GeoJSON` text via `ST_AsGeoJSON` / `ST_GeomFromGeoJSON`.

pub mod db;
pub mod locations;
pub mod reference;
pub mod search;
pub mod timeseries;

mod rows;
mod sql;

use include_dir::{Dir, include_dir};
use switchy_database::Database;
use switchy_schema::discovery::embedded::EmbeddedMigrationSource;
use switchy_schema::runner::MigrationRunner;
use uuid::Uuid;

/// Embedded SQL migrations from the `migrations/` directory.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] switchy_schema::MigrationError),

    /// JSON column or parameter error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A referenced row does not exist.
    #[error("Unknown {kind} '{key}'")]
    UnknownReference {
        /// What was referenced, e.g. `location`.
        kind: &'static str,
        /// The key it was referenced by.
        key: String,
    },

    /// Another write changed the row since its version was read.
    #[error("Resource {uuid} is no longer at version {expected}")]
    VersionConflict {
        /// The location or timeseries being written.
        uuid: Uuid,
        /// The version the writer expected.
        expected: i64,
    },
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub async fn run_migrations(db: &dyn Database) -> Result<(), DbError> {
    let source = EmbeddedMigrationSource::new(&MIGRATIONS_DIR);
    let runner = MigrationRunner::new(Box::new(source));
    runner.run(db).await?;
    log::info!("Database migrations completed successfully");
    Ok(())
}
