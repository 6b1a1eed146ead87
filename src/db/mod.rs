//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: rows and the typed view over the flat `config` table
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: counter and key/value operations

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{ApiSettings, ConfigKey, ContactSettings, DbConfigEntry, SiteSettings};
pub use schema::SQLITE_INIT;
pub use sqlite::{SiteStorage, SqlitePool};
