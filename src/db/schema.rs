//! Relational schema for the favorites store
//!
//! Table and column names are the wire contract with the primary store.

use super::Database;
use crate::error::StoreResult;

pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    upk         TEXT PRIMARY KEY,
    version     BIGINT NOT NULL DEFAULT 0,
    deleted     BOOLEAN,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ
)"#;

pub const CREATE_ASSET_TYPES: &str = r#"
CREATE TABLE IF NOT EXISTS asset_types (
    name        TEXT PRIMARY KEY,
    deleted     BOOLEAN,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ
)"#;

pub const CREATE_ASSETS: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    isin        TEXT PRIMARY KEY,
    asset_type  TEXT NOT NULL REFERENCES asset_types(name),
    deleted     BOOLEAN,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ
)"#;

pub const CREATE_FAVORITES: &str = r#"
CREATE TABLE IF NOT EXISTS favorites (
    id          UUID NOT NULL,
    isin        TEXT NOT NULL REFERENCES assets(isin),
    user_upk    TEXT NOT NULL REFERENCES users(upk),
    version     BIGINT,
    deleted     BOOLEAN,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ,
    UNIQUE (isin, user_upk)
)"#;

pub const CREATE_FAVORITES_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS favorites_user_upk_idx ON favorites (user_upk)";

/// Creation order respects foreign keys
pub const SCHEMA: &[&str] = &[
    CREATE_USERS,
    CREATE_ASSET_TYPES,
    CREATE_ASSETS,
    CREATE_FAVORITES,
    CREATE_FAVORITES_USER_INDEX,
];

/// Create all tables if they do not exist
pub async fn init_schema(db: &Database) -> StoreResult<()> {
    let mut conn = db.acquire().await?;
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }
    tracing::info!("Relational schema initialized ({} statements)", SCHEMA.len());
    Ok(())
}
