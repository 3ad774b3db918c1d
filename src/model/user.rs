//! Favorites owner, keyed by the opaque user-personal-key (upk)
//!
//! `version` is the conflict-resolution clock between the two stores. Every
//! write touching the user's favorites moves it forward by exactly one.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;

use super::{JsonCodec, Keyed, SqlBindable, TAttributes, USER_COLUMNS};
use crate::db::{SafeRow, Statement};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub upk: String,
    pub version: i64,
    #[serde(flatten)]
    pub attributes: TAttributes,
}

impl User {
    /// Never-written user at version 0
    pub fn new(upk: impl Into<String>) -> Self {
        Self::with_attributes(upk, 0, TAttributes::new())
    }

    pub fn with_attributes(upk: impl Into<String>, version: i64, attributes: TAttributes) -> Self {
        Self {
            upk: upk.into(),
            version,
            attributes,
        }
    }

    /// Create at version 1 or advance the stored version by one
    pub fn bump_version(&self) -> Statement {
        Statement::new(
            "INSERT INTO users AS u (upk, version, deleted, created_at) VALUES ($1, 1, FALSE, NOW()) \
             ON CONFLICT (upk) DO UPDATE SET version = u.version + 1, updated_at = NOW()",
            vec![self.upk.clone().into()],
        )
    }

    /// Create or overwrite the stored version with `version`
    pub fn upsert_version(&self, version: i64) -> Statement {
        Statement::new(
            "INSERT INTO users (upk, version, deleted, created_at) VALUES ($1, $2, FALSE, NOW()) \
             ON CONFLICT (upk) DO UPDATE SET version = EXCLUDED.version, updated_at = NOW()",
            vec![self.upk.clone().into(), version.into()],
        )
    }

    pub(crate) fn read(row: &PgRow) -> StoreResult<Self> {
        Ok(Self {
            upk: row.column("u_upk")?,
            version: row.column("u_version")?,
            attributes: TAttributes::read(row, "u_")?,
        })
    }
}

impl Keyed for User {
    const KIND: &'static str = "user";

    fn key(&self) -> String {
        self.upk.clone()
    }
}

impl SqlBindable for User {
    fn select(&self) -> Statement {
        Statement::new(
            format!("SELECT {} FROM users u WHERE u.upk = $1", USER_COLUMNS),
            vec![self.upk.clone().into()],
        )
    }

    fn insert(&self) -> Statement {
        Statement::new(
            format!(
                "INSERT INTO users AS u (upk, version, deleted, created_at) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (upk) DO UPDATE SET version = EXCLUDED.version, updated_at = NOW() \
                 RETURNING {}",
                USER_COLUMNS
            ),
            vec![
                self.upk.clone().into(),
                self.version.into(),
                self.attributes.deleted.into(),
                self.attributes.created_at.into(),
            ],
        )
    }

    fn update(&self) -> Statement {
        Statement::new(
            format!(
                "UPDATE users u SET version = $2, deleted = $3, updated_at = NOW() \
                 WHERE u.upk = $1 RETURNING {}",
                USER_COLUMNS
            ),
            vec![
                self.upk.clone().into(),
                self.version.into(),
                self.attributes.deleted.into(),
            ],
        )
    }

    fn delete(&self) -> Statement {
        Statement::new(
            "UPDATE users SET deleted = TRUE, updated_at = NOW() WHERE upk = $1",
            vec![self.upk.clone().into()],
        )
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        Self::read(row)
    }
}

impl JsonCodec for User {}
