//! A user's favorite instrument
//!
//! Row states on the relational side:
//!
//! ```text
//! Active(version=N) ──write──▶ PendingSync(version=NULL) ──ack──▶ Active(version=N+1)
//!        │
//!        └──delete──▶ Tombstone(deleted, version=NULL) ──ack──▶ TombstoneAcknowledged
//! ```
//!
//! `version` is `NULL` exactly while the matching document-store write is
//! unacknowledged. The embedded `user.version` is the owner's version as read
//! with the row.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::{
    ASSET_COLUMNS, ASSET_TYPE_COLUMNS, Asset, FAVORITES_COLUMNS, JsonCodec, Keyed, SqlBindable,
    TAttributes, USER_COLUMNS, User, key_part,
};
use crate::db::{SafeRow, Statement};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    /// Informational only; identity is `(isin, upk)`
    pub id: Uuid,
    pub asset: Asset,
    pub user: User,
    pub version: Option<i64>,
    #[serde(flatten)]
    pub attributes: TAttributes,
}

/// Observable lifecycle state of a favorites row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Active,
    PendingSync,
    Tombstone,
    TombstoneAcknowledged,
}

impl Favorites {
    pub fn new(asset: Asset, user: User) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset,
            user,
            version: None,
            attributes: TAttributes::new(),
        }
    }

    pub fn isin(&self) -> &str {
        &self.asset.isin
    }

    pub fn upk(&self) -> &str {
        &self.user.upk
    }

    pub fn is_deleted(&self) -> bool {
        self.attributes.is_deleted()
    }

    pub fn is_pending(&self) -> bool {
        self.version.is_none()
    }

    pub fn state(&self) -> SyncState {
        match (self.is_deleted(), self.is_pending()) {
            (false, false) => SyncState::Active,
            (false, true) => SyncState::PendingSync,
            (true, true) => SyncState::Tombstone,
            (true, false) => SyncState::TombstoneAcknowledged,
        }
    }

    /// Copy carrying `version` as its acknowledged version
    pub fn acknowledged(&self, version: i64) -> Self {
        Self {
            version: Some(version),
            ..self.clone()
        }
    }

    /// Ordered statements for a transactional upsert. The last one returns
    /// the stored row.
    pub fn upsert_statements(&self) -> Vec<Statement> {
        vec![
            self.user.bump_version(),
            self.asset.asset_type.upsert_ignore(),
            self.asset.upsert(),
            self.insert(),
        ]
    }

    /// Ordered statements for a transactional soft delete
    pub fn delete_statements(&self) -> Vec<Statement> {
        vec![self.user.bump_version(), self.delete_returning()]
    }

    /// Soft delete that returns the tombstone row
    pub fn delete_returning(&self) -> Statement {
        Statement::new(
            with_joins(
                "UPDATE favorites SET deleted = TRUE, version = NULL, updated_at = NOW() \
                 WHERE isin = $1 AND user_upk = $2 RETURNING *",
            ),
            self.key_args(),
        )
    }

    /// Relational replay from the document store: revive the row and stamp it
    /// with the replayed version
    pub fn upsert_replay(&self, version: i64) -> Statement {
        Statement::new(
            "INSERT INTO favorites (id, isin, user_upk, version, deleted, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5) \
             ON CONFLICT (isin, user_upk) DO UPDATE \
             SET deleted = FALSE, version = EXCLUDED.version, updated_at = NOW()",
            vec![
                self.id.into(),
                self.isin().into(),
                self.upk().into(),
                version.into(),
                self.attributes.created_at.into(),
            ],
        )
    }

    /// Every row of a user, tombstones included
    pub fn for_user(upk: &str) -> Statement {
        Statement::new(
            select_from(
                "favorites f",
                "WHERE f.user_upk = $1 ORDER BY f.created_at, f.isin",
            ),
            vec![upk.into()],
        )
    }

    /// Soft delete every live row of a user before a relational replay. Rows
    /// are stamped with `version` since the document store never held them.
    pub fn clear_for_user(upk: &str, version: i64) -> Statement {
        Statement::new(
            with_joins(
                "UPDATE favorites SET deleted = TRUE, version = $2, updated_at = NOW() \
                 WHERE user_upk = $1 AND deleted IS NOT TRUE RETURNING *",
            ),
            vec![upk.into(), version.into()],
        )
    }

    fn key_args(&self) -> Vec<crate::db::SqlValue> {
        vec![self.isin().into(), self.upk().into()]
    }
}

/// `SELECT` over favorites with asset, asset type and user joined in
pub(crate) fn select_from(source: &str, tail: &str) -> String {
    format!(
        "SELECT {}, {}, {}, {} FROM {} \
         JOIN assets a ON a.isin = f.isin \
         JOIN asset_types t ON t.name = a.asset_type \
         JOIN users u ON u.upk = f.user_upk {}",
        FAVORITES_COLUMNS, ASSET_COLUMNS, ASSET_TYPE_COLUMNS, USER_COLUMNS, source, tail
    )
}

/// Wrap a data-modifying statement returning favorites rows so the result
/// carries the joined projection
pub(crate) fn with_joins(modifying: &str) -> String {
    format!("WITH f AS ({}) {}", modifying, select_from("f", ""))
}

impl Keyed for Favorites {
    const KIND: &'static str = "favorites";

    fn key(&self) -> String {
        format!("{}:{}", key_part(&self.asset.isin), key_part(&self.user.upk))
    }
}

impl SqlBindable for Favorites {
    fn select(&self) -> Statement {
        Statement::new(
            select_from("favorites f", "WHERE f.isin = $1 AND f.user_upk = $2"),
            self.key_args(),
        )
    }

    /// Upsert into PendingSync
    fn insert(&self) -> Statement {
        Statement::new(
            with_joins(
                "INSERT INTO favorites (id, isin, user_upk, version, deleted, created_at) \
                 VALUES ($1, $2, $3, NULL, $4, $5) \
                 ON CONFLICT (isin, user_upk) DO UPDATE \
                 SET version = NULL, deleted = EXCLUDED.deleted, updated_at = NOW() \
                 RETURNING *",
            ),
            vec![
                self.id.into(),
                self.isin().into(),
                self.upk().into(),
                self.attributes.deleted.into(),
                self.attributes.created_at.into(),
            ],
        )
    }

    /// Write `version` back (acknowledgement)
    fn update(&self) -> Statement {
        Statement::new(
            with_joins(
                "UPDATE favorites SET version = $3, updated_at = NOW() \
                 WHERE isin = $1 AND user_upk = $2 RETURNING *",
            ),
            vec![self.isin().into(), self.upk().into(), self.version.into()],
        )
    }

    fn delete(&self) -> Statement {
        Statement::new(
            "UPDATE favorites SET deleted = TRUE, version = NULL, updated_at = NOW() \
             WHERE isin = $1 AND user_upk = $2",
            self.key_args(),
        )
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.column("f_id")?,
            asset: Asset::read(row)?,
            user: User::read(row)?,
            version: row.column("f_version")?,
            attributes: TAttributes::read(row, "f_")?,
        })
    }
}

impl JsonCodec for Favorites {}
