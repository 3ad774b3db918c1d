//! Tombstone view of a favorites row: soft-deleted, deletion not yet
//! propagated to the document store (`version IS NULL AND deleted IS TRUE`).

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;

use super::favorites::select_from;
use super::{Favorites, JsonCodec, Keyed, SqlBindable};
use crate::db::Statement;
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoritesDeleted(pub Favorites);

const PENDING_TOMBSTONE: &str = "f.version IS NULL AND f.deleted IS TRUE";

impl FavoritesDeleted {
    pub fn favorites(&self) -> &Favorites {
        &self.0
    }

    pub fn into_favorites(self) -> Favorites {
        self.0
    }

    /// Every unpropagated tombstone of a user
    pub fn pending_for_user(upk: &str) -> Statement {
        Statement::new(
            select_from(
                "favorites f",
                &format!("WHERE f.user_upk = $1 AND {} ORDER BY f.isin", PENDING_TOMBSTONE),
            ),
            vec![upk.into()],
        )
    }
}

impl From<Favorites> for FavoritesDeleted {
    fn from(favorites: Favorites) -> Self {
        Self(favorites)
    }
}

impl Keyed for FavoritesDeleted {
    // Same rows as Favorites, so the same cache namespace
    const KIND: &'static str = Favorites::KIND;

    fn key(&self) -> String {
        self.0.key()
    }
}

impl SqlBindable for FavoritesDeleted {
    fn select(&self) -> Statement {
        Statement::new(
            select_from(
                "favorites f",
                &format!(
                    "WHERE f.isin = $1 AND f.user_upk = $2 AND {}",
                    PENDING_TOMBSTONE
                ),
            ),
            vec![self.0.isin().into(), self.0.upk().into()],
        )
    }

    fn insert(&self) -> Statement {
        self.0.delete_returning()
    }

    /// Acknowledge the tombstone with the owner's version
    fn update(&self) -> Statement {
        self.0.acknowledged(self.0.user.version).update()
    }

    fn delete(&self) -> Statement {
        self.0.delete()
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        Favorites::from_row(row).map(Self)
    }
}

impl JsonCodec for FavoritesDeleted {}
