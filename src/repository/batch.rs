//! Relational replay of one user's favorites
//!
//! Writes the user at the highest version seen, then every favorite with its
//! asset type and asset, in one transaction. The first failure aborts the
//! batch and nothing is applied. `replace` also clears the user's live rows
//! inside that same transaction.

use sqlx::Connection;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::Statement;
use crate::error::{StoreError, StoreResult};
use crate::model::{Favorites, Keyed, SqlBindable, User};

use super::CachedRepository;

/// Highest `user.version` across `favorites`
pub fn max_user_version(favorites: &[Favorites]) -> Option<i64> {
    favorites.iter().map(|f| f.user.version).max()
}

pub struct BatchWriter {
    repo: Arc<CachedRepository>,
}

impl BatchWriter {
    pub fn new(repo: Arc<CachedRepository>) -> Self {
        Self { repo }
    }

    /// Ordered statements for `upk`. Empty input gives an empty plan.
    pub fn plan(upk: &str, favorites: &[Favorites]) -> StoreResult<Vec<Statement>> {
        let Some(version) = max_user_version(favorites) else {
            return Ok(Vec::new());
        };
        if let Some(stray) = favorites.iter().find(|f| f.upk() != upk) {
            return Err(StoreError::InvalidPlan(format!(
                "batch for {} holds a favorite of {}",
                upk,
                stray.upk()
            )));
        }

        let mut statements = Vec::with_capacity(1 + favorites.len() * 3);
        statements.push(User::new(upk).upsert_version(version));
        for fav in favorites {
            statements.push(fav.asset.asset_type.upsert_ignore());
            statements.push(fav.asset.upsert());
            statements.push(fav.upsert_replay(version));
        }
        Ok(statements)
    }

    pub async fn write(&self, upk: &str, favorites: &[Favorites]) -> StoreResult<()> {
        let statements = Self::plan(upk, favorites)?;
        if statements.is_empty() {
            return Ok(());
        }
        self.run(upk, None, &statements, favorites).await?;
        Ok(())
    }

    /// Soft delete every live row of `upk` at `version`, then replay
    /// `favorites`, committing both together. Returns the cleared row count.
    /// With nothing to replay only the clear runs and the user keeps its
    /// version.
    pub async fn replace(
        &self,
        upk: &str,
        version: i64,
        favorites: &[Favorites],
    ) -> StoreResult<usize> {
        let statements = Self::plan(upk, favorites)?;
        let clear = Favorites::clear_for_user(upk, version);
        self.run(upk, Some(&clear), &statements, favorites).await
    }

    async fn run(
        &self,
        upk: &str,
        clear: Option<&Statement>,
        statements: &[Statement],
        favorites: &[Favorites],
    ) -> StoreResult<usize> {
        let mut evict: Vec<String> = favorites.iter().map(|f| f.cache_key()).collect();
        evict.push(User::new(upk).cache_key());

        let mut conn = self.repo.db().acquire().await?;
        let mut tx = conn.begin().await?;

        let mut cleared = 0;
        if let Some(clear) = clear {
            let rows = match clear.query().fetch_all(&mut *tx).await {
                Ok(rows) => rows,
                Err(e) => {
                    error!(upk = %upk, error = %e, "Clearing rows failed, rolling back");
                    let _ = tx.rollback().await;
                    return Err(e.into());
                }
            };
            for row in &rows {
                match Favorites::from_row(row) {
                    Ok(fav) => evict.push(fav.cache_key()),
                    Err(e) => {
                        let _ = tx.rollback().await;
                        return Err(e);
                    }
                }
            }
            cleared = rows.len();
        }

        for (idx, stmt) in statements.iter().enumerate() {
            if let Err(e) = stmt.query().execute(&mut *tx).await {
                error!(upk = %upk, step = idx, error = %e, "Batch step failed, rolling back");
                let _ = tx.rollback().await;
                return Err(e.into());
            }
        }
        tx.commit().await?;

        let cache = self.repo.cache();
        for key in &evict {
            cache.delete(key);
        }
        info!(upk = %upk, cleared, count = favorites.len(), "Batch replay committed");
        Ok(cleared)
    }
}
