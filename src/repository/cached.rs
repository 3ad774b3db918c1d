//! Cache-aside repository
//!
//! Reads go to the cache first and fall through to PostgreSQL on a miss; the
//! row read on a miss is written back into the cache. Inserts and updates are
//! write-through. Deletes evict first, then soft delete in the database.

use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::db::{Database, Statement};
use crate::error::{StoreError, StoreResult};
use crate::model::Entity;

pub struct CachedRepository {
    db: Arc<Database>,
    cache: Arc<TtlCache>,
}

impl CachedRepository {
    pub fn new(db: Arc<Database>, cache: Arc<TtlCache>) -> Self {
        Self { db, cache }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Read the entity identified by `probe`'s key
    pub async fn get<E: Entity>(&self, probe: &E) -> StoreResult<E> {
        self.db.pool()?;
        let key = probe.cache_key();

        if let Ok(bytes) = self.cache.get(&key) {
            return match E::from_json(&bytes) {
                Ok(entity) => {
                    debug!(key = %key, "Cache hit");
                    Ok(entity)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Corrupt cache entry evicted");
                    self.cache.delete(&key);
                    Err(e)
                }
            };
        }

        let stmt = probe.select();
        let mut conn = self.db.acquire().await?;
        let row = stmt
            .query()
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let entity = E::from_row(&row)?;
        self.remember(&entity)?;
        Ok(entity)
    }

    pub async fn insert<E: Entity>(&self, entity: &E) -> StoreResult<E> {
        self.write_through(entity.insert()).await
    }

    pub async fn update<E: Entity>(&self, entity: &E) -> StoreResult<E> {
        self.write_through(entity.update()).await
    }

    /// Evict, then soft delete. Returns the number of rows touched.
    pub async fn delete<E: Entity>(&self, entity: &E) -> StoreResult<u64> {
        self.db.pool()?;
        self.cache.delete(&entity.cache_key());

        let stmt = entity.delete();
        let mut conn = self.db.acquire().await?;
        let result = stmt.query().execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Stream every row matched by `stmt`, caching each one
    pub async fn get_by_filter<E: Entity>(&self, stmt: &Statement) -> StoreResult<Vec<E>> {
        let mut conn = self.db.acquire().await?;
        let mut rows = stmt.query().fetch(&mut *conn);

        let mut entities = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let entity = E::from_row(&row)?;
            self.remember(&entity)?;
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Side-effect only statement
    pub async fn execute(&self, stmt: &Statement) -> StoreResult<u64> {
        let mut conn = self.db.acquire().await?;
        let result = stmt.query().execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn write_through<E: Entity>(&self, stmt: Statement) -> StoreResult<E> {
        let mut conn = self.db.acquire().await?;
        let row = stmt.query().fetch_one(&mut *conn).await?;
        let entity = E::from_row(&row)?;
        self.remember(&entity)?;
        Ok(entity)
    }

    pub(crate) fn remember<E: Entity>(&self, entity: &E) -> StoreResult<()> {
        self.cache.set_default(&entity.cache_key(), entity.to_json()?);
        Ok(())
    }
}
