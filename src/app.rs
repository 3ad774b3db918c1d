//! Application context
//!
//! Every long-lived component is built exactly once here and handed to its
//! users explicitly.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::config::AppConfig;
use crate::db::{Database, schema};
use crate::document::{DocumentStore, MemoryDocumentStore, MongoFavoritesStore};
use crate::error::StoreResult;
use crate::existence::{AssetExistenceLookup, AssetLookup, UserExistenceLookup, UserLookup};
use crate::repository::CachedRepository;
use crate::service::FavoritesService;
use crate::sync::{Reconciler, RepairPool, Repairer};

pub struct AppContext {
    pub db: Arc<Database>,
    pub cache: Arc<TtlCache>,
    pub repo: Arc<CachedRepository>,
    pub documents: Arc<dyn DocumentStore>,
    pub repairs: Arc<RepairPool>,
    pub service: Arc<FavoritesService>,
    sweeper: JoinHandle<()>,
}

impl AppContext {
    pub async fn build(config: &AppConfig) -> StoreResult<Self> {
        let db = if config.postgres.url.is_some() {
            let db = Database::connect(&config.postgres).await?;
            schema::init_schema(&db).await?;
            db
        } else {
            warn!("postgres.url not set, relational operations will fail");
            Database::unavailable()
        };
        let db = Arc::new(db);

        let cache = Arc::new(TtlCache::new(config.cache.ttl()));
        let sweeper = cache.spawn_sweeper(config.cache.sweep_interval());
        let repo = Arc::new(CachedRepository::new(db.clone(), cache.clone()));

        let documents: Arc<dyn DocumentStore> = if config.mongo.url.is_some() {
            let store = MongoFavoritesStore::connect(&config.mongo).await?;
            if let Err(e) = store.ping().await {
                warn!(error = %e, "MongoDB ping failed, continuing");
            }
            Arc::new(store)
        } else {
            warn!("mongo.url not set, using in-memory document store");
            Arc::new(MemoryDocumentStore::new())
        };

        let assets: Arc<dyn AssetExistenceLookup> =
            Arc::new(AssetLookup::from_config(&config.existence, db.clone())?);
        let users: Arc<dyn UserExistenceLookup> =
            Arc::new(UserLookup::from_config(&config.existence, db.clone())?);

        let repairer = Arc::new(Repairer::new(repo.clone(), documents.clone(), assets));
        let repairs = Arc::new(RepairPool::start(repairer, &config.repair));
        let reconciler = Arc::new(Reconciler::new(users, repairs.clone()));
        let service = Arc::new(FavoritesService::new(
            repo.clone(),
            documents.clone(),
            reconciler,
        ));

        info!(
            relational = db.is_available(),
            documents = documents.name(),
            "Application context ready"
        );
        Ok(Self {
            db,
            cache,
            repo,
            documents,
            repairs,
            service,
            sweeper,
        })
    }

    /// Drain pending repairs, stop the sweeper, close the pool
    pub async fn shutdown(self) {
        self.repairs.shutdown().await;
        self.sweeper.abort();
        self.db.close().await;
        info!("Application context stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFLINE: &str = r#"
log_level: "debug"
log_dir: "./logs"
log_file: "test.log"
use_json: false
rotation: "never"
repair:
  workers: 1
  queue_size: 8
  task_timeout_secs: 1
"#;

    #[tokio::test]
    async fn test_build_without_backends() {
        let config = AppConfig::from_yaml(OFFLINE).unwrap();
        let ctx = AppContext::build(&config).await.unwrap();

        assert!(!ctx.db.is_available());
        assert_eq!(ctx.documents.name(), "memory");

        // Relational store is required for reads
        let result = ctx.service.get_for_user("upk-1").await;
        assert!(result.unwrap_err().is_connectivity());

        ctx.shutdown().await;
    }
}
