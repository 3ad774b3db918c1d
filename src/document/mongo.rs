//! MongoDB-backed document store

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection};
use tracing::{debug, info};

use super::{DocumentStore, FavoriteDocument};
use crate::config::MongoConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::Favorites;

pub struct MongoFavoritesStore {
    client: Client,
    collection: Collection<FavoriteDocument>,
}

impl MongoFavoritesStore {
    pub async fn connect(config: &MongoConfig) -> StoreResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Config("mongo.url is not set".to_string()))?;

        let client = Client::with_uri_str(url).await?;
        let collection = client
            .database(&config.database)
            .collection::<FavoriteDocument>(&config.collection);

        info!(
            database = %config.database,
            collection = %config.collection,
            "MongoDB client created"
        );
        Ok(Self { client, collection })
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoFavoritesStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn load(&self, upk: &str) -> StoreResult<Vec<Favorites>> {
        let cursor = self.collection.find(doc! { "upk": upk }).await?;
        let docs: Vec<FavoriteDocument> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(FavoriteDocument::into_favorites).collect())
    }

    async fn save(&self, favorites: &Favorites) -> StoreResult<()> {
        let incoming = FavoriteDocument::from_favorites(favorites);
        let key = doc! { "upk": incoming.upk.as_str(), "isin": incoming.isin.as_str() };

        let existing = self.collection.count_documents(key).await?;
        if existing == 0 {
            // Two writers may both see zero here and insert twice
            self.collection.insert_one(&incoming).await?;
            debug!(upk = %incoming.upk, isin = %incoming.isin, "Document inserted");
            return Ok(());
        }

        let guarded = doc! {
            "upk": incoming.upk.as_str(),
            "isin": incoming.isin.as_str(),
            "version": { "$lt": incoming.version },
        };
        let update = doc! {
            "$set": {
                "asset-type": incoming.asset_type.as_str(),
                "version": incoming.version,
            }
        };
        let result = self.collection.update_many(guarded, update).await?;
        debug!(
            upk = %incoming.upk,
            isin = %incoming.isin,
            matched = existing,
            modified = result.modified_count,
            "Document updated"
        );
        Ok(())
    }

    async fn delete(&self, favorites: &Favorites) -> StoreResult<u64> {
        let result = self
            .collection
            .delete_many(doc! { "upk": favorites.upk(), "isin": favorites.isin() })
            .await?;
        Ok(result.deleted_count)
    }
}
