//! Document (secondary) store
//!
//! One document per `(upk, isin)`, carrying the owner's version at write time.
//! The store itself enforces no uniqueness.

pub mod memory;
pub mod mongo;

pub use memory::MemoryDocumentStore;
pub use mongo::MongoFavoritesStore;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::{Asset, AssetType, Favorites, TAttributes, User};

/// Load/save/delete of favorites in the document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Every document of a user, as favorites with a nil id
    async fn load(&self, upk: &str) -> StoreResult<Vec<Favorites>>;

    /// Insert when absent, otherwise overwrite every matching document whose
    /// stored version is strictly older
    async fn save(&self, favorites: &Favorites) -> StoreResult<()>;

    /// Remove the documents matching `(upk, isin)`; returns how many
    async fn delete(&self, favorites: &Favorites) -> StoreResult<u64>;
}

/// Wire shape in the `favorites` collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub upk: String,
    pub isin: String,
    #[serde(rename = "asset-type")]
    pub asset_type: String,
    pub version: i64,
}

impl FavoriteDocument {
    pub fn from_favorites(favorites: &Favorites) -> Self {
        Self {
            id: None,
            upk: favorites.upk().to_string(),
            isin: favorites.isin().to_string(),
            asset_type: favorites.asset.asset_type.name.clone(),
            version: favorites.user.version,
        }
    }

    /// Rebuild a favorites value. The relational id and audit fields are not
    /// stored here, so they come back zeroed.
    pub fn into_favorites(self) -> Favorites {
        let asset_type = AssetType::with_attributes(self.asset_type, TAttributes::default());
        let asset = Asset::with_attributes(self.isin, asset_type, TAttributes::default());
        let user = User::with_attributes(self.upk, self.version, TAttributes::default());
        Favorites {
            id: Uuid::nil(),
            asset,
            user,
            version: Some(self.version),
            attributes: TAttributes::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Keyed, fixtures};

    #[test]
    fn test_document_carries_user_version() {
        let mut fav = fixtures::favorite("DE0005140008", "upk-1", 6);
        fav.version = None;
        let doc = FavoriteDocument::from_favorites(&fav);
        assert_eq!(doc.version, 6);
        assert_eq!(doc.asset_type, "ETF");
    }

    #[test]
    fn test_reconstructed_favorites_has_nil_id() {
        let fav = fixtures::favorite("DE0005140008", "upk-1", 6);
        let back = FavoriteDocument::from_favorites(&fav).into_favorites();

        assert_eq!(back.id, Uuid::nil());
        assert_eq!(back.key(), fav.key());
        assert_eq!(back.user.version, 6);
        assert_eq!(back.version, Some(6));
        assert!(!back.is_deleted());
    }

    #[test]
    fn test_wire_field_names() {
        let fav = fixtures::favorite("DE0005140008", "upk-1", 6);
        let json = serde_json::to_value(FavoriteDocument::from_favorites(&fav)).unwrap();
        assert_eq!(json["asset-type"], "ETF");
        assert!(json.get("_id").is_none());
    }
}
