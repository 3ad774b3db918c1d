//! Entity model
//!
//! Every persisted record implements the same capability set: it knows its
//! own cache key ([`Keyed`]), its own SQL ([`SqlBindable`]) and its own JSON
//! form ([`JsonCodec`]). The generic repository only ever talks to [`Entity`].

pub mod asset;
pub mod asset_type;
pub mod attributes;
pub mod favorites;
pub mod favorites_deleted;
pub mod user;

pub use asset::Asset;
pub use asset_type::AssetType;
pub use attributes::TAttributes;
pub use favorites::Favorites;
pub use favorites_deleted::FavoritesDeleted;
pub use user::User;

use serde::Serialize;
use std::borrow::Cow;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;

use crate::db::Statement;
use crate::error::StoreResult;

/// Identity of an entity inside the cache
pub trait Keyed {
    /// Namespace shared by every value stored under the same rows
    const KIND: &'static str;

    fn key(&self) -> String;

    fn cache_key(&self) -> String {
        format!("{}:{}", Self::KIND, self.key())
    }
}

/// One component of a composite key, with `\` and `:` escaped so parts
/// never run into each other
pub(crate) fn key_part(part: &str) -> Cow<'_, str> {
    if part.contains(['\\', ':']) {
        Cow::Owned(part.replace('\\', "\\\\").replace(':', "\\:"))
    } else {
        Cow::Borrowed(part)
    }
}

/// Statements an entity needs to persist itself
pub trait SqlBindable: Sized {
    /// Read the row identified by this value's key
    fn select(&self) -> Statement;
    /// Insert and return the stored row
    fn insert(&self) -> Statement;
    /// Update and return the stored row
    fn update(&self) -> Statement;
    /// Soft delete
    fn delete(&self) -> Statement;

    fn from_row(row: &PgRow) -> StoreResult<Self>;
}

pub trait JsonCodec: Serialize + DeserializeOwned {
    fn to_json(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_json(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Anything the cached repository can store
pub trait Entity: Keyed + SqlBindable + JsonCodec + Send + Sync + 'static {}

impl<T> Entity for T where T: Keyed + SqlBindable + JsonCodec + Send + Sync + 'static {}

// Column aliases shared by every projection. Each entity reads its own prefix.
pub(crate) const ASSET_TYPE_COLUMNS: &str = "t.name AS t_name, t.deleted AS t_deleted, \
     t.created_at AS t_created_at, t.updated_at AS t_updated_at";

pub(crate) const ASSET_COLUMNS: &str = "a.isin AS a_isin, a.deleted AS a_deleted, \
     a.created_at AS a_created_at, a.updated_at AS a_updated_at";

pub(crate) const USER_COLUMNS: &str = "u.upk AS u_upk, u.version AS u_version, \
     u.deleted AS u_deleted, u.created_at AS u_created_at, u.updated_at AS u_updated_at";

pub(crate) const FAVORITES_COLUMNS: &str = "f.id AS f_id, f.version AS f_version, \
     f.deleted AS f_deleted, f.created_at AS f_created_at, f.updated_at AS f_updated_at";
