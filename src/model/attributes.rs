//! Audit and soft-delete metadata embedded in every entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;

use crate::db::SafeRow;
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TAttributes {
    pub deleted: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TAttributes {
    /// Fresh, live record created now
    pub fn new() -> Self {
        Self {
            deleted: Some(false),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted == Some(true)
    }

    /// Read `<prefix>deleted`, `<prefix>created_at`, `<prefix>updated_at`
    pub(crate) fn read(row: &PgRow, prefix: &str) -> StoreResult<Self> {
        Ok(Self {
            deleted: row.column(&format!("{}deleted", prefix))?,
            created_at: row.column(&format!("{}created_at", prefix))?,
            updated_at: row.column(&format!("{}updated_at", prefix))?,
        })
    }
}

impl Default for TAttributes {
    /// Zero value: epoch timestamp, nothing set
    fn default() -> Self {
        Self {
            deleted: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_live() {
        let attrs = TAttributes::new();
        assert_eq!(attrs.deleted, Some(false));
        assert!(!attrs.is_deleted());
        assert!(attrs.updated_at.is_none());
    }

    #[test]
    fn test_unset_deleted_is_not_deleted() {
        let attrs = TAttributes::default();
        assert!(!attrs.is_deleted());
        assert_eq!(attrs.created_at.timestamp(), 0);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(TAttributes::default()).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("deleted").is_some());
    }
}
