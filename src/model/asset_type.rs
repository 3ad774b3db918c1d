//! Category of tradable instrument

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;

use super::{ASSET_TYPE_COLUMNS, JsonCodec, Keyed, SqlBindable, TAttributes};
use crate::db::{SafeRow, Statement};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetType {
    pub name: String,
    #[serde(flatten)]
    pub attributes: TAttributes,
}

impl AssetType {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_attributes(name, TAttributes::new())
    }

    pub fn with_attributes(name: impl Into<String>, attributes: TAttributes) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    /// Insert unless present; existing rows are left as they are
    pub fn upsert_ignore(&self) -> Statement {
        Statement::new(
            "INSERT INTO asset_types (name, deleted, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING",
            vec![
                self.name.clone().into(),
                self.attributes.deleted.into(),
                self.attributes.created_at.into(),
            ],
        )
    }

    pub(crate) fn read(row: &PgRow) -> StoreResult<Self> {
        Ok(Self {
            name: row.column("t_name")?,
            attributes: TAttributes::read(row, "t_")?,
        })
    }
}

impl Keyed for AssetType {
    const KIND: &'static str = "asset_type";

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl SqlBindable for AssetType {
    fn select(&self) -> Statement {
        Statement::new(
            format!(
                "SELECT {} FROM asset_types t WHERE t.name = $1",
                ASSET_TYPE_COLUMNS
            ),
            vec![self.name.clone().into()],
        )
    }

    fn insert(&self) -> Statement {
        Statement::new(
            format!(
                "INSERT INTO asset_types AS t (name, deleted, created_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (name) DO UPDATE SET deleted = EXCLUDED.deleted, updated_at = NOW() \
                 RETURNING {}",
                ASSET_TYPE_COLUMNS
            ),
            vec![
                self.name.clone().into(),
                self.attributes.deleted.into(),
                self.attributes.created_at.into(),
            ],
        )
    }

    fn update(&self) -> Statement {
        Statement::new(
            format!(
                "UPDATE asset_types t SET deleted = $2, updated_at = NOW() \
                 WHERE t.name = $1 RETURNING {}",
                ASSET_TYPE_COLUMNS
            ),
            vec![self.name.clone().into(), self.attributes.deleted.into()],
        )
    }

    fn delete(&self) -> Statement {
        Statement::new(
            "UPDATE asset_types SET deleted = TRUE, updated_at = NOW() WHERE name = $1",
            vec![self.name.clone().into()],
        )
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        Self::read(row)
    }
}

impl JsonCodec for AssetType {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    #[test]
    fn test_key_is_name() {
        let t = AssetType::new("BOND");
        assert_eq!(t.key(), "BOND");
        assert_eq!(t.cache_key(), "asset_type:BOND");
    }

    #[test]
    fn test_json_round_trip() {
        let t = AssetType::with_attributes("ETF", fixtures::attributes());
        let back = AssetType::from_json(&t.to_json().unwrap()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_statement_arity() {
        let t = AssetType::new("ETF");
        for stmt in [t.select(), t.insert(), t.update(), t.delete(), t.upsert_ignore()] {
            assert_eq!(stmt.placeholder_count(), stmt.args.len(), "{}", stmt.sql);
        }
    }
}
