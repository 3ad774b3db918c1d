//! Tradable instrument, identified by ISIN

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;

use super::{ASSET_COLUMNS, ASSET_TYPE_COLUMNS, AssetType, JsonCodec, Keyed, SqlBindable, TAttributes};
use crate::db::{SafeRow, Statement};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub isin: String,
    /// Resolved from `assets.asset_type` by name on every read
    pub asset_type: AssetType,
    #[serde(flatten)]
    pub attributes: TAttributes,
}

impl Asset {
    pub fn new(isin: impl Into<String>, asset_type: AssetType) -> Self {
        Self::with_attributes(isin, asset_type, TAttributes::new())
    }

    pub fn with_attributes(
        isin: impl Into<String>,
        asset_type: AssetType,
        attributes: TAttributes,
    ) -> Self {
        Self {
            isin: isin.into(),
            asset_type,
            attributes,
        }
    }

    /// Insert, or move an existing asset to this asset type
    pub fn upsert(&self) -> Statement {
        Statement::new(
            "INSERT INTO assets (isin, asset_type, deleted, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (isin) DO UPDATE SET asset_type = EXCLUDED.asset_type, updated_at = NOW()",
            self.insert_args(),
        )
    }

    fn insert_args(&self) -> Vec<crate::db::SqlValue> {
        vec![
            self.isin.clone().into(),
            self.asset_type.name.clone().into(),
            self.attributes.deleted.into(),
            self.attributes.created_at.into(),
        ]
    }

    pub(crate) fn read(row: &PgRow) -> StoreResult<Self> {
        Ok(Self {
            isin: row.column("a_isin")?,
            asset_type: AssetType::read(row)?,
            attributes: TAttributes::read(row, "a_")?,
        })
    }
}

fn with_type_join(cte: &str) -> String {
    format!(
        "WITH a AS ({}) SELECT {}, {} FROM a JOIN asset_types t ON t.name = a.asset_type",
        cte, ASSET_COLUMNS, ASSET_TYPE_COLUMNS
    )
}

impl Keyed for Asset {
    const KIND: &'static str = "asset";

    fn key(&self) -> String {
        self.isin.clone()
    }
}

impl SqlBindable for Asset {
    fn select(&self) -> Statement {
        Statement::new(
            format!(
                "SELECT {}, {} FROM assets a JOIN asset_types t ON t.name = a.asset_type \
                 WHERE a.isin = $1",
                ASSET_COLUMNS, ASSET_TYPE_COLUMNS
            ),
            vec![self.isin.clone().into()],
        )
    }

    fn insert(&self) -> Statement {
        Statement::new(
            with_type_join(
                "INSERT INTO assets (isin, asset_type, deleted, created_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (isin) DO UPDATE SET asset_type = EXCLUDED.asset_type, updated_at = NOW() \
                 RETURNING *",
            ),
            self.insert_args(),
        )
    }

    fn update(&self) -> Statement {
        Statement::new(
            with_type_join(
                "UPDATE assets SET asset_type = $2, deleted = $3, updated_at = NOW() \
                 WHERE isin = $1 RETURNING *",
            ),
            vec![
                self.isin.clone().into(),
                self.asset_type.name.clone().into(),
                self.attributes.deleted.into(),
            ],
        )
    }

    fn delete(&self) -> Statement {
        Statement::new(
            "UPDATE assets SET deleted = TRUE, updated_at = NOW() WHERE isin = $1",
            vec![self.isin.clone().into()],
        )
    }

    fn from_row(row: &PgRow) -> StoreResult<Self> {
        Self::read(row)
    }
}

impl JsonCodec for Asset {}
