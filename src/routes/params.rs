use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LimitOffset {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LimitOffset {
    pub fn normalize(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(10).clamp(1, 100);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductOrdering {
    Name,
    Price,
    Stock,
    CreatedAt,
}

/// Product list filters. All predicates are optional and combinable; empty
/// strings are treated as absent.
// limit/offset live directly on the struct: serde_urlencoded (behind axum's
// Query) cannot deserialize numbers through #[serde(flatten)].
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Case-insensitive exact name match.
    pub name: Option<String>,
    /// Case-insensitive name substring match.
    pub name_contains: Option<String>,
    pub price: Option<i64>,
    pub price_lt: Option<i64>,
    pub price_gt: Option<i64>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    /// Matches the exact product name or a substring of the description.
    pub search: Option<String>,
    pub in_stock: Option<bool>,
    pub ordering: Option<ProductOrdering>,
    pub sort: Option<SortOrder>,
}

impl ProductQuery {
    pub fn pagination(&self) -> LimitOffset {
        LimitOffset {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub status: Option<String>,
    /// Orders created on this calendar date (UTC).
    pub created_date: Option<NaiveDate>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}
