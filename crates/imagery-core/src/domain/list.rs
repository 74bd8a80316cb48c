//! Listing query: raw request and its normalized form.
//!
//! 一覧取得は「壊れたソート指定」でエラーにしない。
//! 不正・未指定の値はすべて黙ってデフォルトに置き換える。

use serde::{Deserialize, Serialize};

/// Raw listing parameters, exactly as the client sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Id,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Page size bounds applied while normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            default_limit: 30,
            max_limit: 100,
        }
    }
}

/// Normalized listing query consumed by the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub by: SortBy,
    pub order: SortOrder,
}

impl ListQuery {
    pub fn normalize(req: &ListRequest, limits: ListingLimits) -> Self {
        let page = match req.page {
            Some(p) if p > 0 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let limit = match req.limit {
            Some(l) if l > 0 && l <= i64::from(limits.max_limit) => l as u32,
            _ => limits.default_limit,
        };

        let sort = req.sort.as_deref().unwrap_or("").trim().to_ascii_lowercase();
        // "uid" / "id" / "task_id" は id 順、それ以外はすべて作成日時
        let by = if sort.contains("id") {
            SortBy::Id
        } else {
            SortBy::CreatedAt
        };

        let order = req.order.as_deref().unwrap_or("").trim().to_ascii_lowercase();
        let order = if order.contains("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        };

        Self {
            page,
            limit,
            by,
            order,
        }
    }

    /// Number of records to skip.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }
}
