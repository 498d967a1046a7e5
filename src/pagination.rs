//! This modules defines the common functionality for paging data.

use serde::{Deserialize, Serialize};

/// The largest offset SQLite accepts.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The number of rows to return when a request does not specify a limit.
    pub default_page_size: u64,
    /// The largest limit a request may ask for.
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 200,
        }
    }
}

/// Offset/limit query parameters.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    /// How many rows to skip.
    pub offset: Option<u64>,
    /// How many rows to return at most.
    pub limit: Option<u64>,
}

/// A resolved window into a list of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    /// How many rows to skip.
    pub offset: u64,
    /// How many rows to return at most.
    pub limit: u64,
}

impl PageQuery {
    /// Fill in defaults from `config`, clamp the limit to `1..=max_page_size`
    /// and the offset to [MAX_OFFSET].
    pub fn resolve(&self, config: &PaginationConfig) -> Page {
        let limit = self
            .limit
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size);

        Page {
            offset: self.offset.unwrap_or(0).min(MAX_OFFSET),
            limit,
        }
    }
}

impl Page {
    /// The offset of the next page, or `None` if `total_count` rows have been shown.
    pub fn next_offset(&self, total_count: u64) -> Option<u64> {
        let next = self.offset.saturating_add(self.limit);
        (next < total_count).then_some(next)
    }

    /// The offset and limit as SQL parameters.
    pub fn as_sql_params(&self) -> (i64, i64) {
        (
            i64::try_from(self.offset).unwrap_or(i64::MAX),
            i64::try_from(self.limit).unwrap_or(i64::MAX),
        )
    }

    /// The offset of the previous page, or `None` on the first page.
    pub fn previous_offset(&self) -> Option<u64> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }
}
