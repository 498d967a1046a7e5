//! Client-side state of the monthly summary view.

use crate::report::summary::{AccountType, GroupBy, SortBy, SortOrder, SummaryRow};

/// The grouping, sorting and paging a monthly summary view asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    /// The year of the period.
    pub year: i32,
    /// The month of the period.
    pub month: u8,
    /// What rows are grouped by.
    pub group_by: GroupBy,
    /// What rows are sorted by.
    pub sort_by: SortBy,
    /// The sort direction.
    pub sort_order: SortOrder,
    /// How many rows to skip.
    pub offset: u64,
    /// How many rows a page holds.
    pub limit: u64,
}

impl ReportQuery {
    /// The first page of `(year, month)`, largest amounts first.
    pub fn new(year: i32, month: u8, limit: u64) -> Self {
        Self {
            year,
            month,
            group_by: GroupBy::default(),
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            offset: 0,
            limit: limit.max(1),
        }
    }

    /// Sort by `field`.
    ///
    /// Choosing the current field again flips the direction. Choosing a new
    /// field sorts it descending. Either way the view returns to the first page.
    pub fn toggle_sort(&mut self, field: SortBy) {
        if self.sort_by == field {
            self.sort_order = self.sort_order.flipped();
        } else {
            self.sort_by = field;
            self.sort_order = SortOrder::Desc;
        }

        self.offset = 0;
    }

    /// Group by `group_by` and return to the first page.
    pub fn set_group_by(&mut self, group_by: GroupBy) {
        self.group_by = group_by;
        self.offset = 0;
    }

    /// Show another period from its first page.
    pub fn set_period(&mut self, year: i32, month: u8) {
        self.year = year;
        self.month = month;
        self.offset = 0;
    }

    /// Move to the next page. Returns false if this is the last page.
    pub fn next_page(&mut self, total_count: u64) -> bool {
        let next = self.offset + self.limit;
        if next >= total_count {
            return false;
        }

        self.offset = next;
        true
    }

    /// Move to the previous page. Returns false on the first page.
    pub fn previous_page(&mut self) -> bool {
        if self.offset == 0 {
            return false;
        }

        self.offset = self.offset.saturating_sub(self.limit);
        true
    }

    /// The query string parameters for `GET /api/reports/monthly-summary`.
    pub fn to_query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("year", self.year.to_string()),
            ("month", self.month.to_string()),
            ("group_by", self.group_by.as_str().to_owned()),
            ("sort_by", self.sort_by.as_str().to_owned()),
            ("sort_order", self.sort_order.as_str().to_owned()),
            ("offset", self.offset.to_string()),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// Split fetched rows into bank rows and credit card rows.
///
/// Rows without an account type, e.g. when grouped by description, are credit card rows.
pub fn split_by_account_type(rows: &[SummaryRow]) -> (Vec<&SummaryRow>, Vec<&SummaryRow>) {
    rows.iter()
        .partition(|row| row.account_type == Some(AccountType::Bank))
}
