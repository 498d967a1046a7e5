//! Grouped monthly reports and the state of the report view.

mod endpoints;
mod query;
mod summary;

pub use endpoints::get_monthly_summary_endpoint;
pub use query::{ReportQuery, split_by_account_type};
pub use summary::{
    AccountTotals, AccountType, BANK_VENDORS, GroupBy, MonthlySummary, SortBy, SortOrder,
    SummaryRow, get_account_totals, get_monthly_summary,
};
