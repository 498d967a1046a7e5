//! Grouped spending reports of a period.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, pagination::Page, period::Period};

/// Scraper vendor ids of banks. Every other vendor is a credit card company.
pub const BANK_VENDORS: &[&str] = &[
    "hapoalim",
    "leumi",
    "discount",
    "mercantile",
    "mizrahi",
    "otsarHahayal",
    "beinleumi",
    "massad",
    "yahav",
    "union",
    "oneZero",
    "pagi",
];

/// Whether a vendor is a bank or a credit card company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// A bank account.
    Bank,
    /// A credit card.
    CreditCard,
}

impl AccountType {
    /// The account type of the scraper vendor `vendor`.
    pub fn of_vendor(vendor: &str) -> Self {
        if BANK_VENDORS.contains(&vendor) {
            AccountType::Bank
        } else {
            AccountType::CreditCard
        }
    }
}

/// What transactions are grouped by.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// The transaction description.
    #[default]
    Description,
    /// The card company or bank.
    Vendor,
    /// The card or account.
    Last4,
}

impl GroupBy {
    /// The query string value.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Description => "description",
            GroupBy::Vendor => "vendor",
            GroupBy::Last4 => "last4",
        }
    }
}

/// What report rows are sorted by.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// The amount spent.
    #[default]
    Amount,
    /// The group name.
    Name,
    /// The number of transactions.
    Count,
}

impl SortBy {
    /// The query string value.
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Amount => "amount",
            SortBy::Name => "name",
            SortBy::Count => "count",
        }
    }
}

/// The sort direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl SortOrder {
    /// The opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    /// The query string value.
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Grouping and sorting query parameters of the monthly summary.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct SummaryQuery {
    /// Defaults to grouping by description.
    pub group_by: Option<GroupBy>,
    /// Defaults to sorting by amount.
    pub sort_by: Option<SortBy>,
    /// Defaults to descending.
    pub sort_order: Option<SortOrder>,
}

/// One group of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// The description, vendor or last four digits of the group.
    pub name: String,
    /// The vendor of a card or account, when grouping by last four digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Whether the card or account is a bank, when grouping by vendor or last four digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<AccountType>,
    /// Expenses minus refunds.
    pub amount: f64,
    /// The number of transactions in the group.
    pub count: i64,
}

/// Spending split between banks and credit cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountTotals {
    /// Spending from bank accounts.
    pub bank: f64,
    /// Spending on credit cards.
    pub credit_card: f64,
}

/// One page of the monthly summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// The rows of the page.
    pub rows: Vec<SummaryRow>,
    /// The number of groups across all pages.
    pub total_count: u64,
    /// How many groups were skipped.
    pub offset: u64,
    /// How many groups a page holds.
    pub limit: u64,
    /// Spending of the whole period split by account type.
    pub totals: AccountTotals,
}

/// Group, sort and page the transactions of `period`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_monthly_summary(
    period: &Period,
    group_by: GroupBy,
    sort_by: SortBy,
    sort_order: SortOrder,
    page: Page,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    let (select, group) = match group_by {
        GroupBy::Description => ("name AS group_name, NULL", "name"),
        GroupBy::Vendor => ("vendor AS group_name, vendor", "vendor"),
        GroupBy::Last4 => ("COALESCE(last4, '') AS group_name, vendor", "vendor, last4"),
    };

    let order = match sort_by {
        SortBy::Amount => "amount",
        SortBy::Name => "group_name COLLATE NOCASE",
        SortBy::Count => "count",
    };

    let total_count: i64 = connection.query_row(
        &format!(
            "SELECT COUNT(*) FROM (
                SELECT 1 FROM \"transaction\" WHERE date BETWEEN ?1 AND ?2 GROUP BY {group}
            )"
        ),
        (period.start, period.end),
        |row| row.get(0),
    )?;

    let (offset, limit) = page.as_sql_params();
    let rows = connection
        .prepare(&format!(
            "SELECT {select}, -SUM(price) AS amount, COUNT(*) AS count
             FROM \"transaction\"
             WHERE date BETWEEN ?1 AND ?2
             GROUP BY {group}
             ORDER BY {order} {direction}, group_name ASC
             LIMIT ?3 OFFSET ?4",
            direction = sort_order.as_sql(),
        ))?
        .query_map(
            (
                period.start,
                period.end,
                limit,
                offset,
            ),
            |row| map_summary_row(row, group_by),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MonthlySummary {
        rows,
        total_count: u64::try_from(total_count).unwrap_or_default(),
        offset: page.offset,
        limit: page.limit,
        totals: get_account_totals(period, connection)?,
    })
}

/// Spending of `period` split by account type.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_account_totals(period: &Period, connection: &Connection) -> Result<AccountTotals, Error> {
    let mut totals = AccountTotals::default();

    let mut stmt = connection.prepare(
        "SELECT vendor, -SUM(price) FROM \"transaction\"
         WHERE date BETWEEN ?1 AND ?2
         GROUP BY vendor",
    )?;
    let vendors = stmt.query_map((period.start, period.end), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;

    for vendor in vendors {
        let (vendor, amount) = vendor?;
        match AccountType::of_vendor(&vendor) {
            AccountType::Bank => totals.bank += amount,
            AccountType::CreditCard => totals.credit_card += amount,
        }
    }

    Ok(totals)
}

fn map_summary_row(row: &Row, group_by: GroupBy) -> Result<SummaryRow, rusqlite::Error> {
    let name: String = row.get(0)?;
    let vendor: Option<String> = row.get(1)?;

    let (vendor, account_type) = match group_by {
        GroupBy::Description => (None, None),
        GroupBy::Vendor => (None, vendor.as_deref().map(AccountType::of_vendor)),
        GroupBy::Last4 => {
            let account_type = vendor.as_deref().map(AccountType::of_vendor);
            (vendor, account_type)
        }
    };

    Ok(SummaryRow {
        name,
        vendor,
        account_type,
        amount: row.get(2)?,
        count: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use time::{Date, macros::date};

    use crate::{
        pagination::{MAX_OFFSET, Page, PageQuery, PaginationConfig},
        period::Period,
        test_utils::get_test_connection,
        transaction::{Transaction, create_transaction},
    };

    use super::{AccountType, GroupBy, SortBy, SortOrder, get_monthly_summary};

    fn insert(connection: &rusqlite::Connection, rows: &[(f64, Date, &str, &str, &str)]) {
        for (price, date, name, vendor, card) in rows {
            create_transaction(
                Transaction::build(*price, *date, name, vendor).card6_digits(Some(card)),
                connection,
            )
            .unwrap();
        }
    }

    fn march() -> Period {
        Period::for_month(2025, 3, 1).unwrap()
    }

    fn first_page() -> Page {
        Page {
            offset: 0,
            limit: 20,
        }
    }

    fn seeded_connection() -> rusqlite::Connection {
        let connection = get_test_connection();
        insert(
            &connection,
            &[
                (-50.0, date!(2025 - 03 - 01), "WOLT", "max", "111111"),
                (-70.0, date!(2025 - 03 - 02), "WOLT", "max", "111111"),
                (-300.0, date!(2025 - 03 - 03), "SHUFERSAL", "isracard", "222222"),
                (-3000.0, date!(2025 - 03 - 04), "RENT", "hapoalim", "123456789"),
                (-10.0, date!(2025 - 02 - 28), "OLD", "max", "111111"),
            ],
        );
        connection
    }

    #[test]
    fn groups_by_description_sorted_by_amount() {
        let connection = seeded_connection();

        let summary = get_monthly_summary(
            &march(),
            GroupBy::Description,
            SortBy::Amount,
            SortOrder::Desc,
            first_page(),
            &connection,
        )
        .unwrap();

        let names: Vec<&str> = summary.rows.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["RENT", "SHUFERSAL", "WOLT"]);
        assert_eq!(summary.rows[2].amount, 120.0);
        assert_eq!(summary.rows[2].count, 2);
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.totals.bank, 3000.0);
        assert_eq!(summary.totals.credit_card, 420.0);
    }

    #[test]
    fn last4_rows_carry_vendor_and_account_type() {
        let connection = seeded_connection();

        let summary = get_monthly_summary(
            &march(),
            GroupBy::Last4,
            SortBy::Name,
            SortOrder::Asc,
            first_page(),
            &connection,
        )
        .unwrap();

        let bank = summary.rows.iter().find(|row| row.name == "6789").unwrap();
        assert_eq!(bank.vendor.as_deref(), Some("hapoalim"));
        assert_eq!(bank.account_type, Some(AccountType::Bank));
        let card = summary.rows.iter().find(|row| row.name == "1111").unwrap();
        assert_eq!(card.account_type, Some(AccountType::CreditCard));
    }

    #[test]
    fn pages_are_applied_after_sorting() {
        let connection = seeded_connection();

        let summary = get_monthly_summary(
            &march(),
            GroupBy::Description,
            SortBy::Count,
            SortOrder::Desc,
            Page {
                offset: 0,
                limit: 1,
            },
            &connection,
        )
        .unwrap();

        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].name, "WOLT");
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.limit, 1);
    }

    #[test]
    fn offset_past_the_end_returns_no_rows() {
        let connection = seeded_connection();
        let page = PageQuery {
            offset: Some(u64::MAX),
            limit: Some(20),
        }
        .resolve(&PaginationConfig::default());

        let summary = get_monthly_summary(
            &march(),
            GroupBy::Description,
            SortBy::Amount,
            SortOrder::Desc,
            page,
            &connection,
        )
        .unwrap();

        assert!(summary.rows.is_empty());
        assert_eq!(summary.offset, MAX_OFFSET);
        assert_eq!(summary.total_count, 3);
    }

    #[test]
    fn vendor_classification() {
        assert_eq!(AccountType::of_vendor("leumi"), AccountType::Bank);
        assert_eq!(AccountType::of_vendor("visaCal"), AccountType::CreditCard);
    }
}
