//! Defines the core data models and database queries for transactions.

use rusqlite::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, period::Period};

// ============================================================================
// MODELS
// ============================================================================

/// Database identifier for a transaction.
pub type TransactionId = i64;

/// A charge, refund or transfer on a credit card or bank account.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The free-text description from the card or bank statement.
    pub name: String,
    /// The amount in the account currency. Negative values are expenses.
    pub price: f64,
    /// When the transaction happened.
    pub date: Date,
    /// When the card company charged the transaction, if known.
    pub processed_date: Option<Date>,
    /// The scraper vendor id of the card company or bank, e.g. "isracard".
    pub vendor: String,
    /// The card digits reported by the card company.
    pub card6_digits: Option<String>,
    /// The bank account number reported by the bank.
    pub account_number: Option<String>,
    /// The trailing four digits of the card or account number.
    pub last4: Option<String>,
    /// Which installment this charge is, for split purchases.
    pub installments_number: Option<u32>,
    /// The total number of installments, for split purchases.
    pub installments_total: Option<u32>,
    /// The amount in the original currency for foreign purchases.
    pub original_amount: Option<f64>,
    /// The original currency code for foreign purchases, e.g. "USD".
    pub original_currency: Option<String>,
    /// The category of the transaction, e.g. "Groceries".
    pub category: Option<String>,
    /// The hash used to skip transactions that were already imported.
    pub import_id: Option<i64>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(price: f64, date: Date, name: &str, vendor: &str) -> TransactionBuilder {
        TransactionBuilder {
            name: name.to_owned(),
            price,
            date,
            processed_date: None,
            vendor: vendor.to_owned(),
            card6_digits: None,
            account_number: None,
            installments: None,
            original: None,
            category: None,
            source_id: None,
            import_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The free-text description.
    pub name: String,
    /// The amount, negative for expenses.
    pub price: f64,
    /// When the transaction happened.
    pub date: Date,
    /// When the transaction was charged.
    pub processed_date: Option<Date>,
    /// The scraper vendor id.
    pub vendor: String,
    /// Card digits from card companies.
    pub card6_digits: Option<String>,
    /// Account number from banks.
    pub account_number: Option<String>,
    /// `(number, total)` for installment purchases.
    pub installments: Option<(u32, u32)>,
    /// `(amount, currency)` for foreign purchases.
    pub original: Option<(f64, String)>,
    /// The category, if already known.
    pub category: Option<String>,
    /// The id the vendor gave the transaction, if it reported one.
    pub source_id: Option<String>,
    /// The content hash of a scraped transaction.
    pub import_id: Option<i64>,
}

impl TransactionBuilder {
    /// Set the date the transaction was charged.
    pub fn processed_date(mut self, processed_date: Option<Date>) -> Self {
        self.processed_date = processed_date;
        self
    }

    /// Set the card digits reported by a card company.
    pub fn card6_digits(mut self, card6_digits: Option<&str>) -> Self {
        self.card6_digits = card6_digits.map(str::to_owned);
        self
    }

    /// Set the account number reported by a bank.
    pub fn account_number(mut self, account_number: Option<&str>) -> Self {
        self.account_number = account_number.map(str::to_owned);
        self
    }

    /// Set the installment `(number, total)` of a split purchase.
    pub fn installments(mut self, installments: Option<(u32, u32)>) -> Self {
        self.installments = installments;
        self
    }

    /// Set the original `(amount, currency)` of a foreign purchase.
    pub fn original(mut self, original: Option<(f64, &str)>) -> Self {
        self.original = original.map(|(amount, currency)| (amount, currency.to_owned()));
        self
    }

    /// Set the category for the transaction.
    pub fn category(mut self, category: Option<&str>) -> Self {
        self.category = category.map(str::to_owned);
        self
    }

    /// Set the id the vendor reported for the transaction.
    pub fn source_id(mut self, source_id: Option<&str>) -> Self {
        self.source_id = source_id.map(str::to_owned);
        self
    }

    /// Set the import ID for the transaction.
    pub fn import_id(mut self, import_id: Option<i64>) -> Self {
        self.import_id = import_id;
        self
    }

    /// The trailing four digits of the account number, or of the card digits.
    pub fn last4(&self) -> Option<String> {
        self.account_number
            .as_deref()
            .or(self.card6_digits.as_deref())
            .map(last_four_digits)
            .filter(|digits| !digits.is_empty())
    }
}

/// The last four characters of `number`, or all of it when shorter.
pub fn last_four_digits(number: &str) -> String {
    let number = number.trim();
    let skip = number.chars().count().saturating_sub(4);
    number.chars().skip(skip).collect()
}

/// Narrows down a period's transactions to one account.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AccountFilter {
    /// Only include transactions from this vendor.
    pub vendor: Option<String>,
    /// Only include transactions from the card or account ending in these digits.
    pub last4: Option<String>,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, name, price, date, processed_date, vendor, card6_digits, \
    account_number, last4, installments_number, installments_total, original_amount, \
    original_currency, category, import_id";

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateImportId] if a transaction with the specified import ID already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let last4 = builder.last4();
    let (installments_number, installments_total) = builder.installments.unzip();
    let (original_amount, original_currency) = builder.original.unzip();

    connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (name, price, date, processed_date, vendor, card6_digits,
                account_number, last4, installments_number, installments_total, original_amount,
                original_currency, category, import_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            rusqlite::params![
                builder.name,
                builder.price,
                builder.date,
                builder.processed_date,
                builder.vendor,
                builder.card6_digits,
                builder.account_number,
                last4,
                installments_number,
                installments_total,
                original_amount,
                original_currency,
                builder.category,
                builder.import_id,
            ],
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateImportId,
            error => error.into(),
        })
}

/// Retrieve a transaction by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such transaction.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_transaction_row)
        .map_err(|error| error.into())
}

/// Retrieve the transactions in `period`, newest first, optionally for one account.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_transactions_in_period(
    period: &Period,
    filter: &AccountFilter,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut query = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE date BETWEEN ?1 AND ?2"
    );
    let mut params: Vec<&dyn ToSql> = vec![&period.start, &period.end];

    if let Some(vendor) = &filter.vendor {
        params.push(vendor);
        query.push_str(&format!(" AND vendor = ?{}", params.len()));
    }

    if let Some(last4) = &filter.last4 {
        params.push(last4);
        query.push_str(&format!(" AND last4 = ?{}", params.len()));
    }

    query.push_str(" ORDER BY date DESC, id DESC");

    connection
        .prepare(&query)?
        .query_map(params.as_slice(), map_transaction_row)?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// Retrieve every transaction whose name is exactly `description`, newest first.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_transactions_by_description(
    description: &str,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE name = ?1
             ORDER BY date DESC, id DESC"
        ))?
        .query_map([description], map_transaction_row)?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// Retrieve every transaction, oldest first.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_transactions(connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" ORDER BY date ASC, id ASC"
        ))?
        .query_map([], map_transaction_row)?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// Delete every transaction and return how many were deleted.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn delete_all_transactions(connection: &Connection) -> Result<usize, Error> {
    connection
        .execute("DELETE FROM \"transaction\"", ())
        .map_err(Error::from)
}

pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            price REAL NOT NULL,
            date TEXT NOT NULL,
            processed_date TEXT,
            vendor TEXT NOT NULL,
            card6_digits TEXT,
            account_number TEXT,
            last4 TEXT,
            installments_number INTEGER,
            installments_total INTEGER,
            original_amount REAL,
            original_currency TEXT,
            category TEXT,
            import_id INTEGER UNIQUE
        )",
        (),
    )?;

    // Improve performance when filtering by period
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_date ON \"transaction\"(date)",
        (),
    )?;

    // Quick categorization groups and updates by exact description
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_name ON \"transaction\"(name)",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_category ON \"transaction\"(category)",
        (),
    )?;

    Ok(())
}

pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        date: row.get(3)?,
        processed_date: row.get(4)?,
        vendor: row.get(5)?,
        card6_digits: row.get(6)?,
        account_number: row.get(7)?,
        last4: row.get(8)?,
        installments_number: row.get(9)?,
        installments_total: row.get(10)?,
        original_amount: row.get(11)?,
        original_currency: row.get(12)?,
        category: row.get(13)?,
        import_id: row.get(14)?,
    })
}
