//! Data access helpers for categorizing transactions by description.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{Error, category::CategoryName};

/// A description shared by transactions that have no category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncategorizedDescription {
    /// The exact transaction name.
    pub description: String,
    /// How many uncategorized transactions have this name.
    pub count: i64,
    /// The sum of their amounts.
    pub total_amount: f64,
}

/// Descriptions of uncategorized transactions, most frequent first.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_uncategorized_descriptions(
    connection: &Connection,
) -> Result<Vec<UncategorizedDescription>, Error> {
    connection
        .prepare(
            "SELECT name, COUNT(*) AS count, SUM(price)
             FROM \"transaction\"
             WHERE category IS NULL OR category = ''
             GROUP BY name
             ORDER BY count DESC, name ASC",
        )?
        .query_map([], |row| {
            Ok(UncategorizedDescription {
                description: row.get(0)?,
                count: row.get(1)?,
                total_amount: row.get(2)?,
            })
        })?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// Set the category of every transaction named exactly `description`.
///
/// Returns the number of transactions updated. Transactions that already had
/// a category are recategorized too.
///
/// # Errors
/// Returns [Error::EmptyDescription] if `description` is blank, or an SQL error.
pub fn update_category_by_description(
    description: &str,
    category: &CategoryName,
    connection: &Connection,
) -> Result<usize, Error> {
    if description.trim().is_empty() {
        return Err(Error::EmptyDescription);
    }

    connection
        .execute(
            "UPDATE \"transaction\" SET category = ?2 WHERE name = ?1",
            (description, category.as_ref()),
        )
        .map_err(Error::from)
}
