//! Category names and the category vocabulary.
//!
//! Categories are free text on transactions; there is no category table. The
//! vocabulary offered to users is every category used by a transaction, a
//! budget or a description rule.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{AppState, Error};

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns [Error::EmptyCategory] if `name` is blank.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            Err(Error::EmptyCategory)
        } else {
            Ok(Self(name.to_owned()))
        }
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The sorted, distinct categories used by transactions, budgets and rules.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_categories(connection: &Connection) -> Result<Vec<String>, Error> {
    connection
        .prepare(
            "SELECT category FROM \"transaction\" WHERE category IS NOT NULL AND category != ''
             UNION
             SELECT category FROM budget
             UNION
             SELECT category FROM description_rule
             ORDER BY category COLLATE NOCASE ASC",
        )?
        .query_map([], |row| row.get(0))?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// The state needed to list categories.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// The database connection for reading categories.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler that lists the category vocabulary.
pub async fn get_categories_endpoint(State(state): State<CategoryState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_categories(&connection) {
        Ok(categories) => Json(categories).into_response(),
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::{
        Error,
        budget::upsert_budget,
        rule::upsert_rule,
        test_utils::get_test_connection,
        transaction::{Transaction, create_transaction},
    };

    use super::{CategoryName, get_all_categories};

    #[test]
    fn new_fails_on_blank_string() {
        assert_eq!(CategoryName::new("  "), Err(Error::EmptyCategory));
    }

    #[test]
    fn new_trims_name() {
        assert_eq!(CategoryName::new(" Fuel ").unwrap().as_ref(), "Fuel");
    }

    #[test]
    fn vocabulary_merges_transactions_budgets_and_rules() {
        let connection = get_test_connection();
        create_transaction(
            Transaction::build(-1.0, date!(2025 - 03 - 01), "A", "max").category(Some("dining")),
            &connection,
        )
        .unwrap();
        create_transaction(
            Transaction::build(-1.0, date!(2025 - 03 - 01), "B", "max").category(Some("Fuel")),
            &connection,
        )
        .unwrap();
        upsert_budget("Fuel", 500.0, &connection).unwrap();
        upsert_budget("Groceries", 2000.0, &connection).unwrap();
        upsert_rule("wolt", "Delivery", &connection).unwrap();

        assert_eq!(
            get_all_categories(&connection),
            Ok(vec![
                "Delivery".to_owned(),
                "dining".to_owned(),
                "Fuel".to_owned(),
                "Groceries".to_owned(),
            ])
        );
    }
}
