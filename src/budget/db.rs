use rusqlite::{Connection, OptionalExtension, Row, ToSql, params_from_iter};

use crate::{
    Error,
    budget::spending::{Budget, BudgetId, CategorySpending},
    period::Period,
    report::BANK_VENDORS,
};

/// Create the tables for category budgets and the total spend budget.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn create_budget_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL UNIQUE,
            budget_limit REAL NOT NULL
        )",
        (),
    )?;

    // Holds at most one row.
    connection.execute(
        "CREATE TABLE IF NOT EXISTS total_budget (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            budget_limit REAL NOT NULL
        )",
        (),
    )?;

    Ok(())
}

/// Create the budget for `category`, or change its limit if it already exists.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn upsert_budget(
    category: &str,
    budget_limit: f64,
    connection: &Connection,
) -> Result<Budget, Error> {
    connection
        .prepare(
            "INSERT INTO budget (category, budget_limit) VALUES (?1, ?2)
             ON CONFLICT(category) DO UPDATE SET budget_limit = excluded.budget_limit
             RETURNING id, category, budget_limit",
        )?
        .query_row((category, budget_limit), map_budget_row)
        .map_err(Error::from)
}

/// Retrieve every budget ordered by category.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_budgets(connection: &Connection) -> Result<Vec<Budget>, Error> {
    connection
        .prepare("SELECT id, category, budget_limit FROM budget ORDER BY category ASC")?
        .query_map([], map_budget_row)?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// Delete a budget.
///
/// # Errors
/// Returns [Error::DeleteMissingBudget] if there is no budget with `id`.
pub fn delete_budget(id: BudgetId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM budget WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingBudget);
    }

    Ok(())
}

/// The total spend limit, if one is set.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_total_budget_limit(connection: &Connection) -> Result<Option<f64>, Error> {
    connection
        .query_row("SELECT budget_limit FROM total_budget WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(Error::from)
}

/// Set the total spend limit.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn set_total_budget_limit(budget_limit: f64, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO total_budget (id, budget_limit) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET budget_limit = excluded.budget_limit",
        [budget_limit],
    )?;

    Ok(())
}

/// Remove the total spend limit. Clearing an unset limit is not an error.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn clear_total_budget_limit(connection: &Connection) -> Result<(), Error> {
    connection.execute("DELETE FROM total_budget", ())?;

    Ok(())
}

/// What was spent on each category in `period`, largest first.
///
/// Income in a category offsets its expenses.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_category_spending(
    period: &Period,
    connection: &Connection,
) -> Result<Vec<CategorySpending>, Error> {
    connection
        .prepare(
            "SELECT category, -SUM(price) AS actual_spent FROM \"transaction\"
             WHERE date BETWEEN ?1 AND ?2 AND category IS NOT NULL
             GROUP BY category
             ORDER BY actual_spent DESC, category ASC",
        )?
        .query_map((period.start, period.end), |row| {
            Ok(CategorySpending {
                category: row.get(0)?,
                actual_spent: row.get(1)?,
            })
        })?
        .map(|result| result.map_err(Error::from))
        .collect()
}

/// What was spent on credit cards in `period`, i.e., on vendors that are not banks.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_credit_card_spending(period: &Period, connection: &Connection) -> Result<f64, Error> {
    let placeholders = (3..3 + BANK_VENDORS.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut params: Vec<&dyn ToSql> = vec![&period.start, &period.end];
    params.extend(BANK_VENDORS.iter().map(|vendor| vendor as &dyn ToSql));

    connection
        .query_row(
            &format!(
                "SELECT COALESCE(-SUM(price), 0.0) FROM \"transaction\"
                 WHERE date BETWEEN ?1 AND ?2 AND vendor NOT IN ({placeholders})"
            ),
            params_from_iter(params),
            |row| row.get(0),
        )
        .map_err(Error::from)
}

fn map_budget_row(row: &Row) -> Result<Budget, rusqlite::Error> {
    Ok(Budget {
        id: row.get(0)?,
        category: row.get(1)?,
        budget_limit: row.get(2)?,
    })
}
