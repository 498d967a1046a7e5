use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::Error;

pub type RuleId = i64;

/// A rule that automatically categorizes transactions whose names start with a pattern.
/// Pattern matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Rule {
    pub id: RuleId,

    /// The pattern that transaction names must start with (case-insensitive).
    pub pattern: String,

    /// The category to apply when this rule matches.
    pub category: String,
}

/// Create a rule, or point the existing rule with the same pattern at `category`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn upsert_rule(pattern: &str, category: &str, connection: &Connection) -> Result<Rule, Error> {
    connection
        .prepare(
            "INSERT INTO description_rule (pattern, category) VALUES (?1, ?2)
             ON CONFLICT(pattern) DO UPDATE SET category = excluded.category
             RETURNING id, pattern, category",
        )?
        .query_row((pattern, category), map_rule_row)
        .map_err(|error| error.into())
}

/// Retrieve a rule in the database by `rule_id`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
#[cfg(test)]
pub(super) fn get_rule(rule_id: RuleId, connection: &Connection) -> Result<Rule, Error> {
    connection
        .prepare("SELECT id, pattern, category FROM description_rule WHERE id = :id;")?
        .query_row(&[(":id", &rule_id)], map_rule_row)
        .map_err(|error| error.into())
}

/// Retrieve all rules in the database.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_rules(connection: &Connection) -> Result<Vec<Rule>, Error> {
    connection
        // Sort by descending length to ensure that ambiguous patterns (e.g, foo, foobar)
        // always match the more specific (longer) pattern first
        .prepare(
            "SELECT id, pattern, category FROM description_rule
             ORDER BY LENGTH(pattern) DESC, pattern ASC;",
        )?
        .query_map([], map_rule_row)?
        .map(|maybe_rule| maybe_rule.map_err(|error| error.into()))
        .collect()
}

/// Delete a rule from the database.
///
/// # Errors
/// This function will return an error if there is an SQL error or if the rule doesn't exist.
pub(super) fn delete_rule(rule_id: RuleId, connection: &Connection) -> Result<(), Error> {
    let rows_affected =
        connection.execute("DELETE FROM description_rule WHERE id = ?1", [rule_id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingRule);
    }

    Ok(())
}

pub fn create_rule_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS description_rule (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE COLLATE NOCASE,
                category TEXT NOT NULL
            );",
        (),
    )?;

    Ok(())
}

fn map_rule_row(row: &Row) -> Result<Rule, rusqlite::Error> {
    let id = row.get(0)?;
    let pattern = row.get(1)?;
    let category = row.get(2)?;

    Ok(Rule {
        id,
        pattern,
        category,
    })
}
