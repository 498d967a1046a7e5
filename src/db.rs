//! Creates the application's database schema.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error, budget::create_budget_tables, card::create_card_ownership_table,
    rule::create_rule_table, settings::create_settings_table,
    transaction::create_transaction_table,
};

/// Create all the tables for the domain models if they do not exist yet.
///
/// The tables are created in a single exclusive transaction so that a
/// partially initialised database is never left behind.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_transaction_table(&transaction)?;
    create_budget_tables(&transaction)?;
    create_rule_table(&transaction)?;
    create_card_ownership_table(&transaction)?;
    create_settings_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
