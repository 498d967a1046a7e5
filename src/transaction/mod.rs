//! Transactions scraped from credit cards and bank accounts.
//!
//! This module contains:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing and querying transactions
//! - Importing scraped batches without duplicates
//! - The routes for listing, backing up and deleting transactions

mod core;
mod endpoints;
mod import;
mod purge;

pub use core::{
    AccountFilter, Transaction, TransactionBuilder, TransactionId, create_transaction,
    create_transaction_table, get_all_transactions, get_transactions_by_description,
};
pub use endpoints::{get_transactions_by_description_endpoint, get_transactions_endpoint};
pub use import::{ImportSummary, create_import_id, import_transactions};
pub use purge::{
    DELETE_CONFIRMATION, DeleteAllGate, delete_all_transactions_endpoint,
    export_all_transactions_endpoint,
};

#[cfg(test)]
pub use core::get_transaction;
