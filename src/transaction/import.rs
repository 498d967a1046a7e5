//! Stores scraped transactions, skipping ones that were imported before.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::{
    Error,
    rule::{RuleScope, apply_rules},
    transaction::core::{TransactionBuilder, TransactionId, create_transaction},
};

/// What happened when a batch of transactions was imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Transactions that were new and have been stored.
    pub inserted: usize,
    /// Transactions that were skipped because they were imported before.
    pub duplicates: usize,
    /// New transactions that a description rule assigned a category to.
    pub categorized: usize,
}

/// Insert `builders` and apply the description rules to the new transactions.
///
/// Builders without an import ID get one from [create_import_id], so importing
/// the same scrape twice only stores each transaction once. Identical charges
/// in one batch that have no vendor id are told apart by the order they appear
/// in. The whole batch is written in a single database transaction.
///
/// # Errors
/// Returns an error if there is an SQL error, in which case nothing is stored.
pub fn import_transactions(
    builders: Vec<TransactionBuilder>,
    connection: &Connection,
) -> Result<ImportSummary, Error> {
    let tx = connection.unchecked_transaction()?;
    let mut summary = ImportSummary::default();
    let mut inserted_ids: Vec<TransactionId> = Vec::with_capacity(builders.len());
    let mut occurrences: HashMap<i64, usize> = HashMap::new();

    for builder in builders {
        let import_id = match builder.import_id {
            Some(import_id) => import_id,
            None => {
                let import_id = create_import_id(&builder);

                if builder.source_id.is_some() {
                    import_id
                } else {
                    let occurrence = occurrences.entry(import_id).or_default();
                    let import_id = nth_occurrence_id(import_id, *occurrence);
                    *occurrence += 1;
                    import_id
                }
            }
        };

        match create_transaction(builder.import_id(Some(import_id)), &tx) {
            Ok(transaction) => inserted_ids.push(transaction.id),
            Err(Error::DuplicateImportId) => summary.duplicates += 1,
            Err(error) => return Err(error),
        }
    }

    summary.inserted = inserted_ids.len();
    summary.categorized = apply_rules(RuleScope::Only(&inserted_ids), &tx)?.transactions_categorized;

    tx.commit()?;

    Ok(summary)
}

/// Creates a hash for a transaction based on its vendor, account, date, amount,
/// description, installment and the vendor's own id when there is one.
pub fn create_import_id(builder: &TransactionBuilder) -> i64 {
    let mut line = format!(
        "{}|{}|{}|{:.2}|{}|{}",
        builder.vendor,
        builder.last4().unwrap_or_default(),
        builder.date,
        builder.price,
        builder.name,
        builder
            .installments
            .map(|(number, total)| format!("{number}/{total}"))
            .unwrap_or_default(),
    );
    if let Some(source_id) = &builder.source_id {
        line.push_str("|id:");
        line.push_str(source_id);
    }

    hash_import_line(&line)
}

/// The import ID of the `occurrence`th identical charge in a batch, counting from zero.
///
/// The first occurrence keeps the plain hash.
fn nth_occurrence_id(import_id: i64, occurrence: usize) -> i64 {
    if occurrence == 0 {
        import_id
    } else {
        hash_import_line(&format!("{import_id}#{occurrence}"))
    }
}

fn hash_import_line(line: &str) -> i64 {
    let hash_128 = md5::compute(line);
    let mut hash_64 = [0; 8];
    hash_64.copy_from_slice(&hash_128[0..8]);
    i64::from_le_bytes(hash_64)
}
