use std::collections::HashSet;

use rusqlite::{Connection, ToSql, params_from_iter};
use serde::Serialize;

use crate::{
    Error,
    rule::db::{Rule, get_all_rules},
    transaction::TransactionId,
};

/// Describes which transactions a batch categorization should look at.
///
/// Transactions that already have a category are never changed. A blank
/// category counts as no category.
pub enum RuleScope<'a> {
    /// Every uncategorized transaction.
    AllUncategorized,
    /// The uncategorized transactions among these IDs.
    Only(&'a [TransactionId]),
}

const UNCATEGORIZED: &str = "(category IS NULL OR category = '')";

/// Result of applying description rules to transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulingResult {
    /// Number of transactions that received a category
    pub transactions_categorized: usize,
    /// Number of distinct categories applied
    pub categories_applied: usize,
}

impl RulingResult {
    /// A result where nothing was categorized.
    pub fn empty() -> Self {
        Self {
            transactions_categorized: 0,
            categories_applied: 0,
        }
    }
}

/// Apply all rules to the uncategorized transactions in `scope`.
///
/// **Note**: If you want transactional integrity (all or nothing), pass in a
/// transaction for `connection`.
///
/// # Errors
/// Returns an error if there are database errors during the operation
pub fn apply_rules(scope: RuleScope, connection: &Connection) -> Result<RulingResult, Error> {
    let rules = get_all_rules(connection)?;
    if rules.is_empty() {
        return Ok(RulingResult::empty());
    }

    let transactions = get_uncategorized_names(scope, connection)?;
    if transactions.is_empty() {
        return Ok(RulingResult::empty());
    }

    let mut stmt =
        connection.prepare("UPDATE \"transaction\" SET category = ?2 WHERE id = ?1")?;
    let mut transactions_categorized = 0;
    let mut applied_categories = HashSet::new();

    for (transaction_id, name) in &transactions {
        if let Some(rule) = find_matching_rule(&rules, name) {
            stmt.execute((transaction_id, &rule.category))?;
            applied_categories.insert(rule.category.as_str());
            transactions_categorized += 1;
        }
    }

    Ok(RulingResult {
        transactions_categorized,
        categories_applied: applied_categories.len(),
    })
}

/// Find the first rule whose pattern `name` starts with (case-insensitive).
///
/// `rules` must be sorted longest pattern first so the most specific rule wins.
pub(super) fn find_matching_rule<'a>(rules: &'a [Rule], name: &str) -> Option<&'a Rule> {
    let name = name.to_lowercase();

    rules
        .iter()
        .find(|rule| name.starts_with(&rule.pattern.to_lowercase()))
}

fn get_uncategorized_names(
    scope: RuleScope,
    connection: &Connection,
) -> Result<Vec<(TransactionId, String)>, Error> {
    let (query, ids): (String, &[TransactionId]) = match scope {
        RuleScope::AllUncategorized => (
            format!("SELECT id, name FROM \"transaction\" WHERE {UNCATEGORIZED}"),
            &[],
        ),
        RuleScope::Only([]) => return Ok(Vec::new()),
        RuleScope::Only(ids) => {
            let placeholders = std::iter::repeat_n("?", ids.len())
                .collect::<Vec<_>>()
                .join(", ");

            (
                format!(
                    "SELECT id, name FROM \"transaction\"
                     WHERE {UNCATEGORIZED} AND id IN ({placeholders})"
                ),
                ids,
            )
        }
    };

    let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();

    connection
        .prepare(&query)?
        .query_map(params_from_iter(params), |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::{
        rule::{Rule, upsert_rule},
        test_utils::get_test_connection,
        transaction::{Transaction, create_transaction, get_transaction},
    };

    use super::{RuleScope, RulingResult, apply_rules, find_matching_rule};

    fn rule(pattern: &str, category: &str) -> Rule {
        Rule {
            id: 0,
            pattern: pattern.to_owned(),
            category: category.to_owned(),
        }
    }

    #[test]
    fn matching_is_case_insensitive_prefix() {
        let rules = [rule("wolt", "Delivery")];

        assert!(find_matching_rule(&rules, "WOLT TEL AVIV").is_some());
        assert!(find_matching_rule(&rules, "Wolt").is_some());
        assert!(find_matching_rule(&rules, "PAYBOX WOLT").is_none());
        assert!(find_matching_rule(&rules, "").is_none());
    }

    #[test]
    fn first_rule_in_order_wins() {
        let rules = [rule("super pharm online", "Shopping"), rule("super pharm", "Health")];

        let got = find_matching_rule(&rules, "SUPER PHARM ONLINE 123");

        assert_eq!(got.map(|rule| rule.category.as_str()), Some("Shopping"));
    }

    #[test]
    fn no_rules_returns_empty_result() {
        let connection = get_test_connection();
        create_transaction(
            Transaction::build(-10.0, date!(2025 - 03 - 01), "WOLT", "max"),
            &connection,
        )
        .unwrap();

        let result = apply_rules(RuleScope::AllUncategorized, &connection).unwrap();

        assert_eq!(result, RulingResult::empty());
    }

    #[test]
    fn applies_rules_to_uncategorized_transactions_only() {
        let connection = get_test_connection();
        upsert_rule("wolt", "Delivery", &connection).unwrap();
        upsert_rule("shufersal", "Groceries", &connection).unwrap();
        let uncategorized = create_transaction(
            Transaction::build(-50.0, date!(2025 - 03 - 01), "WOLT HAIFA", "max"),
            &connection,
        )
        .unwrap();
        let categorized = create_transaction(
            Transaction::build(-90.0, date!(2025 - 03 - 01), "SHUFERSAL DEAL", "max")
                .category(Some("Household")),
            &connection,
        )
        .unwrap();
        let groceries = create_transaction(
            Transaction::build(-90.0, date!(2025 - 03 - 02), "Shufersal Online", "max"),
            &connection,
        )
        .unwrap();

        let result = apply_rules(RuleScope::AllUncategorized, &connection).unwrap();

        assert_eq!(
            result,
            RulingResult {
                transactions_categorized: 2,
                categories_applied: 2,
            }
        );
        let category_of = |id| get_transaction(id, &connection).unwrap().category;
        assert_eq!(category_of(uncategorized.id).as_deref(), Some("Delivery"));
        assert_eq!(category_of(categorized.id).as_deref(), Some("Household"));
        assert_eq!(category_of(groceries.id).as_deref(), Some("Groceries"));
    }

    #[test]
    fn only_scope_limits_to_given_ids() {
        let connection = get_test_connection();
        upsert_rule("wolt", "Delivery", &connection).unwrap();
        let first = create_transaction(
            Transaction::build(-50.0, date!(2025 - 03 - 01), "WOLT", "max"),
            &connection,
        )
        .unwrap();
        let second = create_transaction(
            Transaction::build(-50.0, date!(2025 - 03 - 02), "WOLT", "max"),
            &connection,
        )
        .unwrap();

        let result = apply_rules(RuleScope::Only(&[second.id]), &connection).unwrap();

        assert_eq!(result.transactions_categorized, 1);
        assert_eq!(get_transaction(first.id, &connection).unwrap().category, None);
        assert_eq!(
            get_transaction(second.id, &connection).unwrap().category.as_deref(),
            Some("Delivery")
        );
    }

    #[test]
    fn blank_categories_count_as_uncategorized() {
        let connection = get_test_connection();
        upsert_rule("wolt", "Delivery", &connection).unwrap();
        let blank = create_transaction(
            Transaction::build(-50.0, date!(2025 - 03 - 01), "WOLT", "max").category(Some("")),
            &connection,
        )
        .unwrap();

        let result = apply_rules(RuleScope::AllUncategorized, &connection).unwrap();

        assert_eq!(result.transactions_categorized, 1);
        assert_eq!(
            get_transaction(blank.id, &connection).unwrap().category.as_deref(),
            Some("Delivery")
        );
    }

    #[test]
    fn empty_only_scope_does_nothing() {
        let connection = get_test_connection();
        upsert_rule("wolt", "Delivery", &connection).unwrap();

        let result = apply_rules(RuleScope::Only(&[]), &connection).unwrap();

        assert_eq!(result, RulingResult::empty());
    }
}
