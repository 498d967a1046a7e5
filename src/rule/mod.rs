//! Description rules map transaction descriptions to categories.
//!
//! A rule matches transaction names that start with its pattern
//! (case-insensitive) and is applied to newly imported transactions.

mod apply;
mod db;
mod endpoints;

pub use apply::{RuleScope, RulingResult, apply_rules};
pub use db::{Rule, RuleId, create_rule_table, get_all_rules, upsert_rule};
pub use endpoints::{apply_rules_endpoint, delete_rule_endpoint, get_rules_endpoint};
