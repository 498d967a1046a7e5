//! Joins budgets with what was actually spent.

use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};

/// Database identifier for a budget.
pub type BudgetId = i64;

/// A monthly spending limit for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The category the limit applies to. Unique across budgets.
    pub category: String,
    /// The most that should be spent on the category in a period.
    pub budget_limit: f64,
}

/// How much was spent on a category in a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpending {
    /// The category name.
    pub category: String,
    /// The sum of expenses minus refunds.
    pub actual_spent: f64,
}

/// A budget together with the spending of its category.
///
/// These values are derived on every read and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetWithSpending {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The category name.
    pub category: String,
    /// The spending limit.
    pub budget_limit: f64,
    /// What was spent in the period.
    pub actual_spent: f64,
    /// `budget_limit - actual_spent`, negative when over budget.
    pub remaining: f64,
    /// Spending as a percentage of the limit, rounded to one decimal place.
    pub percent_used: f64,
    /// Whether more than the limit was spent.
    pub is_over_budget: bool,
}

impl BudgetWithSpending {
    /// Derive the spending figures of `budget` from `actual_spent`.
    pub fn new(budget: &Budget, actual_spent: f64) -> Self {
        Self {
            id: budget.id,
            category: budget.category.clone(),
            budget_limit: budget.budget_limit,
            actual_spent,
            remaining: budget.budget_limit - actual_spent,
            percent_used: percent_used(actual_spent, budget.budget_limit),
            is_over_budget: actual_spent > budget.budget_limit,
        }
    }
}

/// `actual_spent` as a percentage of `budget_limit`, rounded to one decimal place.
///
/// Returns 0 for limits that are not positive.
pub fn percent_used(actual_spent: f64, budget_limit: f64) -> f64 {
    if budget_limit <= 0.0 {
        return 0.0;
    }

    (actual_spent / budget_limit * 1000.0).round() / 10.0
}

/// Attach each budget's spending and sort by descending `percent_used`.
///
/// Budgets whose category has no spending get zero. Ties are ordered by category.
pub fn join_budgets_with_spending(
    budgets: &[Budget],
    spending: &[CategorySpending],
) -> Vec<BudgetWithSpending> {
    let spent_by_category: HashMap<&str, f64> = spending
        .iter()
        .map(|spending| (spending.category.as_str(), spending.actual_spent))
        .collect();

    let mut joined: Vec<BudgetWithSpending> = budgets
        .iter()
        .map(|budget| {
            let actual_spent = spent_by_category
                .get(budget.category.as_str())
                .copied()
                .unwrap_or(0.0);

            BudgetWithSpending::new(budget, actual_spent)
        })
        .collect();

    joined.sort_by(|a, b| {
        b.percent_used
            .partial_cmp(&a.percent_used)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });

    joined
}

/// The singleton limit on credit card spending and the spending of a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalSpendBudget {
    /// Whether a limit has been set.
    pub is_set: bool,
    /// The limit, if set.
    pub budget_limit: Option<f64>,
    /// Credit card spending in the period. Reported even when no limit is set.
    pub actual_spent: f64,
    /// `budget_limit - actual_spent`, if a limit is set.
    pub remaining: Option<f64>,
    /// Spending as a percentage of the limit, if a limit is set.
    pub percent_used: Option<f64>,
    /// Whether more than the limit was spent.
    pub is_over_budget: bool,
}

impl TotalSpendBudget {
    /// Derive the figures for an optional `budget_limit`.
    pub fn new(budget_limit: Option<f64>, actual_spent: f64) -> Self {
        Self {
            is_set: budget_limit.is_some(),
            budget_limit,
            actual_spent,
            remaining: budget_limit.map(|limit| limit - actual_spent),
            percent_used: budget_limit.map(|limit| percent_used(actual_spent, limit)),
            is_over_budget: budget_limit.is_some_and(|limit| actual_spent > limit),
        }
    }
}
