//! Per-category monthly budgets, the total credit card spend budget, and the
//! budget dashboard state.

mod board;
mod db;
mod endpoints;
mod form;
mod spending;

pub use board::BudgetBoard;
pub use db::{
    create_budget_tables, get_all_budgets, get_category_spending, upsert_budget,
};
pub use endpoints::{
    delete_budget_endpoint, delete_total_budget_endpoint, get_budget_vs_actual_endpoint,
    get_budgets_endpoint, get_total_budget_endpoint, get_total_spend_budget,
    set_total_budget_endpoint, upsert_budget_endpoint,
};
pub use form::{BudgetForm, ValidBudget};
pub use spending::{
    Budget, BudgetId, BudgetWithSpending, CategorySpending, TotalSpendBudget,
    join_budgets_with_spending,
};

#[cfg(test)]
pub use db::set_total_budget_limit;
