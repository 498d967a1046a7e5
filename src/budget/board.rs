//! Client-side state of the budget dashboard.

use crate::{
    Error,
    budget::{
        form::{BudgetForm, ValidBudget},
        spending::{
            Budget, BudgetId, BudgetWithSpending, CategorySpending, TotalSpendBudget,
            join_budgets_with_spending,
        },
    },
    currency::format_remaining,
};

/// The budgets, spending and total budget a dashboard displays.
///
/// The board never talks to the server itself. A front end fetches data,
/// hands it to the board and renders what the board derives from it.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetBoard {
    budgets: Vec<Budget>,
    spending: Vec<CategorySpending>,
    total: Option<TotalSpendBudget>,
    currency_symbol: String,
    pending_delete: Option<BudgetId>,
}

impl BudgetBoard {
    /// An empty board that formats amounts with `currency_symbol`.
    pub fn new(currency_symbol: &str) -> Self {
        Self {
            budgets: Vec::new(),
            spending: Vec::new(),
            total: None,
            currency_symbol: currency_symbol.to_owned(),
            pending_delete: None,
        }
    }

    /// Replace the budgets and spending with freshly fetched data.
    pub fn load(&mut self, budgets: Vec<Budget>, spending: Vec<CategorySpending>) {
        self.budgets = budgets;
        self.spending = spending;
    }

    /// Replace the total spend budget with freshly fetched data.
    pub fn set_total(&mut self, total: TotalSpendBudget) {
        self.total = Some(total);
    }

    /// The total spend budget, if it has been loaded.
    pub fn total(&self) -> Option<&TotalSpendBudget> {
        self.total.as_ref()
    }

    /// The budget cards, most used first.
    pub fn cards(&self) -> Vec<BudgetWithSpending> {
        join_budgets_with_spending(&self.budgets, &self.spending)
    }

    /// The category spending that has no budget yet.
    pub fn unbudgeted_spending(&self) -> Vec<&CategorySpending> {
        self.spending
            .iter()
            .filter(|spending| {
                !self
                    .budgets
                    .iter()
                    .any(|budget| budget.category == spending.category)
            })
            .collect()
    }

    /// How far over the limit a budget is, e.g. "₪500 over", or `None` if within it.
    pub fn over_by(&self, budget: &BudgetWithSpending) -> Option<String> {
        budget
            .is_over_budget
            .then(|| format_remaining(budget.remaining, &self.currency_symbol))
    }

    /// "₪500 over" or "₪120 left" for a budget.
    pub fn remaining_text(&self, budget: &BudgetWithSpending) -> String {
        format_remaining(budget.remaining, &self.currency_symbol)
    }

    /// Validate a create/edit form before it is submitted.
    ///
    /// # Errors
    /// Returns the validation error to show next to the form.
    pub fn validate_form(&self, form: &BudgetForm) -> Result<ValidBudget, Error> {
        form.validate()
    }

    /// Record a budget returned by a successful save.
    pub fn apply_saved(&mut self, saved: Budget) {
        match self.budgets.iter_mut().find(|budget| budget.id == saved.id) {
            Some(budget) => *budget = saved,
            None => self.budgets.push(saved),
        }
    }

    /// Ask for confirmation before deleting `id`.
    pub fn request_delete(&mut self, id: BudgetId) {
        self.pending_delete = Some(id);
    }

    /// Abandon a requested delete.
    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Confirm the requested delete.
    ///
    /// Returns the budget ID to delete, or `None` if `id` was not the budget
    /// awaiting confirmation.
    pub fn confirm_delete(&mut self, id: BudgetId) -> Option<BudgetId> {
        if self.pending_delete == Some(id) {
            self.pending_delete = None;
            Some(id)
        } else {
            None
        }
    }

    /// Remove a budget after the server deleted it.
    pub fn apply_deleted(&mut self, id: BudgetId) {
        self.budgets.retain(|budget| budget.id != id);
    }

    /// Forget the total spend budget after the server cleared it.
    ///
    /// The response body of the delete request is not needed.
    pub fn apply_total_deleted(&mut self) {
        self.total = None;
    }
}
