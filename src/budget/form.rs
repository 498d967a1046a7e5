use serde::{Deserialize, Deserializer};

use crate::Error;

/// The fields of the create/edit budget form.
///
/// `budget_limit` is kept as entered so that validation can report what was typed.
/// JSON clients may send it as a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BudgetForm {
    /// The category, existing or newly typed.
    pub category: String,
    /// The limit as entered.
    #[serde(deserialize_with = "deserialize_number_or_string")]
    pub budget_limit: String,
}

/// A budget that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidBudget {
    /// The trimmed category.
    pub category: String,
    /// A finite, positive limit.
    pub budget_limit: f64,
}

impl BudgetForm {
    /// Check the form.
    ///
    /// # Errors
    /// Returns:
    /// - [Error::EmptyCategory] if the category is blank,
    /// - [Error::InvalidBudgetLimit] if the limit is not a finite number greater than zero.
    pub fn validate(&self) -> Result<ValidBudget, Error> {
        let category = self.category.trim();
        if category.is_empty() {
            return Err(Error::EmptyCategory);
        }

        let budget_limit = validate_budget_limit(&self.budget_limit)?;

        Ok(ValidBudget {
            category: category.to_owned(),
            budget_limit,
        })
    }
}

/// Parse a limit, requiring a finite number greater than zero.
///
/// # Errors
/// Returns [Error::InvalidBudgetLimit] otherwise.
pub fn validate_budget_limit(text: &str) -> Result<f64, Error> {
    match text.trim().parse::<f64>() {
        Ok(limit) if limit.is_finite() && limit > 0.0 => Ok(limit),
        _ => Err(Error::InvalidBudgetLimit(text.to_owned())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

pub(super) fn deserialize_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(number) => number.to_string(),
        NumberOrString::String(text) => text,
    })
}
