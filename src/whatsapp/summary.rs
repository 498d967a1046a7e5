//! The daily spending summary sent over WhatsApp.

use rusqlite::Connection;
use time::{format_description::BorrowedFormatItem, macros::format_description};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    Error,
    budget::{CategorySpending, TotalSpendBudget, get_category_spending, get_total_spend_budget},
    currency::{format_currency_rounded, format_remaining},
    period::Period,
    settings::get_settings,
    timezone::local_today,
};

const TOP_CATEGORY_COUNT: usize = 5;

/// Longer category names are cut to this many characters.
const MAX_CATEGORY_LENGTH: usize = 24;

const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[day]/[month]/[year]");

/// Write the summary of `period`: credit card spending against the total
/// budget, then the categories with the most spending.
pub fn compose_summary(
    period: &Period,
    total: &TotalSpendBudget,
    categories: &[CategorySpending],
    currency_symbol: &str,
) -> String {
    let mut lines = vec![format!(
        "Spending summary {} - {}",
        format_date(period.start),
        format_date(period.end)
    )];

    let spent = format_currency_rounded(total.actual_spent, currency_symbol);
    match (total.budget_limit, total.remaining) {
        (Some(limit), Some(remaining)) => {
            let percent = total.percent_used.unwrap_or(0.0);
            lines.push(format!(
                "Credit cards: {spent} of {} ({percent:.1}%), {}",
                format_currency_rounded(limit, currency_symbol),
                format_remaining(remaining, currency_symbol)
            ));
        }
        _ => lines.push(format!("Credit cards: {spent}")),
    }

    let top: Vec<&CategorySpending> = categories
        .iter()
        .filter(|category| category.actual_spent > 0.0)
        .take(TOP_CATEGORY_COUNT)
        .collect();

    if !top.is_empty() {
        lines.push(String::new());
        lines.push("Top categories:".to_owned());
        for (rank, category) in top.iter().enumerate() {
            lines.push(format!(
                "{}. {} {}",
                rank + 1,
                truncate(&category.category, MAX_CATEGORY_LENGTH),
                format_currency_rounded(category.actual_spent, currency_symbol)
            ));
        }
    }

    lines.join("\n")
}

/// Compose the summary of the current period from the database.
///
/// # Errors
/// Returns an error if the settings or spending cannot be read or the
/// timezone is unknown.
pub fn build_current_summary(local_timezone: &str, connection: &Connection) -> Result<String, Error> {
    let settings = get_settings(connection)?;
    let today = local_today(local_timezone)?;
    let period = Period::containing(today, settings.billing_cycle_start_day)?;

    let total = get_total_spend_budget(&period, connection)?;
    let categories = get_category_spending(&period, connection)?;

    Ok(compose_summary(
        &period,
        &total,
        &categories,
        &settings.currency_symbol,
    ))
}

fn format_date(date: time::Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Cut `text` to `max_length` user-perceived characters, marking the cut with an ellipsis.
fn truncate(text: &str, max_length: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();

    if graphemes.len() <= max_length {
        return text.to_owned();
    }

    let mut truncated: String = graphemes[..max_length.saturating_sub(1)].concat();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use crate::{
        budget::{CategorySpending, TotalSpendBudget},
        period::Period,
    };

    use super::{compose_summary, truncate};

    fn spending(category: &str, actual_spent: f64) -> CategorySpending {
        CategorySpending {
            category: category.to_owned(),
            actual_spent,
        }
    }

    #[test]
    fn summary_with_total_budget() {
        let period = Period::for_month(2025, 3, 1).unwrap();
        let total = TotalSpendBudget::new(Some(5000.0), 5500.0);
        let categories = vec![
            spending("Groceries", 2500.0),
            spending("Fuel", 400.0),
            spending("Refunds", -100.0),
        ];

        let message = compose_summary(&period, &total, &categories, "₪");

        assert_eq!(
            message,
            "Spending summary 01/03/2025 - 31/03/2025\n\
             Credit cards: ₪5,500 of ₪5,000 (110.0%), ₪500 over\n\
             \n\
             Top categories:\n\
             1. Groceries ₪2,500\n\
             2. Fuel ₪400"
        );
    }

    #[test]
    fn summary_without_total_budget_or_categories() {
        let period = Period::for_month(2025, 3, 1).unwrap();
        let total = TotalSpendBudget::new(None, 42.0);

        let message = compose_summary(&period, &total, &[], "$");

        assert_eq!(
            message,
            "Spending summary 01/03/2025 - 31/03/2025\nCredit cards: $42"
        );
    }

    #[test]
    fn only_top_five_categories_are_listed() {
        let period = Period::for_month(2025, 3, 1).unwrap();
        let total = TotalSpendBudget::new(None, 0.0);
        let categories: Vec<CategorySpending> = (1..=7)
            .rev()
            .map(|n| spending(&format!("C{n}"), n as f64 * 10.0))
            .collect();

        let message = compose_summary(&period, &total, &categories, "₪");

        assert!(message.contains("5. C3"));
        assert!(!message.contains("C2"));
    }

    #[test]
    fn truncates_by_grapheme() {
        assert_eq!(truncate("Groceries", 24), "Groceries");
        assert_eq!(truncate("קניות בסופר הגדול", 6), "קניות…");
        assert_eq!(truncate("🇮🇱🇮🇱🇮🇱", 2), "🇮🇱…");
    }
}
