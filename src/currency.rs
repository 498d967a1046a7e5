//! Currency formatting for summaries and budget cards.

use numfmt::{Formatter, Precision};

/// The currency symbol used when the settings do not specify one.
pub const DEFAULT_CURRENCY_SYMBOL: &str = "₪";

/// Format `number` rounded to whole units, e.g. "₪250" or "-₪40".
pub fn format_currency_rounded(number: f64, symbol: &str) -> String {
    let number = number.round();

    if number == 0.0 {
        // Zero is hardcoded as "0", so we must specify the formatted string for zero
        return format!("{symbol}0");
    }

    let prefix = if number < 0.0 {
        format!("-{symbol}")
    } else {
        symbol.to_owned()
    };

    match Formatter::currency(&prefix) {
        Ok(formatter) => formatter
            .precision(Precision::Decimals(0))
            .fmt_string(number.abs()),
        Err(error) => {
            tracing::warn!("could not create currency formatter for {prefix:?}: {error}");
            format!("{prefix}{}", number.abs())
        }
    }
}

/// Describe how far `remaining` is from the budget limit, e.g. "₪500 over" or "₪120 left".
pub fn format_remaining(remaining: f64, symbol: &str) -> String {
    if remaining < 0.0 {
        format!("{} over", format_currency_rounded(-remaining, symbol))
    } else {
        format!("{} left", format_currency_rounded(remaining, symbol))
    }
}
