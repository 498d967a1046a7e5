//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/budgets/{budget_id}', use [format_endpoint].

/// The route for listing, creating and updating budgets.
pub const BUDGETS: &str = "/api/budgets";
/// The route to delete a budget.
pub const BUDGET: &str = "/api/budgets/{budget_id}";
/// The route for per-category spending compared with budgets.
pub const BUDGET_VS_ACTUAL: &str = "/api/reports/budget-vs-actual";
/// The route for the overall credit card spend budget.
pub const TOTAL_BUDGET: &str = "/api/reports/total-budget";
/// The route for grouped monthly reports.
pub const MONTHLY_SUMMARY: &str = "/api/reports/monthly-summary";
/// The route for the category vocabulary.
pub const CATEGORIES: &str = "/api/categories";
/// Alias of [CATEGORIES] used by older clients.
pub const ALL_CATEGORIES: &str = "/api/get_all_categories";
/// The route for descriptions of transactions without a category.
pub const UNCATEGORIZED_DESCRIPTIONS: &str = "/api/uncategorized_descriptions";
/// The route to categorize all transactions with a description.
pub const UPDATE_CATEGORY_BY_DESCRIPTION: &str = "/api/update_category_by_description";
/// Alias of [UPDATE_CATEGORY_BY_DESCRIPTION].
pub const CATEGORIES_UPDATE_BY_DESCRIPTION: &str = "/api/categories/update-by-description";
/// The route for the description rules.
pub const RULES: &str = "/api/rules";
/// The route to delete a description rule.
pub const RULE: &str = "/api/rules/{rule_id}";
/// The route to apply the description rules to uncategorized transactions.
pub const RULES_APPLY: &str = "/api/rules/apply";
/// The route to list transactions for a period or account.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to list transactions that share a description.
pub const TRANSACTIONS_BY_DESCRIPTION: &str = "/api/transactions_by_description";
/// The route to download a backup of every transaction.
pub const EXPORT_ALL_TRANSACTIONS: &str = "/api/transactions/export_all_transactions";
/// The route to delete every transaction.
pub const DELETE_ALL_TRANSACTIONS: &str = "/api/transactions/delete_all_transactions";
/// The route for the settings bag.
pub const SETTINGS: &str = "/api/settings";
/// The route to validate and install a scraper library version.
pub const UPDATE_LIBRARY: &str = "/api/settings/update-library";
/// The route for card metadata.
pub const CARDS: &str = "/api/cards";
/// The route to relink a card to a bank account.
pub const CARD_OWNERSHIP: &str = "/api/cards/ownerships/{ownership_id}";
/// The route to start a background sync.
pub const BACKGROUND_SYNC: &str = "/api/background_sync";
/// The route for the state of the background sync.
pub const BACKGROUND_SYNC_STATUS: &str = "/api/background_sync/status";
/// The route for the WhatsApp session status.
pub const WHATSAPP_STATUS: &str = "/api/whatsapp/status";
/// Alias of [WHATSAPP_STATUS] for the WhatsApp Web bridge.
pub const WHATSAPP_WEBJS_STATUS: &str = "/api/whatsapp-webjs/status";
/// The route for the pairing QR code.
pub const WHATSAPP_WEBJS_QR: &str = "/api/whatsapp-webjs/qr";
/// The route to end the WhatsApp session.
pub const WHATSAPP_WEBJS_DISCONNECT: &str = "/api/whatsapp-webjs/disconnect";
/// The route for the contacts of the paired WhatsApp account.
pub const WHATSAPP_WEBJS_CONTACTS: &str = "/api/whatsapp-webjs/contacts";
/// The route to send an arbitrary WhatsApp message.
pub const WHATSAPP_WEBJS_SEND: &str = "/api/whatsapp-webjs/send";
/// The route to send the spending summary as a test message.
pub const WHATSAPP_TEST: &str = "/api/whatsapp-test";
/// Alias of [WHATSAPP_TEST].
pub const WHATSAPP_TEST_ALIAS: &str = "/api/whatsapp_test";
/// The route for the server-sent event stream.
pub const EVENTS: &str = "/api/events";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/api/budgets/{budget_id}', '{budget_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let Some(param_len) = endpoint_path[param_start..].find('}') else {
        return endpoint_path.to_owned();
    };
    let param_end = param_start + param_len;

    let is_valid_param = endpoint_path[param_start + 1..param_end]
        .chars()
        .all(|c| c.is_ascii_lowercase() || c == '_');

    if !is_valid_param || param_end == param_start + 1 {
        return endpoint_path.to_owned();
    }

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end + 1..]
    )
}
