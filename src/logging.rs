//! Middleware for logging requests and responses.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::settings::SECRET_SETTINGS;

/// Bodies longer than this many characters are truncated in the `info` log.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

const REDACTED: &str = "********";

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] characters, it is
/// truncated and the full body is logged at the `debug` level. Secret
/// settings in JSON bodies are redacted.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(error) => {
            tracing::error!("could not read request body: {error}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    log_body(
        &format!("Received request: {} {}", parts.method, parts.uri),
        &display_body(&parts.headers, &body),
    );

    let request = Request::from_parts(parts, Body::from(body));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(error) => {
            tracing::error!("could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    log_body(
        &format!("Sending response: {}", parts.status),
        &display_body(&parts.headers, &body),
    );

    Response::from_parts(parts, Body::from(body))
}

/// The body as text for the logs, with secrets hidden when it is JSON.
fn display_body(headers: &HeaderMap, body: &Bytes) -> String {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|content_type| content_type.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("application/json"));

    if is_json {
        if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
            redact_secrets(&mut value);
            return value.to_string();
        }
    }

    String::from_utf8_lossy(body).to_string()
}

/// Replace the non-empty values of secret fields anywhere in `value`.
fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields.iter_mut() {
                if SECRET_SETTINGS.contains(&key.as_str()) {
                    if !(field.is_null() || field.as_str() == Some("")) {
                        *field = Value::String(REDACTED.to_owned());
                    }
                } else {
                    redact_secrets(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}

/// The first [LOG_BODY_LENGTH_LIMIT] characters of `body`, if it is longer.
fn truncate_body(body: &str) -> Option<&str> {
    body.char_indices()
        .nth(LOG_BODY_LENGTH_LIMIT)
        .map(|(end, _)| &body[..end])
}

fn log_body(summary: &str, body: &str) {
    match truncate_body(body) {
        Some(truncated) => {
            tracing::info!("{summary}\nbody: {truncated}...");
            tracing::debug!("Full body: {body:?}");
        }
        None => tracing::info!("{summary}\nbody: {body:?}"),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Bytes,
        http::{HeaderMap, HeaderValue, header::CONTENT_TYPE},
    };
    use serde_json::json;

    use super::{LOG_BODY_LENGTH_LIMIT, display_body, truncate_body};

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn secrets_are_redacted_from_json() {
        let body = Bytes::from(
            json!({
                "revision": 3,
                "ai_api_key": "sk-very-secret",
                "twilio_auth_token": "abc123",
                "currency_symbol": "₪"
            })
            .to_string(),
        );

        let display = display_body(&json_headers(), &body);

        assert!(!display.contains("sk-very-secret"));
        assert!(!display.contains("abc123"));
        assert!(display.contains("\"ai_api_key\":\"********\""));
        assert!(display.contains("\"revision\":3"));
    }

    #[test]
    fn nested_secrets_are_redacted() {
        let body = Bytes::from(
            json!({"error": "stale", "settings": {"ai_api_key": "sk-nested"}}).to_string(),
        );

        let display = display_body(&json_headers(), &body);

        assert!(!display.contains("sk-nested"));
    }

    #[test]
    fn unset_secrets_stay_visible_as_unset() {
        let body = Bytes::from(json!({"ai_api_key": null}).to_string());

        assert_eq!(display_body(&json_headers(), &body), r#"{"ai_api_key":null}"#);
    }

    #[test]
    fn non_json_bodies_are_logged_as_text() {
        let body = Bytes::from_static(b"ai_api_key=plain");

        assert_eq!(display_body(&HeaderMap::new(), &body), "ai_api_key=plain");
    }

    #[test]
    fn truncation_respects_character_boundaries() {
        let body = "₪".repeat(LOG_BODY_LENGTH_LIMIT + 1);

        let truncated = truncate_body(&body).unwrap();

        assert_eq!(truncated.chars().count(), LOG_BODY_LENGTH_LIMIT);
        assert_eq!(truncate_body("short"), None);
    }
}
