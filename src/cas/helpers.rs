//! Pure helper functions for the CAS filter
//!
//! HTTP client construction, cookie extraction, session cookie formatting and
//! redirect responses.

use axum::http::{header, header::InvalidHeaderValue, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;

use crate::config::Config;

// =============================================================================
// HTTP Client Builders
// =============================================================================

/// Create the reqwest client used for ticket validation
///
/// The timeouts bound every CAS round trip; a timeout surfaces as a failed
/// validation.
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

// =============================================================================
// Cookie Extraction
// =============================================================================

/// Extract a cookie value from headers
///
/// Handles multiple Cookie headers (some proxies fold/duplicate headers).
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);

    for header_value in headers.get_all("cookie") {
        if let Ok(cookie_str) = header_value.to_str() {
            if let Some(value) = cookie_str
                .split(';')
                .map(|c| c.trim())
                .find(|c| c.starts_with(&prefix))
                .and_then(|c| c.strip_prefix(&prefix))
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

// =============================================================================
// Session Cookies
// =============================================================================

/// Set-Cookie value binding the browser to a session
pub fn session_cookie(config: &Config, session_id: &str) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax{}{}",
        config.session_cookie_name,
        session_id,
        config.cookie_domain_attr(),
        config.cookie_secure_flag()
    )
}

/// Set-Cookie value removing the session cookie
pub fn clear_session_cookie(config: &Config) -> String {
    format!(
        "{}=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax{}{}",
        config.session_cookie_name,
        config.cookie_domain_attr(),
        config.cookie_secure_flag()
    )
}

// =============================================================================
// Responses
// =============================================================================

/// Create a HeaderValue from a string, returning an error response if invalid.
pub fn header_value(s: &str) -> Result<HeaderValue, Box<Response>> {
    HeaderValue::from_str(s).map_err(|e: InvalidHeaderValue| {
        tracing::error!(
            error = %e,
            value_len = s.len(),
            "Failed to create header value"
        );
        Box::new(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal error setting response headers"})),
            )
                .into_response(),
        )
    })
}

/// `302 Found` redirect, the status CAS clients use for login and logout hops
pub fn found(location: &str) -> Response {
    match header_value(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(response) => *response,
    }
}

/// Append a Set-Cookie header; failures are logged and skipped
pub fn append_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = header_value(cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_cookie_finds_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("foo=bar; CAS_GATEWAY_SESSION=abc123; baz=qux"),
        );

        let result = extract_cookie(&headers, "CAS_GATEWAY_SESSION");
        assert_eq!(result, Some("abc123".to_string()));
    }

    #[test]
    fn test_extract_cookie_missing_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("foo=bar; baz=qux"));

        assert_eq!(extract_cookie(&headers, "CAS_GATEWAY_SESSION"), None);
    }

    #[test]
    fn test_extract_cookie_no_cookie_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_cookie(&headers, "CAS_GATEWAY_SESSION"), None);
    }

    #[test]
    fn test_extract_cookie_multiple_headers() {
        // Some proxies send multiple Cookie headers instead of one combined header
        let mut headers = HeaderMap::new();
        headers.append("cookie", HeaderValue::from_static("foo=bar"));
        headers.append(
            "cookie",
            HeaderValue::from_static("CAS_GATEWAY_SESSION=secret123; baz=qux"),
        );

        let result = extract_cookie(&headers, "CAS_GATEWAY_SESSION");
        assert_eq!(result, Some("secret123".to_string()));
    }

    #[test]
    fn test_session_cookie_format() {
        let mut config = Config::for_tests();
        assert_eq!(
            session_cookie(&config, "abc"),
            "CAS_GATEWAY_SESSION=abc; HttpOnly; Path=/; SameSite=Lax"
        );

        config.cookie_domain = Some("example.com".to_string());
        config.environment = crate::config::Environment::Production;
        assert_eq!(
            clear_session_cookie(&config),
            "CAS_GATEWAY_SESSION=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax; Domain=example.com; Secure"
        );
    }

    #[test]
    fn test_found_sets_location() {
        let response = found("https://cas.example.com/cas/logout");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://cas.example.com/cas/logout"
        );
    }

    #[test]
    fn test_found_rejects_header_injection() {
        let response = found("https://cas.example.com/\r\nSet-Cookie: x=y");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
