//! Shared HTTP plumbing for the network-backed adapters.
//!
//! Maps transport failures and status codes into the shared taxonomy so
//! that every adapter classifies a 429 or a 503 the same way.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::MetadataError;

/// User agent sent to every provider. Wikipedia rejects anonymous clients.
pub const DEFAULT_USER_AGENT: &str =
    concat!("shelfmark/", env!("CARGO_PKG_VERSION"), " (library catalog tooling)");

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the client an adapter uses when none is injected.
pub fn build_client(user_agent: &str) -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Send a request and decode a JSON body, mapping failures for `provider`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<T, MetadataError> {
    let response = send(provider, request).await?;
    let body = response.text().await.map_err(|e| MetadataError::Transient {
        provider: provider.to_string(),
        message: format!("Failed to read response: {}", e),
    })?;

    serde_json::from_str(&body).map_err(|e| MetadataError::Transient {
        provider: provider.to_string(),
        message: format!("Unparsable response: {}", e),
    })
}

/// Send a request and return the response when the status is a success.
pub(crate) async fn send(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<Response, MetadataError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(provider, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    debug!("{} responded {} ({} bytes)", provider, status, body.len());

    Err(status_error(provider, status, retry_after, &body))
}

pub(crate) fn map_transport_error(provider: &'static str, error: reqwest::Error) -> MetadataError {
    if error.is_timeout() {
        MetadataError::Timeout {
            provider: provider.to_string(),
        }
    } else if error.is_connect() || error.is_request() || error.is_body() {
        MetadataError::Transient {
            provider: provider.to_string(),
            message: format!("Request failed: {}", error),
        }
    } else {
        MetadataError::Network(error)
    }
}

/// Classify a non-success status code.
pub(crate) fn status_error(
    provider: &'static str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> MetadataError {
    let provider = provider.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => MetadataError::RateLimited {
            provider,
            retry_after,
        },
        StatusCode::NOT_FOUND | StatusCode::GONE => MetadataError::NotFound { provider },
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::METHOD_NOT_ALLOWED
        | StatusCode::UNPROCESSABLE_ENTITY => MetadataError::Permanent {
            provider,
            message: format!("HTTP {} - {}", status, truncate(body, 200)),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            MetadataError::Timeout { provider }
        }
        _ => MetadataError::Transient {
            provider,
            message: format!("HTTP {}", status),
        },
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Find the volume number a title refers to.
///
/// Recognises "Vol. 3", "Volume 3", "vol 3", "#3" and a trailing number
/// ("Naruto 3"). Returns `None` when the title names no volume.
pub(crate) fn volume_in_title(title: &str) -> Option<u32> {
    let lower = title.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':' || c == '(' || c == ')')
        .filter(|t| !t.is_empty())
        .collect();

    for (idx, token) in tokens.iter().enumerate() {
        let marker = matches!(*token, "vol" | "vol." | "volume" | "v." | "no." | "book");
        if marker {
            if let Some(number) = tokens.get(idx + 1).and_then(|t| parse_number(t)) {
                return Some(number);
            }
        }
        for prefix in ["vol.", "vol", "v", "#"] {
            if let Some(rest) = token.strip_prefix(prefix) {
                if let Some(number) = parse_number(rest) {
                    return Some(number);
                }
            }
        }
    }

    tokens.last().and_then(|t| parse_number(t))
}

fn parse_number(token: &str) -> Option<u32> {
    let token = token.trim_end_matches(['.', ';']);
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Upgrade a plain-http URL to https.
pub(crate) fn force_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error("P", StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2)), ""),
            MetadataError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(2)
        ));
        assert!(matches!(
            status_error("P", StatusCode::NOT_FOUND, None, ""),
            MetadataError::NotFound { .. }
        ));
        assert!(matches!(
            status_error("P", StatusCode::FORBIDDEN, None, "key invalid"),
            MetadataError::Permanent { .. }
        ));
        assert!(matches!(
            status_error("P", StatusCode::SERVICE_UNAVAILABLE, None, ""),
            MetadataError::Transient { .. }
        ));
        assert!(matches!(
            status_error("P", StatusCode::GATEWAY_TIMEOUT, None, ""),
            MetadataError::Timeout { .. }
        ));
    }

    #[test]
    fn test_volume_in_title() {
        assert_eq!(volume_in_title("Naruto, Vol. 12"), Some(12));
        assert_eq!(volume_in_title("One Piece Volume 3"), Some(3));
        assert_eq!(volume_in_title("Bleach vol 7 (Paperback)"), Some(7));
        assert_eq!(volume_in_title("Tokyo Ghoul: re vol.4"), Some(4));
        assert_eq!(volume_in_title("Hunter x Hunter #5"), Some(5));
        assert_eq!(volume_in_title("Bakuman 2"), Some(2));
        assert_eq!(volume_in_title("Assassination Classroom"), None);
    }

    #[test]
    fn test_force_https() {
        assert_eq!(
            force_https("http://books.google.com/x.jpg"),
            "https://books.google.com/x.jpg"
        );
        assert_eq!(force_https("https://a.b/c"), "https://a.b/c");
    }
}
