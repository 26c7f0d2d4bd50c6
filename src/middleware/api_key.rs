use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_SECRET_HEADER: &str = "x-api-secret";

/// Credentials presented on a data-plane request, injected by middleware
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Middleware that requires an `X-API-Key` header and exposes it to handlers.
/// Whether the key is valid is decided by the gateway.
pub async fn api_key_middleware(headers: HeaderMap, mut request: Request, next: Next) -> Response {
    let Some(api_key) = header_value(&headers, API_KEY_HEADER) else {
        return ApiError::unauthorized("X-API-Key header is required").into_response();
    };

    let credentials = ApiCredentials {
        api_key,
        api_secret: header_value(&headers, API_SECRET_HEADER),
    };
    request.extensions_mut().insert(credentials);

    next.run(request).await
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_trimmed_non_empty_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  abc  "));
        headers.insert(API_SECRET_HEADER, HeaderValue::from_static(""));

        assert_eq!(header_value(&headers, API_KEY_HEADER).as_deref(), Some("abc"));
        assert!(header_value(&headers, API_SECRET_HEADER).is_none());
        assert!(header_value(&headers, "x-missing").is_none());
    }

    #[test]
    fn debug_hides_credentials() {
        let credentials = ApiCredentials {
            api_key: "key-value".into(),
            api_secret: Some("secret-value".into()),
        };
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("key-value"));
        assert!(!printed.contains("secret-value"));
    }
}
