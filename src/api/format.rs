//! Wire helpers shared by the admin and data planes.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::store::{Document, ID_FIELD};

/// Parse a request body into a JSON object, rejecting anything else with 400
pub fn parse_object(body: &[u8]) -> Result<Document, ApiError> {
    match parse_value(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

/// Deserialize a typed request body; an empty body reads as `{}`
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value = if is_blank(body) { json!({}) } else { parse_value(body)? };
    serde_json::from_value(value).map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

/// Parse an optional JSON body; an empty body is `None`
pub fn parse_optional(body: &[u8]) -> Result<Option<Value>, ApiError> {
    if is_blank(body) {
        return Ok(None);
    }
    parse_value(body).map(Some)
}

/// Remove a client-supplied identifier; the document store assigns identity
pub fn strip_identifier(document: &mut Document) -> Option<Value> {
    document.remove(ID_FIELD)
}

pub fn message(text: impl Into<String>) -> Value {
    json!({ "message": text.into() })
}

fn parse_value(body: &[u8]) -> Result<Value, ApiError> {
    if is_blank(body) {
        return Err(ApiError::bad_request("Request body is required"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object(br#"{"title":"a"}"#).is_ok());
        for body in [&b""[..], b"  ", b"[1,2]", b"\"text\"", b"{broken"] {
            let err = parse_object(body).unwrap_err();
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn parse_json_treats_empty_as_empty_object() {
        #[derive(Deserialize, Default)]
        struct Body {
            name: Option<String>,
        }

        let body: Body = parse_json(b"").unwrap();
        assert!(body.name.is_none());
        let body: Body = parse_json(br#"{"name":"x"}"#).unwrap();
        assert_eq!(body.name.as_deref(), Some("x"));
        assert!(parse_json::<Body>(br#"{"name":1}"#).is_err());
    }

    #[test]
    fn strips_client_identifiers() {
        let mut document = parse_object(br#"{"_id":"mine","n":1}"#).unwrap();
        assert_eq!(strip_identifier(&mut document), Some(json!("mine")));
        assert!(!document.contains_key(ID_FIELD));
    }
}
