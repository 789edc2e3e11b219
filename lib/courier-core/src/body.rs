//! JSON body helpers.
//!
//! Request bodies are always buffered [`Bytes`], so a request can be replayed
//! any number of times without re-reading a stream.

use bytes::Bytes;

use crate::Result;

/// Serialize a value into a buffered JSON body.
///
/// # Example
///
/// ```
/// use courier_core::to_json;
///
/// let body = to_json(&serde_json::json!({ "id": 7 })).expect("serialize");
/// assert_eq!(body.as_ref(), br#"{"id":7}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    let buffer = serde_json::to_vec(value)?;
    Ok(Bytes::from(buffer))
}

/// Deserialize a JSON body, reporting the path of the offending field on failure.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        crate::Error::json_deserialization(err.path().to_string(), err.inner().to_string())
    })
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Order {
        id: u64,
        lines: Vec<Line>,
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Line {
        sku: String,
        quantity: u32,
    }

    #[test]
    fn json_body_is_buffered_bytes() {
        let order = Order {
            id: 1,
            lines: vec![Line {
                sku: "A-1".to_string(),
                quantity: 2,
            }],
        };

        let body = to_json(&order).expect("serialize");

        check!(body.as_ref() == br#"{"id":1,"lines":[{"sku":"A-1","quantity":2}]}"#);
        let decoded: Order = from_json(&body).expect("deserialize");
        check!(decoded == order);
    }

    #[test]
    fn decode_error_reports_field_path() {
        let result: Result<Order> = from_json(br#"{"id":1,"lines":[{"sku":"A-1"}]}"#);

        let_assert!(Err(err) = result);
        let message = err.to_string();
        check!(message.contains("lines[0]"));
        check!(message.contains("quantity"));
    }

    #[test]
    fn decode_error_on_garbage() {
        let result: Result<Order> = from_json(b"<html>");

        let_assert!(Err(crate::Error::JsonDeserialization { .. }) = result);
    }
}
