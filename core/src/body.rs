//! Request payloads and decoded response bodies.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FetchError;
use crate::http::HttpResponse;

/// How the raw response body is decoded into `ResponseData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Text,
    Json,
    Blob,
    ArrayBuffer,
    FormData,
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Text(String),
    Json(Value),
    Blob { content_type: Option<String>, bytes: Bytes },
    ArrayBuffer(Bytes),
    FormData(Vec<(String, String)>),
}

impl ResponseData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseData::Blob { bytes, .. } | ResponseData::ArrayBuffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserializes JSON or text data into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        let parsed = match self {
            ResponseData::Json(value) => serde_json::from_value(value.clone()),
            ResponseData::Text(text) => serde_json::from_str(text),
            ResponseData::Blob { bytes, .. } | ResponseData::ArrayBuffer(bytes) => {
                serde_json::from_slice(bytes)
            }
            ResponseData::FormData(_) => {
                return Err(FetchError::Decode("form data is not JSON".to_string()))
            }
        };
        parsed.map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl From<Value> for ResponseData {
    fn from(value: Value) -> Self {
        ResponseData::Json(value)
    }
}

impl From<&str> for ResponseData {
    fn from(text: &str) -> Self {
        ResponseData::Text(text.to_string())
    }
}

impl From<String> for ResponseData {
    fn from(text: String) -> Self {
        ResponseData::Text(text)
    }
}

/// Decodes the body of `response` according to `response_type`.
pub fn decode(response: &HttpResponse, response_type: ResponseType) -> Result<ResponseData, FetchError> {
    let body = &response.body;
    match response_type {
        ResponseType::Text => Ok(ResponseData::Text(String::from_utf8_lossy(body).into_owned())),
        ResponseType::Json => serde_json::from_slice(body)
            .map(ResponseData::Json)
            .map_err(|e| FetchError::Decode(e.to_string())),
        ResponseType::Blob => Ok(ResponseData::Blob {
            content_type: response.content_type().map(str::to_string),
            bytes: body.clone(),
        }),
        ResponseType::ArrayBuffer => Ok(ResponseData::ArrayBuffer(body.clone())),
        ResponseType::FormData => {
            let urlencoded = response
                .content_type()
                .map_or(true, |ct| ct.starts_with("application/x-www-form-urlencoded"));
            if !urlencoded {
                return Err(FetchError::Decode(format!(
                    "cannot decode {} as form data",
                    response.content_type().unwrap_or_default()
                )));
            }
            let pairs = url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            Ok(ResponseData::FormData(pairs))
        }
    }
}

/// Explicit content type tag for a request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadType {
    Json,
    Text,
    FormData,
    /// A raw content type sent verbatim.
    Other(String),
}

impl PayloadType {
    pub fn content_type(&self) -> &str {
        match self {
            PayloadType::Json => "application/json",
            PayloadType::Text => "text/plain",
            PayloadType::FormData => "multipart/form-data",
            PayloadType::Other(raw) => raw,
        }
    }
}

/// A request body value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl Payload {
    /// Structured values are the only payloads whose type can be inferred.
    pub fn inferred_type(&self) -> Option<PayloadType> {
        match self {
            Payload::Json(Value::Object(_) | Value::Array(_)) => Some(PayloadType::Json),
            _ => None,
        }
    }

    /// Encodes the payload into a request body.
    pub fn encode(&self) -> Result<Bytes, FetchError> {
        match self {
            Payload::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| FetchError::Serialization(e.to_string())),
            Payload::Text(text) => Ok(Bytes::from(text.clone())),
            Payload::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: &'static str) -> HttpResponse {
        HttpResponse::new(200, body)
    }

    #[test]
    fn text_decoding_is_lossy_utf8() {
        let resp = HttpResponse::new(200, Bytes::from_static(b"ok\xff"));
        let data = decode(&resp, ResponseType::Text).unwrap();
        assert_eq!(data.as_text(), Some("ok\u{fffd}"));
    }

    #[test]
    fn json_decoding() {
        let data = decode(&response(r#"{"a":1}"#), ResponseType::Json).unwrap();
        assert_eq!(data, ResponseData::Json(json!({"a": 1})));
    }

    #[test]
    fn bad_json_is_a_decode_error() {
        let err = decode(&response("nope"), ResponseType::Json).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn blob_keeps_content_type() {
        let resp = response("png").with_header("content-type", "image/png");
        let data = decode(&resp, ResponseType::Blob).unwrap();
        assert_eq!(
            data,
            ResponseData::Blob {
                content_type: Some("image/png".to_string()),
                bytes: Bytes::from_static(b"png"),
            }
        );
    }

    #[test]
    fn form_data_from_urlencoded_body() {
        let resp = response("a=1&b=two+words")
            .with_header("content-type", "application/x-www-form-urlencoded");
        let data = decode(&resp, ResponseType::FormData).unwrap();
        assert_eq!(
            data,
            ResponseData::FormData(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two words".to_string()),
            ])
        );
    }

    #[test]
    fn form_data_rejects_other_content_types() {
        let resp = response("{}").with_header("content-type", "application/json");
        assert!(decode(&resp, ResponseType::FormData).is_err());
    }

    #[test]
    fn only_structured_payloads_infer_json() {
        assert_eq!(Payload::Json(json!({"a": 1})).inferred_type(), Some(PayloadType::Json));
        assert_eq!(Payload::Json(json!([1, 2])).inferred_type(), Some(PayloadType::Json));
        assert_eq!(Payload::Json(json!(3)).inferred_type(), None);
        assert_eq!(Payload::from("plain").inferred_type(), None);
    }

    #[test]
    fn json_payload_encodes_as_json() {
        let body = Payload::Json(json!({"name": "x"})).encode().unwrap();
        assert_eq!(&body[..], br#"{"name":"x"}"#);
    }

    #[test]
    fn deserialize_typed_view() {
        #[derive(serde::Deserialize)]
        struct Msg {
            message: String,
        }
        let data = ResponseData::Json(json!({"message": "hi"}));
        let msg: Msg = data.deserialize().unwrap();
        assert_eq!(msg.message, "hi");
    }
}
