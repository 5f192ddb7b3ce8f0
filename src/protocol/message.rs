//! Wire shapes and classification predicates.
//!
//! Every message on a shared transport is an untyped JSON value. Before a
//! responder or requester touches one it runs the fixed sequence
//! channel-filter → request / error classification. The predicates below are
//! total: any input, including non-objects and `null`, yields `false` rather
//! than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback message used when an error reply carries no `message`.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Returns true iff `message` is an object with both `channel` and `type`
/// fields and its `channel` equals `channel`.
pub fn belongs_to_channel(message: &Value, channel: &str) -> bool {
    // ---
    let Some(fields) = message.as_object() else {
        return false;
    };

    if !fields.contains_key("type") {
        return false;
    }

    matches!(fields.get("channel"), Some(Value::String(c)) if c == channel)
}

/// Returns true iff `message` is a request: `type == "request"`, a string
/// `method` and an array `args`.
pub fn is_request(message: &Value) -> bool {
    message.get("type").and_then(Value::as_str) == Some("request")
        && message.get("method").is_some_and(Value::is_string)
        && message.get("args").is_some_and(Value::is_array)
}

/// Returns true iff `message` is an error reply: `type == "error"` with an
/// `error` field present.
pub fn is_error(message: &Value) -> bool {
    message.get("type").and_then(Value::as_str) == Some("error") && message.get("error").is_some()
}

/// Request message.
///
/// `args` is always list-shaped, also for zero-argument calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub channel: String,
    pub method: String,
    pub args: Vec<Value>,
}

/// Error details carried by an [`ErrorMessage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    /// Lenient decode of whatever sits in an error message's `error` field.
    ///
    /// Non-string `message`/`stack` values and non-object bodies decode as
    /// absent fields.
    fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_owned);

        Self {
            message: field("message"),
            stack: field("stack"),
        }
    }

    /// The message, or [`UNKNOWN_ERROR`] when absent or empty.
    pub fn message_or_unknown(&self) -> &str {
        match self.message.as_deref() {
            Some(message) if !message.is_empty() => message,
            _ => UNKNOWN_ERROR,
        }
    }
}

/// Error message, sent by a responder in reply to a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub channel: String,
    pub error: ErrorBody,
}

/// Tagged union of the message shapes this protocol defines.
///
/// Serializes with the discriminating `type` field inline:
///
/// ```
/// # use chan_rpc::{RequestMessage, WireMessage};
/// let msg = WireMessage::Request(RequestMessage {
///     channel: "ext".into(),
///     method: "ping".into(),
///     args: vec![],
/// });
///
/// assert_eq!(
///     serde_json::to_value(&msg).unwrap(),
///     serde_json::json!({ "type": "request", "channel": "ext", "method": "ping", "args": [] }),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Request(RequestMessage),
    Error(ErrorMessage),
}

impl WireMessage {
    /// Validating parse of an untyped value.
    ///
    /// Returns `None` for anything that classifies as neither a request nor
    /// an error. The channel is not checked here; callers apply
    /// [`belongs_to_channel`] first.
    pub fn parse(value: &Value) -> Option<Self> {
        // ---
        let channel = value
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        if is_request(value) {
            let method = value.get("method")?.as_str()?.to_owned();
            let args = value.get("args")?.as_array()?.clone();
            return Some(WireMessage::Request(RequestMessage {
                channel,
                method,
                args,
            }));
        }

        if is_error(value) {
            let error = ErrorBody::from_value(value.get("error")?);
            return Some(WireMessage::Error(ErrorMessage { channel, error }));
        }

        None
    }

    /// Decode a raw transport payload into a JSON value.
    ///
    /// Payloads that are not valid JSON are malformed traffic and yield
    /// `None`.
    pub fn decode(payload: &[u8]) -> Option<Value> {
        serde_json::from_slice(payload).ok()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_filter_rejects_non_objects() {
        // ---
        for value in [
            Value::Null,
            json!(1),
            json!("ext"),
            json!(true),
            json!(["ext"]),
        ] {
            assert!(!belongs_to_channel(&value, "ext"), "{value}");
        }
    }

    #[test]
    fn test_channel_filter_requires_both_fields() {
        // ---
        assert!(!belongs_to_channel(&json!({ "channel": "ext" }), "ext"));
        assert!(!belongs_to_channel(&json!({ "type": "request" }), "ext"));
        assert!(belongs_to_channel(
            &json!({ "channel": "ext", "type": "whatever" }),
            "ext"
        ));
        assert!(!belongs_to_channel(
            &json!({ "channel": "other", "type": "request" }),
            "ext"
        ));
        assert!(!belongs_to_channel(
            &json!({ "channel": 7, "type": "request" }),
            "7"
        ));
    }

    #[test]
    fn test_request_classification() {
        // ---
        let ok = json!({ "type": "request", "channel": "ext", "method": "ping", "args": [] });
        assert!(is_request(&ok));
        assert!(!is_error(&ok));

        assert!(!is_request(
            &json!({ "type": "request", "method": 3, "args": [] })
        ));
        assert!(!is_request(
            &json!({ "type": "request", "method": "ping", "args": {} })
        ));
        assert!(!is_request(&json!({ "type": "request", "method": "ping" })));
        assert!(!is_request(&Value::Null));
    }

    #[test]
    fn test_error_classification() {
        // ---
        assert!(is_error(&json!({ "type": "error", "error": null })));
        assert!(!is_error(&json!({ "type": "error" })));
        assert!(!is_error(&json!("error")));
    }

    #[test]
    fn test_parse_request() {
        // ---
        let value = json!({ "type": "request", "channel": "ext", "method": "add", "args": [1, 2] });

        let parsed = WireMessage::parse(&value).unwrap();
        assert_eq!(
            parsed,
            WireMessage::Request(RequestMessage {
                channel: "ext".into(),
                method: "add".into(),
                args: vec![json!(1), json!(2)],
            })
        );
    }

    #[test]
    fn test_parse_error_is_lenient() {
        // ---
        let value = json!({ "type": "error", "channel": "ext", "error": "boom" });

        let Some(WireMessage::Error(msg)) = WireMessage::parse(&value) else {
            panic!("expected error message");
        };
        assert_eq!(msg.error.message, None);
        assert_eq!(msg.error.message_or_unknown(), UNKNOWN_ERROR);
    }

    #[test]
    fn test_parse_rejects_unknown_shapes() {
        // ---
        assert!(WireMessage::parse(&json!({ "type": "event", "channel": "ext" })).is_none());
        assert!(WireMessage::decode(b"not json").is_none());
    }

    #[test]
    fn test_error_serialization_omits_missing_stack() {
        // ---
        let msg = WireMessage::Error(ErrorMessage {
            channel: "ext".into(),
            error: ErrorBody {
                message: Some("fail".into()),
                stack: None,
            },
        });

        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "error", "channel": "ext", "error": { "message": "fail" } })
        );
    }
}
