//! JSON-RPC wire DTOs.
//!
//! # Design
//! The `error` member of a response envelope comes in two shapes: an object
//! carrying a `message` string, or a bare string from older servers. Both
//! are decoded into `RpcErrorBody` by shape, and `into_message` normalizes
//! them to the single string a caller sees.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request envelope posted to the endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub method: &'a str,
    pub params: &'a [Value],
    pub id: u64,
}

/// Response envelope returned by the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

/// The `error` member of a response envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RpcErrorBody {
    /// `{"message": "...", ...}`; other members are kept for reporting when
    /// the message is empty.
    Object {
        message: String,
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
    /// A bare string.
    Message(String),
    /// Anything else.
    Other(Value),
}

impl RpcErrorBody {
    /// The message to report, or `None` when the error member is empty
    /// (`""`, `false`, `0`, `[]`, `{}`) and should be ignored.
    pub fn into_message(self) -> Option<String> {
        match self {
            RpcErrorBody::Object { message, mut rest } if message.is_empty() => {
                rest.insert("message".to_string(), Value::String(message));
                Some(Value::Object(rest).to_string())
            }
            RpcErrorBody::Object { message, .. } => Some(message),
            RpcErrorBody::Message(message) if message.is_empty() => None,
            RpcErrorBody::Message(message) => Some(message),
            RpcErrorBody::Other(value) if is_empty_value(&value) => None,
            RpcErrorBody::Other(value) => Some(value.to_string()),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(members) => members.is_empty(),
    }
}
