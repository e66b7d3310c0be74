//! wRPC JSON message envelope.
//!
//! A call is `{ "id", "method", "params" }`. The node answers with the same
//! `id` and either `params` or `error`. Notifications carry no `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl WrpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// A node message: a response to a call, or a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl WrpcResponse {
    /// The response body, or the node's error message.
    pub fn into_result(self) -> Result<Value, String> {
        match self.error {
            Some(error) => Err(error_message(&error)),
            None => Ok(self.params.unwrap_or(Value::Null)),
        }
    }
}

/// Nodes send errors either as a plain string or as an object with a
/// `message` field.
fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => match fields.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope() {
        let req = WrpcRequest::new(7, "getBlocks", json!({ "lowHash": "aa" }));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "id": 7, "method": "getBlocks", "params": { "lowHash": "aa" } })
        );
    }

    #[test]
    fn error_wins_over_params() {
        let resp: WrpcResponse = serde_json::from_value(json!({
            "id": 1,
            "params": {},
            "error": { "message": "block not found" }
        }))
        .unwrap();
        assert_eq!(resp.into_result().unwrap_err(), "block not found");
    }

    #[test]
    fn string_error_is_kept_verbatim() {
        let resp: WrpcResponse =
            serde_json::from_value(json!({ "id": 1, "error": "rpc disabled" })).unwrap();
        assert_eq!(resp.into_result().unwrap_err(), "rpc disabled");
    }

    #[test]
    fn notification_has_no_id() {
        let msg: WrpcResponse = serde_json::from_value(json!({
            "method": "virtualDaaScoreChangedNotification",
            "params": { "virtualDaaScore": 1 }
        }))
        .unwrap();
        assert_eq!(msg.id, None);
        assert_eq!(msg.method.as_deref(), Some("virtualDaaScoreChangedNotification"));
    }
}
