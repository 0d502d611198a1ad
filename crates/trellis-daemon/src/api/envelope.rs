//! Success response envelope.

use serde::Serialize;

/// Uniform success body: `{ "success": true, "data": ..., "message"? }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_omitted_when_absent() {
        let body = serde_json::to_value(ApiResponse::ok(42)).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": 42}));

        let body =
            serde_json::to_value(ApiResponse::ok_with_message(42, "created")).unwrap();
        assert_eq!(body["message"], "created");
    }
}
