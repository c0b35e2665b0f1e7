//! Business codes shared by the pipeline and the wire envelope.

use serde::{Deserialize, Serialize};

pub const SERVER_ERROR: i32 = 10101;
pub const TOO_MANY_REQUESTS: i32 = 10102;
pub const PARAM_BIND_ERROR: i32 = 10103;
pub const BODY_READ_ERROR: i32 = 10104;

/// Default user-facing text for a framework-level business code.
pub fn text(code: i32) -> &'static str {
    match code {
        SERVER_ERROR => "Internal server error",
        TOO_MANY_REQUESTS => "Too many requests",
        PARAM_BIND_ERROR => "Invalid request parameters",
        BODY_READ_ERROR => "Request body could not be read",
        _ => "",
    }
}

/// Error envelope written to the client: `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: i32,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_have_text() {
        assert_eq!(text(SERVER_ERROR), "Internal server error");
        assert_eq!(text(TOO_MANY_REQUESTS), "Too many requests");
        assert_eq!(text(42), "");
    }

    #[test]
    fn test_failure_serializes_as_envelope() {
        let failure = Failure {
            code: 40401,
            message: "not found".into(),
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value, serde_json::json!({"code": 40401, "message": "not found"}));
    }
}
