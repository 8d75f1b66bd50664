use serde_json::Value;
use thiserror::Error;

pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// Blocked client-side before any request was made.
    #[error("{0}")]
    Validation(String),

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    MalformedResponse(String),

    /// The playback element refused to start or failed to decode the clip.
    #[error("Playback failed: {0}")]
    Playback(String),
}

pub type WizardResult<T> = Result<T, WizardError>;

impl WizardError {
    /// The text shown to the user in an alert or inline.
    pub fn user_message(&self) -> String {
        match self {
            WizardError::Validation(msg) => msg.clone(),
            WizardError::InvalidTransition { .. } => self.to_string(),
            WizardError::Network(msg) => format!("Could not reach the server: {}", msg),
            WizardError::Server { message, .. } => message.clone(),
            WizardError::MalformedResponse(msg) => msg.clone(),
            WizardError::Playback(msg) => format!("Error playing audio: {}", msg),
        }
    }

    /// Client-side rejections never touch the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WizardError::Validation(_) | WizardError::InvalidTransition { .. }
        )
    }
}

impl From<reqwest::Error> for WizardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            WizardError::MalformedResponse(e.to_string())
        } else {
            WizardError::Network(e.to_string())
        }
    }
}

/// Pulls a readable message out of an error body.
///
/// JSON `message` first (then `error` / `detail` when they are strings), then the
/// trimmed raw text, then a generic message.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return GENERIC_ERROR_MESSAGE.to_string();
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in ["message", "error", "detail"] {
            if let Some(Value::String(msg)) = map.get(key) {
                if !msg.trim().is_empty() {
                    return msg.trim().to_string();
                }
            }
        }
        return GENERIC_ERROR_MESSAGE.to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_message() {
        assert_eq!(extract_error_message(r#"{"message": "Quota exceeded"}"#), "Quota exceeded");
        assert_eq!(extract_error_message(r#"{"detail": "Bad input"}"#), "Bad input");
    }

    #[test]
    fn test_extract_prefers_message_over_error() {
        let body = r#"{"error": "E42", "message": "Title too long"}"#;
        assert_eq!(extract_error_message(body), "Title too long");
    }

    #[test]
    fn test_extract_falls_back_to_text() {
        assert_eq!(extract_error_message("  Internal Server Error \n"), "Internal Server Error");
    }

    #[test]
    fn test_extract_generic() {
        assert_eq!(extract_error_message(""), GENERIC_ERROR_MESSAGE);
        assert_eq!(extract_error_message(r#"{"code": 500}"#), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_validation_classification() {
        assert!(WizardError::Validation("x".into()).is_validation());
        assert!(WizardError::InvalidTransition { from: "idle".into(), action: "play" }.is_validation());
        assert!(!WizardError::Network("down".into()).is_validation());
    }
}
