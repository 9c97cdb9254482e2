//! Error types for the conversation controller and its collaborators.

/// Errors surfaced by the controller, the store, and the provider clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyPrompt,
    #[error("a reply is still on its way")]
    RequestInFlight,
    #[error("conversation history is still loading")]
    HistoryLoading,
    #[error("{0}")]
    Service(String),
    #[error("storage error: {0}")]
    Persistence(String),
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("voice capture error: {0}")]
    Voice(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        ChatError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Service("request timed out".to_string())
        } else if e.is_decode() {
            ChatError::Service(format!("malformed response: {}", e))
        } else {
            ChatError::Service(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ChatError::EmptyPrompt.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::Persistence("disk full".to_string()).to_string(),
            "storage error: disk full"
        );
        assert_eq!(
            ChatError::Service("quota exceeded".to_string()).to_string(),
            "quota exceeded"
        );
    }

    #[test]
    fn test_rusqlite_error_maps_to_persistence() {
        let err: ChatError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, ChatError::Persistence(_)));
    }
}
