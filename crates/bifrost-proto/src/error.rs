//! Protocol decode errors.

use thiserror::Error;

/// Errors from encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A server message was not the expected array of command objects.
    #[error("server message is not a command batch")]
    NotABatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_display() {
        let err = serde_json::from_str::<Vec<u8>>("{").map_err(ProtocolError::from);
        assert!(err.is_err());
        let msg = match err {
            Err(e) => e.to_string(),
            Ok(_) => String::new(),
        };
        assert!(msg.starts_with("malformed JSON frame"));
    }
}
