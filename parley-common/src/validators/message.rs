//! Chat message validation

/// Maximum length for chat messages in characters
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Validation error for chat messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Message is empty
    Empty,
    /// Message exceeds maximum length
    TooLong,
    /// Message contains null bytes
    ContainsNull,
}

/// Validate a chat message before it is sent over a data channel
///
/// # Errors
///
/// Returns a `MessageError` variant describing the validation failure.
pub fn validate_message(message: &str) -> Result<(), MessageError> {
    if message.is_empty() {
        return Err(MessageError::Empty);
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(MessageError::TooLong);
    }
    if message.contains('\0') {
        return Err(MessageError::ContainsNull);
    }
    Ok(())
}
