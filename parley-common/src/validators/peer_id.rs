//! Peer identity validation
//!
//! Validates identities a client asks the relay to reuse.

/// Maximum length for peer identities in characters
pub const MAX_PEER_ID_LENGTH: usize = 64;

/// Validation error for peer identities
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerIdError {
    /// Identity is empty
    Empty,
    /// Identity exceeds maximum length
    TooLong,
    /// Identity contains whitespace, control, or non-ASCII characters
    InvalidCharacters,
}

/// Validate a peer identity
///
/// Checks:
/// - Not empty
/// - Does not exceed maximum length (64 characters)
/// - Only ASCII graphic characters (`!` through `~`)
///
/// # Errors
///
/// Returns a `PeerIdError` variant describing the validation failure.
pub fn validate_peer_id(peer_id: &str) -> Result<(), PeerIdError> {
    if peer_id.is_empty() {
        return Err(PeerIdError::Empty);
    }
    if peer_id.len() > MAX_PEER_ID_LENGTH {
        return Err(PeerIdError::TooLong);
    }
    if !peer_id.chars().all(|ch| ch.is_ascii_graphic()) {
        return Err(PeerIdError::InvalidCharacters);
    }
    Ok(())
}
