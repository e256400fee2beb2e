//! SHA-256 hash validation
//!
//! Validates the content hash a sender may attach to `file-start`.

/// Expected length for SHA-256 hash strings (64 hex characters)
pub const SHA256_HEX_LENGTH: usize = 64;

/// Validation error for SHA-256 hash strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sha256Error {
    /// Hash string has wrong length
    InvalidLength,
    /// Hash string contains non-hexadecimal or uppercase characters
    InvalidCharacters,
}

/// Validate a lowercase hex SHA-256 string
///
/// # Errors
///
/// Returns a `Sha256Error` variant describing the validation failure.
pub fn validate_sha256(hash: &str) -> Result<(), Sha256Error> {
    if hash.len() != SHA256_HEX_LENGTH {
        return Err(Sha256Error::InvalidLength);
    }
    if !hash
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(Sha256Error::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_hex;

    #[test]
    fn test_valid_hash() {
        assert!(validate_sha256(&sha256_hex(b"parley")).is_ok());
        assert!(validate_sha256(&"0".repeat(SHA256_HEX_LENGTH)).is_ok());
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(validate_sha256("abc"), Err(Sha256Error::InvalidLength));
        assert_eq!(validate_sha256(""), Err(Sha256Error::InvalidLength));
    }

    #[test]
    fn test_uppercase_rejected() {
        let upper = sha256_hex(b"parley").to_uppercase();
        assert_eq!(validate_sha256(&upper), Err(Sha256Error::InvalidCharacters));
    }

    #[test]
    fn test_non_hex_rejected() {
        assert_eq!(
            validate_sha256(&"g".repeat(SHA256_HEX_LENGTH)),
            Err(Sha256Error::InvalidCharacters)
        );
    }
}
