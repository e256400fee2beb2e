//! File name validation
//!
//! Validates the name announced in `file-start`. The receiver may write the
//! file under this name, so anything that could escape a directory is refused.

/// Maximum length for file names in characters
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Validation error for file names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNameError {
    /// Name is empty
    Empty,
    /// Name exceeds maximum length
    TooLong,
    /// Name contains a path separator or is a relative path component
    PathComponent,
    /// Name contains null bytes or control characters
    InvalidCharacters,
}

/// Validate a file name
///
/// Checks:
/// - Not empty
/// - Does not exceed maximum length (255 characters)
/// - No `/` or `\`, and not `.` or `..`
/// - No null bytes or other control characters
///
/// # Errors
///
/// Returns a `FileNameError` variant describing the validation failure.
pub fn validate_file_name(name: &str) -> Result<(), FileNameError> {
    if name.is_empty() {
        return Err(FileNameError::Empty);
    }
    if name.chars().count() > MAX_FILE_NAME_LENGTH {
        return Err(FileNameError::TooLong);
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(FileNameError::PathComponent);
    }
    if name.chars().any(char::is_control) {
        return Err(FileNameError::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name("my photo (1).jpg").is_ok());
        assert!(validate_file_name(".bashrc").is_ok());
        assert!(validate_file_name("日本語.txt").is_ok());
        assert!(validate_file_name(&"a".repeat(MAX_FILE_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_empty() {
        assert_eq!(validate_file_name(""), Err(FileNameError::Empty));
    }

    #[test]
    fn test_too_long() {
        assert_eq!(
            validate_file_name(&"a".repeat(MAX_FILE_NAME_LENGTH + 1)),
            Err(FileNameError::TooLong)
        );
    }

    #[test]
    fn test_path_components() {
        assert_eq!(
            validate_file_name("../etc/passwd"),
            Err(FileNameError::PathComponent)
        );
        assert_eq!(
            validate_file_name("dir\\file"),
            Err(FileNameError::PathComponent)
        );
        assert_eq!(validate_file_name(".."), Err(FileNameError::PathComponent));
        assert_eq!(validate_file_name("."), Err(FileNameError::PathComponent));
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(
            validate_file_name("a\0b"),
            Err(FileNameError::InvalidCharacters)
        );
        assert_eq!(
            validate_file_name("a\nb"),
            Err(FileNameError::InvalidCharacters)
        );
    }
}
