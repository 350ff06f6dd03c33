use crate::error::ValidationError;

/// Default upper bound on post length, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 500;

/// Trim and check post content. Returns the text that should be sent.
pub fn validate_content(raw: &str, max_length: usize) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    let len = trimmed.chars().count();
    if len > max_length {
        return Err(ValidationError::ContentTooLong {
            max: max_length,
            len,
        });
    }

    Ok(trimmed.to_string())
}

pub fn validate_reason(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyReason);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(validate_content("  hello \n", 500).unwrap(), "hello");
    }

    #[test]
    fn rejects_blank_content() {
        assert_eq!(validate_content("   ", 500), Err(ValidationError::EmptyContent));
        assert_eq!(validate_content("", 500), Err(ValidationError::EmptyContent));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(500);
        assert!(validate_content(&text, 500).is_ok());

        let text = "é".repeat(501);
        assert_eq!(
            validate_content(&text, 500),
            Err(ValidationError::ContentTooLong { max: 500, len: 501 })
        );
    }

    #[test]
    fn reason_must_not_be_blank() {
        assert_eq!(validate_reason(" \t"), Err(ValidationError::EmptyReason));
        assert_eq!(validate_reason(" spam ").unwrap(), "spam");
    }
}
