//! # Input Validation
//!
//! Rules for what a customer can type and what a module display can show.
//!
//! The keypad is a 4x4 matrix: digits, `A`..`D`, `*` and `#`. `*` and `#`
//! are control keys, so a product code may only use the other fourteen.

use crate::error::ValidationError;
use crate::{MAX_CODE_LEN, MAX_DISPLAY_NAME_LEN};

/// Checks that a product code is non-empty, short enough to type, and
/// uses only characters the keypad can produce.
pub fn validate_product_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.chars().count() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if let Some(bad) = code.chars().find(|c| !is_code_char(*c)) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: format!("'{}' is not a keypad character", bad),
        });
    }

    Ok(())
}

/// True for characters a product code may contain.
pub fn is_code_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, 'A'..='D')
}

/// Truncates a display name to at most [`MAX_DISPLAY_NAME_LEN`] bytes
/// without splitting a UTF-8 sequence.
pub fn truncate_display_name(name: &str) -> &str {
    if name.len() <= MAX_DISPLAY_NAME_LEN {
        return name;
    }

    let mut end = MAX_DISPLAY_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_codes() {
        assert!(validate_product_code("A1").is_ok());
        assert!(validate_product_code("1234").is_ok());
        assert!(validate_product_code("DCBA").is_ok());
    }

    #[test]
    fn test_empty_code_is_required() {
        assert_eq!(
            validate_product_code(""),
            Err(ValidationError::Required {
                field: "code".to_string()
            })
        );
    }

    #[test]
    fn test_long_code_rejected() {
        let code = "1".repeat(MAX_CODE_LEN + 1);
        assert!(matches!(
            validate_product_code(&code),
            Err(ValidationError::TooLong { max: 20, .. })
        ));
    }

    #[test]
    fn test_non_keypad_characters_rejected() {
        assert!(validate_product_code("E1").is_err());
        assert!(validate_product_code("a1").is_err());
        assert!(validate_product_code("A#").is_err());
    }

    #[test]
    fn test_truncate_display_name() {
        assert_eq!(truncate_display_name("Soda"), "Soda");
        assert_eq!(
            truncate_display_name("Sparkling Mineral Water 500ml"),
            "Sparkling Mineral Wa"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 19 ASCII bytes followed by a two-byte character straddling the limit.
        let name = format!("{}é", "x".repeat(19));
        assert_eq!(truncate_display_name(&name), "x".repeat(19));
    }
}
