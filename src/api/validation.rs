//! Input validation for API requests.
//!
//! This module provides validation functions for API request data,
//! ensuring all inputs meet the required format and constraints.
//!
//! For collecting multiple validation errors and returning them as an ApiError,
//! use the `ValidationErrorBuilder` from the `error` module.

/// Maximum length, in characters, of short text columns (titles, machine ids)
pub const MAX_SHORT_TEXT: usize = 255;

/// Validate a title (optional field, may be blank)
pub fn validate_title(title: &Option<String>) -> Result<(), String> {
    if let Some(t) = title {
        if t.chars().count() > MAX_SHORT_TEXT {
            return Err(format!(
                "Title is too long (max {} characters)",
                MAX_SHORT_TEXT
            ));
        }
    }

    Ok(())
}

/// Validate a machine identifier (Tomay)
pub fn validate_machine(machine: &str) -> Result<(), String> {
    if machine.trim().is_empty() {
        return Err("Machine identifier may not be blank".to_string());
    }

    if machine.chars().count() > MAX_SHORT_TEXT {
        return Err(format!(
            "Machine identifier is too long (max {} characters)",
            MAX_SHORT_TEXT
        ));
    }

    Ok(())
}

/// Parse a path id. Anything that is not a positive integer cannot name a
/// record, so callers answer it with 404 like any other missing id.
pub fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Validate a password for a new user
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 5 {
        return Err("Password must be at least 5 characters".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert!(validate_title(&None).is_ok());
        assert!(validate_title(&Some(String::new())).is_ok());
        assert!(validate_title(&Some("Nhật ký sự kiện".to_string())).is_ok());
        assert!(validate_title(&Some("ệ".repeat(255))).is_ok());
        assert!(validate_title(&Some("a".repeat(256))).is_err());
    }

    #[test]
    fn test_validate_machine() {
        assert!(validate_machine("H1").is_ok());
        assert!(validate_machine("Hệ thống máy xử lý").is_ok());
        assert!(validate_machine("").is_err());
        assert!(validate_machine("   ").is_err());
        assert!(validate_machine(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42"), Some(42));
        assert_eq!(parse_id("0"), None);
        assert_eq!(parse_id("-3"), None);
        assert_eq!(parse_id("abc"), None);
        assert_eq!(parse_id(""), None);
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("test123").is_ok());
        assert!(validate_password("abc").is_err());
    }
}
