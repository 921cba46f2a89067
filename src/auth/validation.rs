//! Field format rules shared by signup, recovery and profile updates.
//!
//! Every check returns [`AuthError::InvalidInput`] on the first violation so
//! callers can short-circuit with `?`.

use regex::Regex;
use std::sync::OnceLock;

use crate::auth::{AuthError, AuthResult};

pub const MIN_PASSWORD_LEN: usize = 8;

static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
static NICKNAME_REGEX: OnceLock<Regex> = OnceLock::new();
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// Names are 2-20 characters written in a single script: all Hangul or all Latin.
fn name_regex() -> &'static Regex {
    NAME_REGEX.get_or_init(|| {
        Regex::new(r"^(?:[가-힣]{2,20}|[a-zA-Z]{2,20})$").expect("Invalid name regex")
    })
}

fn nickname_regex() -> &'static Regex {
    NICKNAME_REGEX
        .get_or_init(|| Regex::new(r"^[가-힣a-zA-Z0-9]{2,10}$").expect("Invalid nickname regex"))
}

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.\-]+@(?:[A-Za-z0-9_\-]+\.)+[A-Za-z0-9_\-]{2,4}$")
            .expect("Invalid email regex")
    })
}

pub fn validate_name(name: &str) -> AuthResult<()> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(AuthError::invalid_input("Invalid name format"))
    }
}

pub fn validate_nickname(nickname: &str) -> AuthResult<()> {
    if nickname_regex().is_match(nickname) {
        Ok(())
    } else {
        Err(AuthError::invalid_input("Invalid nickname format"))
    }
}

pub fn validate_email(email: &str) -> AuthResult<()> {
    if email_regex().is_match(email) {
        Ok(())
    } else {
        Err(AuthError::invalid_input("Invalid email format"))
    }
}

/// At least eight characters with one or more ASCII letters and digits.
/// Line terminators are not allowed anywhere.
pub fn is_valid_password(password: &str) -> bool {
    !password.contains(['\n', '\r', '\u{2028}', '\u{2029}'])
        && password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

pub fn validate_password(password: &str) -> AuthResult<()> {
    if is_valid_password(password) {
        Ok(())
    } else {
        Err(AuthError::invalid_input(
            "Password must be at least 8 characters and contain a letter and a digit",
        ))
    }
}

/// Both entries must satisfy the format rule before they are compared.
pub fn validate_password_pair(password: &str, confirmation: &str) -> AuthResult<()> {
    validate_password(password)?;
    validate_password(confirmation)?;
    if password != confirmation {
        return Err(AuthError::invalid_input("Passwords do not match"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules() {
        assert!(is_valid_password("abc12345"));
        assert!(!is_valid_password("abcdefgh"));
        assert!(!is_valid_password("1234567"));
        assert!(!is_valid_password("12345678"));
        assert!(is_valid_password("비밀번호abc1234"));
        assert!(!is_valid_password("abc1234\n"));
        assert!(!is_valid_password("abc\r\n12345"));
        assert!(is_valid_password("abc 1234"));
    }

    #[test]
    fn names_must_use_one_script() {
        assert!(validate_name("Kim").is_ok());
        assert!(validate_name("김철수").is_ok());
        assert!(validate_name("K").is_err());
        assert!(validate_name("Kim김").is_err());
        assert!(validate_name("Kim Lee").is_err());
        assert!(validate_name(&"a".repeat(21)).is_err());
    }

    #[test]
    fn nicknames_are_short_alphanumerics() {
        assert!(validate_nickname("kim01").is_ok());
        assert!(validate_nickname("공원러버1").is_ok());
        assert!(validate_nickname("k").is_err());
        assert!(validate_nickname("kim_01").is_err());
        assert!(validate_nickname("abcdefghijk").is_err());
    }

    #[test]
    fn emails_follow_address_syntax() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("first.last-name@mail.example.kr").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b.c").is_err());
        assert!(validate_email("a b@c.com").is_err());
    }

    #[test]
    fn password_pair_checks_format_then_match() {
        assert!(validate_password_pair("abc12345", "abc12345").is_ok());
        let mismatch = validate_password_pair("abc12345", "abc123456").unwrap_err();
        assert_eq!(mismatch.to_string(), "Passwords do not match");
        assert!(matches!(
            validate_password_pair("abcdefgh", "abcdefgh"),
            Err(AuthError::InvalidInput(_))
        ));
    }
}
