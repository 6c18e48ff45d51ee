//! Field validation producing `{field: [messages]}` maps.
//!
//! Rules run in order. A failed `required` (or an empty `nullable` value)
//! skips the remaining rules of that field.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::ApiError;

static KATAKANA: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[ァ-ヴー\s]+$").ok());
static EMAIL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Start validating a string field.
    pub fn field<'a>(&'a mut self, name: &'static str, value: &'a str) -> Field<'a> {
        Field {
            errors: self,
            name,
            value,
            skip: false,
        }
    }

    /// Check an integer against an inclusive range. `None` counts as missing.
    pub fn integer_between(&mut self, name: &str, value: Option<i64>, min: i64, max: i64) {
        match value {
            None => self.add(name, format!("The {} field is required.", label(name))),
            Some(v) if v < min || v > max => self.add(
                name,
                format!("The {} field must be between {min} and {max}.", label(name)),
            ),
            Some(_) => {}
        }
    }

    /// Check a non-negative integer. `None` counts as missing.
    pub fn non_negative(&mut self, name: &str, value: Option<i64>) {
        match value {
            None => self.add(name, format!("The {} field is required.", label(name))),
            Some(v) if v < 0 => self.add(
                name,
                format!("The {} field must be at least 0.", label(name)),
            ),
            Some(_) => {}
        }
    }

    /// `Ok(())` when nothing failed.
    ///
    /// # Errors
    /// Returns `ApiError::Validation` carrying every collected message.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

fn label(name: &str) -> String {
    name.replace('_', " ")
}

pub struct Field<'a> {
    errors: &'a mut ValidationErrors,
    name: &'static str,
    value: &'a str,
    skip: bool,
}

impl Field<'_> {
    fn fail(&mut self, message: String) {
        self.errors.add(self.name, message);
    }

    fn active(&self) -> bool {
        !self.skip
    }

    pub fn required(&mut self) -> &mut Self {
        if self.value.trim().is_empty() {
            self.fail(format!("The {} field is required.", label(self.name)));
            self.skip = true;
        }
        self
    }

    /// Remaining rules only apply to non-empty values.
    pub fn nullable(&mut self) -> &mut Self {
        if self.value.trim().is_empty() {
            self.skip = true;
        }
        self
    }

    pub fn max_chars(&mut self, max: usize) -> &mut Self {
        if self.active() && self.value.chars().count() > max {
            self.fail(format!(
                "The {} field must not be greater than {max} characters.",
                label(self.name)
            ));
        }
        self
    }

    pub fn min_chars(&mut self, min: usize) -> &mut Self {
        if self.active() && self.value.chars().count() < min {
            self.fail(format!(
                "The {} field must be at least {min} characters.",
                label(self.name)
            ));
        }
        self
    }

    /// Full-width katakana, the long vowel mark and whitespace.
    pub fn katakana(&mut self) -> &mut Self {
        let matches = KATAKANA.as_ref().is_some_and(|re| re.is_match(self.value));
        if self.active() && !matches {
            self.fail(format!(
                "The {} field must be written in katakana.",
                label(self.name)
            ));
        }
        self
    }

    pub fn email(&mut self) -> &mut Self {
        if self.active() && !valid_email(self.value) {
            self.fail(format!(
                "The {} field must be a valid email address.",
                label(self.name)
            ));
        }
        self
    }

    pub fn lowercase(&mut self) -> &mut Self {
        if self.active() && self.value != self.value.to_lowercase() {
            self.fail(format!("The {} field must be lowercase.", label(self.name)));
        }
        self
    }

    /// Exactly `len` ASCII digits.
    pub fn digits(&mut self, len: usize) -> &mut Self {
        if self.active() && !(self.value.len() == len && all_digits(self.value)) {
            self.fail(format!(
                "The {} field must be {len} digits.",
                label(self.name)
            ));
        }
        self
    }

    pub fn digits_between(&mut self, min: usize, max: usize) -> &mut Self {
        let len = self.value.len();
        if self.active() && !(all_digits(self.value) && (min..=max).contains(&len)) {
            self.fail(format!(
                "The {} field must be between {min} and {max} digits.",
                label(self.name)
            ));
        }
        self
    }

    pub fn confirmed(&mut self, confirmation: &str) -> &mut Self {
        if self.active() && self.value != confirmation {
            self.fail(format!(
                "The {} field confirmation does not match.",
                label(self.name)
            ));
        }
        self
    }

    /// `HH:MM`; returns the parsed time when valid.
    pub fn time(&mut self) -> Option<NaiveTime> {
        if !self.active() {
            return None;
        }
        let parsed = parse_time(self.value);
        if parsed.is_none() {
            self.fail(format!(
                "The {} field must match the format H:i.",
                label(self.name)
            ));
        }
        parsed
    }

    /// `YYYY-MM-DD`; returns the parsed date when valid.
    pub fn date(&mut self) -> Option<NaiveDate> {
        if !self.active() {
            return None;
        }
        let parsed = NaiveDate::parse_from_str(self.value, "%Y-%m-%d").ok();
        if parsed.is_none() {
            self.fail(format!(
                "The {} field must be a valid date.",
                label(self.name)
            ));
        }
        parsed
    }
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Basic email format check.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|regex| regex.is_match(email))
}

/// Parse `HH:MM` (a trailing `:SS` is tolerated).
#[must_use]
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Trim and turn empty strings into `None`.
#[must_use]
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_skips_remaining_rules() {
        let mut errors = ValidationErrors::new();
        errors.field("name", "  ").required().max_chars(1);
        assert_eq!(
            errors.0.get("name"),
            Some(&vec!["The name field is required.".to_string()])
        );
    }

    #[test]
    fn nullable_skips_empty_values() {
        let mut errors = ValidationErrors::new();
        errors.field("birthday", "").nullable().digits(8);
        assert!(errors.is_empty());
    }

    #[test]
    fn multiple_failures_are_collected() {
        let mut errors = ValidationErrors::new();
        errors
            .field("email", "Taro@Example")
            .required()
            .email()
            .lowercase();
        assert_eq!(errors.0.get("email").map(Vec::len), Some(2));
    }

    #[test]
    fn patterns_compile() {
        assert!(KATAKANA.is_some());
        assert!(EMAIL.is_some());
    }

    #[test]
    fn katakana_accepts_full_width() {
        let mut errors = ValidationErrors::new();
        errors.field("kana", "サムライ タロウ").katakana();
        errors.field("other", "ヤマダー　ハナコ").katakana();
        assert!(errors.is_empty());
    }

    #[test]
    fn katakana_rejects_hiragana_and_latin() {
        let mut errors = ValidationErrors::new();
        errors.field("kana", "さむらい").katakana();
        errors.field("other", "Samurai").katakana();
        assert!(errors.has("kana"));
        assert!(errors.has("other"));
    }

    #[test]
    fn digit_rules() {
        let mut errors = ValidationErrors::new();
        errors.field("postal_code", "1010022").digits(7);
        errors.field("phone_number", "0312345678").digits_between(10, 11);
        assert!(errors.is_empty());

        errors.field("postal_code", "101-0022").digits(7);
        errors.field("phone_number", "031234567").digits_between(10, 11);
        errors.field("birthday", "199001011").nullable().digits(8);
        assert!(errors.has("postal_code"));
        assert!(errors.has("phone_number"));
        assert!(errors.has("birthday"));
    }

    #[test]
    fn max_chars_counts_characters_not_bytes() {
        let mut errors = ValidationErrors::new();
        errors.field("name", "侍侍侍").max_chars(3);
        assert!(errors.is_empty());
    }

    #[test]
    fn confirmed_and_min_length() {
        let mut errors = ValidationErrors::new();
        errors
            .field("password", "short")
            .required()
            .min_chars(8)
            .confirmed("other");
        assert_eq!(errors.0.get("password").map(Vec::len), Some(2));
    }

    #[test]
    fn time_and_date_parsing() {
        let mut errors = ValidationErrors::new();
        assert!(errors.field("opening_time", "10:30").required().time().is_some());
        assert!(errors.field("reservation_date", "2026-10-18").required().date().is_some());
        assert!(errors.is_empty());
        assert!(errors.field("closing_time", "25:00").required().time().is_none());
        assert!(errors.field("reservation_date", "2026/10/18").required().date().is_none());
        assert!(errors.has("closing_time"));
        assert!(errors.has("reservation_date"));
    }

    #[test]
    fn integer_rules() {
        let mut errors = ValidationErrors::new();
        errors.integer_between("score", Some(5), 1, 5);
        errors.non_negative("seating_capacity", Some(0));
        assert!(errors.is_empty());
        errors.integer_between("score", Some(6), 1, 5);
        errors.non_negative("lowest_price", None);
        assert!(errors.has("score"));
        assert!(errors.has("lowest_price"));
    }

    #[test]
    fn finish_reports_errors() {
        assert!(ValidationErrors::new().finish().is_ok());
        let mut errors = ValidationErrors::new();
        errors.add("name", "bad");
        assert!(matches!(errors.finish(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn normalize_optional_trims() {
        assert_eq!(normalize_optional(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" 会社員 ".to_string())),
            Some("会社員".to_string())
        );
    }
}
