// Field-level validation
// Collects every failing field before rejecting a request, keyed by the
// request field name (nested arrays use dotted keys such as `items.0.name`).

use crate::error::{AppError, AppResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Largest money value accepted from input (999.999.999.999,99)
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 2);

// ============================================================================
// VALIDATION ERRORS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }

    /// First message overall, used as the summary line of an error response
    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flat_map(|v| v.iter()).next().map(|s| s.as_str())
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (field, messages) in &self.0 {
            for message in messages {
                writeln!(f, "{}: {}", field, message)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Accumulating validator. Each check records a message instead of
/// returning early; `finish()` turns the collected messages into an error.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.has(field)
    }

    /// Required text: trimmed, non-empty and at most `max` characters.
    pub fn required_str(
        &mut self,
        field: &str,
        label: &str,
        value: Option<&str>,
        max: usize,
    ) -> Option<String> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => {
                self.max_len(field, label, v, max);
                Some(v.to_string())
            }
            None => {
                self.add(field, format!("{} wajib diisi.", label));
                None
            }
        }
    }

    /// Optional text: blank becomes `None`.
    pub fn optional_str(
        &mut self,
        field: &str,
        label: &str,
        value: Option<&str>,
        max: usize,
    ) -> Option<String> {
        let v = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.max_len(field, label, v, max);
        Some(v.to_string())
    }

    pub fn max_len(&mut self, field: &str, label: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(field, format!("{} maksimal {} karakter.", label, max));
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !is_valid_email(value) {
            self.add(field, "Format email tidak valid.");
        }
    }

    pub fn required<T>(&mut self, field: &str, label: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, format!("{} wajib diisi.", label));
        }
        value
    }

    /// Required enum given as its wire string.
    pub fn one_of<T>(
        &mut self,
        field: &str,
        label: &str,
        value: Option<&str>,
        parse: fn(&str) -> Option<T>,
    ) -> Option<T> {
        let raw = self.required(field, label, value.map(str::trim).filter(|v| !v.is_empty()))?;
        let parsed = parse(raw);
        if parsed.is_none() {
            self.add(field, format!("{} yang dipilih tidak valid.", label));
        }
        parsed
    }

    pub fn non_negative(&mut self, field: &str, label: &str, value: Decimal) {
        if value.is_sign_negative() && !value.is_zero() {
            self.add(field, format!("{} tidak boleh bernilai negatif.", label));
        }
    }

    pub fn positive(&mut self, field: &str, label: &str, value: Decimal) {
        if value <= Decimal::ZERO {
            self.add(field, format!("{} harus lebih dari 0.", label));
        }
    }

    pub fn percentage(&mut self, field: &str, label: &str, value: Decimal) {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            self.add(field, format!("{} harus di antara 0 dan 100.", label));
        }
    }

    /// Money bound, checked on the magnitude so negative import rows are
    /// held to the same limit.
    pub fn max_amount(&mut self, field: &str, label: &str, value: Decimal) {
        if value.abs() > MAX_AMOUNT {
            self.add(field, format!("{} maksimal 999.999.999.999,99.", label));
        }
    }

    pub fn min_int(&mut self, field: &str, label: &str, value: i64, min: i64) {
        if value < min {
            self.add(field, format!("{} minimal {}.", label, min));
        }
    }

    pub fn max_int(&mut self, field: &str, label: &str, value: i64, max: i64) {
        if value > max {
            self.add(field, format!("{} maksimal {}.", label, max));
        }
    }

    /// `value` must be on or after `other`.
    pub fn date_not_before(
        &mut self,
        field: &str,
        label: &str,
        value: NaiveDate,
        other: NaiveDate,
        other_label: &str,
    ) {
        if value < other {
            self.add(
                field,
                format!("{} harus setelah atau sama dengan {}.", label, other_label),
            );
        }
    }

    /// Referenced row does not exist (or is not selectable).
    pub fn not_exists(&mut self, field: &str, label: &str) {
        self.add(field, format!("{} yang dipilih tidak valid.", label));
    }

    pub fn taken(&mut self, field: &str, label: &str) {
        self.add(field, format!("{} sudah digunakan.", label));
    }

    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }

    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Three upper-case ASCII letters (ISO 4217 shape).
pub fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_collects_all_errors() {
        let mut v = Validator::new();
        v.required_str("name", "Nama", Some("   "), 255);
        v.required_str("email", "Email", None, 255);
        v.non_negative("amount", "Jumlah", dec!(-1));

        let errors = v.into_errors();
        assert_eq!(errors.fields(), vec!["amount", "email", "name"]);
        assert_eq!(errors.get("name").unwrap()[0], "Nama wajib diisi.");
    }

    #[test]
    fn test_required_str_trims_and_checks_length() {
        let mut v = Validator::new();
        assert_eq!(v.required_str("name", "Nama", Some("  Budi  "), 10), Some("Budi".to_string()));
        v.required_str("title", "Judul", Some("abcdefghijk"), 10);
        assert!(v.has("title"));
        assert!(!v.has("name"));
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("sari@example.co.id"));
        assert!(!is_valid_email("sari@example"));
        assert!(!is_valid_email("sari example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_one_of_rejects_unknown_values() {
        fn parse(s: &str) -> Option<u8> {
            match s {
                "one" => Some(1),
                _ => None,
            }
        }
        let mut v = Validator::new();
        assert_eq!(v.one_of("kind", "Jenis", Some("one"), parse), Some(1));
        assert_eq!(v.one_of("kind", "Jenis", Some("two"), parse), None);
        assert_eq!(
            v.into_errors().get("kind").unwrap()[0],
            "Jenis yang dipilih tidak valid."
        );
    }

    #[test]
    fn test_date_ordering_and_numbers() {
        let mut v = Validator::new();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        v.date_not_before("period_end", "Tanggal akhir", end, start, "tanggal mulai");
        v.percentage("discount_percent", "Diskon", dec!(101));
        v.positive("amount", "Jumlah", Decimal::ZERO);
        v.non_negative("fee", "Biaya", Decimal::ZERO);
        v.min_int("months", "Durasi", 0, 1);

        let errors = v.into_errors();
        assert!(errors.has("period_end"));
        assert!(errors.has("discount_percent"));
        assert!(errors.has("amount"));
        assert!(errors.has("months"));
        assert!(!errors.has("fee"));
    }

    #[test]
    fn test_money_and_integer_upper_bounds() {
        assert_eq!(MAX_AMOUNT, dec!(999999999999.99));

        let mut v = Validator::new();
        v.max_amount("amount", "Jumlah", MAX_AMOUNT);
        v.max_amount("fee", "Biaya", -MAX_AMOUNT);
        v.max_int("quantity", "Jumlah", 10_000, 10_000);
        assert!(v.into_errors().is_empty());

        let mut v = Validator::new();
        v.max_amount("amount", "Jumlah", Decimal::MAX);
        v.max_amount("fee", "Biaya", dec!(-1000000000000));
        v.max_int("quantity", "Jumlah", 5_000_000_000, 10_000);
        let errors = v.into_errors();
        assert_eq!(errors.get("amount").unwrap()[0], "Jumlah maksimal 999.999.999.999,99.");
        assert!(errors.has("fee"));
        assert_eq!(errors.get("quantity").unwrap()[0], "Jumlah maksimal 10000.");
    }

    #[test]
    fn test_currency_code() {
        assert!(is_currency_code("IDR"));
        assert!(!is_currency_code("idr"));
        assert!(!is_currency_code("RUPIAH"));
    }
}
