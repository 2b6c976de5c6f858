//! Label normalization and value coercion
//!
//! Spreadsheet labels drift in accenting, spacing and punctuation
//! ("Flag Urgente:", "flag  urgente", "Flág Urgente"). [`normalize_label`]
//! folds all of them onto one lookup key (`flag_urgente`).
//!
//! Values are uncontrolled free text, so every coercion here is total: bad
//! input yields a documented default instead of an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical lookup key for a label.
///
/// Lowercases, strips diacritics, collapses whitespace runs to `_` and drops
/// anything outside `[a-z0-9_]`.
pub fn normalize_label(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    let mut in_whitespace = false;

    for c in label.to_lowercase().nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_whitespace() {
            if !in_whitespace {
                key.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            key.push(c);
        }
    }
    key
}

/// Digits-only integer coercion: `"R$ 1.234"` → 1234. Empty or unparseable → 0.
pub fn coerce_int(value: Option<&str>) -> i64 {
    let digits: String = value
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

const AFFIRMATIVE: [&str; 4] = ["sim", "yes", "true", "1"];

/// Affirmative-set boolean coercion. Anything not recognized is `false`.
pub fn coerce_bool(value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    let value = value.trim().to_lowercase();
    AFFIRMATIVE.contains(&value.as_str()) || value.contains("sim")
}

/// Calendar date/time coercion. Unparseable or absent → `None`.
///
/// Accepts RFC 3339 timestamps, naive ISO date-times (assumed UTC), ISO dates
/// and day-first `DD/MM/YYYY` dates with an optional time part.
pub fn coerce_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATE_TIME_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Flag Urgente"), "flag_urgente");
        assert_eq!(normalize_label("Já Cancelou Antes"), "ja_cancelou_antes");
        assert_eq!(normalize_label("  Ação   Sugerida "), "_acao_sugerida_");
        assert_eq!(normalize_label("Classificação"), "classificacao");
        assert_eq!(normalize_label("Score (Risco)"), "score_risco");
        assert_eq!(normalize_label("Total de\tTickets"), "total_de_tickets");
        assert_eq!(normalize_label("🚨"), "");
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int(Some("R$ 1.234")), 1234);
        assert_eq!(coerce_int(Some("42 tickets")), 42);
        assert_eq!(coerce_int(Some("")), 0);
        assert_eq!(coerce_int(Some("none")), 0);
        assert_eq!(coerce_int(None), 0);
        // overflow is unparseable, not a panic
        assert_eq!(coerce_int(Some("99999999999999999999999")), 0);
    }

    #[test]
    fn test_coerce_bool() {
        for yes in ["SIM", "sim ⚠️", "true", "1", "Yes", " TRUE "] {
            assert!(coerce_bool(Some(yes)), "{yes:?} should be true");
        }
        for no in ["", "NAO", "NÃO", "false", "0", "2"] {
            assert!(!coerce_bool(Some(no)), "{no:?} should be false");
        }
        assert!(!coerce_bool(None));
    }

    #[test]
    fn test_coerce_date() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(coerce_date(Some("2024-01-15")), Some(expected));
        assert_eq!(coerce_date(Some("15/01/2024")), Some(expected));
        assert_eq!(
            coerce_date(Some("2024-01-15T10:30:00Z")),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert_eq!(
            coerce_date(Some("2024-01-15T10:30:00.000")),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert_eq!(
            coerce_date(Some("15/01/2024 08:05")),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 5, 0).unwrap())
        );
        assert_eq!(coerce_date(Some("not a date")), None);
        assert_eq!(coerce_date(Some("")), None);
        assert_eq!(coerce_date(None), None);
    }
}
