//! Small helpers shared by the gateway, the sync engine, and the CLI.

use chrono::NaiveDate;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Storage and wire format for lesson dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Sort key for display names.
///
/// Compares names the way the roster is read: canonical decomposition with
/// combining marks removed (Hebrew points, Latin accents) and case folded, so
/// "שָׁלוֹם" sorts with "שלום" and "Émile" with "emile". The raw name is the
/// tie-breaker so the order stays total and deterministic.
pub fn collation_key(name: &str) -> (String, String) {
    let folded: String = name
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    (folded, name.to_string())
}

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
}

/// Format a calendar date in `YYYY-MM-DD` form.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collation_ignores_points_and_case() {
        assert_eq!(collation_key("שָׁלוֹם").0, collation_key("שלום").0);
        assert_eq!(collation_key("Émile").0, "emile");
    }

    #[test]
    fn test_collation_orders_hebrew_alphabetically() {
        let mut names = vec!["גיל", "אבי", "בתיה"];
        names.sort_by_cached_key(|n| collation_key(n));
        assert_eq!(names, vec!["אבי", "בתיה", "גיל"]);
    }

    #[test]
    fn test_date_round_trip_format() {
        let date = parse_date(" 2025-01-09 ").unwrap();
        assert_eq!(format_date(date), "2025-01-09");
        assert!(parse_date("09/01/2025").is_err());
    }
}
