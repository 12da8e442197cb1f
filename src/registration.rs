// 🧗 Registration - one spreadsheet row
// Column order is fixed: timestamp | name | email | category | amount

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Header written to row 1. Existing sheets depend on these exact names.
pub const HEADER: [&str; 5] = ["timestamp", "name", "email", "category", "amount"];

pub const COLUMN_COUNT: usize = HEADER.len();

// ============================================================================
// REGISTRATION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// ISO-8601, generated by the writer at append time
    pub timestamp: String,
    pub name: String,
    pub email: String,
    pub category: String,
    pub amount: Decimal,
}

impl Registration {
    pub fn new(
        recorded_at: DateTime<Utc>,
        name: String,
        email: String,
        category: String,
        amount: Decimal,
    ) -> Self {
        Registration {
            timestamp: format_timestamp(recorded_at),
            name,
            email,
            category,
            amount,
        }
    }

    /// Parsed timestamp. Rows typed in by hand may not have one.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Cells in column order, as text
    pub fn to_cells(&self) -> [String; COLUMN_COUNT] {
        [
            self.timestamp.clone(),
            self.name.clone(),
            self.email.clone(),
            self.category.clone(),
            self.amount.normalize().to_string(),
        ]
    }

    /// Decode one data row.
    ///
    /// Short rows are padded with empty cells. Returns `None` for a blank row.
    /// An unreadable amount counts as zero so the registrant is still counted.
    pub fn from_cells(cells: &[String]) -> Option<Self> {
        if cells.iter().all(|c| c.trim().is_empty()) {
            return None;
        }

        let cell = |i: usize| cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default();

        let amount_text = cell(4);
        let amount = parse_amount(&amount_text).unwrap_or_else(|| {
            warn!(
                amount = %amount_text,
                name = %cell(1),
                "Unreadable amount in row store, counting it as zero"
            );
            Decimal::ZERO
        });

        Some(Registration {
            timestamp: cell(0),
            name: cell(1),
            email: cell(2),
            category: cell(3),
            amount,
        })
    }
}

/// Public-feed view of a registration: never carries email or amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentEntry {
    pub name: String,
    pub category: String,
}

impl From<&Registration> for RecentEntry {
    fn from(reg: &Registration) -> Self {
        RecentEntry {
            name: reg.name.clone(),
            category: reg.category.clone(),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and the offset-less ISO form older rows were written in
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse a money cell: plain decimals, scientific notation, optional `$` and thousands separators
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_cells_follow_header_order() {
        let at = Utc.with_ymd_and_hms(2026, 4, 10, 9, 30, 0).unwrap();
        let reg = Registration::new(
            at,
            "Alex".to_string(),
            "alex@example.com".to_string(),
            "Women".to_string(),
            Decimal::new(2500, 2),
        );

        let row = reg.to_cells();
        assert_eq!(row[0], "2026-04-10T09:30:00.000000Z");
        assert_eq!(row[1], "Alex");
        assert_eq!(row[2], "alex@example.com");
        assert_eq!(row[3], "Women");
        assert_eq!(row[4], "25");
        assert_eq!(reg.recorded_at(), Some(at));
    }

    #[test]
    fn test_short_row_is_padded() {
        let reg = Registration::from_cells(&cells(&["2026-04-10T09:30:00", "Sam", "sam@example.com"]))
            .unwrap();

        assert_eq!(reg.name, "Sam");
        assert_eq!(reg.category, "");
        assert_eq!(reg.amount, Decimal::ZERO);
    }

    #[test]
    fn test_blank_row_is_skipped() {
        assert!(Registration::from_cells(&cells(&["", "  ", ""])).is_none());
        assert!(Registration::from_cells(&[]).is_none());
    }

    #[test]
    fn test_unreadable_amount_counts_as_zero() {
        let reg = Registration::from_cells(&cells(&[
            "2026-04-10T09:30:00",
            "Kim",
            "kim@example.com",
            "Men",
            "twenty",
        ]))
        .unwrap();

        assert_eq!(reg.amount, Decimal::ZERO);
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("25"), Some(Decimal::from(25)));
        assert_eq!(parse_amount("25.0"), Some(Decimal::new(250, 1)));
        assert_eq!(parse_amount("$1,020.50"), Some(Decimal::new(102050, 2)));
        assert_eq!(parse_amount("2.5e1"), Some(Decimal::from(25)));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_parse_naive_timestamp_as_utc() {
        let parsed = parse_timestamp("2026-03-01T10:00:00.123456").unwrap();
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + chrono::Duration::microseconds(123456)
        );
        assert!(parse_timestamp("yesterday").is_none());
    }
}
