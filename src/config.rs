// ⚙️ Configuration - startup-time values from the environment
// Secrets come from the environment or from mounted secret files

use crate::store::RetryPolicy;
use crate::validation::{RegistrationRules, DEFAULT_MAXIMUM_DONATION};
use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_SECRETS_DIR: &str = "/run/secrets";
pub const ACCESS_TOKEN_SECRET: &str = "sheets_access_token";

// ============================================================================
// CONFIG TYPES
// ============================================================================

/// Where registrations are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Google Sheets (production)
    Sheets,
    /// Local CSV file with the same column layout
    Csv,
    /// Process memory, lost on exit
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(BackendKind::Sheets),
            "csv" => Ok(BackendKind::Csv),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown backend '{other}' (expected sheets, csv or memory)")),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Sheets => "sheets",
            BackendKind::Csv => "csv",
            BackendKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub worksheet_name: String,
    pub api_base: String,
    /// OAuth bearer token minted by the deployment platform
    pub access_token: Option<String>,
    pub timeout: Duration,
}

/// Public event details shown next to the form
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventInfo {
    pub title: String,
    pub date: String,
    pub location: String,
    pub payment_handle: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    pub csv_path: PathBuf,
    pub sheets: SheetsConfig,
    pub retry: RetryPolicy,
    pub rules: RegistrationRules,
    pub default_donation: Decimal,
    pub memo_window: Duration,
    pub recent_count: usize,
    pub event: EventInfo,
    pub port: u16,
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Load from process environment and `/run/secrets`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend: BackendKind = parse_or(&lookup, "PLEDGE_BACKEND", BackendKind::Sheets)?;

        let secrets_dir = lookup("SECRETS_DIR").unwrap_or_else(|| DEFAULT_SECRETS_DIR.to_string());
        let access_token = lookup("SHEETS_ACCESS_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| read_secret(Path::new(&secrets_dir), ACCESS_TOKEN_SECRET));

        let spreadsheet_id = lookup("SHEETS_SPREADSHEET_ID").unwrap_or_default();
        if backend == BackendKind::Sheets && spreadsheet_id.trim().is_empty() {
            bail!("SHEETS_SPREADSHEET_ID is required when PLEDGE_BACKEND=sheets");
        }

        let sheets = SheetsConfig {
            spreadsheet_id: spreadsheet_id.trim().to_string(),
            worksheet_name: text_or(&lookup, "SHEETS_WORKSHEET_NAME", "Sheet1"),
            api_base: text_or(&lookup, "SHEETS_API_BASE", DEFAULT_SHEETS_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            access_token,
            timeout: Duration::from_secs(parse_or(&lookup, "SHEETS_TIMEOUT_SECS", 10u64)?),
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "PLEDGE_RETRY_ATTEMPTS", 3usize)?,
            base_backoff_ms: parse_or(&lookup, "PLEDGE_RETRY_BACKOFF_MS", 200u64)?,
            ..RetryPolicy::default()
        };
        if retry.max_attempts == 0 {
            bail!("PLEDGE_RETRY_ATTEMPTS must be at least 1");
        }

        let minimum_donation: Decimal = parse_or(&lookup, "PLEDGE_MINIMUM_DONATION", Decimal::from(20))?;
        let default_donation: Decimal = parse_or(&lookup, "PLEDGE_DEFAULT_DONATION", minimum_donation)?;
        if minimum_donation.is_sign_negative() {
            bail!("PLEDGE_MINIMUM_DONATION must not be negative");
        }
        if default_donation < minimum_donation {
            bail!("PLEDGE_DEFAULT_DONATION ({default_donation}) is below the minimum ({minimum_donation})");
        }
        let maximum_donation: Decimal = parse_or(
            &lookup,
            "PLEDGE_MAXIMUM_DONATION",
            Decimal::from(DEFAULT_MAXIMUM_DONATION),
        )?;
        if maximum_donation < default_donation {
            bail!("PLEDGE_MAXIMUM_DONATION ({maximum_donation}) is below the default donation ({default_donation})");
        }

        let categories = parse_categories(&text_or(&lookup, "PLEDGE_CATEGORIES", "Men,Women"))?;

        let recent_count = parse_or(&lookup, "PLEDGE_RECENT_COUNT", 10usize)?;
        if recent_count == 0 {
            bail!("PLEDGE_RECENT_COUNT must be at least 1");
        }

        let config = Config {
            backend,
            csv_path: PathBuf::from(text_or(&lookup, "PLEDGE_CSV_PATH", "registrations.csv")),
            sheets,
            retry,
            rules: RegistrationRules::new(minimum_donation, categories)
                .with_maximum_donation(maximum_donation),
            default_donation,
            memo_window: Duration::from_secs(parse_or(&lookup, "PLEDGE_MEMO_WINDOW_SECS", 60u64)?),
            recent_count,
            event: EventInfo {
                title: text_or(&lookup, "EVENT_TITLE", "Climb4Good"),
                date: text_or(&lookup, "EVENT_DATE", "April 10-12, 2026"),
                location: text_or(&lookup, "EVENT_LOCATION", "Shelf Road - The Banks"),
                payment_handle: text_or(&lookup, "PAYMENT_HANDLE", "@Evan-Komp"),
            },
            port: parse_or(&lookup, "PORT", 3000u16)?,
        };

        info!(
            backend = ?config.backend,
            minimum = %config.rules.minimum_donation,
            maximum = %config.rules.maximum_donation,
            categories = ?config.rules.categories,
            memo_window_secs = config.memo_window.as_secs(),
            "Configuration loaded"
        );

        Ok(config)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn text_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| {
            debug!("{key} not set, using default: {default}");
            default.to_string()
        })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {key} value '{raw}': {e}")),
        None => {
            debug!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// Stats field a category's head count is published under, e.g. `men_count`
pub fn category_count_key(category: &str) -> String {
    let key: String = category
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{key}_count")
}

/// Count fields that sit next to the per-category ones
pub const RESERVED_COUNT_KEYS: &[&str] = &["participant_count"];

fn parse_categories(raw: &str) -> Result<Vec<String>> {
    let mut categories: Vec<String> = Vec::new();
    let mut keys: Vec<String> = RESERVED_COUNT_KEYS.iter().map(|k| k.to_string()).collect();

    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if categories.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            bail!("duplicate category '{name}' in PLEDGE_CATEGORIES");
        }
        let key = category_count_key(name);
        if keys.contains(&key) {
            bail!("category '{name}' in PLEDGE_CATEGORIES collides with the stats field '{key}'");
        }
        keys.push(key);
        categories.push(name.to_string());
    }

    if categories.is_empty() {
        bail!("PLEDGE_CATEGORIES must name at least one category");
    }

    Ok(categories)
}

fn read_secret(dir: &Path, secret_name: &str) -> Option<String> {
    let path = dir.join(secret_name);

    read_to_string(&path)
        .with_context(|| format!("reading secret {}", path.display()))
        .map(|s| s.trim().to_string())
        .map_err(|e| debug!("{e:#}"))
        .ok()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_for_memory_backend() {
        let config = Config::from_lookup(lookup_from(&[
            ("PLEDGE_BACKEND", "memory"),
            ("SECRETS_DIR", "/nonexistent"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.rules.minimum_donation, Decimal::from(20));
        assert_eq!(config.rules.maximum_donation, Decimal::from(1_000_000));
        assert_eq!(config.default_donation, Decimal::from(20));
        assert_eq!(config.rules.categories, vec!["Men", "Women"]);
        assert_eq!(config.memo_window, Duration::from_secs(60));
        assert_eq!(config.recent_count, 10);
        assert_eq!(config.sheets.worksheet_name, "Sheet1");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.sheets.access_token.is_none());
    }

    #[test]
    fn test_sheets_backend_requires_spreadsheet_id() {
        let result = Config::from_lookup(lookup_from(&[("SECRETS_DIR", "/nonexistent")]));
        assert!(result.is_err());

        let config = Config::from_lookup(lookup_from(&[
            ("SHEETS_SPREADSHEET_ID", "abc123"),
            ("SHEETS_ACCESS_TOKEN", "ya29.token"),
            ("SHEETS_API_BASE", "http://localhost:8080/"),
        ]))
        .unwrap();
        assert_eq!(config.sheets.spreadsheet_id, "abc123");
        assert_eq!(config.sheets.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.sheets.api_base, "http://localhost:8080");
    }

    #[test]
    fn test_access_token_from_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ACCESS_TOKEN_SECRET), "  secret-token\n").unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let config = Config::from_lookup(lookup_from(&[
            ("SHEETS_SPREADSHEET_ID", "abc123"),
            ("SECRETS_DIR", dir_str.as_str()),
        ]))
        .unwrap();

        assert_eq!(config.sheets.access_token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = [("PLEDGE_BACKEND", "memory"), ("SECRETS_DIR", "/nonexistent")];

        for bad in [
            ("PLEDGE_MINIMUM_DONATION", "twenty"),
            ("PLEDGE_BACKEND", "postgres"),
            ("PLEDGE_CATEGORIES", " , "),
            ("PLEDGE_CATEGORIES", "Men,men"),
            ("PLEDGE_DEFAULT_DONATION", "5"),
            ("PLEDGE_MAXIMUM_DONATION", "10"),
            ("PLEDGE_CATEGORIES", "Men,Participant"),
            ("PLEDGE_CATEGORIES", "Non Binary,non-binary"),
            ("PLEDGE_RECENT_COUNT", "0"),
            ("PORT", "99999"),
        ] {
            let mut pairs = base.to_vec();
            pairs.retain(|(k, _)| *k != bad.0);
            pairs.push(bad);
            assert!(
                Config::from_lookup(lookup_from(&pairs)).is_err(),
                "{} = {} should be rejected",
                bad.0,
                bad.1
            );
        }
    }

    #[test]
    fn test_custom_categories_and_minimum() {
        let config = Config::from_lookup(lookup_from(&[
            ("PLEDGE_BACKEND", "csv"),
            ("PLEDGE_CATEGORIES", "Open, Youth ,Masters"),
            ("PLEDGE_MINIMUM_DONATION", "12.50"),
            ("PLEDGE_MEMO_WINDOW_SECS", "30"),
            ("SECRETS_DIR", "/nonexistent"),
        ]))
        .unwrap();

        assert_eq!(config.rules.categories, vec!["Open", "Youth", "Masters"]);
        assert_eq!(config.rules.minimum_donation, Decimal::new(1250, 2));
        assert_eq!(config.default_donation, Decimal::new(1250, 2));
        assert_eq!(config.memo_window, Duration::from_secs(30));
    }

    #[test]
    fn test_category_count_keys() {
        assert_eq!(category_count_key("Men"), "men_count");
        assert_eq!(category_count_key(" Non Binary "), "non_binary_count");
        assert!(parse_categories("Participant").is_err());
        assert!(parse_categories("Open,Youth").is_ok());
    }

    #[test]
    fn test_maximum_donation_from_env() {
        let config = Config::from_lookup(lookup_from(&[
            ("PLEDGE_BACKEND", "memory"),
            ("PLEDGE_MAXIMUM_DONATION", "250"),
            ("SECRETS_DIR", "/nonexistent"),
        ]))
        .unwrap();

        assert_eq!(config.rules.maximum_donation, Decimal::from(250));
    }
}
