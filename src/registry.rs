// 🏛️ Registry - the process-scoped entry point
// Owns the row store, writer and aggregator; binaries only talk to this

use crate::aggregator::{Aggregator, StatsSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendKind, Config};
use crate::error::{RegisterError, StoreError};
use crate::registration::{RecentEntry, Registration};
use crate::store::{CsvFileStore, MemoryStore, RowStore, SheetsStore};
use crate::validation::{RegistrationForm, RegistrationRules};
use crate::writer::RegistrationWriter;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Registry {
    store: Arc<dyn RowStore>,
    writer: RegistrationWriter,
    aggregator: Aggregator,
    default_recent: usize,
}

impl Registry {
    pub fn new(
        store: Arc<dyn RowStore>,
        clock: Arc<dyn Clock>,
        rules: RegistrationRules,
        memo_window: Duration,
        default_recent: usize,
    ) -> Self {
        let aggregator = Aggregator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            memo_window,
            rules.categories.clone(),
        );
        let writer = RegistrationWriter::new(Arc::clone(&store), clock, rules);

        Registry {
            store,
            writer,
            aggregator,
            default_recent,
        }
    }

    /// Wire up the configured backend with the wall clock
    pub fn from_config(config: &Config) -> Self {
        let store = build_store(config);
        info!(backend = store.backend_tag(), "Row store selected");

        Self::new(
            store,
            Arc::new(SystemClock),
            config.rules.clone(),
            config.memo_window,
            config.recent_count,
        )
    }

    pub fn rules(&self) -> &RegistrationRules {
        self.writer.rules()
    }

    pub fn backend_tag(&self) -> &'static str {
        self.store.backend_tag()
    }

    /// Verify credentials and reachability up front
    pub async fn connect(&self) -> Result<(), StoreError> {
        self.store.connect().await
    }

    /// Validate and append; the stats memo is expired so the new pledge shows up
    pub async fn register(&self, form: &RegistrationForm) -> Result<Registration, RegisterError> {
        let record = self.writer.register(form).await?;
        self.aggregator.invalidate().await;
        Ok(record)
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, StoreError> {
        self.aggregator.stats().await
    }

    /// Recent feed; `None` uses the configured count
    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<RecentEntry>, StoreError> {
        self.aggregator
            .recent(limit.unwrap_or(self.default_recent))
            .await
    }

    /// Forget the memo window ("refresh now")
    pub async fn refresh(&self) {
        self.aggregator.invalidate().await;
    }

    /// Every row, read straight from the store (not memoized)
    pub async fn all_registrations(&self) -> Result<Vec<Registration>, StoreError> {
        self.store.read_all().await
    }
}

pub fn build_store(config: &Config) -> Arc<dyn RowStore> {
    match config.backend {
        BackendKind::Sheets => Arc::new(SheetsStore::from_config(&config.sheets, config.retry.clone())),
        BackendKind::Csv => Arc::new(CsvFileStore::new(config.csv_path.clone())),
        BackendKind::Memory => Arc::new(MemoryStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Field;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, Registry) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 10, 9, 0, 0).unwrap()));
        let registry = Registry::new(
            store.clone(),
            clock.clone(),
            RegistrationRules::default(),
            Duration::from_secs(60),
            10,
        );
        (store, clock, registry)
    }

    fn form(name: &str, category: &str, amount: &str) -> RegistrationForm {
        RegistrationForm::new(name, format!("{}@example.com", name.to_lowercase()), category, amount)
    }

    #[tokio::test]
    async fn test_two_registrations_scenario() {
        let (_, _, registry) = setup();

        registry.register(&form("Alex", "Women", "25")).await.unwrap();
        registry.register(&form("Sam", "Men", "30")).await.unwrap();

        let summary = registry.stats().await.unwrap().summary;
        assert_eq!(summary.total_amount, Decimal::from(55));
        assert_eq!(summary.participant_count, 2);
        assert_eq!(summary.men_count(), 1);
        assert_eq!(summary.women_count(), 1);
    }

    #[tokio::test]
    async fn test_register_shows_up_inside_memo_window() {
        let (store, _, registry) = setup();

        assert_eq!(registry.stats().await.unwrap().summary.participant_count, 0);
        registry.register(&form("Alex", "Women", "25")).await.unwrap();

        assert_eq!(registry.stats().await.unwrap().summary.participant_count, 1);
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_reads_within_window_are_idempotent() {
        let (store, clock, registry) = setup();
        registry.register(&form("Alex", "Women", "25")).await.unwrap();

        let first = registry.stats().await.unwrap();
        clock.advance(ChronoDuration::seconds(10));
        let second = registry.stats().await.unwrap();
        let recent = registry.recent(None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(recent.len(), 1);
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_registration_leaves_store_untouched() {
        let (store, _, registry) = setup();

        let err = registry.register(&form("Alex", "Women", "5")).await.unwrap_err();

        assert!(err.has_field(Field::Amount));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_huge_amounts_rejected_and_stats_keep_working() {
        let (store, _, registry) = setup();

        for _ in 0..2 {
            let err = registry
                .register(&form("Sam", "Men", "79228162514264337593543950335"))
                .await
                .unwrap_err();
            assert!(err.has_field(Field::Amount));
        }
        assert!(store.rows().is_empty());

        registry.register(&form("Alex", "Women", "25")).await.unwrap();
        assert_eq!(registry.stats().await.unwrap().summary.total_amount, Decimal::from(25));
    }

    #[tokio::test]
    async fn test_transient_failure_serves_cached_stats() {
        let (store, clock, registry) = setup();
        registry.register(&form("Alex", "Women", "25")).await.unwrap();
        let cached = registry.stats().await.unwrap();

        clock.advance(ChronoDuration::minutes(5));
        store.set_read_failure(Some(StoreError::read("timed out", true)));
        let served = registry.stats().await.unwrap();

        assert!(served.stale);
        assert_eq!(served.summary, cached.summary);
    }

    #[tokio::test]
    async fn test_refresh_forces_reread() {
        let (store, _, registry) = setup();

        registry.stats().await.unwrap();
        registry.refresh().await;
        registry.stats().await.unwrap();

        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_registered_timestamp_not_before_call() {
        let (store, clock, registry) = setup();
        let started = clock.now();

        registry.register(&form("Alex", "Women", "25")).await.unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].recorded_at().unwrap() >= started);
    }
}
