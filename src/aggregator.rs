// 💰 Aggregator - pledged total and head counts
// Rows are memoized for a short window so page refreshes don't burn API quota

use crate::clock::Clock;
use crate::error::StoreError;
use crate::registration::{RecentEntry, Registration};
use crate::store::RowStore;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_amount: Decimal,
    pub participant_count: usize,
    /// Configured categories always present (possibly 0); unknown ones added as seen
    pub category_counts: BTreeMap<String, usize>,
}

impl Summary {
    pub fn empty(categories: &[String]) -> Self {
        Summary {
            total_amount: Decimal::ZERO,
            participant_count: 0,
            category_counts: categories.iter().map(|c| (c.clone(), 0)).collect(),
        }
    }

    pub fn from_rows(rows: &[Registration], categories: &[String]) -> Self {
        let mut summary = Summary::empty(categories);

        for row in rows {
            match summary.total_amount.checked_add(row.amount) {
                Some(total) => summary.total_amount = total,
                None => warn!(
                    name = %row.name,
                    amount = %row.amount,
                    "Amount would overflow the pledged total, leaving it out"
                ),
            }
            summary.participant_count += 1;
            *summary.category_counts.entry(row.category.clone()).or_insert(0) += 1;
        }

        summary
    }

    pub fn count_for(&self, category: &str) -> usize {
        self.category_counts.get(category).copied().unwrap_or(0)
    }

    pub fn men_count(&self) -> usize {
        self.count_for("Men")
    }

    pub fn women_count(&self) -> usize {
        self.count_for("Women")
    }
}

/// Stats as served to a caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub summary: Summary,
    /// When the underlying rows were read
    pub last_updated: DateTime<Utc>,
    /// True when a refresh failed and this is the last good value
    pub stale: bool,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

struct Memo {
    rows: Arc<Vec<Registration>>,
    summary: Summary,
    fetched_at: DateTime<Utc>,
    expired: bool,
}

struct View {
    rows: Arc<Vec<Registration>>,
    summary: Summary,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

pub struct Aggregator {
    store: Arc<dyn RowStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    categories: Vec<String>,
    /// Held across the refresh so concurrent callers share one read
    memo: Mutex<Option<Memo>>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn RowStore>,
        clock: Arc<dyn Clock>,
        window: std::time::Duration,
        categories: Vec<String>,
    ) -> Self {
        Aggregator {
            store,
            clock,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::days(36_500)),
            categories,
            memo: Mutex::new(None),
        }
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, StoreError> {
        let view = self.view().await?;
        Ok(StatsSnapshot {
            summary: view.summary,
            last_updated: view.fetched_at,
            stale: view.stale,
        })
    }

    /// Newest `limit` registrations first, name and category only
    pub async fn recent(&self, limit: usize) -> Result<Vec<RecentEntry>, StoreError> {
        let view = self.view().await?;
        Ok(view.rows.iter().rev().take(limit).map(RecentEntry::from).collect())
    }

    /// Expire the memo. The old value stays as the fallback if the next read fails.
    pub async fn invalidate(&self) {
        if let Some(memo) = self.memo.lock().await.as_mut() {
            memo.expired = true;
            debug!("Stats memo invalidated");
        }
    }

    async fn view(&self) -> Result<View, StoreError> {
        let mut slot = self.memo.lock().await;
        let now = self.clock.now();

        if let Some(memo) = slot.as_ref() {
            if !memo.expired && now.signed_duration_since(memo.fetched_at) < self.window {
                return Ok(View {
                    rows: Arc::clone(&memo.rows),
                    summary: memo.summary.clone(),
                    fetched_at: memo.fetched_at,
                    stale: false,
                });
            }
        }

        match self.store.read_all().await {
            Ok(rows) => {
                let summary = Summary::from_rows(&rows, &self.categories);
                info!(
                    total = %summary.total_amount,
                    participants = summary.participant_count,
                    "Prize pool stats refreshed"
                );
                let memo = Memo {
                    rows: Arc::new(rows),
                    summary,
                    fetched_at: now,
                    expired: false,
                };
                let view = View {
                    rows: Arc::clone(&memo.rows),
                    summary: memo.summary.clone(),
                    fetched_at: now,
                    stale: false,
                };
                *slot = Some(memo);
                Ok(view)
            }
            Err(e) => match slot.as_ref() {
                Some(memo) => {
                    if e.is_fatal() {
                        error!(error = %e, "Row store unusable, serving last known stats");
                    } else {
                        warn!(error = %e, last_updated = %memo.fetched_at, "Refresh failed, serving last known stats");
                    }
                    Ok(View {
                        rows: Arc::clone(&memo.rows),
                        summary: memo.summary.clone(),
                        fetched_at: memo.fetched_at,
                        stale: true,
                    })
                }
                None => Err(e),
            },
        }
    }
}
