// 🧪 Memory Store - in-process row store
// Backs the `memory` backend and stands in for the spreadsheet in tests

use super::RowStore;
use crate::error::StoreError;
use crate::registration::Registration;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Registration>>,
    read_count: AtomicUsize,
    read_failure: Mutex<Option<StoreError>>,
    write_failure: Mutex<Option<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Registration>) -> Self {
        MemoryStore {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Snapshot of the stored rows
    pub fn rows(&self) -> Vec<Registration> {
        lock(&self.rows).clone()
    }

    /// Number of `read_all` calls that reached this store
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Make every following `read_all` fail with `error` (None restores reads)
    pub fn set_read_failure(&self, error: Option<StoreError>) {
        *lock(&self.read_failure) = error;
    }

    /// Make every following `append_row` fail with `error` (None restores writes)
    pub fn set_write_failure(&self, error: Option<StoreError>) {
        *lock(&self.write_failure) = error;
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Registration>, StoreError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.read_failure).clone() {
            return Err(err);
        }
        Ok(self.rows())
    }

    async fn append_row(&self, record: &Registration) -> Result<(), StoreError> {
        if let Some(err) = lock(&self.write_failure).clone() {
            return Err(err);
        }
        lock(&self.rows).push(record.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample(name: &str) -> Registration {
        Registration::new(
            Utc::now(),
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            "Men".to_string(),
            Decimal::from(20),
        )
    }

    #[tokio::test]
    async fn test_append_then_read_in_order() {
        let store = MemoryStore::new();
        store.append_row(&sample("Alex")).await.unwrap();
        store.append_row(&sample("Sam")).await.unwrap();

        let rows = store.read_all().await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alex", "Sam"]);
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::with_rows(vec![sample("Alex")]);

        store.set_write_failure(Some(StoreError::write("quota", true)));
        assert!(store.append_row(&sample("Sam")).await.is_err());
        assert_eq!(store.rows().len(), 1);

        store.set_read_failure(Some(StoreError::read("down", true)));
        assert!(store.read_all().await.is_err());

        store.set_read_failure(None);
        assert_eq!(store.read_all().await.unwrap().len(), 1);
    }
}
