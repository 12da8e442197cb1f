// 🗄️ Row Store - the spreadsheet as an append-only table
// Every backend exposes the same two primitives: read everything, append one row

use crate::error::StoreError;
use crate::registration::Registration;
use async_trait::async_trait;

pub mod csv_file;
pub mod memory;
pub mod retry;
pub mod sheets;

pub use csv_file::CsvFileStore;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use sheets::{SheetsStore, SheetsTarget};

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Short name for logs
    fn backend_tag(&self) -> &'static str;

    /// Establish (or verify) the connection. Backends connect lazily, so
    /// calling this is optional; it surfaces auth problems at startup.
    async fn connect(&self) -> Result<(), StoreError>;

    /// All data rows in insertion order, header excluded
    async fn read_all(&self) -> Result<Vec<Registration>, StoreError>;

    /// Append one complete row at the end
    async fn append_row(&self, record: &Registration) -> Result<(), StoreError>;
}
