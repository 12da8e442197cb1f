// Pledge Registry - Core Library
// Registration form backend that keeps its rows in a spreadsheet

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod registration;
pub mod registry;
pub mod store;
pub mod validation;
pub mod writer;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use aggregator::{Aggregator, StatsSnapshot, Summary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, Config, EventInfo, SheetsConfig};
pub use error::{Field, RegisterError, StoreError, ValidationError};
pub use registration::{RecentEntry, Registration, HEADER};
pub use registry::{build_store, Registry};
pub use store::{CsvFileStore, MemoryStore, RetryPolicy, RowStore, SheetsStore, SheetsTarget};
pub use validation::{validate, RegistrationForm, RegistrationRules};
pub use writer::RegistrationWriter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `RUST_LOG`-driven subscriber used by both binaries
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
