pub mod cases;
pub mod chain;
pub mod config;
pub mod driver;
pub mod export;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod watcher;

pub use config::{BenchConfig, ConfigError};
pub use driver::{BatchDriver, DriverConfig, RunOutcome};
pub use pipeline::{run_suite, Collaborators, RunSummary};
pub use watcher::{Confirmation, ConfirmationWatcher, WatchConfig};
