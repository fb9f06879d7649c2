//! Process wiring: state, configuration, and the outbound adapters.

pub mod app_state;
pub mod config;
pub mod fetch;
pub mod records;

pub use app_state::AppState;
pub use config::{Config, ConfigLoad};
pub use fetch::HttpFrameFetcher;
pub use records::{MIGRATOR, PostgresRecordStore};
