pub mod commands;
pub mod extractor;
pub mod fetcher;
pub mod listener;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use monitor::{Monitor, MonitorPhase, MonitorStatus, TickOutcome};
pub use state::{StateBacking, StateStore};
