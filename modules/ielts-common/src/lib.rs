pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, StateLocation};
pub use error::IeltsError;
pub use types::*;
