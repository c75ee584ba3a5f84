pub mod config;
pub mod error;
pub mod id;
pub mod traits;
pub mod types;

pub use config::WyvernConfig;
pub use error::{ActionError, Result, TickError, WyvernError};
pub use types::*;
