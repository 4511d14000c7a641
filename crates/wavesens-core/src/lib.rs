pub mod config;
pub mod error;
pub mod logging;
pub mod market_hours;
pub mod types;

pub use error::{PipelineError, PipelineResult};
