//! Run lifecycle: admission, worker hosting, and log streaming.

pub mod logs;
pub mod manager;

pub use logs::{LogSubscription, RunLogBus};
pub use manager::{CancelOutcome, RunManager};
