//! Shared utilities: arrow column helpers, dataset IO and logging

pub mod arrow;
pub mod io;
pub mod logging;

pub use logging::{log_operation_complete, log_operation_start, log_warning};
