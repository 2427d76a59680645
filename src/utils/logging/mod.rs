//! Logging utilities for output and progress tracking

pub mod log;
pub mod progress;

pub use self::log::{log_operation_complete, log_operation_start, log_warning};
pub use progress::{
    add_group_progress_bar, create_main_progress_bar, create_multi_progress, finish_progress_bar,
};
