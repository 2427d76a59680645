//! Progress reporting for per-unit pipeline work, using indicatif

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Template of the main progress bar
pub const DEFAULT_MAIN_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}) {msg}";

/// Template of per-cohort progress bars
pub const DEFAULT_GROUP_TEMPLATE: &str =
    "{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn styled_bar(length: u64, template: &str, description: Option<&str>) -> ProgressBar {
    let pb = ProgressBar::new(length);
    pb.set_style(bar_style(template));
    if let Some(desc) = description {
        pb.set_message(desc.to_string());
    }
    pb
}

/// Create a main progress bar with the standard style
#[must_use]
pub fn create_main_progress_bar(length: u64, description: Option<&str>) -> ProgressBar {
    styled_bar(length, DEFAULT_MAIN_TEMPLATE, description)
}

/// Create a multi-progress setup with a main progress bar
#[must_use]
pub fn create_multi_progress(total: u64, description: Option<&str>) -> (MultiProgress, ProgressBar) {
    let mp = MultiProgress::new();
    let main_pb = mp.add(create_main_progress_bar(total, description));
    (mp, main_pb)
}

/// Add a group progress bar to a `MultiProgress` instance
#[must_use]
pub fn add_group_progress_bar(mp: &MultiProgress, length: u64, description: Option<&str>) -> ProgressBar {
    mp.add(styled_bar(length, DEFAULT_GROUP_TEMPLATE, description))
}

/// Finish a progress bar with an optional completion message
pub fn finish_progress_bar(pb: &ProgressBar, message: Option<&str>) {
    match message {
        Some(msg) => pb.finish_with_message(msg.to_string()),
        None => pb.finish(),
    }
}
