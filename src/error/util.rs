//! Utility functions for error handling
//!
//! Filesystem helpers that fail with the path and the purpose of the access
//! attached, so a failed unit of work can be diagnosed without rerunning.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(PipelineError::io_error("File not found")
            .with_path(path)
            .context(format!("Needed for: {purpose}")));
    }

    if !path.is_file() {
        return Err(PipelineError::io_error("Path is not a file")
            .with_path(path)
            .context(format!("Expected a file for: {purpose}")));
    }

    fs::File::open(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied - check file permissions".to_string()
            }
            _ => format!("Failed to open file for: {purpose}"),
        };
        PipelineError::io_error_with_source(context, e).with_path(path)
    })
}

/// Check if a directory exists and is readable, with rich error information
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::io_error("Directory not found")
            .with_path(path)
            .context(format!("Needed for: {purpose}")));
    }

    if !path.is_dir() {
        return Err(PipelineError::io_error("Path is not a directory")
            .with_path(path)
            .context(format!("Expected a directory for: {purpose}")));
    }

    fs::read_dir(path).map(|_| ()).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied - check directory permissions".to_string()
            }
            _ => format!("Failed to access directory for: {purpose}"),
        };
        PipelineError::io_error_with_source(context, e).with_path(path)
    })
}

/// Safely read a file to string with rich error information
pub fn safe_read_to_string(path: &Path, purpose: &str) -> Result<String> {
    let mut file = safe_open_file(path, purpose)?;

    let mut content = String::new();
    match io::Read::read_to_string(&mut file, &mut content) {
        Ok(_) => Ok(content),
        Err(e) => {
            let context = match e.kind() {
                io::ErrorKind::InvalidData => {
                    "File contains invalid UTF-8 data - cannot read as text".to_string()
                }
                _ => format!("Failed to read file content for: {purpose}"),
            };
            Err(PipelineError::io_error_with_source(context, e).with_path(path))
        }
    }
}

/// Create a directory (and parents), attaching the path on failure
pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        PipelineError::io_error_with_source("Failed to create output directory", e)
            .with_path(path)
    })
}

/// Create the parent directory of a file path if it has one
pub fn ensure_parent_directory(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}
