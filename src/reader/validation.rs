//! File validation utilities for ensuring files are suitable for tailing.
//!
//! Only the initial open is checked here; failures are fatal to the session.
//! Later I/O faults during tailing are logged and simply stop the tail.

use crate::error::{Result, SiftError};
use std::fs::File;
use std::path::Path;

/// Validate that a file path is accessible and suitable for viewing
///
/// # Validations Performed
/// - Path exists and is a regular file
/// - File is readable by the current process
///
/// An empty file is accepted: it may be a log that has not been written yet.
pub fn validate_file_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SiftError::file_error(
            format!("File does not exist: {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "File not found"),
        ));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| SiftError::file_error("Failed to read file metadata", e))?;

    if !metadata.is_file() {
        return Err(SiftError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    // Try to open the file to verify read permissions
    File::open(path).map_err(|e| SiftError::file_error("Cannot open file for reading", e))?;

    Ok(())
}
