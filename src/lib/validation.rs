//! Input validation utilities
//!
//! This module provides common validation functions for command-line parameters
//! and file paths with consistent error messages.
//!
//! All validation functions use structured error types from [`crate::errors`] to provide
//! rich contextual information when validation fails.

use crate::errors::{Result, ZmwAlignError};
use std::fmt::Display;
use std::path::Path;

/// Validate that a file exists
///
/// # Arguments
/// * `path` - Path to validate
/// * `description` - Human-readable description of the file (e.g., "Subreads BAM")
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use zmwalign_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/file.bam", "Subreads BAM");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(ZmwAlignError::input_shape(format!(
            "{description} does not exist: {}",
            path_ref.display()
        )));
    }
    Ok(())
}

/// Validate that multiple files exist
///
/// # Errors
/// Returns an error for the first file that doesn't exist
pub fn validate_files_exist<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<()> {
    for (path, desc) in files {
        validate_file_exists(path, desc)?;
    }
    Ok(())
}

/// Validate that max >= min for optional max values
///
/// # Errors
/// Returns an error if max < min
///
/// # Example
/// ```
/// use zmwalign_lib::validation::validate_min_max;
///
/// validate_min_max(1, Some(10), "min-zmw", "max-zmw").unwrap();
/// validate_min_max(1, None, "min-zmw", "max-zmw").unwrap();
///
/// let result = validate_min_max(10, Some(5), "min-zmw", "max-zmw");
/// assert!(result.is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_min_max<T: Ord + Display>(
    min_val: T,
    max_val: Option<T>,
    min_name: &str,
    max_name: &str,
) -> Result<()> {
    if let Some(max) = max_val {
        if max < min_val {
            return Err(ZmwAlignError::InvalidParameter {
                parameter: max_name.to_string(),
                reason: format!("{max_name} ({max}) must be >= {min_name} ({min_val})"),
            });
        }
    }
    Ok(())
}

/// Validate that a value is positive (> 0)
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use zmwalign_lib::validation::validate_positive;
///
/// validate_positive(10, "threads").unwrap();
///
/// let result = validate_positive(0, "threads");
/// assert!(result.is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(ZmwAlignError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}
