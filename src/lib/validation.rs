//! Input validation utilities
//!
//! Checks run by the command before any file is opened, reported through
//! [`MatefixError::InvalidParameter`].

use crate::bam_io::is_stdin_path;
use crate::errors::{MatefixError, Result};
use std::fmt::Display;
use std::path::Path;

/// Highest BGZF compression level accepted by the writer.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Validate that an input file exists. Standard input (`-`) always passes.
///
/// # Errors
/// Returns an error if the path is not stdin and does not exist.
///
/// # Example
/// ```
/// use matefix_lib::validation::validate_input_exists;
///
/// assert!(validate_input_exists("-", "input").is_ok());
/// assert!(validate_input_exists("/nonexistent/file.bam", "input").is_err());
/// ```
pub fn validate_input_exists<P: AsRef<Path>>(path: P, parameter: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !is_stdin_path(path_ref) && !path_ref.exists() {
        return Err(MatefixError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: format!("File does not exist: {}", path_ref.display()),
        });
    }
    Ok(())
}

/// Validate that a value is positive (greater than zero)
///
/// # Errors
/// Returns an error if the value is zero or negative
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(MatefixError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}

/// Validate a BGZF compression level (0 = uncompressed blocks).
///
/// # Errors
/// Returns an error if the level is above [`MAX_COMPRESSION_LEVEL`].
pub fn validate_compression_level(level: u32) -> Result<()> {
    if level > MAX_COMPRESSION_LEVEL {
        return Err(MatefixError::InvalidParameter {
            parameter: "compression-level".to_string(),
            reason: format!("Must be between 0 and {MAX_COMPRESSION_LEVEL}, got: {level}"),
        });
    }
    Ok(())
}
