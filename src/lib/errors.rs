//! Custom error types for matefix operations.

use matefix_raw_bam::EditError;
use thiserror::Error;

/// Result type alias for matefix operations
pub type Result<T> = std::result::Result<T, MatefixError>;

/// Error type for matefix operations
#[derive(Error, Debug)]
pub enum MatefixError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A token in a sanitize option list matched no keyword
    #[error("Unrecognised sanitize keyword '{keyword}'")]
    UnknownSanitizeKeyword {
        /// The offending token
        keyword: String,
    },

    /// The input declares a sort order that cannot be grouped by name
    #[error("Input is {sort_order} sorted; records must be grouped or sorted by query name")]
    DisallowedSortOrder {
        /// The `SO` value found in the header
        sort_order: String,
    },

    /// A record is inconsistent with its own layout or with the header
    #[error("Malformed record '{read_name}': {reason}")]
    MalformedRecord {
        /// Read name of the record, lossily decoded
        read_name: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Resizing or rewriting a record failed
    #[error("Failed to edit record '{read_name}': {source}")]
    RecordEdit {
        /// Read name of the record, lossily decoded
        read_name: String,
        /// Underlying editor failure
        #[source]
        source: EditError,
    },

    /// Reading or writing the record stream failed
    #[error("I/O error while {action}: {source}")]
    Io {
        /// What was being done when the error happened
        action: &'static str,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl MatefixError {
    /// Wrap an editor failure with the name of the record being edited.
    pub(crate) fn edit(record: &[u8], source: EditError) -> Self {
        Self::RecordEdit { read_name: lossy_name(record), source }
    }

    /// Build a [`MatefixError::MalformedRecord`] for `record`.
    pub(crate) fn malformed(record: &[u8], reason: impl Into<String>) -> Self {
        Self::MalformedRecord { read_name: lossy_name(record), reason: reason.into() }
    }
}

fn lossy_name(record: &[u8]) -> String {
    if matefix_raw_bam::is_well_formed(record) {
        String::from_utf8_lossy(matefix_raw_bam::read_name(record)).into_owned()
    } else {
        String::from("<unreadable>")
    }
}
