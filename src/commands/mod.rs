//! CLI command implementations for matefix.
//!
//! - [`fixmate`] - Fill in mate coordinates, template lengths and mate tags

#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::struct_excessive_bools,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod fixmate;
