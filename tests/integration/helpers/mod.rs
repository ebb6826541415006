//! Helper utilities for integration tests.

pub mod bam_generator;

pub use bam_generator::*;
