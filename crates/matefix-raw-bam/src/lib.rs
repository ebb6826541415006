#![deny(unsafe_code)]

pub mod cigar;
pub mod editor;
pub mod fields;
pub mod tags;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

// Flat re-exports: callers use matefix_raw_bam::flags() etc.
pub use cigar::*;
pub use editor::*;
pub use fields::*;
pub use tags::*;

#[cfg(any(test, feature = "test-utils"))]
pub use testutil::*;
