//! Integration tests for the matefix binary.
//!
//! These tests write small BAMs with noodles, run the built binary on them
//! and decode the output again to check the repaired records.

mod helpers;
mod test_fixmate_command;
