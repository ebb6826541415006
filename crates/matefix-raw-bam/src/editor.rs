//! In-place structural edits of raw BAM records.
//!
//! Field setters in [`crate::fields`] overwrite fixed-width values. The
//! functions here change the length of variable-width blocks, so they take
//! the owning `Vec<u8>` and keep the dependent header fields (`n_cigar_op`,
//! `bin`) consistent with the new layout.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::cigar::end_position;
use crate::fields::{cigar_offset, is_well_formed, n_cigar_op, pos, set_bin, set_n_cigar_op};

/// Failure while editing a raw record.
#[derive(Error, Debug)]
pub enum EditError {
    #[error("CIGAR with {count} operations does not fit in a BAM record")]
    TooManyCigarOps { count: usize },

    #[error("Failed to grow record buffer: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("Malformed BAM record: {reason}")]
    MalformedRecord { reason: &'static str },

    #[error("Malformed aux data at offset {offset}")]
    MalformedAux { offset: usize },
}

/// Compute the BAI bin for the 0-based half-open interval `[beg, end)`.
///
/// Uses the standard 14-bit minimum shift and 5 levels, so an unplaced
/// record (`beg = -1`, `end = 0`) lands in bin 4680.
#[must_use]
pub fn reg2bin(beg: i64, end: i64) -> u16 {
    let end = end - 1;
    let bin = if beg >> 14 == end >> 14 {
        ((1 << 15) - 1) / 7 + (beg >> 14)
    } else if beg >> 17 == end >> 17 {
        ((1 << 12) - 1) / 7 + (beg >> 17)
    } else if beg >> 20 == end >> 20 {
        ((1 << 9) - 1) / 7 + (beg >> 20)
    } else if beg >> 23 == end >> 23 {
        ((1 << 6) - 1) / 7 + (beg >> 23)
    } else if beg >> 26 == end >> 26 {
        ((1 << 3) - 1) / 7 + (beg >> 26)
    } else {
        0
    };
    // Positions past the BAI addressable range have no meaningful bin
    u16::try_from(bin).unwrap_or(0)
}

/// Recompute `bin` from the record's current position and CIGAR.
pub fn update_bin(record: &mut [u8]) {
    let beg = i64::from(pos(record));
    let end = end_position(record);
    set_bin(record, reg2bin(beg, end));
}

/// Replace the whole CIGAR block with `new_ops`.
///
/// Everything after the CIGAR is shifted in a single splice, growing the
/// buffer through `try_reserve` first. `n_cigar_op` and `bin` are updated.
///
/// # Errors
///
/// Returns an error if the record is malformed, `new_ops` has more than
/// `u16::MAX` entries, or the buffer cannot grow.
pub fn replace_cigar(record: &mut Vec<u8>, new_ops: &[u32]) -> Result<(), EditError> {
    if !is_well_formed(record) {
        return Err(EditError::MalformedRecord { reason: "declared layout exceeds record length" });
    }
    let count = u16::try_from(new_ops.len())
        .map_err(|_| EditError::TooManyCigarOps { count: new_ops.len() })?;

    let start = cigar_offset(record);
    let old_end = start + usize::from(n_cigar_op(record)) * 4;
    let new_len = new_ops.len() * 4;
    if new_len > old_end - start {
        record.try_reserve(new_len - (old_end - start))?;
    }

    record.splice(start..old_end, new_ops.iter().flat_map(|op| op.to_le_bytes()));
    set_n_cigar_op(record, count);
    update_bin(record);
    Ok(())
}

/// Remove every CIGAR operation from the record.
///
/// # Errors
///
/// Returns an error if the record is malformed.
pub fn clear_cigar(record: &mut Vec<u8>) -> Result<(), EditError> {
    replace_cigar(record, &[])
}
