//! Clipping alignments that run off the end of their reference.
//!
//! An alignment whose reference footprint extends past the reference length
//! is cut at the boundary: the overhanging part of the crossing operation and
//! every read base after it become a single trailing soft clip, trailing hard
//! clips stay where they are, and reference-only operations past the boundary
//! are dropped. The rewritten CIGAR is installed with one relayout of the
//! record buffer.

use matefix_raw_bam::{
    cigar_op, consumes_query, consumes_reference, encode_op, flags, get_cigar_ops, op_len,
    op_type, pos, replace_cigar, set_flags,
};

use crate::errors::{MatefixError, Result};

/// Largest length representable in a packed CIGAR op.
const MAX_OP_LEN: u64 = (1 << 28) - 1;

/// What [`trim`] did to a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimOutcome {
    /// The alignment already ends within the reference.
    Unchanged,
    /// The CIGAR was rewritten to end exactly at the reference end.
    Trimmed,
    /// No aligned base lies within the reference; the record was flagged
    /// unmapped (and not properly paired) with its CIGAR left alone.
    MarkedUnmapped,
}

/// Clip `record` so its alignment ends at or before `reference_length`.
///
/// # Errors
///
/// Returns an error if the new soft clip is too long for a CIGAR op or the
/// record buffer cannot be resized.
pub fn trim(record: &mut Vec<u8>, reference_length: i64) -> Result<TrimOutcome> {
    let ops = get_cigar_ops(record);
    if ops.is_empty() {
        return Ok(TrimOutcome::Unchanged);
    }

    let start = i64::from(pos(record));
    let mut ref_end = start;
    let Some(crossing) = ops.iter().position(|&op| {
        if consumes_reference(op_type(op)) {
            ref_end += i64::from(op_len(op));
        }
        ref_end > reference_length
    }) else {
        return Ok(TrimOutcome::Unchanged);
    };

    let kind = op_type(ops[crossing]);
    let len = i64::from(op_len(ops[crossing]));
    let op_start = ref_end - len;

    // Only query-consuming lengths join the clip, so the CIGAR still spans
    // exactly l_seq bases; reference-only ops past the boundary vanish.
    let mut kept = Vec::with_capacity(ops.len() + 1);
    kept.extend_from_slice(&ops[..crossing]);
    let mut clip: u64 = 0;

    if op_start < reference_length {
        let keep = reference_length - op_start;
        kept.push(encode_op(kind, keep as u32));
        if consumes_query(kind) {
            clip += (len - keep) as u64;
        }
    } else if op_start == reference_length && op_start > start {
        // The alignment must end on a reference-consuming op; anything after
        // the last one joins the clip.
        while let Some(&last) = kept.last() {
            let last_kind = op_type(last);
            if consumes_reference(last_kind) || last_kind == cigar_op::HARD_CLIP {
                break;
            }
            kept.pop();
            if consumes_query(last_kind) {
                clip += u64::from(op_len(last));
            }
        }
        if consumes_query(kind) {
            clip += len as u64;
        }
    } else {
        let flag = flags(record);
        set_flags(record, (flag | flags::UNMAPPED) & !flags::PROPER_PAIR);
        return Ok(TrimOutcome::MarkedUnmapped);
    }

    let mut hard_clips = Vec::new();
    for &op in &ops[crossing + 1..] {
        let op_kind = op_type(op);
        if op_kind == cigar_op::HARD_CLIP {
            hard_clips.push(op);
        } else if consumes_query(op_kind) {
            clip += u64::from(op_len(op));
        }
    }

    if clip > MAX_OP_LEN {
        return Err(MatefixError::malformed(record, format!("soft clip of {clip} bases")));
    }
    if clip > 0 {
        kept.push(encode_op(cigar_op::SOFT_CLIP, clip as u32));
    }
    kept.extend(hard_clips);

    replace_cigar(record, &kept).map_err(|e| MatefixError::edit(record, e))?;
    Ok(TrimOutcome::Trimmed)
}
