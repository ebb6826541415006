use std::fmt::Write;

use crate::fields::{flags, flags::UNMAPPED, l_read_name, n_cigar_op, pos};

/// CIGAR operation codes as stored in the low 4 bits of each packed op.
pub mod cigar_op {
    pub const MATCH: u32 = 0;
    pub const INSERTION: u32 = 1;
    pub const DELETION: u32 = 2;
    pub const SKIP: u32 = 3;
    pub const SOFT_CLIP: u32 = 4;
    pub const HARD_CLIP: u32 = 5;
    pub const PAD: u32 = 6;
    pub const SEQ_MATCH: u32 = 7;
    pub const SEQ_MISMATCH: u32 = 8;
}

/// Characters for op codes 0-9, matching the SAM text representation.
const CIGAR_CHARS: &[u8; 10] = b"MIDNSHP=XB";

/// Pack an operation code and length into a BAM CIGAR op.
#[inline]
#[must_use]
pub const fn encode_op(op_type: u32, len: u32) -> u32 {
    (len << 4) | op_type
}

/// Operation code of a packed CIGAR op.
#[inline]
#[must_use]
pub const fn op_type(op: u32) -> u32 {
    op & 0xF
}

/// Length of a packed CIGAR op.
#[inline]
#[must_use]
pub const fn op_len(op: u32) -> u32 {
    op >> 4
}

/// M/D/N/=/X advance along the reference.
#[inline]
#[must_use]
pub const fn consumes_reference(op_type: u32) -> bool {
    matches!(op_type, 0 | 2 | 3 | 7 | 8)
}

/// M/I/S/=/X consume stored read bases.
#[inline]
#[must_use]
pub const fn consumes_query(op_type: u32) -> bool {
    matches!(op_type, 0 | 1 | 4 | 7 | 8)
}

/// SAM character for an operation code (`?` for codes outside the SAM format).
#[inline]
#[must_use]
pub fn op_char(op_type: u32) -> char {
    CIGAR_CHARS.get(op_type as usize).map_or('?', |&c| char::from(c))
}

/// Extract CIGAR operations from BAM record.
#[inline]
#[must_use]
pub fn get_cigar_ops(bam: &[u8]) -> Vec<u32> {
    let l_read_name = l_read_name(bam) as usize;
    let n_cigar_op = n_cigar_op(bam) as usize;

    if n_cigar_op == 0 {
        return Vec::new();
    }

    let cigar_start = 32 + l_read_name;
    let cigar_end = cigar_start + n_cigar_op * 4;

    if cigar_end > bam.len() {
        return Vec::new();
    }

    // Read CIGAR ops bytewise to avoid alignment issues; the CIGAR data offset
    // (32 + l_read_name) is not guaranteed to be 4-byte aligned.
    let cigar_bytes = &bam[cigar_start..cigar_end];
    cigar_bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Compute reference length directly from raw CIGAR bytes (zero allocation).
#[inline]
#[must_use]
pub fn reference_length_from_raw_bam(bam: &[u8]) -> i64 {
    let n_cigar_op = n_cigar_op(bam) as usize;
    if n_cigar_op == 0 {
        return 0;
    }
    let cigar_start = 32 + l_read_name(bam) as usize;
    let cigar_end = cigar_start + n_cigar_op * 4;
    if cigar_end > bam.len() {
        return 0;
    }

    bam[cigar_start..cigar_end]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .filter(|&op| consumes_reference(op_type(op)))
        .map(|op| i64::from(op_len(op)))
        .sum()
}

/// Compute the query-consuming length of CIGAR operations (the "read length").
///
/// This is the sum of M/I/S/=/X operations.
#[inline]
#[must_use]
pub fn query_length_from_cigar(cigar_ops: &[u32]) -> usize {
    cigar_ops
        .iter()
        .filter(|&&op| consumes_query(op_type(op)))
        .map(|&op| op_len(op) as usize)
        .sum()
}

/// 0-based exclusive end of the alignment on the reference.
///
/// Unmapped records and records without reference-consuming operations are
/// treated as covering a single base, so the result is always `pos + 1` or more.
#[inline]
#[must_use]
pub fn end_position(bam: &[u8]) -> i64 {
    let ref_len =
        if flags(bam) & UNMAPPED != 0 { 0 } else { reference_length_from_raw_bam(bam) };
    i64::from(pos(bam)) + ref_len.max(1)
}

/// Append the SAM text of `cigar_ops` to `out`, or `*` when there are none.
pub fn format_cigar(cigar_ops: &[u32], out: &mut String) {
    if cigar_ops.is_empty() {
        out.push('*');
        return;
    }
    for &op in cigar_ops {
        // Writing to a String cannot fail
        let _ = write!(out, "{}{}", op_len(op), op_char(op_type(op)));
    }
}

/// SAM text of a record's CIGAR (`*` when empty).
#[must_use]
pub fn cigar_to_string(bam: &[u8]) -> String {
    let ops = get_cigar_ops(bam);
    let mut out = String::with_capacity(ops.len() * 4);
    format_cigar(&ops, &mut out);
    out
}
