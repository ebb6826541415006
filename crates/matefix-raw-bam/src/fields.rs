//! Direct field access on BAM binary records.
//!
//! Records are handled as the raw bytes that follow the 4-byte `block_size`
//! prefix in a BAM stream. Getters read little-endian values at fixed offsets;
//! setters overwrite them in place without touching the variable-length tail.
//!
//! # BAM Record Binary Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0-3     4     refID (i32) - reference sequence ID
//! 4-7     4     pos (i32) - 0-based leftmost position
//! 8       1     l_read_name (u8) - length of read name + NUL
//! 9       1     mapq (u8) - mapping quality
//! 10-11   2     bin (u16) - BAM bin
//! 12-13   2     n_cigar_op (u16) - number of CIGAR operations
//! 14-15   2     flag (u16) - bitwise flags
//! 16-19   4     l_seq (u32) - length of sequence
//! 20-23   4     next_refID (i32) - mate reference sequence ID
//! 24-27   4     next_pos (i32) - mate 0-based position
//! 28-31   4     tlen (i32) - template length
//! 32+     var   read_name, CIGAR (n_cigar_op * 4), packed sequence,
//!               qualities (l_seq), auxiliary data
//! ```

/// Length of the fixed portion of a BAM record.
///
/// All getters and setters that access fixed-offset fields require at least
/// this many bytes.
pub const MIN_BAM_HEADER_LEN: usize = 32;

/// BAM flag bits.
pub mod flags {
    /// Read is paired in sequencing.
    pub const PAIRED: u16 = 0x1;
    /// Read is mapped in a proper pair.
    pub const PROPER_PAIR: u16 = 0x2;
    /// Read is unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Mate is unmapped.
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Read is reverse complemented.
    pub const REVERSE: u16 = 0x10;
    /// Mate is reverse complemented.
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in template (R1).
    pub const FIRST_SEGMENT: u16 = 0x40;
    /// Last segment in template (R2).
    pub const LAST_SEGMENT: u16 = 0x80;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Not passing quality controls.
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate.
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Fixed-size tag value sizes indexed by type byte.
/// 0 = variable/unknown (needs special handling).
pub(crate) const TAG_FIXED_SIZES: [u8; 256] = {
    let mut table = [0u8; 256];
    table[b'A' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'C' as usize] = 1;
    table[b's' as usize] = 2;
    table[b'S' as usize] = 2;
    table[b'i' as usize] = 4;
    table[b'I' as usize] = 4;
    table[b'f' as usize] = 4;
    table
};

/// Calculate the size of a tag value based on its type.
///
/// `data` starts immediately after the type byte. Returns `None` for unknown
/// types or truncated variable-length values.
#[inline]
#[must_use]
pub fn tag_value_size(val_type: u8, data: &[u8]) -> Option<usize> {
    let fixed = TAG_FIXED_SIZES[val_type as usize];
    if fixed > 0 {
        return Some(fixed as usize);
    }
    match val_type {
        b'Z' | b'H' => Some(data.iter().position(|&b| b == 0)? + 1),
        b'B' => {
            if data.len() < 5 {
                return None;
            }
            let elem_type = data[0];
            let count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
            let elem_size = TAG_FIXED_SIZES[elem_type as usize] as usize;
            if elem_size == 0 {
                return None;
            }
            Some(5 + count * elem_size)
        }
        _ => None,
    }
}

// ============================================================================
// Read Primitives
// ============================================================================
//
// All read primitives below assume `bam.len() >= 32`. Passing a shorter slice
// will panic on out-of-bounds indexing; use `is_well_formed` first on bytes of
// unknown provenance.

/// Extract flags (u16) from a BAM record.
#[inline]
#[must_use]
pub fn flags(bam: &[u8]) -> u16 {
    u16::from_le_bytes([bam[14], bam[15]])
}

/// Extract mapping quality from a BAM record.
#[inline]
#[must_use]
pub fn mapq(bam: &[u8]) -> u8 {
    bam[9]
}

/// Extract reference sequence ID from a BAM record.
#[inline]
#[must_use]
pub fn ref_id(bam: &[u8]) -> i32 {
    i32::from_le_bytes([bam[0], bam[1], bam[2], bam[3]])
}

/// Extract 0-based leftmost position from a BAM record.
#[inline]
#[must_use]
pub fn pos(bam: &[u8]) -> i32 {
    i32::from_le_bytes([bam[4], bam[5], bam[6], bam[7]])
}

/// Extract `l_read_name` (length of read name + NUL) from a BAM record.
#[inline]
#[must_use]
pub fn l_read_name(bam: &[u8]) -> u8 {
    bam[8]
}

/// Extract the BAI bin from a BAM record.
#[inline]
#[must_use]
pub fn bin(bam: &[u8]) -> u16 {
    u16::from_le_bytes([bam[10], bam[11]])
}

/// Extract number of CIGAR operations from a BAM record.
#[inline]
#[must_use]
pub fn n_cigar_op(bam: &[u8]) -> u16 {
    u16::from_le_bytes([bam[12], bam[13]])
}

/// Extract sequence length from a BAM record.
#[inline]
#[must_use]
pub fn l_seq(bam: &[u8]) -> u32 {
    u32::from_le_bytes([bam[16], bam[17], bam[18], bam[19]])
}

/// Extract mate reference sequence ID from a BAM record.
#[inline]
#[must_use]
pub fn mate_ref_id(bam: &[u8]) -> i32 {
    i32::from_le_bytes([bam[20], bam[21], bam[22], bam[23]])
}

/// Extract mate 0-based position from a BAM record.
#[inline]
#[must_use]
pub fn mate_pos(bam: &[u8]) -> i32 {
    i32::from_le_bytes([bam[24], bam[25], bam[26], bam[27]])
}

/// Extract template length (tlen) from a BAM record.
#[inline]
#[must_use]
pub fn template_length(bam: &[u8]) -> i32 {
    i32::from_le_bytes([bam[28], bam[29], bam[30], bam[31]])
}

/// Extract read name (without null terminator) from a BAM record.
#[inline]
#[must_use]
pub fn read_name(bam: &[u8]) -> &[u8] {
    let l = bam[8] as usize;
    if l > 1 { &bam[32..32 + l - 1] } else { &[] }
}

/// True if the unmapped flag is set.
#[inline]
#[must_use]
pub fn is_unmapped(bam: &[u8]) -> bool {
    flags(bam) & flags::UNMAPPED != 0
}

/// True if the record is neither secondary nor supplementary.
#[inline]
#[must_use]
pub fn is_primary(bam: &[u8]) -> bool {
    flags(bam) & (flags::SECONDARY | flags::SUPPLEMENTARY) == 0
}

// ============================================================================
// Write Primitives
// ============================================================================

/// Set flags (u16) in a BAM record.
#[inline]
pub fn set_flags(bam: &mut [u8], new_flags: u16) {
    bam[14..16].copy_from_slice(&new_flags.to_le_bytes());
}

/// Set the mapping quality of a BAM record.
#[inline]
pub fn set_mapq(bam: &mut [u8], mapq: u8) {
    bam[9] = mapq;
}

/// Set the reference sequence ID of a BAM record.
#[inline]
pub fn set_ref_id(bam: &mut [u8], tid: i32) {
    bam[0..4].copy_from_slice(&tid.to_le_bytes());
}

/// Set the 0-based leftmost position of a BAM record.
#[inline]
pub fn set_pos(bam: &mut [u8], pos: i32) {
    bam[4..8].copy_from_slice(&pos.to_le_bytes());
}

/// Set the BAI bin of a BAM record.
#[inline]
pub fn set_bin(bam: &mut [u8], bin: u16) {
    bam[10..12].copy_from_slice(&bin.to_le_bytes());
}

/// Set the CIGAR operation count. Callers must keep the CIGAR bytes consistent.
#[inline]
pub fn set_n_cigar_op(bam: &mut [u8], n: u16) {
    bam[12..14].copy_from_slice(&n.to_le_bytes());
}

/// Set the mate reference sequence ID of a BAM record.
#[inline]
pub fn set_mate_ref_id(bam: &mut [u8], tid: i32) {
    bam[20..24].copy_from_slice(&tid.to_le_bytes());
}

/// Set the mate 0-based position of a BAM record.
#[inline]
pub fn set_mate_pos(bam: &mut [u8], pos: i32) {
    bam[24..28].copy_from_slice(&pos.to_le_bytes());
}

/// Set the template length (tlen) of a BAM record.
#[inline]
pub fn set_template_length(bam: &mut [u8], tlen: i32) {
    bam[28..32].copy_from_slice(&tlen.to_le_bytes());
}

// ============================================================================
// Variable-length Section Offsets
// ============================================================================

/// Calculate the offset to auxiliary data in a BAM record.
///
/// `aux_offset = 32 + l_read_name + n_cigar_op*4 + (l_seq+1)/2 + l_seq`
#[inline]
#[must_use]
pub fn aux_data_offset(l_read_name: usize, n_cigar_op: usize, l_seq: usize) -> usize {
    32 + l_read_name + n_cigar_op * 4 + l_seq.div_ceil(2) + l_seq
}

/// Calculate the offset to auxiliary data for a complete BAM record.
///
/// Returns `None` if the record is too short to read the required header
/// fields (needs at least 20 bytes for `l_read_name`, `n_cigar_op`, `l_seq`).
#[inline]
#[must_use]
pub fn aux_data_offset_from_record(bam: &[u8]) -> Option<usize> {
    if bam.len() < 20 {
        return None;
    }
    let l_rn = bam[8] as usize;
    let n_co = u16::from_le_bytes([bam[12], bam[13]]) as usize;
    let l_s = u32::from_le_bytes([bam[16], bam[17], bam[18], bam[19]]) as usize;
    Some(aux_data_offset(l_rn, n_co, l_s))
}

/// Get auxiliary data as a byte slice from a complete BAM record.
///
/// Returns an empty slice for truncated records or records with no aux data.
#[inline]
#[must_use]
pub fn aux_data_slice(bam: &[u8]) -> &[u8] {
    match aux_data_offset_from_record(bam) {
        Some(offset) if offset <= bam.len() => &bam[offset..],
        _ => &[],
    }
}

/// Offset of the first CIGAR operation.
#[inline]
#[must_use]
pub fn cigar_offset(bam: &[u8]) -> usize {
    32 + bam[8] as usize
}

/// Calculate the offset to sequence data in a BAM record.
#[inline]
#[must_use]
pub fn seq_offset(bam: &[u8]) -> usize {
    let l_rn = bam[8] as usize;
    let n_co = u16::from_le_bytes([bam[12], bam[13]]) as usize;
    32 + l_rn + n_co * 4
}

/// Calculate the offset to quality data in a BAM record.
#[inline]
#[must_use]
pub fn qual_offset(bam: &[u8]) -> usize {
    seq_offset(bam) + (l_seq(bam) as usize).div_ceil(2)
}

/// Base qualities of a record (raw Phred values, `0xFF` when absent).
#[inline]
#[must_use]
pub fn quality_scores(bam: &[u8]) -> &[u8] {
    let start = qual_offset(bam);
    &bam[start..start + l_seq(bam) as usize]
}

/// Check that a byte block is large enough to hold the layout its own
/// header declares, and that the read name is NUL-terminated.
#[must_use]
pub fn is_well_formed(bam: &[u8]) -> bool {
    if bam.len() < MIN_BAM_HEADER_LEN {
        return false;
    }
    let l_rn = bam[8] as usize;
    if l_rn == 0 || bam.len() < 32 + l_rn || bam[32 + l_rn - 1] != 0 {
        return false;
    }
    aux_data_offset_from_record(bam).is_some_and(|offset| offset <= bam.len())
}
