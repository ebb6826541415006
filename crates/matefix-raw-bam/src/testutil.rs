//! Builders for raw BAM records used by tests in this crate and downstream.
//!
//! CIGAR ops are packed with [`crate::cigar::encode_op`].

use crate::fields::qual_offset;

/// Build a raw BAM record (without the `block_size` prefix).
///
/// Sequence bases and qualities are zero-filled; mapq, bin and tlen are 0.
///
/// # Panics
///
/// Panics if `name` is longer than 254 bytes or there are more than
/// `u16::MAX` CIGAR ops.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn make_bam_bytes(
    tid: i32,
    pos: i32,
    flag: u16,
    name: &[u8],
    cigar_ops: &[u32],
    seq_len: usize,
    mate_tid: i32,
    mate_pos: i32,
    aux_data: &[u8],
) -> Vec<u8> {
    let l_read_name = u8::try_from(name.len() + 1).unwrap();
    let n_cigar_op = u16::try_from(cigar_ops.len()).unwrap();
    let seq_bytes = seq_len.div_ceil(2);

    let mut buf = Vec::with_capacity(
        32 + usize::from(l_read_name) + cigar_ops.len() * 4 + seq_bytes + seq_len + aux_data.len(),
    );
    buf.extend_from_slice(&tid.to_le_bytes());
    buf.extend_from_slice(&pos.to_le_bytes());
    buf.push(l_read_name);
    buf.push(0); // mapq
    buf.extend_from_slice(&0u16.to_le_bytes()); // bin
    buf.extend_from_slice(&n_cigar_op.to_le_bytes());
    buf.extend_from_slice(&flag.to_le_bytes());
    buf.extend_from_slice(&u32::try_from(seq_len).unwrap().to_le_bytes());
    buf.extend_from_slice(&mate_tid.to_le_bytes());
    buf.extend_from_slice(&mate_pos.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // tlen

    buf.extend_from_slice(name);
    buf.push(0);
    for op in cigar_ops {
        buf.extend_from_slice(&op.to_le_bytes());
    }
    buf.resize(buf.len() + seq_bytes + seq_len, 0);
    buf.extend_from_slice(aux_data);
    buf
}

/// Overwrite the base qualities of a record built by [`make_bam_bytes`].
///
/// # Panics
///
/// Panics if `quals` is not exactly `l_seq` long.
pub fn set_quality_scores(rec: &mut [u8], quals: &[u8]) {
    let l_seq = u32::from_le_bytes([rec[16], rec[17], rec[18], rec[19]]) as usize;
    assert_eq!(quals.len(), l_seq, "quality length must equal l_seq");
    let start = qual_offset(rec);
    rec[start..start + l_seq].copy_from_slice(quals);
}

/// Prefix a record with its little-endian `block_size`, as it appears on disk.
///
/// # Panics
///
/// Panics if the record is longer than `u32::MAX` bytes.
#[must_use]
pub fn frame_record(rec: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rec.len() + 4);
    out.extend_from_slice(&u32::try_from(rec.len()).unwrap().to_le_bytes());
    out.extend_from_slice(rec);
    out
}

/// Helper: build raw aux bytes for a B-type array tag.
#[must_use]
pub fn make_b_array_tag(tag: [u8; 2], elem_type: u8, count: u32, elements: &[u8]) -> Vec<u8> {
    let mut aux = vec![tag[0], tag[1], b'B', elem_type];
    aux.extend_from_slice(&count.to_le_bytes());
    aux.extend_from_slice(elements);
    aux
}
