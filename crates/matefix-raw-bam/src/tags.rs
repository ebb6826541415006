use crate::editor::EditError;
use crate::fields::{aux_data_offset_from_record, tag_value_size};

/// Find a string (Z-type) tag in auxiliary data, returning value bytes without null terminator.
#[must_use]
pub fn find_string_tag<'a>(aux_data: &'a [u8], tag: &[u8; 2]) -> Option<&'a [u8]> {
    let (start, end) = find_tag_bounds(aux_data, tag)?;
    if aux_data[start + 2] != b'Z' {
        return None;
    }
    // Exclude the NUL terminator
    Some(&aux_data[start + 3..end - 1])
}

/// Find the byte range `[start, end)` of an entire tag entry (tag+type+value) in aux data.
///
/// Returns offsets relative to the start of `aux_data`.
/// Returns `None` if the tag is not found.
#[must_use]
pub fn find_tag_bounds(aux_data: &[u8], tag: &[u8; 2]) -> Option<(usize, usize)> {
    let mut p = 0;
    while p + 3 <= aux_data.len() {
        let t = &aux_data[p..p + 2];
        let val_type = aux_data[p + 2];

        if let Some(size) = tag_value_size(val_type, &aux_data[p + 3..]) {
            let entry_end = p + 3 + size;
            if entry_end > aux_data.len() {
                break;
            }
            if t == tag {
                return Some((p, entry_end));
            }
            p = entry_end;
        } else {
            break;
        }
    }
    None
}

/// Find an integer tag value in auxiliary data.
///
/// Supports signed/unsigned byte, short, and int types (c/C/s/S/i/I).
#[must_use]
pub fn find_int_tag(aux_data: &[u8], tag: &[u8; 2]) -> Option<i64> {
    let (start, _) = find_tag_bounds(aux_data, tag)?;
    let v = &aux_data[start + 3..];
    match aux_data[start + 2] {
        b'c' => Some(i64::from(v[0].cast_signed())),
        b'C' => Some(i64::from(v[0])),
        b's' => Some(i64::from(i16::from_le_bytes([v[0], v[1]]))),
        b'S' => Some(i64::from(u16::from_le_bytes([v[0], v[1]]))),
        b'i' => Some(i64::from(i32::from_le_bytes([v[0], v[1], v[2], v[3]]))),
        b'I' => Some(i64::from(u32::from_le_bytes([v[0], v[1], v[2], v[3]]))),
        _ => None,
    }
}

/// Tags present in auxiliary data, in stored order.
///
/// Stops at the first entry whose type cannot be sized.
#[must_use]
pub fn tag_keys(aux_data: &[u8]) -> Vec<[u8; 2]> {
    let mut keys = Vec::new();
    let mut p = 0;
    while p + 3 <= aux_data.len() {
        let Some(size) = tag_value_size(aux_data[p + 2], &aux_data[p + 3..]) else {
            break;
        };
        keys.push([aux_data[p], aux_data[p + 1]]);
        p += 3 + size;
    }
    keys
}

/// Append a string (Z-type) tag to a BAM record.
///
/// The tag is appended at the end of the record: `[tag_byte_1, tag_byte_2, 'Z', value..., NUL]`.
pub fn append_string_tag(record: &mut Vec<u8>, tag: &[u8; 2], value: &[u8]) {
    record.push(tag[0]);
    record.push(tag[1]);
    record.push(b'Z');
    record.extend_from_slice(value);
    record.push(0); // null terminator
}

/// Append an integer tag that is always stored as a 4-byte `'i'` value.
pub fn append_i32_tag(record: &mut Vec<u8>, tag: &[u8; 2], value: i32) {
    record.push(tag[0]);
    record.push(tag[1]);
    record.push(b'i');
    record.extend_from_slice(&value.to_le_bytes());
}

/// Remove a tag from a BAM record. No-op if the tag is not found.
pub fn remove_tag(record: &mut Vec<u8>, tag: &[u8; 2]) {
    let Some(aux_start) = aux_data_offset_from_record(record) else {
        return;
    };
    if aux_start >= record.len() {
        return;
    }
    if let Some((start, end)) = find_tag_bounds(&record[aux_start..], tag) {
        let abs_start = aux_start + start;
        let abs_end = aux_start + end;
        record.drain(abs_start..abs_end);
    }
}

/// Keep only the aux entries whose tag satisfies `keep`, preserving their order.
///
/// Entries are compacted towards the start of the aux block in a single pass
/// and the record is truncated once at the end. Returns the number of
/// removed entries.
///
/// # Errors
///
/// Returns [`EditError::MalformedAux`] if an entry cannot be sized; the
/// record is left unchanged in that case.
pub fn retain_tags<F>(record: &mut Vec<u8>, mut keep: F) -> Result<usize, EditError>
where
    F: FnMut(&[u8; 2]) -> bool,
{
    let Some(aux_start) = aux_data_offset_from_record(record) else {
        return Err(EditError::MalformedRecord { reason: "record shorter than fixed fields" });
    };
    if aux_start > record.len() {
        return Err(EditError::MalformedRecord { reason: "aux offset past end of record" });
    }

    // Validate the whole block first so a bad entry leaves the record untouched
    let mut entries = Vec::new();
    let mut p = aux_start;
    while p < record.len() {
        if p + 3 > record.len() {
            return Err(EditError::MalformedAux { offset: p - aux_start });
        }
        let size = tag_value_size(record[p + 2], &record[p + 3..])
            .filter(|&size| p + 3 + size <= record.len())
            .ok_or(EditError::MalformedAux { offset: p - aux_start })?;
        entries.push((p, p + 3 + size));
        p += 3 + size;
    }

    let mut to = aux_start;
    let mut removed = 0;
    for (start, end) in entries {
        let tag = [record[start], record[start + 1]];
        if keep(&tag) {
            if start != to {
                record.copy_within(start..end, to);
            }
            to += end - start;
        } else {
            removed += 1;
        }
    }
    record.truncate(to);
    Ok(removed)
}
