//! Header-level preconditions and edits for a fixmate run.
//!
//! Covers the per-reference length table used by the sanitizer, the
//! sort-order check done before any record is read, and the @PG record
//! appended to the output header.

use anyhow::Result;
use bstr::BString;
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::Program;
use noodles::sam::header::record::value::map::header::sort_order::COORDINATE;
use noodles::sam::header::record::value::map::program::tag;
use std::collections::HashSet;

use crate::errors::MatefixError;

/// Program ID (and name) used for the @PG record.
pub const PROGRAM_ID: &str = "matefix";

/// Reference sequence lengths indexed by reference ID.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceLengths(Vec<i64>);

impl ReferenceLengths {
    /// Collect lengths in header order.
    #[must_use]
    pub fn from_header(header: &Header) -> Self {
        Self(header.reference_sequences().values().map(|map| map.length().get() as i64).collect())
    }

    /// Length of the reference at `tid`.
    ///
    /// A negative `tid` (no reference) has length 0. `None` means the index
    /// lies past the end of the header's reference list.
    #[must_use]
    pub fn get(&self, tid: i32) -> Option<i64> {
        match usize::try_from(tid) {
            Ok(i) => self.0.get(i).copied(),
            Err(_) => Some(0),
        }
    }

    /// Number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the header declared no references.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i64>> for ReferenceLengths {
    fn from(lengths: Vec<i64>) -> Self {
        Self(lengths)
    }
}

/// Reject inputs whose @HD line declares coordinate order.
///
/// Unsorted, queryname and absent sort orders are all accepted.
///
/// # Errors
///
/// Returns [`MatefixError::DisallowedSortOrder`] for `SO:coordinate`.
pub fn validate_sort_order(header: &Header) -> std::result::Result<(), MatefixError> {
    let sort_order = header.header().and_then(|hd| hd.other_fields().get(b"SO"));
    match sort_order {
        Some(so) if <_ as AsRef<[u8]>>::as_ref(so) == COORDINATE => {
            Err(MatefixError::DisallowedSortOrder {
                sort_order: String::from_utf8_lossy(COORDINATE).into_owned(),
            })
        }
        _ => Ok(()),
    }
}

/// ID of the program at the end of the @PG chain (the one no PP points to).
#[must_use]
pub fn last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let program_map = programs.as_ref();

    let referenced: HashSet<&[u8]> = program_map
        .values()
        .filter_map(|pg| pg.other_fields().get(&tag::PREVIOUS_PROGRAM_ID))
        .map(AsRef::as_ref)
        .collect();

    program_map
        .keys()
        .find(|id| !referenced.contains(id.as_slice()))
        .or_else(|| program_map.keys().next())
        .map(|id| String::from_utf8_lossy(id).into_owned())
}

/// `base_id`, or `base_id.N` for the smallest N not already taken.
#[must_use]
pub fn unique_program_id(header: &Header, base_id: &str) -> String {
    let programs = header.programs();
    let program_map = programs.as_ref();

    if !program_map.contains_key(base_id.as_bytes()) {
        return base_id.to_string();
    }
    (1..)
        .map(|i| format!("{base_id}.{i}"))
        .find(|candidate| !program_map.contains_key(candidate.as_bytes()))
        .unwrap_or_else(|| base_id.to_string())
}

/// Append a @PG record for this run, chained to the previous last program.
///
/// # Errors
///
/// Returns an error if the record cannot be built or added.
pub fn add_pg_record(mut header: Header, version: &str, command_line: &str) -> Result<Header> {
    let previous_program = last_program_id(&header);
    let id = unique_program_id(&header, PROGRAM_ID);

    let mut builder = Map::<Program>::builder()
        .insert(tag::NAME, PROGRAM_ID)
        .insert(tag::VERSION, version)
        .insert(tag::COMMAND_LINE, command_line);
    if let Some(pp) = previous_program {
        builder = builder.insert(tag::PREVIOUS_PROGRAM_ID, pp);
    }

    header.programs_mut().add(BString::from(id), builder.build()?)?;
    Ok(header)
}
