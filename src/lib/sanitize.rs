//! Record sanitization.
//!
//! [`SanitizeFlags`] selects which consistency rules run, and [`sanitize`]
//! applies them to one raw record:
//!
//! 1. `pos`: a record without a reference gets position -1 (and, with
//!    `unmap`, the unmapped flag).
//! 2. `cigar`: a mapped record with no valid position, or one starting past
//!    the end of its reference, becomes unmapped (with `unmap`); one that
//!    merely overhangs the end is clipped by [`crate::trim::trim`].
//! 3. For records that are unmapped afterwards: `cigar` drops the CIGAR,
//!    `mqual` zeroes the mapping quality and `aux` strips the
//!    alignment-specific tags `NM`, `MD`, `CG` and `SM`.

use std::fmt;
use std::str::FromStr;

use matefix_raw_bam::{
    clear_cigar, end_position, flags, is_unmapped, is_well_formed, n_cigar_op, pos, ref_id,
    retain_tags, set_flags, set_mapq, set_pos, set_ref_id, update_bin,
};

use crate::errors::{MatefixError, Result};
use crate::header::ReferenceLengths;
use crate::trim::{TrimOutcome, trim};

/// Aux tags that describe an alignment and are meaningless once unmapped.
const ALIGNMENT_TAGS: [[u8; 2]; 4] = [*b"NM", *b"MD", *b"CG", *b"SM"];

/// Set of sanitization rules to apply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SanitizeFlags(u8);

impl SanitizeFlags {
    /// Normalize the position of records without a reference.
    pub const POS: Self = Self(0x01);
    /// Zero the mapping quality of unmapped records.
    pub const MQUAL: Self = Self(0x02);
    /// Set the unmapped flag where position data says the record is unplaced.
    pub const UNMAP: Self = Self(0x04);
    /// Clip overhanging alignments and drop CIGARs of unmapped records.
    pub const CIGAR: Self = Self(0x08);
    /// Strip alignment-specific tags from unmapped records.
    pub const AUX: Self = Self(0x10);

    /// No rules.
    pub const NONE: Self = Self(0);
    /// Every rule except `pos`, which can break coordinate order.
    pub const ON: Self = Self(Self::MQUAL.0 | Self::UNMAP.0 | Self::CIGAR.0 | Self::AUX.0);
    /// Every rule.
    pub const ALL: Self = Self(Self::ON.0 | Self::POS.0);

    const NAMED: [(&'static str, Self); 5] = [
        ("pos", Self::POS),
        ("mqual", Self::MQUAL),
        ("unmap", Self::UNMAP),
        ("cigar", Self::CIGAR),
        ("aux", Self::AUX),
    ];

    /// Whether every rule in `other` is enabled.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no rule is enabled.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for SanitizeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SanitizeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Parses a comma-separated keyword list.
///
/// Tokens are matched by prefix and applied left to right: `all` (or any
/// token starting with `*`) and `on` replace the set, `none`/`off` clear it,
/// and `pos`, `mqual`, `unmap`, `cigar`, `aux` add to it. Empty tokens are
/// ignored.
impl FromStr for SanitizeFlags {
    type Err = MatefixError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parsed = Self::NONE;
        for token in s.split(',').filter(|t| !t.is_empty()) {
            if token.starts_with("all") || token.starts_with('*') {
                parsed = Self::ALL;
            } else if token.starts_with("none") || token.starts_with("off") {
                parsed = Self::NONE;
            } else if token.starts_with("on") {
                parsed = Self::ON;
            } else if let Some(&(_, flag)) =
                Self::NAMED.iter().find(|(name, _)| token.starts_with(name))
            {
                parsed |= flag;
            } else {
                return Err(MatefixError::UnknownSanitizeKeyword { keyword: token.to_string() });
            }
        }
        Ok(parsed)
    }
}

impl fmt::Display for SanitizeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("none"),
            Self::ALL => f.write_str("all"),
            flags => {
                let names: Vec<&str> = Self::NAMED
                    .iter()
                    .filter(|(_, flag)| flags.contains(*flag))
                    .map(|(name, _)| *name)
                    .collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

/// What [`sanitize`] changed, for run metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// The CIGAR was clipped at the reference end.
    pub trimmed: bool,
    /// A record that arrived mapped left unmapped.
    pub marked_unmapped: bool,
}

/// Apply the rules in `options` to one record in place.
///
/// # Errors
///
/// Returns an error if the record is shorter than its declared layout,
/// refers to a reference missing from the header, or cannot be resized.
pub fn sanitize(
    record: &mut Vec<u8>,
    references: &ReferenceLengths,
    options: SanitizeFlags,
) -> Result<SanitizeReport> {
    if !is_well_formed(record) {
        return Err(MatefixError::malformed(record, "record is shorter than its declared layout"));
    }
    let mut report = SanitizeReport::default();
    if options.is_empty() {
        return Ok(report);
    }
    let was_unmapped = is_unmapped(record);
    let mut placement_changed = false;

    if options.contains(SanitizeFlags::POS) && ref_id(record) < 0 {
        if pos(record) != -1 {
            set_pos(record, -1);
            placement_changed = true;
        }
        if options.contains(SanitizeFlags::UNMAP) {
            mark_unmapped(record);
        }
    }

    if options.contains(SanitizeFlags::CIGAR) && !is_unmapped(record) {
        if pos(record) < 0 && options.contains(SanitizeFlags::UNMAP) {
            mark_unmapped(record);
        } else {
            let tid = ref_id(record);
            let reference_length = references.get(tid).ok_or_else(|| {
                MatefixError::malformed(
                    record,
                    format!(
                        "reference index {tid} is not among the {} header references",
                        references.len()
                    ),
                )
            })?;

            if i64::from(pos(record)) >= reference_length
                && options.contains(SanitizeFlags::UNMAP)
            {
                mark_unmapped(record);
                if options.contains(SanitizeFlags::POS) {
                    set_ref_id(record, -1);
                    set_pos(record, -1);
                    placement_changed = true;
                }
            } else if end_position(record) > reference_length {
                report.trimmed = trim(record, reference_length)? == TrimOutcome::Trimmed;
            }
        }
    }

    if is_unmapped(record) {
        if options.contains(SanitizeFlags::CIGAR) && n_cigar_op(record) > 0 {
            clear_cigar(record).map_err(|e| MatefixError::edit(record, e))?;
            placement_changed = false;
        }
        if options.contains(SanitizeFlags::MQUAL) {
            set_mapq(record, 0);
        }
        if options.contains(SanitizeFlags::AUX) {
            retain_tags(record, |tag| !ALIGNMENT_TAGS.contains(tag))
                .map_err(|e| MatefixError::edit(record, e))?;
        }
    }

    // clear_cigar already refreshed the bin
    if placement_changed {
        update_bin(record);
    }
    report.marked_unmapped = !was_unmapped && is_unmapped(record);
    Ok(report)
}

fn mark_unmapped(record: &mut [u8]) {
    set_flags(record, flags(record) | flags::UNMAPPED);
}
