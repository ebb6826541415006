//! Mate synchronization for a pair of primary records.
//!
//! [`synchronize`] reads both records as immutable snapshots and plans every
//! change up front, returning one [`RecordPatch`] per record. Nothing is
//! written until [`apply_patch`] runs, so each step sees exactly the state
//! the previous steps produced and neither record observes a half-updated
//! partner.

use matefix_raw_bam::{
    EditError, append_i32_tag, append_string_tag, end_position, flags, format_cigar,
    get_cigar_ops, mapq, mate_pos, mate_ref_id, op_char, op_len, op_type, pos, quality_scores,
    ref_id, remove_tag, set_flags, set_mate_pos, set_mate_ref_id, set_pos, set_ref_id,
    set_template_length, template_length, update_bin,
};

/// Base qualities below this do not count towards the mate score.
pub const MATE_SCORE_MIN_QUALITY: u8 = 15;

/// Optional steps of mate synchronization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MateOptions {
    /// Add the template CIGAR (`ct`) tag to the leftmost record.
    pub template_cigar: bool,
    /// Clear the proper-pair flag when the pair is not inward facing.
    pub proper_pair_check: bool,
    /// Add each record's mate score (`ms`) to its partner.
    pub mate_score: bool,
}

impl Default for MateOptions {
    fn default() -> Self {
        Self { template_cigar: false, proper_pair_check: true, mate_score: false }
    }
}

/// A change to one aux tag. Setting a tag replaces any existing value and
/// moves it to the end of the aux block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagEdit {
    /// Delete the tag if present.
    Remove([u8; 2]),
    /// Store a 4-byte signed integer (`i`).
    SetInt([u8; 2], i32),
    /// Store a string (`Z`).
    SetString([u8; 2], String),
}

impl TagEdit {
    /// Upper bound on the bytes this edit appends.
    fn appended_len(&self) -> usize {
        match self {
            Self::Remove(_) => 0,
            Self::SetInt(..) => 7,
            Self::SetString(_, value) => 4 + value.len(),
        }
    }
}

/// New values for the mate-related fields of one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordPatch {
    pub ref_id: i32,
    pub pos: i32,
    pub flags: u16,
    pub mate_ref_id: i32,
    pub mate_pos: i32,
    pub template_length: i32,
    /// Tag edits, applied in order.
    pub tags: Vec<TagEdit>,
}

/// Snapshot of the fields synchronization reads and writes.
struct MateView<'a> {
    bytes: &'a [u8],
    ref_id: i32,
    pos: i32,
    flags: u16,
    mate_ref_id: i32,
    mate_pos: i32,
    template_length: i32,
    /// Alignment end of the record as read.
    end: i64,
    tags: Vec<TagEdit>,
}

impl<'a> MateView<'a> {
    fn of(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            ref_id: ref_id(bytes),
            pos: pos(bytes),
            flags: flags(bytes),
            mate_ref_id: mate_ref_id(bytes),
            mate_pos: mate_pos(bytes),
            template_length: template_length(bytes),
            end: end_position(bytes),
            tags: Vec::new(),
        }
    }

    fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    fn set(&mut self, flag: u16, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    fn is_mapped(&self) -> bool {
        !self.has(flags::UNMAPPED)
    }

    fn five_prime(&self) -> i64 {
        if self.has(flags::REVERSE) { self.end } else { i64::from(self.pos) }
    }

    fn into_patch(self) -> RecordPatch {
        RecordPatch {
            ref_id: self.ref_id,
            pos: self.pos,
            flags: self.flags,
            mate_ref_id: self.mate_ref_id,
            mate_pos: self.mate_pos,
            template_length: self.template_length,
            tags: self.tags,
        }
    }
}

/// Plan the synchronization of two primary records of one template.
///
/// Steps, each applied in both directions:
/// 1. both records get the paired flag;
/// 2. an unmapped record takes the position of its mapped mate;
/// 3. mate position and mate strand are copied across, and mate unmapped is
///    set when the mate is unmapped;
/// 4. `MQ` is set from a mapped mate's mapping quality, and `MC` from the
///    mate's CIGAR whenever either record is mapped;
/// 5. template length is the mate's 5' end minus this record's 5' end when
///    both are mapped to the same reference, and 0 otherwise;
/// 6. optionally `ct`, the proper-pair check and `ms`.
#[must_use]
pub fn synchronize(a: &[u8], b: &[u8], options: MateOptions) -> (RecordPatch, RecordPatch) {
    let mut a = MateView::of(a);
    let mut b = MateView::of(b);

    a.flags |= flags::PAIRED;
    b.flags |= flags::PAIRED;

    co_locate(&a, &mut b);
    co_locate(&b, &mut a);
    link_mate(&a, &mut b);
    link_mate(&b, &mut a);
    annotate_mate(&a, &mut b);
    annotate_mate(&b, &mut a);

    let both_placed = [&a, &b]
        .iter()
        .all(|v| !v.has(flags::UNMAPPED) && !v.has(flags::MATE_UNMAPPED));
    if a.ref_id == b.ref_id && both_placed {
        let (a5, b5) = (a.five_prime(), b.five_prime());
        a.template_length = saturating_i32(b5 - a5);
        b.template_length = saturating_i32(a5 - b5);
    } else {
        a.template_length = 0;
        b.template_length = 0;
    }

    if options.template_cigar {
        add_template_cigar(&mut a, &mut b);
    }

    if options.proper_pair_check && !views_plausibly_paired(&a, &b) {
        a.set(flags::PROPER_PAIR, false);
        b.set(flags::PROPER_PAIR, false);
    }

    if options.mate_score {
        let (a_score, b_score) = (mate_score(a.bytes), mate_score(b.bytes));
        b.tags.push(TagEdit::SetInt(*b"ms", a_score.cast_signed()));
        a.tags.push(TagEdit::SetInt(*b"ms", b_score.cast_signed()));
    }

    (a.into_patch(), b.into_patch())
}

fn co_locate(src: &MateView<'_>, dest: &mut MateView<'_>) {
    if !dest.is_mapped() && src.is_mapped() {
        dest.ref_id = src.ref_id;
        dest.pos = src.pos;
    }
}

fn link_mate(src: &MateView<'_>, dest: &mut MateView<'_>) {
    dest.mate_ref_id = src.ref_id;
    dest.mate_pos = src.pos;
    dest.set(flags::MATE_REVERSE, src.has(flags::REVERSE));
    // Never cleared: a stale mate-unmapped flag also suppresses template length
    if !src.is_mapped() {
        dest.flags |= flags::MATE_UNMAPPED;
    }
}

fn annotate_mate(src: &MateView<'_>, dest: &mut MateView<'_>) {
    if src.is_mapped() {
        dest.tags.push(TagEdit::SetInt(*b"MQ", i32::from(mapq(src.bytes))));
    }
    if src.is_mapped() || dest.is_mapped() {
        let mut cigar = String::new();
        format_cigar(&get_cigar_ops(src.bytes), &mut cigar);
        dest.tags.push(TagEdit::SetString(*b"MC", cigar));
    }
}

fn add_template_cigar<'a>(a: &mut MateView<'a>, b: &mut MateView<'a>) {
    if a.ref_id != b.ref_id
        || a.ref_id < 0
        || a.pos < 0
        || b.pos < 0
        || !a.is_mapped()
        || !b.is_mapped()
    {
        return;
    }
    let (left, right) = if a.pos > b.pos { (b, a) } else { (a, b) };

    let mut text = String::new();
    push_segment(&mut text, left);
    text.push_str(&(i64::from(right.pos) - left.end).to_string());
    text.push('T');
    push_segment(&mut text, right);

    left.tags.push(TagEdit::SetString(*b"ct", text));
    right.tags.push(TagEdit::Remove(*b"ct"));
}

/// `<1|2><F|R><ops>` with the ops written without a `*` for an empty CIGAR.
fn push_segment(text: &mut String, view: &MateView<'_>) {
    text.push(if view.has(flags::FIRST_SEGMENT) { '1' } else { '2' });
    text.push(if view.has(flags::REVERSE) { 'R' } else { 'F' });
    for op in get_cigar_ops(view.bytes) {
        text.push_str(&op_len(op).to_string());
        text.push(op_char(op_type(op)));
    }
}

fn views_plausibly_paired(a: &MateView<'_>, b: &MateView<'_>) -> bool {
    if !a.is_mapped() || !b.is_mapped() || a.ref_id != b.ref_id {
        return false;
    }
    let (first, second) = if a.five_prime() > b.five_prime() { (b, a) } else { (a, b) };
    !first.has(flags::REVERSE) && second.has(flags::REVERSE)
}

/// Whether two records face each other on the same reference, the leftmost
/// (by 5' end) on the forward strand and the other on the reverse strand.
#[must_use]
pub fn plausibly_properly_paired(a: &[u8], b: &[u8]) -> bool {
    views_plausibly_paired(&MateView::of(a), &MateView::of(b))
}

/// Sum of the base qualities at or above [`MATE_SCORE_MIN_QUALITY`].
#[must_use]
pub fn mate_score(record: &[u8]) -> u32 {
    quality_scores(record)
        .iter()
        .filter(|&&q| q >= MATE_SCORE_MIN_QUALITY)
        .map(|&q| u32::from(q))
        .sum()
}

fn saturating_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Write `patch` into `record`.
///
/// Room for every appended tag is reserved before any byte changes, so a
/// failed allocation leaves the record untouched.
///
/// # Errors
///
/// Returns an error if the record buffer cannot grow.
pub fn apply_patch(record: &mut Vec<u8>, patch: &RecordPatch) -> Result<(), EditError> {
    let growth: usize = patch.tags.iter().map(TagEdit::appended_len).sum();
    record.try_reserve(growth)?;

    let moved = ref_id(record) != patch.ref_id || pos(record) != patch.pos;
    let unmapped_changed = (flags(record) ^ patch.flags) & flags::UNMAPPED != 0;
    set_ref_id(record, patch.ref_id);
    set_pos(record, patch.pos);
    set_flags(record, patch.flags);
    set_mate_ref_id(record, patch.mate_ref_id);
    set_mate_pos(record, patch.mate_pos);
    set_template_length(record, patch.template_length);
    if moved || unmapped_changed {
        update_bin(record);
    }

    for edit in &patch.tags {
        match edit {
            TagEdit::Remove(tag) => remove_tag(record, tag),
            TagEdit::SetInt(tag, value) => {
                remove_tag(record, tag);
                append_i32_tag(record, tag, *value);
            }
            TagEdit::SetString(tag, value) => {
                remove_tag(record, tag);
                append_string_tag(record, tag, value.as_bytes());
            }
        }
    }
    Ok(())
}
