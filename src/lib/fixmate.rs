//! Template orchestration: the fixmate run loop.
//!
//! Each template from the [`TemplateGrouper`] has its primary records paired
//! through [`synchronize`], lone primaries reset to the unpaired convention,
//! and every record re-emitted in input order (minus secondary and unmapped
//! records when removal is requested).
//!
//! A template with more than two primary records pairs the first primary
//! with each later one in turn, so only the last pairing leaves consistent
//! mate fields. This is reported with a warning and counted in
//! [`FixMateMetrics::templates_with_extra_primaries`].

use std::io;

use bstr::ByteSlice;
use log::warn;
use matefix_raw_bam::{
    flags, is_primary, is_unmapped, read_name, set_flags, set_mate_pos, set_mate_ref_id,
    set_template_length,
};

use crate::bam_io::RawBamWriter;
use crate::errors::{MatefixError, Result};
use crate::grouper::{RecordSource, TemplateGrouper};
use crate::header::ReferenceLengths;
use crate::mate::{MateOptions, apply_patch, synchronize};
use crate::progress::ProgressTracker;
use crate::raw_record::RawRecord;
use crate::sanitize::SanitizeFlags;

/// Flags that only make sense for a record with a usable mate.
const PAIRING_FLAGS: u16 = flags::PAIRED | flags::MATE_REVERSE | flags::PROPER_PAIR;

/// Options for one fixmate run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixMateOptions {
    /// Drop secondary and unmapped records from the output.
    pub remove_reads: bool,
    /// Per-pair synchronization options.
    pub mate: MateOptions,
    /// Sanitization applied to every record as it is read.
    pub sanitize: SanitizeFlags,
}

impl Default for FixMateOptions {
    fn default() -> Self {
        Self { remove_reads: false, mate: MateOptions::default(), sanitize: SanitizeFlags::ALL }
    }
}

/// Counters reported at the end of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixMateMetrics {
    pub templates: u64,
    pub records_read: u64,
    pub records_written: u64,
    /// Pairings run, one per primary after the first in each template.
    pub pairs_synchronized: u64,
    /// Templates whose only primary was reset to unpaired.
    pub unpaired_primaries: u64,
    pub records_removed: u64,
    pub records_trimmed: u64,
    pub records_marked_unmapped: u64,
    pub templates_with_extra_primaries: u64,
}

/// Destination for processed records.
pub trait RecordSink {
    /// Write one record (bytes without the `block_size` prefix).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    fn write_record(&mut self, record: &[u8]) -> io::Result<()>;
}

impl RecordSink for RawBamWriter {
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.write_raw_record(record)
    }
}

impl RecordSink for Vec<Vec<u8>> {
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.push(record.to_vec());
        Ok(())
    }
}

/// Fix mate information for one template in place.
///
/// # Errors
///
/// Returns an error if a record buffer cannot grow to hold the new tags.
pub fn process_template(
    records: &mut [RawRecord],
    options: &FixMateOptions,
    metrics: &mut FixMateMetrics,
) -> Result<()> {
    let mut first: Option<usize> = None;
    let mut paired = false;
    let mut primaries = 0usize;

    for index in 0..records.len() {
        if !is_primary(&records[index]) {
            continue;
        }
        primaries += 1;
        let Some(pre) = first else {
            first = Some(index);
            continue;
        };

        let (pre_patch, cur_patch) = synchronize(&records[pre], &records[index], options.mate);
        apply_patch(records[pre].as_mut_vec(), &pre_patch)
            .map_err(|e| MatefixError::edit(&records[pre], e))?;
        apply_patch(records[index].as_mut_vec(), &cur_patch)
            .map_err(|e| MatefixError::edit(&records[index], e))?;
        paired = true;
        metrics.pairs_synchronized += 1;

        if options.remove_reads {
            clear_orphan_flags(records, pre, index);
        }
    }

    if let (Some(pre), false) = (first, paired) {
        let record = &mut records[pre];
        let flag = flags(record);
        set_flags(record, flag & !PAIRING_FLAGS);
        set_mate_ref_id(record, -1);
        set_mate_pos(record, -1);
        set_template_length(record, 0);
        metrics.unpaired_primaries += 1;
    }

    if primaries > 2 {
        if metrics.templates_with_extra_primaries == 0 {
            warn!(
                "Template '{}' has {primaries} primary records; only the first and last are \
                 synchronized as mates (further occurrences are counted in the summary)",
                read_name(&records[0]).as_bstr()
            );
        }
        metrics.templates_with_extra_primaries += 1;
    }
    Ok(())
}

/// Strip pairing flags from each record whose partner is unmapped and will
/// be dropped.
fn clear_orphan_flags(records: &mut [RawRecord], a: usize, b: usize) {
    for (mate, record) in [(a, b), (b, a)] {
        if is_unmapped(&records[mate]) {
            let flag = flags(&records[record]);
            set_flags(&mut records[record], flag & !PAIRING_FLAGS);
        }
    }
}

/// Write a processed template, honouring the removal policy.
///
/// # Errors
///
/// Returns an error if the sink fails.
pub fn write_template<W: RecordSink>(
    records: &[RawRecord],
    options: &FixMateOptions,
    sink: &mut W,
    metrics: &mut FixMateMetrics,
) -> Result<()> {
    for record in records {
        let flag = flags(record);
        if options.remove_reads && flag & (flags::SECONDARY | flags::UNMAPPED) != 0 {
            metrics.records_removed += 1;
            continue;
        }
        sink.write_record(record)
            .map_err(|source| MatefixError::Io { action: "writing records", source })?;
        metrics.records_written += 1;
    }
    Ok(())
}

/// Run fixmate over every template from `source`, writing to `sink`.
///
/// # Errors
///
/// Returns an error on the first read, sanitize, edit or write failure.
/// Templates completed before the failure have already been written.
pub fn fix_mates<S: RecordSource, W: RecordSink>(
    source: S,
    references: ReferenceLengths,
    sink: &mut W,
    options: &FixMateOptions,
    progress: &mut ProgressTracker,
) -> Result<FixMateMetrics> {
    let mut grouper = TemplateGrouper::new(source, references, options.sanitize);
    let mut metrics = FixMateMetrics::default();

    while let Some(template) = grouper.next_template()? {
        process_template(template, options, &mut metrics)?;
        write_template(template, options, sink, &mut metrics)?;
        metrics.templates += 1;
        progress.log_if_needed(template.len() as u64);
    }

    let counts = grouper.counts();
    metrics.records_read = counts.records;
    metrics.records_trimmed = counts.trimmed;
    metrics.records_marked_unmapped = counts.marked_unmapped;
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matefix_raw_bam::{
        aux_data_slice, encode_op, find_int_tag, make_bam_bytes, mate_pos,
        mate_ref_id, pos, ref_id, template_length,
    };
    use rstest::rstest;
    use std::collections::VecDeque;

    fn rec(name: &[u8], tid: i32, pos: i32, flag: u16) -> Vec<u8> {
        let cigar: &[u32] = if flag & flags::UNMAPPED != 0 { &[] } else { &[encode_op(0, 50)] };
        make_bam_bytes(tid, pos, flag, name, cigar, 50, 7, 777, &[])
    }

    fn run(records: Vec<Vec<u8>>, options: &FixMateOptions) -> (Vec<Vec<u8>>, FixMateMetrics) {
        let source: VecDeque<Vec<u8>> = records.into();
        let mut sink: Vec<Vec<u8>> = Vec::new();
        let mut progress = ProgressTracker::new("Processed records");
        let metrics = fix_mates(
            source,
            ReferenceLengths::from(vec![10_000, 10_000]),
            &mut sink,
            options,
            &mut progress,
        )
        .unwrap();
        (sink, metrics)
    }

    const R1: u16 = flags::PAIRED | flags::FIRST_SEGMENT;
    const R2: u16 = flags::PAIRED | flags::LAST_SEGMENT;

    #[test]
    fn test_pair_is_synchronized() {
        let input = vec![
            rec(b"q", 0, 100, R1 | flags::PROPER_PAIR),
            rec(b"q", 0, 200, R2 | flags::REVERSE | flags::PROPER_PAIR),
        ];
        let (out, metrics) = run(input, &FixMateOptions::default());

        assert_eq!(out.len(), 2);
        assert_eq!((mate_ref_id(&out[0]), mate_pos(&out[0])), (0, 200));
        assert_eq!((mate_ref_id(&out[1]), mate_pos(&out[1])), (0, 100));
        assert_eq!(template_length(&out[0]), 150);
        assert_eq!(template_length(&out[1]), -150);
        assert_ne!(flags(&out[0]) & flags::PROPER_PAIR, 0);
        assert_eq!(metrics.pairs_synchronized, 1);
        assert_eq!(metrics.templates, 1);
        assert_eq!(metrics.records_read, 2);
        assert_eq!(metrics.records_written, 2);
    }

    #[test]
    fn test_single_primary_with_secondaries() {
        let secondary = rec(b"q", 1, 900, R1 | flags::SECONDARY | flags::MATE_REVERSE);
        let supplementary = rec(b"q", 0, 40, R1 | flags::SUPPLEMENTARY);
        let input = vec![
            secondary.clone(),
            rec(b"q", 0, 100, R1 | flags::PROPER_PAIR | flags::MATE_REVERSE),
            supplementary.clone(),
        ];
        let (out, metrics) = run(input, &FixMateOptions::default());

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], secondary);
        assert_eq!(out[2], supplementary);

        let primary = &out[1];
        assert_eq!((mate_ref_id(primary), mate_pos(primary)), (-1, -1));
        assert_eq!(template_length(primary), 0);
        assert_eq!(flags(primary) & PAIRING_FLAGS, 0);
        assert_ne!(flags(primary) & flags::FIRST_SEGMENT, 0);
        assert_eq!(metrics.unpaired_primaries, 1);
        assert_eq!(metrics.pairs_synchronized, 0);
    }

    #[test]
    fn test_template_without_primary_passes_through() {
        let input = vec![
            rec(b"q", 0, 100, R1 | flags::SECONDARY),
            rec(b"q", 0, 300, R2 | flags::SUPPLEMENTARY),
        ];
        let (out, metrics) = run(input.clone(), &FixMateOptions::default());
        assert_eq!(out, input);
        assert_eq!(metrics.unpaired_primaries, 0);
    }

    #[rstest]
    #[case::keep_all(false, 4, 0)]
    #[case::remove(true, 1, 3)]
    fn test_removal_policy(
        #[case] remove_reads: bool,
        #[case] expected_written: usize,
        #[case] expected_removed: u64,
    ) {
        let input = vec![
            rec(b"q", 0, 100, R1 | flags::PROPER_PAIR | flags::REVERSE),
            rec(b"q", -1, -1, R2 | flags::UNMAPPED),
            rec(b"q", 0, 500, R1 | flags::SECONDARY),
            rec(b"r", -1, -1, R1 | flags::UNMAPPED),
        ];
        let options = FixMateOptions { remove_reads, ..FixMateOptions::default() };
        let (out, metrics) = run(input, &options);

        assert_eq!(out.len(), expected_written);
        assert_eq!(metrics.records_removed, expected_removed);
        assert_eq!(metrics.records_read, 4);

        let mapped = &out[0];
        assert!(!is_unmapped(mapped));
        let pairing = flags(mapped) & PAIRING_FLAGS;
        if remove_reads {
            assert_eq!(pairing, 0);
        } else {
            assert_eq!(pairing, flags::PAIRED);
            // The unmapped mate sits with its partner
            assert_eq!((ref_id(&out[1]), pos(&out[1])), (0, 100));
        }
        assert_ne!(flags(mapped) & flags::MATE_UNMAPPED, 0);
    }

    #[test]
    fn test_three_primaries_pair_first_with_each() {
        let input = vec![
            rec(b"q", 0, 100, R1),
            rec(b"q", 0, 200, R2 | flags::REVERSE),
            rec(b"q", 1, 300, R2),
        ];
        let (out, metrics) = run(input, &FixMateOptions::default());

        // The last pairing wins for the first record
        assert_eq!((mate_ref_id(&out[0]), mate_pos(&out[0])), (1, 300));
        assert_eq!(mate_pos(&out[1]), 100);
        assert_eq!(mate_pos(&out[2]), 100);
        assert_eq!(metrics.pairs_synchronized, 2);
        assert_eq!(metrics.templates_with_extra_primaries, 1);
    }

    #[test]
    fn test_templates_are_processed_independently() {
        let input = vec![
            rec(b"a", 0, 100, R1),
            rec(b"a", 0, 150, R2 | flags::REVERSE),
            rec(b"b", 1, 10, R1),
            rec(b"c", 0, 1000, R1 | flags::REVERSE),
            rec(b"c", 0, 900, R2),
        ];
        let options = FixMateOptions {
            mate: MateOptions { mate_score: true, ..MateOptions::default() },
            ..FixMateOptions::default()
        };
        let (out, metrics) = run(input, &options);

        assert_eq!(metrics.templates, 3);
        assert_eq!(metrics.pairs_synchronized, 2);
        assert_eq!(metrics.unpaired_primaries, 1);
        assert_eq!(mate_pos(&out[0]), 150);
        assert_eq!(mate_ref_id(&out[2]), -1);
        assert_eq!(mate_pos(&out[4]), 1000);
        assert_eq!(template_length(&out[4]), 150);
        assert_eq!(find_int_tag(aux_data_slice(&out[3]), b"ms"), Some(0));
    }

    #[test]
    fn test_sanitize_counts_reach_metrics() {
        let input = vec![
            rec(b"q", 0, 9_980, R1),
            rec(b"q", 0, 20_000, R2 | flags::REVERSE),
        ];
        let (out, metrics) = run(input, &FixMateOptions::default());

        assert_eq!(metrics.records_trimmed, 1);
        assert_eq!(metrics.records_marked_unmapped, 1);
        assert!(is_unmapped(&out[1]));
        // The record that ran off the reference end is co-located with its mate
        assert_eq!((ref_id(&out[1]), pos(&out[1])), (0, 9_980));
    }

    #[test]
    fn test_write_failure_is_reported() {
        struct FailingSink;
        impl RecordSink for FailingSink {
            fn write_record(&mut self, _record: &[u8]) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
        }

        let source: VecDeque<Vec<u8>> = vec![rec(b"q", 0, 1, R1)].into();
        let mut progress = ProgressTracker::new("Processed records");
        let err = fix_mates(
            source,
            ReferenceLengths::from(vec![10_000]),
            &mut FailingSink,
            &FixMateOptions::default(),
            &mut progress,
        )
        .unwrap_err();
        assert!(matches!(err, MatefixError::Io { action: "writing records", .. }));
    }
}
