//! End-to-end tests for `matefix fixmate`.

use bstr::BString;
use noodles::core::Position;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record_buf::RecordBuf;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    assert_success, find_record, int_tag, mapped_read, read_bam, read_bam_bytes, run_fixmate,
    run_fixmate_with_stdin, string_tag, test_header, unplaced_read, write_bam,
};

const R1: Flags = Flags::SEGMENTED.union(Flags::FIRST_SEGMENT);
const R2: Flags = Flags::SEGMENTED.union(Flags::LAST_SEGMENT);

fn position(start: usize) -> Option<Position> {
    Position::try_from(start).ok()
}

/// Writes `records` under a queryname header and runs fixmate with `args`.
fn fix(dir: &TempDir, records: &[RecordBuf], args: &[&str]) -> Vec<RecordBuf> {
    let input = dir.path().join("input.bam");
    let output = dir.path().join("output.bam");
    write_bam(&input, &test_header("queryname"), records);

    let mut argv = vec!["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()];
    argv.extend_from_slice(args);
    assert_success(&run_fixmate(&argv));

    read_bam(&output).1
}

/// A forward read at chr1:101 and its reverse mate at chr1:201, both 50M.
fn inward_pair(name: &str) -> Vec<RecordBuf> {
    vec![
        mapped_read(name, R1 | Flags::PROPERLY_SEGMENTED, 0, 101, &[(Kind::Match, 50)], 60),
        mapped_read(
            name,
            R2 | Flags::PROPERLY_SEGMENTED | Flags::REVERSE_COMPLEMENTED,
            0,
            201,
            &[(Kind::Match, 50)],
            40,
        ),
    ]
}

#[test]
fn test_pair_gets_mate_fields_and_tags() {
    let dir = TempDir::new().unwrap();
    let records = fix(&dir, &inward_pair("q1"), &[]);
    assert_eq!(records.len(), 2);

    let r1 = find_record(&records, "q1", Flags::FIRST_SEGMENT);
    assert_eq!(r1.mate_reference_sequence_id(), Some(0));
    assert_eq!(r1.mate_alignment_start(), position(201));
    assert_eq!(r1.template_length(), 150);
    assert!(r1.flags().is_mate_reverse_complemented());
    assert!(r1.flags().is_properly_segmented());
    assert_eq!(int_tag(r1, *b"MQ"), Some(40));
    assert_eq!(string_tag(r1, *b"MC").as_deref(), Some("50M"));

    let r2 = find_record(&records, "q1", Flags::LAST_SEGMENT);
    assert_eq!(r2.mate_reference_sequence_id(), Some(0));
    assert_eq!(r2.mate_alignment_start(), position(101));
    assert_eq!(r2.template_length(), -150);
    assert!(!r2.flags().is_mate_reverse_complemented());
    assert_eq!(int_tag(r2, *b"MQ"), Some(60));
    assert_eq!(string_tag(r2, *b"MC").as_deref(), Some("50M"));
}

#[test]
fn test_pairs_on_different_references_have_zero_template_length() {
    let dir = TempDir::new().unwrap();
    let input = vec![
        mapped_read("q1", R1, 0, 101, &[(Kind::Match, 50)], 60),
        mapped_read("q1", R2, 1, 11, &[(Kind::Match, 50)], 60),
    ];
    let records = fix(&dir, &input, &[]);

    let r1 = find_record(&records, "q1", Flags::FIRST_SEGMENT);
    assert_eq!(r1.mate_reference_sequence_id(), Some(1));
    assert_eq!(r1.mate_alignment_start(), position(11));
    assert_eq!(r1.template_length(), 0);
    let r2 = find_record(&records, "q1", Flags::LAST_SEGMENT);
    assert_eq!(r2.mate_reference_sequence_id(), Some(0));
    assert_eq!(r2.template_length(), 0);
}

#[rstest]
#[case::inward_facing_kept(Flags::empty(), Flags::REVERSE_COMPLEMENTED, &[], true)]
#[case::same_strand_cleared(Flags::empty(), Flags::empty(), &[], false)]
#[case::outward_facing_cleared(Flags::REVERSE_COMPLEMENTED, Flags::empty(), &[], false)]
#[case::check_disabled(Flags::empty(), Flags::empty(), &["-p"], true)]
fn test_proper_pair_check(
    #[case] r1_strand: Flags,
    #[case] r2_strand: Flags,
    #[case] args: &[&str],
    #[case] proper: bool,
) {
    let dir = TempDir::new().unwrap();
    let cigar = [(Kind::Match, 50)];
    let input = vec![
        mapped_read("q1", R1 | Flags::PROPERLY_SEGMENTED | r1_strand, 0, 101, &cigar, 60),
        mapped_read("q1", R2 | Flags::PROPERLY_SEGMENTED | r2_strand, 0, 201, &cigar, 60),
    ];
    let records = fix(&dir, &input, args);
    assert!(records.iter().all(|r| r.flags().is_properly_segmented() == proper));
}

#[test]
fn test_unmapped_mate_is_placed_with_its_partner() {
    let dir = TempDir::new().unwrap();
    let input = vec![
        mapped_read("q1", R1, 0, 301, &[(Kind::Match, 40)], 33),
        unplaced_read("q1", R2, 40),
    ];
    let records = fix(&dir, &input, &[]);
    assert_eq!(records.len(), 2);

    let mapped = find_record(&records, "q1", Flags::FIRST_SEGMENT);
    assert!(mapped.flags().is_mate_unmapped());
    assert_eq!(mapped.mate_reference_sequence_id(), Some(0));
    assert_eq!(mapped.mate_alignment_start(), position(301));
    assert_eq!(mapped.template_length(), 0);
    assert_eq!(int_tag(mapped, *b"MQ"), None);
    assert_eq!(string_tag(mapped, *b"MC").as_deref(), Some("*"));

    let unmapped = find_record(&records, "q1", Flags::LAST_SEGMENT);
    assert!(unmapped.flags().is_unmapped());
    assert_eq!(unmapped.reference_sequence_id(), Some(0));
    assert_eq!(unmapped.alignment_start(), position(301));
    assert_eq!(unmapped.mate_alignment_start(), position(301));
    assert_eq!(unmapped.template_length(), 0);
    assert_eq!(int_tag(unmapped, *b"MQ"), Some(33));
    assert_eq!(string_tag(unmapped, *b"MC").as_deref(), Some("40M"));
}

#[test]
fn test_lone_primary_is_reset_to_unpaired() {
    let dir = TempDir::new().unwrap();
    let stale = RecordBuf::builder()
        .set_name(BString::from("lonely"))
        .set_flags(R1 | Flags::PROPERLY_SEGMENTED | Flags::MATE_REVERSE_COMPLEMENTED)
        .set_reference_sequence_id(0)
        .set_alignment_start(Position::try_from(11).unwrap())
        .set_cigar([Op::new(Kind::Match, 10)].into_iter().collect())
        .set_sequence(vec![b'A'; 10].into())
        .set_quality_scores(vec![30; 10].into())
        .set_mate_reference_sequence_id(1)
        .set_mate_alignment_start(Position::try_from(77).unwrap())
        .set_template_length(99)
        .build();

    let records = fix(&dir, &[stale], &[]);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(!record.flags().is_segmented());
    assert!(!record.flags().is_properly_segmented());
    assert!(!record.flags().is_mate_reverse_complemented());
    assert_eq!(record.mate_reference_sequence_id(), None);
    assert_eq!(record.mate_alignment_start(), None);
    assert_eq!(record.template_length(), 0);
}

#[test]
fn test_secondary_records_pass_through_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut input = inward_pair("q1");
    input.insert(1, mapped_read("q1", R1 | Flags::SECONDARY, 1, 51, &[(Kind::Match, 50)], 0));
    let records = fix(&dir, &input, &[]);
    assert_eq!(records.len(), 3);

    let secondary = find_record(&records, "q1", Flags::SECONDARY);
    assert_eq!(secondary.mate_reference_sequence_id(), None);
    assert_eq!(secondary.template_length(), 0);
    assert_eq!(string_tag(secondary, *b"MC"), None);

    // the secondary record does not break the primary pair apart
    let r2 = find_record(&records, "q1", Flags::LAST_SEGMENT);
    assert_eq!(r2.mate_alignment_start(), position(101));
}

#[test]
fn test_remove_reads_drops_unmapped_and_secondary() {
    let dir = TempDir::new().unwrap();
    let mut input = vec![
        mapped_read(
            "q1",
            R1 | Flags::PROPERLY_SEGMENTED | Flags::MATE_REVERSE_COMPLEMENTED,
            0,
            301,
            &[(Kind::Match, 40)],
            33,
        ),
        unplaced_read("q1", R2, 40),
    ];
    input.extend(inward_pair("q2"));
    input.push(mapped_read("q2", R2 | Flags::SECONDARY, 1, 51, &[(Kind::Match, 50)], 0));

    let records = fix(&dir, &input, &["-r"]);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| !r.flags().is_unmapped() && !r.flags().is_secondary()));

    let survivor = find_record(&records, "q1", Flags::FIRST_SEGMENT);
    assert!(!survivor.flags().is_segmented());
    assert!(!survivor.flags().is_properly_segmented());
    assert!(!survivor.flags().is_mate_reverse_complemented());

    let q2_r1 = find_record(&records, "q2", Flags::FIRST_SEGMENT);
    assert!(q2_r1.flags().is_segmented());
    assert_eq!(q2_r1.template_length(), 150);
}

#[test]
fn test_template_cigar_and_mate_score() {
    let dir = TempDir::new().unwrap();
    let records = fix(&dir, &inward_pair("q1"), &["-c", "-m"]);

    let left = find_record(&records, "q1", Flags::FIRST_SEGMENT);
    let ct = string_tag(left, *b"ct").expect("leftmost record carries ct");
    assert!(ct.starts_with("1F"));
    assert!(ct.contains("2R"));
    let right = find_record(&records, "q1", Flags::LAST_SEGMENT);
    assert_eq!(string_tag(right, *b"ct"), None);

    // 50 bases at quality 30 on each side
    assert_eq!(int_tag(left, *b"ms"), Some(1500));
    assert_eq!(int_tag(right, *b"ms"), Some(1500));
}

#[test]
fn test_overhanging_alignment_is_trimmed() {
    let dir = TempDir::new().unwrap();
    let input = vec![mapped_read("q1", Flags::empty(), 1, 481, &[(Kind::Match, 50)], 60)];
    let records = fix(&dir, &input, &[]);

    let expected = [Op::new(Kind::Match, 20), Op::new(Kind::SoftClip, 30)];
    assert_eq!(records[0].cigar().as_ref(), expected.as_slice());
    assert_eq!(records[0].alignment_start(), position(481));
}

#[test]
fn test_sanitize_off_leaves_overhang() {
    let dir = TempDir::new().unwrap();
    let input = vec![mapped_read("q1", Flags::empty(), 1, 481, &[(Kind::Match, 50)], 60)];
    let records = fix(&dir, &input, &["--sanitize", "off"]);

    assert_eq!(records[0].cigar().as_ref(), [Op::new(Kind::Match, 50)].as_slice());
}

#[test]
fn test_alignment_starting_past_reference_end_is_marked_unmapped() {
    let dir = TempDir::new().unwrap();
    let input = vec![mapped_read("q1", Flags::empty(), 1, 501, &[(Kind::Match, 50)], 60)];
    let records = fix(&dir, &input, &[]);

    let record = &records[0];
    assert!(record.flags().is_unmapped());
    assert_eq!(record.reference_sequence_id(), None);
    assert_eq!(record.alignment_start(), None);
    assert!(record.cigar().as_ref().is_empty());
    assert_eq!(record.mapping_quality().map(u8::from), Some(0));
}

#[rstest]
#[case::default(&[], true)]
#[case::suppressed(&["--no-pg"], false)]
fn test_program_record(#[case] args: &[&str], #[case] expected: bool) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.bam");
    let output = dir.path().join("output.bam");
    write_bam(&input, &test_header("queryname"), &inward_pair("q1"));

    let mut argv = vec!["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()];
    argv.extend_from_slice(args);
    assert_success(&run_fixmate(&argv));

    let (header, _) = read_bam(&output);
    assert_eq!(header.programs().as_ref().contains_key(b"matefix".as_slice()), expected);
}

#[test]
fn test_coordinate_sorted_input_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.bam");
    let output = dir.path().join("output.bam");
    write_bam(&input, &test_header("coordinate"), &inward_pair("q1"));

    let result = run_fixmate(&["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("coordinate"));
}

#[test]
fn test_unknown_sanitize_keyword_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.bam");
    write_bam(&input, &test_header("queryname"), &inward_pair("q1"));

    let result = run_fixmate(&["-i", input.to_str().unwrap(), "-o", "-", "-z", "pos,sparkle"]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("sparkle"));
}

#[test]
fn test_missing_input_is_rejected() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.bam");
    let output = dir.path().join("output.bam");

    let result = run_fixmate(&["-i", missing.to_str().unwrap(), "-o", output.to_str().unwrap()]);
    assert!(!result.status.success());
    assert!(!output.exists());
}

#[test]
fn test_stdin_to_stdout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.bam");
    write_bam(&input, &test_header("unsorted"), &inward_pair("q1"));
    let bytes = std::fs::read(&input).unwrap();

    let result = run_fixmate_with_stdin(&["-i", "-", "-o", "-", "-u"], &bytes);
    assert_success(&result);

    let (_, records) = read_bam_bytes(&result.stdout);
    assert_eq!(records.len(), 2);
    assert_eq!(find_record(&records, "q1", Flags::FIRST_SEGMENT).template_length(), 150);
}

#[rstest]
#[case::uncompressed(&["-u"])]
#[case::best(&["--compression-level", "9"])]
#[case::threaded(&["--threads", "3"])]
fn test_output_settings_do_not_change_records(#[case] args: &[&str]) {
    let mut input = inward_pair("q1");
    input.extend(inward_pair("q2"));

    let baseline_dir = TempDir::new().unwrap();
    let baseline = fix(&baseline_dir, &input, &[]);
    let dir = TempDir::new().unwrap();
    let records = fix(&dir, &input, args);

    assert_eq!(records, baseline);
}
