//! Builders for small test BAMs and a runner for the matefix binary.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use bstr::BString;
use noodles::bam;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::MappingQuality;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, RecordBuf, Sequence};

/// Length of `chr1` in [`test_header`].
pub const CHR1_LEN: usize = 1000;

/// Length of `chr2` in [`test_header`].
pub const CHR2_LEN: usize = 500;

/// Builds a two-reference header with the given `@HD SO` value.
///
/// # Panics
///
/// Panics if the header text does not parse.
#[must_use]
pub fn test_header(sort_order: &str) -> Header {
    let text = format!(
        "@HD\tVN:1.6\tSO:{sort_order}\n@SQ\tSN:chr1\tLN:{CHR1_LEN}\n@SQ\tSN:chr2\tLN:{CHR2_LEN}\n"
    );
    text.parse().expect("valid header text")
}

/// A read placed at `start` (1-based) on reference `ref_id` with the given CIGAR.
///
/// The sequence length follows the query-consuming CIGAR operations and every
/// base gets quality 30.
///
/// # Panics
///
/// Panics if `start` is zero.
#[must_use]
pub fn mapped_read(
    name: &str,
    flags: Flags,
    ref_id: usize,
    start: usize,
    cigar: &[(Kind, usize)],
    mapq: u8,
) -> RecordBuf {
    let ops: Vec<Op> = cigar.iter().map(|&(kind, len)| Op::new(kind, len)).collect();
    let read_len: usize = cigar
        .iter()
        .filter(|(kind, _)| {
            matches!(
                kind,
                Kind::Match
                    | Kind::Insertion
                    | Kind::SoftClip
                    | Kind::SequenceMatch
                    | Kind::SequenceMismatch
            )
        })
        .map(|&(_, len)| len)
        .sum();

    RecordBuf::builder()
        .set_name(BString::from(name))
        .set_flags(flags)
        .set_reference_sequence_id(ref_id)
        .set_alignment_start(Position::try_from(start).expect("1-based start"))
        .set_mapping_quality(MappingQuality::new(mapq).expect("mapq below 255"))
        .set_cigar(Cigar::from(ops))
        .set_sequence(Sequence::from(vec![b'A'; read_len]))
        .set_quality_scores(QualityScores::from(vec![30; read_len]))
        .build()
}

/// An unplaced read with no reference, position or CIGAR.
#[must_use]
pub fn unplaced_read(name: &str, flags: Flags, read_len: usize) -> RecordBuf {
    RecordBuf::builder()
        .set_name(BString::from(name))
        .set_flags(flags | Flags::UNMAPPED)
        .set_sequence(Sequence::from(vec![b'C'; read_len]))
        .set_quality_scores(QualityScores::from(vec![30; read_len]))
        .build()
}

/// Writes `records` to a BAM at `path`.
///
/// # Panics
///
/// Panics on any I/O failure.
pub fn write_bam(path: &Path, header: &Header, records: &[RecordBuf]) {
    let mut writer = bam::io::Writer::new(File::create(path).expect("create test BAM"));
    writer.write_header(header).expect("write header");
    for record in records {
        writer.write_alignment_record(header, record).expect("write record");
    }
    writer.finish(header).expect("finish test BAM");
}

/// Reads every record of the BAM at `path`.
///
/// # Panics
///
/// Panics on any I/O or decode failure.
#[must_use]
pub fn read_bam(path: &Path) -> (Header, Vec<RecordBuf>) {
    let mut reader = bam::io::reader::Builder.build_from_path(path).expect("open output BAM");
    let header = reader.read_header().expect("read header");
    let records = reader
        .record_bufs(&header)
        .collect::<std::io::Result<Vec<_>>>()
        .expect("decode records");
    (header, records)
}

/// Decodes a BAM held in memory, e.g. captured stdout.
///
/// # Panics
///
/// Panics on any decode failure.
#[must_use]
pub fn read_bam_bytes(bytes: &[u8]) -> (Header, Vec<RecordBuf>) {
    let mut reader = bam::io::Reader::new(bytes);
    let header = reader.read_header().expect("read header");
    let records = reader
        .record_bufs(&header)
        .collect::<std::io::Result<Vec<_>>>()
        .expect("decode records");
    (header, records)
}

/// Runs `matefix fixmate` with the given arguments.
///
/// # Panics
///
/// Panics if the binary cannot be started.
#[must_use]
pub fn run_fixmate(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_matefix"))
        .arg("fixmate")
        .args(args)
        .output()
        .expect("run matefix")
}

/// Runs `matefix fixmate` with `stdin_bytes` piped to its standard input.
///
/// # Panics
///
/// Panics if the binary cannot be started or stdin cannot be written.
#[must_use]
pub fn run_fixmate_with_stdin(args: &[&str], stdin_bytes: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_matefix"))
        .arg("fixmate")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn matefix");
    {
        let mut stdin = child.stdin.take().expect("child stdin");
        stdin.write_all(stdin_bytes).expect("write stdin");
    }
    child.wait_with_output().expect("wait for matefix")
}

/// Asserts the command succeeded, showing its stderr otherwise.
///
/// # Panics
///
/// Panics if the process exited with a failure status.
pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "matefix failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Finds the record with the given name and flag bits.
///
/// # Panics
///
/// Panics if no such record exists.
#[must_use]
pub fn find_record<'a>(records: &'a [RecordBuf], name: &str, flags: Flags) -> &'a RecordBuf {
    records
        .iter()
        .find(|r| {
            r.name().map(std::convert::AsRef::as_ref) == Some(name.as_bytes())
                && r.flags().contains(flags)
        })
        .unwrap_or_else(|| panic!("no record {name} with flags {flags:?}"))
}

/// Returns the string value of a two-letter tag.
#[must_use]
pub fn string_tag(record: &RecordBuf, tag: [u8; 2]) -> Option<String> {
    match record.data().get(&Tag::from(tag)) {
        Some(Value::String(s)) => Some(s.to_string()),
        _ => None,
    }
}

/// Returns the integer value of a two-letter tag, whatever its width.
#[must_use]
pub fn int_tag(record: &RecordBuf, tag: [u8; 2]) -> Option<i64> {
    match record.data().get(&Tag::from(tag)) {
        Some(Value::Int8(v)) => Some(i64::from(*v)),
        Some(Value::UInt8(v)) => Some(i64::from(*v)),
        Some(Value::Int16(v)) => Some(i64::from(*v)),
        Some(Value::UInt16(v)) => Some(i64::from(*v)),
        Some(Value::Int32(v)) => Some(i64::from(*v)),
        Some(Value::UInt32(v)) => Some(i64::from(*v)),
        _ => None,
    }
}
