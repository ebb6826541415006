//! Grouping a name-collated record stream into templates.
//!
//! [`TemplateGrouper`] pulls records from a [`RecordSource`], sanitizes each
//! one as soon as it is read, and hands out runs of records that share a
//! query name. The first record of the next template is read one call early
//! and parked in the batch buffer, so no record is ever dropped or copied.

use std::io::{self, Read};

use matefix_raw_bam::read_name;

use crate::errors::{MatefixError, Result};
use crate::header::ReferenceLengths;
use crate::raw_record::{RawBamReader, RawRecord};
use crate::sanitize::{SanitizeFlags, sanitize};

/// A stream of raw records.
pub trait RecordSource {
    /// Read the next record into `record`, returning `false` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream fails or ends mid-record.
    fn read_record(&mut self, record: &mut RawRecord) -> io::Result<bool>;
}

impl<R: Read> RecordSource for RawBamReader<R> {
    fn read_record(&mut self, record: &mut RawRecord) -> io::Result<bool> {
        RawBamReader::read_record(self, record)
    }
}

/// Records pulled from the source so far, with what sanitization did to them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadCounts {
    /// Records read from the source.
    pub records: u64,
    /// Records whose CIGAR was clipped at the reference end.
    pub trimmed: u64,
    /// Records that arrived mapped and were flagged unmapped.
    pub marked_unmapped: u64,
}

/// Batches consecutive records with the same query name.
///
/// The batch buffer grows to the largest template seen and its record
/// buffers are reused across calls.
pub struct TemplateGrouper<S> {
    source: S,
    references: ReferenceLengths,
    sanitize: SanitizeFlags,
    /// Backing storage; only the first `len` entries belong to the current template.
    records: Vec<RawRecord>,
    len: usize,
    /// Index in `records` of the already-read first record of the next template.
    lookahead: Option<usize>,
    eof: bool,
    counts: ReadCounts,
}

impl<S: RecordSource> TemplateGrouper<S> {
    /// Create a grouper that sanitizes every record with `sanitize`.
    pub fn new(source: S, references: ReferenceLengths, sanitize: SanitizeFlags) -> Self {
        Self {
            source,
            references,
            sanitize,
            records: Vec::new(),
            len: 0,
            lookahead: None,
            eof: false,
            counts: ReadCounts::default(),
        }
    }

    /// Return the next template, or `None` once the source is exhausted.
    ///
    /// The slice is only valid until the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or a record cannot be sanitized.
    pub fn next_template(&mut self) -> Result<Option<&mut [RawRecord]>> {
        if let Some(index) = self.lookahead.take() {
            // Swap keeps the old slot-0 allocation around for reuse
            self.records.swap(0, index);
            self.len = 1;
        } else if self.eof || !self.read_into(0)? {
            self.len = 0;
            return Ok(None);
        } else {
            self.len = 1;
        }

        while self.read_into(self.len)? {
            if read_name(&self.records[self.len]) != read_name(&self.records[0]) {
                self.lookahead = Some(self.len);
                break;
            }
            self.len += 1;
        }

        Ok(Some(&mut self.records[..self.len]))
    }

    /// Counts accumulated over every record read so far.
    #[must_use]
    pub fn counts(&self) -> ReadCounts {
        self.counts
    }

    /// Read and sanitize one record into slot `index`, growing the buffer by
    /// at most one slot. Returns `false` at end of stream.
    fn read_into(&mut self, index: usize) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if index == self.records.len() {
            self.records.try_reserve(1).map_err(|e| MatefixError::Io {
                action: "growing the template buffer",
                source: io::Error::new(io::ErrorKind::OutOfMemory, e),
            })?;
            self.records.push(RawRecord::new());
        }

        let record = &mut self.records[index];
        let found = self
            .source
            .read_record(record)
            .map_err(|source| MatefixError::Io { action: "reading records", source })?;
        if !found {
            self.eof = true;
            return Ok(false);
        }

        self.counts.records += 1;
        let report = sanitize(record.as_mut_vec(), &self.references, self.sanitize)?;
        self.counts.trimmed += u64::from(report.trimmed);
        self.counts.marked_unmapped += u64::from(report.marked_unmapped);
        Ok(true)
    }
}

/// In-memory source used by unit tests.
#[cfg(test)]
impl RecordSource for std::collections::VecDeque<Vec<u8>> {
    fn read_record(&mut self, record: &mut RawRecord) -> io::Result<bool> {
        match self.pop_front() {
            Some(bytes) => {
                *record = RawRecord::from(bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
