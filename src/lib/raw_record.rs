//! Owned raw BAM records and a reader for length-prefixed record streams.
//!
//! Records are kept as the undecoded bytes that follow each `block_size`
//! prefix, so field access and in-place edits go through
//! [`matefix_raw_bam`] and output is a straight copy.

use std::io::{self, Read};

use matefix_raw_bam::MIN_BAM_HEADER_LEN;

/// A raw BAM record stored as bytes (without the `block_size` prefix).
///
/// The buffer is reused between reads, so a record keeps its capacity for
/// the lifetime of the template batch that owns it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawRecord(Vec<u8>);

impl RawRecord {
    /// Creates a new empty raw record.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Mutable access to the backing buffer for edits that change its length.
    #[inline]
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.0
    }
}

impl AsRef<[u8]> for RawRecord {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for RawRecord {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for RawRecord {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for RawRecord {
    #[inline]
    fn from(buf: Vec<u8>) -> Self {
        Self(buf)
    }
}

/// Reads a single raw BAM record into `record`, reusing its allocation.
///
/// Returns `false` at a clean end of stream (no bytes before the next
/// `block_size`).
///
/// # Errors
///
/// Returns an error if the reader fails, the stream ends mid-record, or the
/// declared block is too small to hold the fixed fields.
pub fn read_raw_record<R>(reader: &mut R, record: &mut RawRecord) -> io::Result<bool>
where
    R: Read,
{
    let Some(block_size) = read_block_size(reader)? else {
        return Ok(false);
    };
    if block_size < MIN_BAM_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("BAM record block of {block_size} bytes is shorter than the fixed fields"),
        ));
    }

    record.0.resize(block_size, 0);
    reader.read_exact(&mut record.0)?;
    Ok(true)
}

/// Reads the 4-byte block size prefix, or `None` at end of stream.
fn read_block_size<R>(reader: &mut R) -> io::Result<Option<usize>>
where
    R: Read,
{
    let mut buf = [0u8; 4];

    // A clean EOF may only occur before the first byte of the prefix
    loop {
        match reader.read(&mut buf[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    reader.read_exact(&mut buf[1..])?;

    let n = u32::from_le_bytes(buf);
    usize::try_from(n).map(Some).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// A reader for raw BAM records positioned after the header.
pub struct RawBamReader<R> {
    inner: R,
}

impl<R: Read> RawBamReader<R> {
    /// Wraps a decompressed stream whose header has already been consumed.
    #[inline]
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next record. Returns `false` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or if EOF is encountered mid-record.
    #[inline]
    pub fn read_record(&mut self, record: &mut RawRecord) -> io::Result<bool> {
        read_raw_record(&mut self.inner, record)
    }
}
