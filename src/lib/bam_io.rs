//! BAM file I/O utilities.
//!
//! Opens the input as a header plus a stream of raw record bytes, and writes
//! raw records back out behind a freshly serialized header. Both ends accept
//! `-` for the standard streams.
//!
//! # Threading Model
//!
//! BGZF (de)compression is the only parallel work:
//!
//! - **Single-threaded**: `threads` of `None` or 1
//! - **Multi-threaded**: `threads > 1`, handled inside `noodles::bgzf`
//!
//! Record processing itself always runs on the calling thread.

use anyhow::{Context, Result, bail};
use noodles::bgzf::io::writer::CompressionLevel;
use noodles::bgzf::io::{
    MultithreadedReader, MultithreadedWriter, Reader as BgzfReader, Writer as BgzfWriter,
    multithreaded_writer, writer,
};
use noodles::sam::Header;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Read, Write};
use std::num::NonZero;
use std::path::Path;

use crate::raw_record::RawBamReader;

type BoxedRead = Box<dyn Read + Send>;
type BoxedWrite = Box<dyn Write + Send>;

/// Enum wrapping single-threaded and multi-threaded BGZF readers.
pub enum BgzfReaderEnum {
    /// Single-threaded BGZF reader (lower overhead for small files)
    SingleThreaded(BgzfReader<BoxedRead>),
    /// Multi-threaded BGZF reader (noodles built-in threading)
    MultiThreaded(MultithreadedReader<BoxedRead>),
}

impl Read for BgzfReaderEnum {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.read(buf),
            BgzfReaderEnum::MultiThreaded(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfReaderEnum {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.fill_buf(),
            BgzfReaderEnum::MultiThreaded(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.consume(amt),
            BgzfReaderEnum::MultiThreaded(r) => r.consume(amt),
        }
    }
}

/// Enum wrapping single-threaded and multi-threaded BGZF writers
pub enum BgzfWriterEnum {
    /// Single-threaded BGZF writer
    SingleThreaded(BgzfWriter<BoxedWrite>),
    /// Multi-threaded BGZF writer
    MultiThreaded(MultithreadedWriter<BoxedWrite>),
}

impl Write for BgzfWriterEnum {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.write(buf),
            BgzfWriterEnum::MultiThreaded(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.flush(),
            BgzfWriterEnum::MultiThreaded(w) => w.flush(),
        }
    }
}

impl BgzfWriterEnum {
    /// Flush remaining blocks, write the BGZF EOF marker and flush the sink.
    ///
    /// # Errors
    /// Returns an error if flushing or finalizing the writer fails.
    pub fn finish(self) -> io::Result<()> {
        let mut inner = match self {
            BgzfWriterEnum::SingleThreaded(w) => w.finish()?,
            BgzfWriterEnum::MultiThreaded(mut w) => w.finish()?,
        };
        inner.flush()
    }
}

/// Raw BAM reader over either BGZF reader flavour.
pub type RawBamReaderAuto = RawBamReader<BgzfReaderEnum>;

/// Raw BAM writer for writing raw record bytes directly.
///
/// Writes records as a 4-byte little-endian `block_size` followed by the
/// record bytes, bypassing noodles record encoding.
pub struct RawBamWriter {
    inner: BgzfWriterEnum,
}

impl RawBamWriter {
    /// Create a new raw BAM writer from a BGZF writer.
    #[must_use]
    pub fn new(inner: BgzfWriterEnum) -> Self {
        Self { inner }
    }

    /// Write the BAM magic, header text and reference dictionary.
    ///
    /// # Errors
    /// Returns an error if writing fails or a length does not fit the BAM field.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        self.inner.write_all(b"BAM\x01")?;

        let mut sam_writer = noodles::sam::io::Writer::new(Vec::new());
        sam_writer.write_header(header)?;
        let text = sam_writer.into_inner();
        self.inner.write_all(&to_i32(text.len(), "header text length")?.to_le_bytes())?;
        self.inner.write_all(&text)?;

        let references = header.reference_sequences();
        self.inner.write_all(&to_i32(references.len(), "reference count")?.to_le_bytes())?;
        for (name, map) in references {
            self.inner.write_all(&to_i32(name.len() + 1, "reference name length")?.to_le_bytes())?;
            self.inner.write_all(name)?;
            self.inner.write_all(&[0u8])?;
            self.inner.write_all(&to_i32(map.length().get(), "reference length")?.to_le_bytes())?;
        }
        Ok(())
    }

    /// Write one raw record (bytes without the `block_size` prefix).
    ///
    /// # Errors
    /// Returns an error if writing to the underlying writer fails.
    #[inline]
    pub fn write_raw_record(&mut self, record_bytes: &[u8]) -> io::Result<()> {
        let block_size = u32::try_from(record_bytes.len())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.inner.write_all(&block_size.to_le_bytes())?;
        self.inner.write_all(record_bytes)
    }

    /// Finish writing and close the writer.
    ///
    /// # Errors
    /// Returns an error if finalizing the writer fails.
    pub fn finish(self) -> io::Result<()> {
        self.inner.finish()
    }
}

fn to_i32(n: usize, what: &str) -> io::Result<i32> {
    i32::try_from(n).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{what} {n} exceeds BAM limits"))
    })
}

/// Check if a path refers to stdin ("-" or "/dev/stdin").
///
/// # Example
/// ```
/// use matefix_lib::bam_io::is_stdin_path;
///
/// assert!(is_stdin_path("-"));
/// assert!(!is_stdin_path("input.bam"));
/// ```
pub fn is_stdin_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdin"
}

/// Check if a path refers to stdout ("-" or "/dev/stdout").
pub fn is_stdout_path<P: AsRef<Path>>(path: P) -> bool {
    let path_str = path.as_ref().to_string_lossy();
    path_str == "-" || path_str == "/dev/stdout"
}

fn worker_count(threads: Option<usize>) -> Option<NonZero<usize>> {
    threads.filter(|&t| t > 1).and_then(NonZero::new)
}

/// Open a BAM for raw record reading, returning the reader and parsed header.
///
/// # Errors
/// Returns an error if the input cannot be opened or the header cannot be read.
pub fn create_raw_bam_reader<P: AsRef<Path>>(
    path: P,
    threads: Option<usize>,
) -> Result<(RawBamReaderAuto, Header)> {
    let path_ref = path.as_ref();
    let source: BoxedRead = if is_stdin_path(path_ref) {
        Box::new(io::stdin())
    } else {
        let file = File::open(path_ref)
            .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;
        Box::new(file)
    };

    let bgzf_reader = match worker_count(threads) {
        Some(workers) => {
            BgzfReaderEnum::MultiThreaded(MultithreadedReader::with_worker_count(workers, source))
        }
        None => BgzfReaderEnum::SingleThreaded(BgzfReader::new(source)),
    };

    // Use noodles to read the header, then take the BGZF stream back for raw records
    let mut noodles_reader = noodles::bam::io::Reader::from(bgzf_reader);
    let header = noodles_reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;

    Ok((RawBamReader::new(noodles_reader.into_inner()), header))
}

/// Create a raw BAM writer and write `header`.
///
/// `compression_level` 0 produces uncompressed BGZF blocks.
///
/// # Errors
/// Returns an error if the output cannot be created, the level is invalid,
/// or the header cannot be written.
pub fn create_raw_bam_writer<P: AsRef<Path>>(
    path: P,
    header: &Header,
    threads: Option<usize>,
    compression_level: u32,
) -> Result<RawBamWriter> {
    let path_ref = path.as_ref();
    let Some(level) = u8::try_from(compression_level).ok().and_then(CompressionLevel::new) else {
        bail!("Invalid BGZF compression level: {compression_level}");
    };

    let sink: BoxedWrite = if is_stdout_path(path_ref) {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(path_ref)
            .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;
        Box::new(file)
    };

    let bgzf_writer = match worker_count(threads) {
        Some(workers) => BgzfWriterEnum::MultiThreaded(
            multithreaded_writer::Builder::default()
                .set_worker_count(workers)
                .set_compression_level(level)
                .build_from_writer(sink),
        ),
        None => BgzfWriterEnum::SingleThreaded(
            writer::Builder::default().set_compression_level(level).build_from_writer(sink),
        ),
    };

    let mut writer = RawBamWriter::new(bgzf_writer);
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;
    Ok(writer)
}
