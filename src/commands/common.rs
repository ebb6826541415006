//! Common CLI options shared across commands.
//!
//! Argument structures composed into command structs with `#[command(flatten)]`.

use std::path::PathBuf;

use clap::Args;

use matefix_lib::validation::{
    validate_compression_level, validate_input_exists, validate_positive,
};

/// Input/output options for commands that read a BAM and write a BAM.
#[derive(Debug, Clone, Args)]
pub struct BamIoOptions {
    /// Input BAM file, grouped or sorted by query name (`-` for stdin)
    #[arg(short = 'i', long = "input", default_value = "-")]
    pub input: PathBuf,

    /// Output BAM file (`-` for stdout)
    #[arg(short = 'o', long = "output", default_value = "-")]
    pub output: PathBuf,
}

impl BamIoOptions {
    /// Validates that the input file exists (skipped for stdin paths).
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_input_exists(&self.input, "input")?;
        Ok(())
    }
}

/// Options for BGZF worker threads.
#[derive(Debug, Clone, Default, Args)]
pub struct ThreadingOptions {
    /// Number of BGZF compression/decompression threads.
    ///
    /// If not specified (or 1), BGZF blocks are handled on the main thread.
    /// Record processing is always single-threaded.
    #[arg(long = "threads")]
    pub threads: Option<usize>,
}

impl ThreadingOptions {
    /// Validates that a requested thread count is positive.
    ///
    /// # Errors
    ///
    /// Returns an error if `--threads 0` was given.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(threads) = self.threads {
            validate_positive(threads, "threads")?;
        }
        Ok(())
    }
}

/// Options for output compression.
#[derive(Debug, Clone, Default, Args)]
pub struct CompressionOptions {
    /// Compression level for output BAM (0-9).
    ///
    /// Level 0 writes uncompressed BGZF blocks. Level 1 is fastest with
    /// larger files; level 9 produces the smallest files but is slowest.
    #[arg(long, default_value_t = 1)]
    pub compression_level: u32,

    /// Write uncompressed BGZF blocks (same as --compression-level 0)
    #[arg(short = 'u', long = "uncompressed", default_value_t = false)]
    pub uncompressed: bool,
}

impl CompressionOptions {
    /// The level to hand to the BGZF writer.
    #[must_use]
    pub fn effective_level(&self) -> u32 {
        if self.uncompressed { 0 } else { self.compression_level }
    }

    /// Validates the compression level.
    ///
    /// # Errors
    ///
    /// Returns an error if the level is out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_compression_level(self.compression_level)?;
        Ok(())
    }
}
