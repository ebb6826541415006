//! Fill in mate information for a name-grouped BAM.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use matefix_lib::bam_io::{create_raw_bam_reader, create_raw_bam_writer};
use matefix_lib::fixmate::{FixMateOptions, fix_mates};
use matefix_lib::header::{ReferenceLengths, add_pg_record, validate_sort_order};
use matefix_lib::logging::{OperationTimer, log_fixmate_summary};
use matefix_lib::mate::MateOptions;
use matefix_lib::progress::ProgressTracker;
use matefix_lib::sanitize::SanitizeFlags;

use crate::commands::command::Command;
use crate::commands::common::{BamIoOptions, CompressionOptions, ThreadingOptions};

/// Records between progress messages.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Fill in mate coordinates, template lengths and mate tags.
#[derive(Debug, Parser)]
#[command(
    name = "fixmate",
    about = "\x1b[38;5;72m[ALIGNMENT]\x1b[0m      \x1b[36mFill in mate coordinates, ISIZE and mate related flags\x1b[0m",
    long_about = r#"
Fill in mate coordinates, ISIZE and mate related flags from a name-grouped BAM.

Records must be grouped by query name (queryname sorted or straight from an
aligner). Coordinate-sorted input is rejected.

For every template, the first primary record is paired with the next primary
record and both get:

  - the paired flag, mate reference/position, mate strand and mate unmapped
  - an unmapped mate placed at its mapped partner's position
  - template length from the 5' ends when both are mapped to one reference
  - MQ (mate mapping quality) and MC (mate CIGAR) tags

A lone primary record is reset to unpaired. Secondary and supplementary
records are passed through untouched apart from sanitizing.

SANITIZE:

  Every record is checked as it is read. Keywords, comma separated:

  pos     records without a reference get position -1 (and are marked unmapped)
  mqual   unmapped records get mapping quality 0
  unmap   records without a usable position are marked unmapped
  cigar   alignments past the reference end are soft clipped; unmapped
          records lose their CIGAR
  aux     unmapped records lose NM, MD, CG and SM
  on      mqual,unmap,cigar,aux
  all     every rule (default)
  off     no rules

EXAMPLES:

  # Typical use after alignment, before coordinate sorting
  matefix fixmate -i aligned.namesorted.bam -o fixed.bam

  # Add mate score tags and drop unmapped and secondary records
  matefix fixmate -m -r -i in.bam -o out.bam

  # Streamed, uncompressed output for piping into a sorter
  matefix fixmate -u -i in.bam -o - | samtools sort -o out.bam -
"#
)]
pub struct FixMate {
    #[command(flatten)]
    pub io: BamIoOptions,

    /// Remove unmapped reads and secondary alignments
    #[arg(short = 'r', long = "remove-reads", default_value_t = false)]
    pub remove_reads: bool,

    /// Do not clear the proper-pair flag on pairs that are not inward facing (FR)
    #[arg(short = 'p', long = "no-proper-pair-check", default_value_t = false)]
    pub no_proper_pair_check: bool,

    /// Add the template CIGAR tag (ct) to the leftmost record of each pair
    #[arg(short = 'c', long = "template-cigar", default_value_t = false)]
    pub template_cigar: bool,

    /// Add the mate score tag (ms), the sum of the mate's base qualities >= 15
    #[arg(short = 'm', long = "mate-score", default_value_t = false)]
    pub mate_score: bool,

    /// Sanitize rules applied to each record (see above)
    #[arg(short = 'z', long = "sanitize", default_value = "all", value_name = "FLAG[,FLAG]")]
    pub sanitize: SanitizeFlags,

    /// Do not add a @PG line to the output header
    #[arg(long = "no-pg", alias = "no-PG", default_value_t = false)]
    pub no_pg: bool,

    #[command(flatten)]
    pub threading: ThreadingOptions,

    #[command(flatten)]
    pub compression: CompressionOptions,
}

impl FixMate {
    fn options(&self) -> FixMateOptions {
        FixMateOptions {
            remove_reads: self.remove_reads,
            mate: MateOptions {
                template_cigar: self.template_cigar,
                proper_pair_check: !self.no_proper_pair_check,
                mate_score: self.mate_score,
            },
            sanitize: self.sanitize,
        }
    }
}

impl Command for FixMate {
    fn execute(&self, command_line: &str) -> Result<()> {
        self.io.validate()?;
        self.threading.validate()?;
        self.compression.validate()?;
        let options = self.options();

        info!("FixMate");
        info!("  Input: {}", self.io.input.display());
        info!("  Output: {}", self.io.output.display());
        info!("  Remove reads: {}", options.remove_reads);
        info!("  Proper pair check: {}", options.mate.proper_pair_check);
        info!("  Template CIGAR: {}", options.mate.template_cigar);
        info!("  Mate score: {}", options.mate.mate_score);
        info!("  Sanitize: {}", options.sanitize);
        info!("  Compression level: {}", self.compression.effective_level());
        if let Some(threads) = self.threading.threads {
            info!("  BGZF threads: {threads}");
        }

        let timer = OperationTimer::new("Fixing mate information");

        let (reader, header) = create_raw_bam_reader(&self.io.input, self.threading.threads)?;
        validate_sort_order(&header)?;
        let references = ReferenceLengths::from_header(&header);

        let header = if self.no_pg {
            header
        } else {
            add_pg_record(header, crate::version::VERSION, command_line)?
        };

        let mut writer = create_raw_bam_writer(
            &self.io.output,
            &header,
            self.threading.threads,
            self.compression.effective_level(),
        )?;

        let mut progress =
            ProgressTracker::new("Processed records").with_interval(PROGRESS_INTERVAL);
        let metrics = fix_mates(reader, references, &mut writer, &options, &mut progress)
            .with_context(|| format!("Failed to fix mates in {}", self.io.input.display()))?;
        writer
            .finish()
            .with_context(|| format!("Failed to finish output: {}", self.io.output.display()))?;

        progress.log_final();
        log_fixmate_summary(&metrics);
        timer.log_completion(metrics.records_read);
        Ok(())
    }
}
