//! # Configuration Logic
//!
//! ## Role
//! CLI argument parsing and validation, plus the library-side `BuildOptions`
//! that carry every tunable into a build explicitly.
//!
//! ## Validation
//! - `bin_width > 0`
//! - `threads >= 1`
//! - `alphabet` in `2..=16`
//! - input file exists
//!
//! ## Example CLI
//! ```bash
//! snpbins build --vcf cohort.vcf.gz --bin-width 250000 --threads 8
//! snpbins verify --vcf cohort.vcf.gz --bin-width 250000
//! snpbins index --vcf cohort.vcf.gz
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::data::counters::WidthPolicy;
use crate::error::{Result, SnpBinsError};
use crate::io::artifact::{ArtifactWidths, GenomeLayout};
use crate::model::aggregator::AggregationConfig;
use crate::utils::threading::default_threads;

pub const DEFAULT_BIN_WIDTH: u64 = 250_000;
pub const DEFAULT_ALPHABET: usize = 4;
pub const DEFAULT_POLL_MS: u64 = 1_000;

/// Binned pairwise genotype-difference matrices over a BGZF VCF
#[derive(Parser, Debug, Clone)]
#[command(name = "snpbins", version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Log span timings when spans close
    #[arg(long, global = true)]
    pub profile: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate every chromosome and publish the genome manifest
    Build(BuildArgs),
    /// Re-derive every stored aggregate of a finished build
    Verify(VerifyArgs),
    /// Rebuild the chromosome locator cache
    Index(IndexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Block-compressed VCF with a companion .gzi table
    #[arg(long)]
    pub vcf: PathBuf,

    /// Bin width in base pairs
    #[arg(long, default_value_t = DEFAULT_BIN_WIDTH)]
    pub bin_width: u64,

    /// Chromosome workers (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Store per-bin variant positions
    #[arg(long)]
    pub positions: bool,

    /// Counter width for the pairwise matrix (auto, 16, 32, 64)
    #[arg(long, default_value = "auto")]
    pub matrix_width: WidthPolicy,

    /// Counter width for per-sample totals
    #[arg(long, default_value = "auto")]
    pub totals_width: WidthPolicy,

    /// Counter width for positions
    #[arg(long, default_value = "auto")]
    pub positions_width: WidthPolicy,

    /// Allele alphabet size of the diff table
    #[arg(long, default_value_t = DEFAULT_ALPHABET)]
    pub alphabet: usize,

    /// Scheduler poll interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_MS)]
    pub poll_ms: u64,

    /// Output root (default: <vcf>_ib)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[arg(long)]
    pub vcf: PathBuf,

    #[arg(long, default_value_t = DEFAULT_BIN_WIDTH)]
    pub bin_width: u64,

    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long)]
    pub vcf: PathBuf,
}

impl Config {
    /// Parse process arguments and validate them
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Build(args) => args.to_options().validate(),
            Command::Verify(args) => {
                check_input(&args.vcf)?;
                check_bin_width(args.bin_width)
            }
            Command::Index(args) => check_input(&args.vcf),
        }
    }
}

impl BuildArgs {
    pub fn to_options(&self) -> BuildOptions {
        BuildOptions {
            input: self.vcf.clone(),
            bin_width: self.bin_width,
            threads: self.threads.unwrap_or_else(default_threads),
            matrix_width: self.matrix_width,
            totals_width: self.totals_width,
            positions_width: self.positions_width,
            track_positions: self.positions,
            alphabet: self.alphabet,
            poll_interval: Duration::from_millis(self.poll_ms),
            out_dir: self.out_dir.clone(),
        }
    }
}

impl VerifyArgs {
    pub fn layout(&self) -> GenomeLayout {
        GenomeLayout::new(&self.vcf, self.bin_width, self.out_dir.as_deref())
    }
}

/// Everything one genome build needs, passed in explicitly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub input: PathBuf,
    pub bin_width: u64,
    pub threads: usize,
    pub matrix_width: WidthPolicy,
    pub totals_width: WidthPolicy,
    pub positions_width: WidthPolicy,
    pub track_positions: bool,
    pub alphabet: usize,
    pub poll_interval: Duration,
    pub out_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            bin_width: DEFAULT_BIN_WIDTH,
            threads: default_threads(),
            matrix_width: WidthPolicy::Auto,
            totals_width: WidthPolicy::Auto,
            positions_width: WidthPolicy::Auto,
            track_positions: false,
            alphabet: DEFAULT_ALPHABET,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            out_dir: None,
        }
    }
}

impl BuildOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_bin_width(self.bin_width)?;
        if self.threads == 0 {
            return Err(SnpBinsError::config("threads must be at least 1"));
        }
        if !(2..=16).contains(&self.alphabet) {
            return Err(SnpBinsError::config(format!(
                "alphabet must be between 2 and 16, got {}",
                self.alphabet
            )));
        }
        check_input(&self.input)
    }

    pub fn aggregation(&self) -> AggregationConfig {
        AggregationConfig {
            bin_width: self.bin_width,
            matrix_width: self.matrix_width,
            totals_width: self.totals_width,
            track_positions: self.track_positions,
        }
    }

    pub fn widths(&self) -> ArtifactWidths {
        ArtifactWidths {
            matrix: self.matrix_width,
            totals: self.totals_width,
            positions: self.positions_width,
        }
    }

    pub fn layout(&self) -> GenomeLayout {
        GenomeLayout::new(&self.input, self.bin_width, self.out_dir.as_deref())
    }
}

fn check_bin_width(bin_width: u64) -> Result<()> {
    if bin_width == 0 {
        return Err(SnpBinsError::config("bin width must be positive"));
    }
    Ok(())
}

fn check_input(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(SnpBinsError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
