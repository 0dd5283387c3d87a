//! Genome-level manifest and rollup accumulation.

use serde::{Deserialize, Serialize};

use crate::data::chromosome::ChromosomeSummary;

/// Version stamp written into every JSON artifact
pub const FORMAT_VERSION: u32 = 1;

/// Running genome totals, updated once per finished chromosome
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenomeTotals {
    pub bins: u64,
    pub snps: u64,
}

impl GenomeTotals {
    pub fn add(&mut self, summary: &ChromosomeSummary) {
        self.bins += summary.bin_count;
        self.snps += summary.chromosome_snps;
    }
}

/// Top-level description of a completed genome build
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeManifest {
    pub format_version: u32,
    /// File name of the source VCF
    pub input_name: String,
    pub bin_width: u64,
    pub sample_names: Vec<String>,
    /// Chromosome names in genome order
    pub chromosome_names: Vec<String>,
    pub chromosome_count: usize,
    pub genome_bins: u64,
    pub genome_snps: u64,
    /// Length of the genome rollup matrix
    pub matrix_size: usize,
}
