//! # Bins and Chromosomes
//!
//! ## Role
//! In-memory form of the aggregation result. A [`Bin`] holds the frozen
//! pairwise matrix and per-sample totals for every variant whose position falls
//! in `[bin_number * bin_width, (bin_number + 1) * bin_width)`. A
//! [`Chromosome`] owns its bins in strictly increasing `bin_number` order.

use crate::data::counters::Counters;
use crate::data::triangle::TriangleIndex;

/// Aggregated state for one fixed-width genomic window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bin {
    pub bin_number: u64,
    /// Supported records aggregated into this bin
    pub snp_count: u64,
    pub first_position: u64,
    pub last_position: u64,
    /// Strict upper triangle of pairwise diff sums
    pub matrix: Counters,
    /// Per-sample sum of that sample's pair values
    pub totals: Counters,
    /// Positions of aggregated records, zero padded to the chromosome's
    /// widest bin; present only when position tracking is on
    pub positions: Option<Vec<u64>>,
}

impl Bin {
    /// Value of the pair `(i, j)` in either order; 0 on the diagonal
    pub fn pair_value(&self, tri: &TriangleIndex, i: usize, j: usize) -> u64 {
        tri.index_unordered(i, j)
            .map(|k| self.matrix.get(k))
            .unwrap_or(0)
    }

    /// Full row of sample `i` against every sample, diagonal as 0
    pub fn sample_row(&self, tri: &TriangleIndex, i: usize) -> Vec<u64> {
        (0..tri.n()).map(|j| self.pair_value(tri, i, j)).collect()
    }

    /// Non-padding positions
    pub fn recorded_positions(&self) -> Option<&[u64]> {
        self.positions
            .as_ref()
            .map(|p| &p[..(self.snp_count as usize).min(p.len())])
    }
}

/// Lightweight record of a finished chromosome, used for genome rollups
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChromosomeSummary {
    pub order: usize,
    pub name: String,
    pub bin_count: u64,
    pub chromosome_snps: u64,
}

/// All bins of one chromosome plus chromosome-level aggregates
#[derive(Clone, Debug)]
pub struct Chromosome {
    /// Zero-based position in the genome's chromosome order
    pub order: usize,
    pub name: String,
    pub bin_width: u64,
    pub sample_count: usize,
    pub bins: Vec<Bin>,
    pub chromosome_snps: u64,
    /// Position of the first aggregated record, 0 when none
    pub first_position: u64,
    /// Position of the last aggregated record, 0 when none
    pub last_position: u64,
    /// Records excluded because they are not biallelic single-base variants
    pub skipped_records: u64,
}

impl Chromosome {
    pub fn triangle(&self) -> TriangleIndex {
        TriangleIndex::new(self.sample_count)
    }

    pub fn matrix_size(&self) -> usize {
        self.triangle().size()
    }

    pub fn bin_count(&self) -> u64 {
        self.bins.len() as u64
    }

    pub fn bin_min(&self) -> Option<u64> {
        self.bins.first().map(|b| b.bin_number)
    }

    pub fn bin_max(&self) -> Option<u64> {
        self.bins.last().map(|b| b.bin_number)
    }

    pub fn bin_snps_min(&self) -> u64 {
        self.bins.iter().map(|b| b.snp_count).min().unwrap_or(0)
    }

    pub fn bin_snps_max(&self) -> u64 {
        self.bins.iter().map(|b| b.snp_count).max().unwrap_or(0)
    }

    pub fn has_positions(&self) -> bool {
        self.bins.iter().any(|b| b.positions.is_some())
    }

    /// Element-wise sum of every bin's matrix
    pub fn rollup_matrix(&self) -> Vec<u64> {
        let mut out = vec![0u64; self.matrix_size()];
        for bin in &self.bins {
            for (acc, v) in out.iter_mut().zip(bin.matrix.iter()) {
                *acc += v;
            }
        }
        out
    }

    /// Element-wise sum of every bin's totals
    pub fn rollup_totals(&self) -> Vec<u64> {
        let mut out = vec![0u64; self.sample_count];
        for bin in &self.bins {
            for (acc, v) in out.iter_mut().zip(bin.totals.iter()) {
                *acc += v;
            }
        }
        out
    }

    pub fn summary(&self) -> ChromosomeSummary {
        ChromosomeSummary {
            order: self.order,
            name: self.name.clone(),
            bin_count: self.bin_count(),
            chromosome_snps: self.chromosome_snps,
        }
    }
}
