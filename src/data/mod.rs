//! # Data Module
//!
//! In-memory representations of aggregation results. This is the core "Model" layer.
//!
//! ## Design Philosophy: Data-Oriented Design
//! - **Flat triangular arrays:** a bin's pairwise matrix is one contiguous
//!   array addressed through [`TriangleIndex`], never a nested map.
//! - **Zero-cost newtypes:** `SampleIdx` and `ChromIdx` keep sample and
//!   chromosome ordinals apart at compile time.
//! - **Enum-based width selection:** [`Counters`] stores each frozen array in
//!   its chosen unsigned width as a single enum.

pub mod chromosome;
pub mod counters;
pub mod genome;
pub mod genotype;
pub mod samples;
pub mod triangle;

// Re-export commonly used types
pub use chromosome::{Bin, Chromosome, ChromosomeSummary};
pub use counters::{CounterWidth, Counters, WidthPolicy};
pub use genome::{GenomeManifest, GenomeTotals, FORMAT_VERSION};
pub use genotype::{parse_genotype, Genotype, GenotypeDiffTable};
pub use samples::{SampleIdx, Samples};
pub use triangle::{matrix_size, TriangleIndex};

/// Chromosome identifier (0-based index into the genome's chromosome order)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChromIdx(pub u32);

impl ChromIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for ChromIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<ChromIdx> for usize {
    fn from(idx: ChromIdx) -> usize {
        idx.0 as usize
    }
}
