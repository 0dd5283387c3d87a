//! # I/O Module
//!
//! File reading/writing boundaries. Converts between disk formats (BGZF VCF,
//! block-offset tables, registers, JSON metadata) and the in-memory model.

pub mod artifact;
pub mod block_index;
pub mod register;
pub mod variant_stream;
pub mod vcf;

pub use artifact::{ArtifactPaths, ArtifactWidths, ChromosomeMeta, GenomeLayout};
pub use block_index::{BlockIndex, ChromosomeLocation};
pub use register::{RegisterReader, RegisterWriter};
pub use variant_stream::VariantStream;
