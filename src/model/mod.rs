//! # Model Module
//!
//! The aggregation algorithm: streaming a chromosome's records into
//! fixed-width bins of pairwise genotype diff sums.

pub mod aggregator;

pub use aggregator::{AggregationConfig, BinAggregator};
