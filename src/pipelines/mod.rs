//! # Pipeline Module
//!
//! High-level orchestration of a genome build and its consistency audit.

pub mod build;
pub mod verify;

pub use build::{ChromosomeScheduler, GenomeBuild};
pub use verify::{subtract_until_zero, Verifier, VerifyReport};
