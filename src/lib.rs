//! # snpbins Library Root
//!
//! ## Role
//! Declares all public modules and re-exports common types, so the build can
//! be driven from the binary or embedded in other tools.
//!
//! ## Module Structure
//! ```text
//! snpbins
//! ├── data        # In-memory model (samples, triangle index, bins, counters)
//! ├── io          # BGZF locator, variant streams, registers, artifacts
//! ├── model       # Bin aggregation
//! ├── pipelines   # Genome build scheduler and verifier
//! └── utils       # Thread pool and telemetry
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

pub use config::BuildOptions;
pub use error::{Result, SnpBinsError};
pub use pipelines::{ChromosomeScheduler, GenomeBuild, Verifier, VerifyReport};
