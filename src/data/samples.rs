//! Sample index types for the VCF column order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SnpBinsError};

/// Zero-cost newtype for sample indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SampleIdx(pub u32);

impl SampleIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for SampleIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

/// Ordered, unique sample names taken from the VCF header line
#[derive(Clone, Debug)]
pub struct Samples {
    /// Sample IDs in column order
    ids: Vec<Arc<str>>,
    /// Map from sample ID to index for fast lookup
    id_to_idx: HashMap<Arc<str>, SampleIdx>,
}

impl Samples {
    /// Create from sample IDs, rejecting duplicates
    pub fn from_ids(ids: Vec<String>) -> Result<Self> {
        let ids: Vec<Arc<str>> = ids.into_iter().map(|s| s.into()).collect();
        let mut id_to_idx = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if id_to_idx.insert(id.clone(), SampleIdx::new(i as u32)).is_some() {
                return Err(SnpBinsError::data(format!("duplicate sample name '{}'", id)));
            }
        }

        Ok(Self { ids, id_to_idx })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Get sample index by ID
    pub fn index_of(&self, id: &str) -> Option<SampleIdx> {
        self.id_to_idx.get(id).copied()
    }

    /// Get all sample IDs
    pub fn ids(&self) -> &[Arc<str>] {
        &self.ids
    }

    /// Owned copy of the names, for serialized metadata
    pub fn names(&self) -> Vec<String> {
        self.ids.iter().map(|s| s.to_string()).collect()
    }
}

impl std::ops::Index<SampleIdx> for Samples {
    type Output = str;

    fn index(&self, idx: SampleIdx) -> &Self::Output {
        &self.ids[idx.as_usize()]
    }
}
