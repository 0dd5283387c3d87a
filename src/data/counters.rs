//! # Width-Typed Counter Arrays
//!
//! ## Role
//! Accumulation always happens in `u64`. When a bin is finalized its arrays are
//! frozen into the narrowest unsigned width allowed by the family's
//! [`WidthPolicy`]; a pinned width that cannot hold the largest value is an
//! overflow error rather than a silent truncation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnpBinsError};

/// Stored integer width of a counter array
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CounterWidth {
    U16,
    U32,
    U64,
}

impl CounterWidth {
    pub fn bits(self) -> u8 {
        match self {
            CounterWidth::U16 => 16,
            CounterWidth::U32 => 32,
            CounterWidth::U64 => 64,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Largest representable value
    pub fn max(self) -> u64 {
        match self {
            CounterWidth::U16 => u16::MAX as u64,
            CounterWidth::U32 => u32::MAX as u64,
            CounterWidth::U64 => u64::MAX,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            16 => Some(CounterWidth::U16),
            32 => Some(CounterWidth::U32),
            64 => Some(CounterWidth::U64),
            _ => None,
        }
    }

    /// Narrowest width that holds `max_value`
    pub fn smallest_for(max_value: u64) -> Self {
        if max_value <= CounterWidth::U16.max() {
            CounterWidth::U16
        } else if max_value <= CounterWidth::U32.max() {
            CounterWidth::U32
        } else {
            CounterWidth::U64
        }
    }
}

impl fmt::Display for CounterWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.bits())
    }
}

/// Width selection for one counter family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WidthPolicy {
    /// Narrowest width that fits the observed maximum
    #[default]
    Auto,
    /// Fixed width; exceeding it is an overflow error
    Fixed(CounterWidth),
}

impl WidthPolicy {
    /// Resolve the width for an array whose largest value is `max_value`
    pub fn resolve(self, family: &str, max_value: u64) -> Result<CounterWidth> {
        match self {
            WidthPolicy::Auto => Ok(CounterWidth::smallest_for(max_value)),
            WidthPolicy::Fixed(width) => {
                if max_value > width.max() {
                    Err(SnpBinsError::overflow(family, max_value, width.max(), width.bits()))
                } else {
                    Ok(width)
                }
            }
        }
    }
}

impl FromStr for WidthPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(WidthPolicy::Auto),
            "16" | "u16" => Ok(WidthPolicy::Fixed(CounterWidth::U16)),
            "32" | "u32" => Ok(WidthPolicy::Fixed(CounterWidth::U32)),
            "64" | "u64" => Ok(WidthPolicy::Fixed(CounterWidth::U64)),
            other => Err(format!("invalid width '{}': expected auto, 16, 32 or 64", other)),
        }
    }
}

impl fmt::Display for WidthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidthPolicy::Auto => write!(f, "auto"),
            WidthPolicy::Fixed(w) => write!(f, "{}", w.bits()),
        }
    }
}

/// A frozen counter array in its stored width
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Counters {
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl Counters {
    /// Freeze `u64` accumulators under `policy`
    pub fn freeze(family: &str, values: &[u64], policy: WidthPolicy) -> Result<Self> {
        let max_value = values.iter().copied().max().unwrap_or(0);
        let width = policy.resolve(family, max_value)?;
        Self::with_width(family, values, width)
    }

    /// Store `values` at exactly `width`
    pub fn with_width(family: &str, values: &[u64], width: CounterWidth) -> Result<Self> {
        if let Some(&v) = values.iter().find(|&&v| v > width.max()) {
            return Err(SnpBinsError::overflow(family, v, width.max(), width.bits()));
        }
        Ok(match width {
            CounterWidth::U16 => Counters::U16(values.iter().map(|&v| v as u16).collect()),
            CounterWidth::U32 => Counters::U32(values.iter().map(|&v| v as u32).collect()),
            CounterWidth::U64 => Counters::U64(values.to_vec()),
        })
    }

    pub fn width(&self) -> CounterWidth {
        match self {
            Counters::U16(_) => CounterWidth::U16,
            Counters::U32(_) => CounterWidth::U32,
            Counters::U64(_) => CounterWidth::U64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Counters::U16(v) => v.len(),
            Counters::U32(v) => v.len(),
            Counters::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        match self {
            Counters::U16(v) => v[i] as u64,
            Counters::U32(v) => v[i] as u64,
            Counters::U64(v) => v[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn to_u64_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }

    pub fn max_value(&self) -> u64 {
        self.iter().max().unwrap_or(0)
    }

    /// Wrapping sum, the same quantity a register header stores as its checksum
    pub fn checksum(&self) -> u64 {
        self.iter().fold(0u64, |acc, v| acc.wrapping_add(v))
    }
}
