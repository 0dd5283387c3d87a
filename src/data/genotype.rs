//! # Genotype Calls and Pairwise Diff Table
//!
//! ## Role
//! Parses the GT subfield of a VCF sample column into a diploid call and
//! scores pairs of calls through a precomputed lookup table.
//!
//! ## Scoring
//! For calls `(a1, a2)` and `(b1, b2)` the table value is the number of allele
//! matches among the four cross comparisons `a1=b1, a1=b2, a2=b1, a2=b2`, so
//! every value lies in `0..=4`. Identical homozygous calls score 4, hom-ref
//! against het scores 2 and opposite homozygotes score 0.

use crate::error::{Result, SnpBinsError};

/// Largest value any table entry can take
pub const MAX_DIFF_VALUE: u64 = 4;

/// A parsed GT value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Genotype {
    /// `./.`, `.|.`, a partially missing call, or any unparseable GT
    #[default]
    Missing,
    /// Two allele indices, phase ignored
    Diploid(u8, u8),
}

impl Genotype {
    pub fn is_missing(self) -> bool {
        matches!(self, Genotype::Missing)
    }
}

/// Parse one sample column (`GT[:FIELD...]`) into a genotype.
///
/// Only the first `:`-delimited subfield is consulted. Haploid calls and
/// anything that is not `<allele><sep><allele>` with `sep` in `/|` count as
/// missing, as does an allele index that does not fit a `u8`.
#[inline]
pub fn parse_genotype(sample_field: &str) -> Genotype {
    let gt = match sample_field.find(':') {
        Some(pos) => &sample_field[..pos],
        None => sample_field,
    };

    let Some(sep) = gt.find(['/', '|']) else {
        return Genotype::Missing;
    };

    match (parse_allele(&gt[..sep]), parse_allele(&gt[sep + 1..])) {
        (Some(a1), Some(a2)) => Genotype::Diploid(a1, a2),
        _ => Genotype::Missing,
    }
}

#[inline]
fn parse_allele(s: &str) -> Option<u8> {
    if s.is_empty() || s == "." {
        return None;
    }
    s.parse::<u8>().ok()
}

/// Parse the tab-separated sample columns of a record into `out`.
///
/// `out` is cleared first. Returns a data error when the number of columns
/// differs from `expected`.
pub fn parse_genotypes(samples_field: &str, expected: usize, out: &mut Vec<Genotype>) -> Result<()> {
    out.clear();
    out.extend(samples_field.split('\t').map(parse_genotype));
    if out.len() != expected {
        return Err(SnpBinsError::data(format!(
            "sample-count mismatch: record has {} sample columns, header declares {}",
            out.len(),
            expected
        )));
    }
    Ok(())
}

/// Precomputed diff values for every pair of diploid calls over an alphabet
/// of allele indices `0..alphabet`.
#[derive(Clone, Debug)]
pub struct GenotypeDiffTable {
    alphabet: usize,
    values: Vec<u8>,
}

impl GenotypeDiffTable {
    /// Build the table for allele indices `0..alphabet`
    pub fn new(alphabet: usize) -> Self {
        let mut values = vec![0u8; alphabet.pow(4)];
        for a1 in 0..alphabet {
            for a2 in 0..alphabet {
                for b1 in 0..alphabet {
                    for b2 in 0..alphabet {
                        let matches = (a1 == b1) as u8
                            + (a1 == b2) as u8
                            + (a2 == b1) as u8
                            + (a2 == b2) as u8;
                        values[((a1 * alphabet + a2) * alphabet + b1) * alphabet + b2] = matches;
                    }
                }
            }
        }
        Self { alphabet, values }
    }

    pub fn alphabet(&self) -> usize {
        self.alphabet
    }

    /// Diff value for two calls, `None` when either call uses an allele index
    /// outside the alphabet
    #[inline]
    pub fn lookup(&self, a: (u8, u8), b: (u8, u8)) -> Option<u8> {
        let k = self.alphabet;
        let (a1, a2, b1, b2) = (a.0 as usize, a.1 as usize, b.0 as usize, b.1 as usize);
        if a1 >= k || a2 >= k || b1 >= k || b2 >= k {
            return None;
        }
        Some(self.values[((a1 * k + a2) * k + b1) * k + b2])
    }

    /// Like [`lookup`](Self::lookup) but reports a missing entry as a data error
    #[inline]
    pub fn value(&self, a: (u8, u8), b: (u8, u8)) -> Result<u8> {
        self.lookup(a, b).ok_or_else(|| {
            SnpBinsError::data(format!(
                "genotype pair {}/{} vs {}/{} not in diff table (alphabet {}); multiallelic site?",
                a.0, a.1, b.0, b.1, self.alphabet
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genotype_forms() {
        assert_eq!(parse_genotype("0/1"), Genotype::Diploid(0, 1));
        assert_eq!(parse_genotype("1|0"), Genotype::Diploid(1, 0));
        assert_eq!(parse_genotype("1/1:35:99"), Genotype::Diploid(1, 1));
        assert_eq!(parse_genotype("./."), Genotype::Missing);
        assert_eq!(parse_genotype(".|1"), Genotype::Missing);
        assert_eq!(parse_genotype("0"), Genotype::Missing);
        assert_eq!(parse_genotype(""), Genotype::Missing);
        assert_eq!(parse_genotype("0/x"), Genotype::Missing);
        assert_eq!(parse_genotype("2/12"), Genotype::Diploid(2, 12));
    }

    #[test]
    fn test_parse_genotypes_count() {
        let mut out = Vec::new();
        parse_genotypes("0/0\t0/1\t./.", 3, &mut out).unwrap();
        assert_eq!(out[2], Genotype::Missing);
        let err = parse_genotypes("0/0\t0/1", 3, &mut out).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_diff_values() {
        let table = GenotypeDiffTable::new(4);
        assert_eq!(table.lookup((0, 0), (0, 0)), Some(4));
        assert_eq!(table.lookup((0, 0), (0, 1)), Some(2));
        assert_eq!(table.lookup((0, 1), (0, 1)), Some(2));
        assert_eq!(table.lookup((0, 1), (1, 0)), Some(2));
        assert_eq!(table.lookup((0, 0), (1, 1)), Some(0));
        assert_eq!(table.lookup((1, 1), (1, 1)), Some(4));
        assert_eq!(table.lookup((0, 2), (1, 3)), Some(0));
    }

    #[test]
    fn test_diff_table_symmetric_and_bounded() {
        let table = GenotypeDiffTable::new(4);
        for a1 in 0..4u8 {
            for a2 in 0..4u8 {
                for b1 in 0..4u8 {
                    for b2 in 0..4u8 {
                        let v = table.lookup((a1, a2), (b1, b2)).unwrap();
                        assert_eq!(v, table.lookup((b1, b2), (a1, a2)).unwrap());
                        assert!(v as u64 <= MAX_DIFF_VALUE);
                    }
                }
            }
        }
    }

    #[test]
    fn test_allele_outside_alphabet() {
        let table = GenotypeDiffTable::new(2);
        assert_eq!(table.lookup((0, 2), (0, 0)), None);
        assert!(table.value((0, 0), (3, 0)).unwrap_err().is_data_error());
    }
}
