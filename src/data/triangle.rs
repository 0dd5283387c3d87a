//! # Upper-Triangle Pair Indexing
//!
//! ## Role
//! Maps an unordered sample pair `(i, j)`, `i < j < n`, to a linear offset in
//! `[0, n*(n-1)/2)` and back. The ordering is row-major over the strict upper
//! triangle: `i` ascending, then `j` ascending.
//!
//! ```text
//! n = 4
//!   -  0  1  2
//!   -  -  3  4
//!   -  -  -  5
//!   -  -  -  -
//! ```

/// Number of unordered pairs among `n` samples
#[inline]
pub fn matrix_size(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        n * (n - 1) / 2
    }
}

/// Bijection between sample pairs and triangular offsets for a fixed `n`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriangleIndex {
    n: usize,
    size: usize,
}

impl TriangleIndex {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            size: matrix_size(n),
        }
    }

    /// Number of samples
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of pairs (length of a triangular array)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of the first pair in row `i`, i.e. the pair `(i, i + 1)`
    #[inline]
    pub fn row_start(&self, i: usize) -> usize {
        i * self.n - i * (i + 1) / 2
    }

    /// Linear offset of the pair `(i, j)`; requires `i < j < n`
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < self.n, "invalid pair ({}, {}) for n={}", i, j, self.n);
        self.row_start(i) + (j - i - 1)
    }

    /// Offset of an unordered pair, accepting either argument order
    pub fn index_unordered(&self, a: usize, b: usize) -> Option<usize> {
        if a == b || a >= self.n || b >= self.n {
            return None;
        }
        let (i, j) = if a < b { (a, b) } else { (b, a) };
        Some(self.index(i, j))
    }

    /// Inverse of [`index`](Self::index); requires `k < size`
    pub fn coord(&self, k: usize) -> (usize, usize) {
        debug_assert!(k < self.size, "offset {} out of range {}", k, self.size);
        let n = self.n as f64;
        let disc = -8.0 * k as f64 + 4.0 * n * (n - 1.0) - 7.0;
        let estimate = n - 2.0 - (disc.max(0.0).sqrt() / 2.0 - 0.5).floor();
        let mut i = estimate.clamp(0.0, (self.n - 2) as f64) as usize;

        // Float rounding can be off by one row for very large n.
        while i > 0 && self.row_start(i) > k {
            i -= 1;
        }
        while i + 2 < self.n && self.row_start(i + 1) <= k {
            i += 1;
        }

        let j = k - self.row_start(i) + i + 1;
        (i, j)
    }

    /// All pairs in canonical order
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n).flat_map(move |i| ((i + 1)..self.n).map(move |j| (i, j)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_size() {
        assert_eq!(matrix_size(0), 0);
        assert_eq!(matrix_size(1), 0);
        assert_eq!(matrix_size(2), 1);
        assert_eq!(matrix_size(4), 6);
        assert_eq!(matrix_size(361), 64_980);
    }

    #[test]
    fn test_known_layout() {
        let tri = TriangleIndex::new(8);
        assert_eq!(tri.index(0, 1), 0);
        assert_eq!(tri.index(0, 7), 6);
        assert_eq!(tri.index(1, 2), 7);
        assert_eq!(tri.index(2, 3), 13);
        assert_eq!(tri.index(6, 7), 27);
        assert_eq!(tri.coord(27), (6, 7));
    }

    #[test]
    fn test_bijection_small_n() {
        for n in 2..40 {
            let tri = TriangleIndex::new(n);
            for k in 0..tri.size() {
                let (i, j) = tri.coord(k);
                assert!(i < j && j < n);
                assert_eq!(tri.index(i, j), k, "n={} k={}", n, k);
            }
            for (k, (i, j)) in tri.pairs().enumerate() {
                assert_eq!(tri.index(i, j), k);
                assert_eq!(tri.coord(k), (i, j));
            }
        }
    }

    #[test]
    fn test_bijection_large_n_edges() {
        let n = 100_000;
        let tri = TriangleIndex::new(n);
        for &k in &[0, 1, n - 2, n - 1, tri.size() / 2, tri.size() - 2, tri.size() - 1] {
            let (i, j) = tri.coord(k);
            assert_eq!(tri.index(i, j), k);
        }
        assert_eq!(tri.coord(tri.size() - 1), (n - 2, n - 1));
    }

    #[test]
    fn test_unordered_lookup() {
        let tri = TriangleIndex::new(5);
        assert_eq!(tri.index_unordered(3, 1), Some(tri.index(1, 3)));
        assert_eq!(tri.index_unordered(2, 2), None);
        assert_eq!(tri.index_unordered(0, 5), None);
    }
}
