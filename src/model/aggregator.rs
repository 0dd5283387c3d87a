//! # Bin Aggregation
//!
//! ## Role
//! Consumes one chromosome's record lines in position order and accumulates,
//! per fixed-width bin, the pairwise genotype diff matrix and per-sample
//! totals.
//!
//! ## Per record
//! 1. Records that are not single-base (REF length 1, every ALT length at
//!    most 1) are counted as skipped and contribute nothing.
//! 2. `bin_number = position / bin_width`. A new bin number closes the open
//!    bin, freezing its arrays at their selected widths.
//! 3. For every pair `i < j` where neither call is missing, the diff value
//!    `v` is added to `matrix[idx(i, j)]`, `totals[i]` and `totals[j]`.
//! 4. The bin's SNP count and first/last positions are updated.
//!
//! Accumulators are `u64` while a bin is open.

use std::sync::Arc;

use tracing::debug;

use crate::data::chromosome::{Bin, Chromosome};
use crate::data::counters::{Counters, WidthPolicy};
use crate::data::genotype::{parse_genotypes, Genotype, GenotypeDiffTable};
use crate::data::triangle::TriangleIndex;
use crate::error::{Result, SnpBinsError};
use crate::io::variant_stream::VariantStream;
use crate::io::vcf::VariantRecord;

/// Aggregation parameters shared by every chromosome of a build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregationConfig {
    pub bin_width: u64,
    pub matrix_width: WidthPolicy,
    pub totals_width: WidthPolicy,
    pub track_positions: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            bin_width: 250_000,
            matrix_width: WidthPolicy::Auto,
            totals_width: WidthPolicy::Auto,
            track_positions: false,
        }
    }
}

/// Open bin state
struct OpenBin {
    bin_number: u64,
    snp_count: u64,
    first_position: u64,
    last_position: u64,
    matrix: Vec<u64>,
    totals: Vec<u64>,
    positions: Vec<u64>,
}

impl OpenBin {
    fn new(bin_number: u64, matrix_size: usize, n_samples: usize) -> Self {
        Self {
            bin_number,
            snp_count: 0,
            first_position: 0,
            last_position: 0,
            matrix: vec![0; matrix_size],
            totals: vec![0; n_samples],
            positions: Vec::new(),
        }
    }
}

/// Streaming aggregator for a single chromosome
pub struct BinAggregator {
    order: usize,
    name: String,
    n_samples: usize,
    tri: TriangleIndex,
    diff: Arc<GenotypeDiffTable>,
    config: AggregationConfig,

    open: Option<OpenBin>,
    bins: Vec<Bin>,
    genotypes: Vec<Genotype>,

    chromosome_snps: u64,
    first_position: Option<u64>,
    last_position: u64,
    skipped_records: u64,
    records_seen: usize,
}

impl BinAggregator {
    pub fn new(
        order: usize,
        name: &str,
        n_samples: usize,
        diff: Arc<GenotypeDiffTable>,
        config: AggregationConfig,
    ) -> Self {
        Self {
            order,
            name: name.to_string(),
            n_samples,
            tri: TriangleIndex::new(n_samples),
            diff,
            config,
            open: None,
            bins: Vec::new(),
            genotypes: Vec::with_capacity(n_samples),
            chromosome_snps: 0,
            first_position: None,
            last_position: 0,
            skipped_records: 0,
            records_seen: 0,
        }
    }

    /// Parse and aggregate one record line
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        self.records_seen += 1;
        let record = VariantRecord::parse(line, self.records_seen)?;
        self.push_record(&record)
    }

    /// Aggregate one parsed record
    pub fn push_record(&mut self, record: &VariantRecord<'_>) -> Result<()> {
        if !record.is_single_base() {
            self.skipped_records += 1;
            return Ok(());
        }

        let bin_number = record.position / self.config.bin_width;
        self.ensure_bin(bin_number)?;

        parse_genotypes(record.samples, self.n_samples, &mut self.genotypes)?;

        let Some(bin) = self.open.as_mut() else {
            return Err(SnpBinsError::data("no open bin"));
        };
        accumulate(&self.tri, &self.diff, &self.genotypes, bin)?;

        if bin.snp_count == 0 {
            bin.first_position = record.position;
        }
        bin.snp_count += 1;
        bin.last_position = record.position;
        if self.config.track_positions {
            bin.positions.push(record.position);
        }

        self.chromosome_snps += 1;
        self.first_position.get_or_insert(record.position);
        self.last_position = record.position;
        Ok(())
    }

    fn ensure_bin(&mut self, bin_number: u64) -> Result<()> {
        match &self.open {
            Some(open) if open.bin_number == bin_number => return Ok(()),
            Some(open) if bin_number < open.bin_number => {
                return Err(SnpBinsError::data(format!(
                    "{}: records not position-sorted (bin {} after bin {})",
                    self.name, bin_number, open.bin_number
                )));
            }
            _ => {}
        }
        self.close_bin()?;
        self.open = Some(OpenBin::new(bin_number, self.tri.size(), self.n_samples));
        Ok(())
    }

    fn close_bin(&mut self) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let bin = Bin {
            bin_number: open.bin_number,
            snp_count: open.snp_count,
            first_position: open.first_position,
            last_position: open.last_position,
            matrix: Counters::freeze("matrix", &open.matrix, self.config.matrix_width)?,
            totals: Counters::freeze("totals", &open.totals, self.config.totals_width)?,
            positions: self.config.track_positions.then_some(open.positions),
        };
        debug!(
            chromosome = %self.name,
            bin = bin.bin_number,
            snps = bin.snp_count,
            width = %bin.matrix.width(),
            "Closed bin"
        );
        self.bins.push(bin);
        Ok(())
    }

    /// Close the last bin and assemble the chromosome
    pub fn finish(mut self) -> Result<Chromosome> {
        self.close_bin()?;

        if self.config.track_positions {
            let widest = self.bins.iter().map(|b| b.snp_count as usize).max().unwrap_or(0);
            for bin in &mut self.bins {
                if let Some(positions) = bin.positions.as_mut() {
                    positions.resize(widest, 0);
                }
            }
        }

        Ok(Chromosome {
            order: self.order,
            name: self.name,
            bin_width: self.config.bin_width,
            sample_count: self.n_samples,
            bins: self.bins,
            chromosome_snps: self.chromosome_snps,
            first_position: self.first_position.unwrap_or(0),
            last_position: self.last_position,
            skipped_records: self.skipped_records,
        })
    }

    /// Drain a variant stream and finish
    pub fn run(mut self, stream: &mut VariantStream) -> Result<Chromosome> {
        while let Some(line) = stream.next_line()? {
            self.push_line(line)?;
        }
        self.finish()
    }
}

/// Add one record's pairwise contributions to an open bin
#[inline]
fn accumulate(
    tri: &TriangleIndex,
    diff: &GenotypeDiffTable,
    genotypes: &[Genotype],
    bin: &mut OpenBin,
) -> Result<()> {
    let n = genotypes.len();
    for i in 0..n {
        let Genotype::Diploid(a1, a2) = genotypes[i] else {
            continue;
        };
        let row = tri.row_start(i);
        for j in (i + 1)..n {
            let Genotype::Diploid(b1, b2) = genotypes[j] else {
                continue;
            };
            let v = diff.value((a1, a2), (b1, b2))? as u64;
            bin.matrix[row + (j - i - 1)] += v;
            bin.totals[i] += v;
            bin.totals[j] += v;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::counters::CounterWidth;

    fn line(pos: u64, alt: &str, gts: &[&str]) -> String {
        format!("chr1\t{}\t.\tA\t{}\t.\t.\t.\tGT\t{}", pos, alt, gts.join("\t"))
    }

    fn aggregator(n: usize, bin_width: u64) -> BinAggregator {
        let config = AggregationConfig {
            bin_width,
            ..AggregationConfig::default()
        };
        BinAggregator::new(0, "chr1", n, Arc::new(GenotypeDiffTable::new(4)), config)
    }

    #[test]
    fn test_four_sample_scenario() {
        let mut agg = aggregator(4, 100);
        agg.push_line(&line(10, "C", &["0/0", "0/1", "1/1", "./."])).unwrap();
        agg.push_line(&line(150, "C", &["0/0", "0/0", "0/0", "0/0"])).unwrap();
        agg.push_line(&line(160, "AT", &["0/1", "0/1", "0/1", "0/1"])).unwrap();
        let chrom = agg.finish().unwrap();

        assert_eq!(chrom.bin_count(), 2);
        assert_eq!(chrom.chromosome_snps, 2);
        assert_eq!(chrom.skipped_records, 1);
        assert_eq!((chrom.first_position, chrom.last_position), (10, 150));

        let tri = chrom.triangle();
        let b0 = &chrom.bins[0];
        assert_eq!(b0.bin_number, 0);
        assert_eq!(b0.pair_value(&tri, 0, 1), 2);
        assert_eq!(b0.pair_value(&tri, 0, 2), 0);
        assert_eq!(b0.pair_value(&tri, 1, 2), 2);
        assert_eq!(b0.pair_value(&tri, 0, 3), 0);
        assert_eq!(b0.pair_value(&tri, 2, 3), 0);
        assert_eq!(b0.totals.to_u64_vec(), vec![2, 4, 2, 0]);

        let b1 = &chrom.bins[1];
        assert_eq!(b1.bin_number, 1);
        assert_eq!(b1.snp_count, 1);
        assert!(b1.matrix.iter().all(|v| v == 4));
        assert_eq!(b1.totals.to_u64_vec(), vec![12, 12, 12, 12]);
        assert_eq!((b1.first_position, b1.last_position), (150, 150));
    }

    #[test]
    fn test_row_sums_match_totals() {
        let mut agg = aggregator(5, 1_000);
        for (pos, gts) in [
            (1, ["0/0", "0/1", "1/1", "0/1", "./."]),
            (2, ["1|1", "0|1", "0|0", "1|0", "0|0"]),
            (3, ["0/1", "0/1", "./.", "1/1", "0/0"]),
        ] {
            agg.push_line(&line(pos, "G", &gts)).unwrap();
        }
        let chrom = agg.finish().unwrap();
        let tri = chrom.triangle();
        let bin = &chrom.bins[0];
        for i in 0..5 {
            let row: u64 = bin.sample_row(&tri, i).iter().sum();
            assert_eq!(row, bin.totals.get(i), "sample {}", i);
        }
    }

    #[test]
    fn test_multiallelic_genotype_is_data_error() {
        let mut agg = aggregator(2, 100);
        let err = agg
            .push_line(&line(5, "C", &["0/7", "0/0"]))
            .unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_sample_count_mismatch() {
        let mut agg = aggregator(3, 100);
        assert!(agg.push_line(&line(5, "C", &["0/1", "0/0"])).is_err());
    }

    #[test]
    fn test_unsorted_records_rejected() {
        let mut agg = aggregator(2, 10);
        agg.push_line(&line(25, "C", &["0/1", "0/0"])).unwrap();
        assert!(agg.push_line(&line(5, "C", &["0/1", "0/0"])).is_err());
    }

    #[test]
    fn test_pinned_width_overflow_at_close() {
        let config = AggregationConfig {
            bin_width: 1_000_000,
            matrix_width: WidthPolicy::Fixed(CounterWidth::U16),
            ..AggregationConfig::default()
        };
        let mut agg = BinAggregator::new(0, "chr1", 2, Arc::new(GenotypeDiffTable::new(4)), config);
        // 16_384 identical hom-ref pairs sum to 65_536.
        for pos in 0..16_384u64 {
            agg.push_line(&line(pos, "C", &["0/0", "0/0"])).unwrap();
        }
        assert!(matches!(
            agg.finish(),
            Err(SnpBinsError::Overflow { .. })
        ));
    }

    #[test]
    fn test_positions_padded_to_widest_bin() {
        let config = AggregationConfig {
            bin_width: 10,
            track_positions: true,
            ..AggregationConfig::default()
        };
        let mut agg = BinAggregator::new(0, "chr1", 2, Arc::new(GenotypeDiffTable::new(4)), config);
        for pos in [1u64, 2, 3, 15] {
            agg.push_line(&line(pos, "C", &["0/1", "0/0"])).unwrap();
        }
        let chrom = agg.finish().unwrap();
        assert_eq!(chrom.bins[0].positions.as_deref(), Some(&[1, 2, 3][..]));
        assert_eq!(chrom.bins[1].positions.as_deref(), Some(&[15, 0, 0][..]));
        assert_eq!(chrom.bins[1].recorded_positions(), Some(&[15][..]));
    }

    #[test]
    fn test_skipped_only_bin_not_emitted() {
        let mut agg = aggregator(2, 10);
        agg.push_line(&line(1, "AT", &["0/1", "0/0"])).unwrap();
        agg.push_line(&line(25, "C", &["0/1", "0/0"])).unwrap();
        let chrom = agg.finish().unwrap();
        assert_eq!(chrom.bin_count(), 1);
        assert_eq!(chrom.bins[0].bin_number, 2);
        assert_eq!(chrom.skipped_records, 1);
    }
}
