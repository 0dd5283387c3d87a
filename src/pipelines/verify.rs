//! # Consistency Verifier
//!
//! Re-derives every stored aggregate of a finished build from its leaves and
//! compares it with the stored value:
//! 1. Per bin: each sample's matrix row sums to its stored total.
//! 2. Bin to chromosome: SNP counts, first/last positions, bin count, and the
//!    stored rollup matrix and totals.
//! 3. Chromosome to genome: SNP and bin totals of the manifest.
//! 4. Subtract-until-zero: starting from the genome totals and the genome
//!    rollup matrix, every chromosome's leaf-derived contribution is removed.
//!    The residual must never go negative and must end at exactly zero.
//!
//! The first mismatch aborts with a `Consistency` error carrying both values.

use tracing::{debug, info, info_span};

use crate::data::chromosome::Chromosome;
use crate::data::ChromIdx;
use crate::error::{Result, SnpBinsError};
use crate::io::artifact::{read_chromosome, read_genome_rollup, read_rollups, GenomeLayout};

/// Counts of what a successful verification covered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub chromosomes: usize,
    pub bins: u64,
    pub snps: u64,
    pub checks: u64,
}

/// Audits the artifacts of one `(input, bin_width)` build
pub struct Verifier {
    layout: GenomeLayout,
}

/// Subtract every part from `total`; the residual must reach exactly zero
pub fn subtract_until_zero(
    what: &str,
    total: u64,
    parts: impl IntoIterator<Item = u64>,
) -> Result<()> {
    let mut residual = total;
    let mut removed = 0u64;
    for part in parts {
        removed = removed.saturating_add(part);
        residual = residual
            .checked_sub(part)
            .ok_or_else(|| SnpBinsError::consistency(what, total, removed))?;
    }
    if residual != 0 {
        return Err(SnpBinsError::consistency(what, total, removed));
    }
    Ok(())
}

fn check_equal(what: impl FnOnce() -> String, stored: u64, computed: u64) -> Result<()> {
    if stored != computed {
        return Err(SnpBinsError::consistency(what(), stored, computed));
    }
    Ok(())
}

fn check_slices(what: &str, stored: &[u64], computed: &[u64]) -> Result<()> {
    check_equal(|| format!("{} length", what), stored.len() as u64, computed.len() as u64)?;
    for (k, (&s, &c)) in stored.iter().zip(computed).enumerate() {
        check_equal(|| format!("{}[{}]", what, k), s, c)?;
    }
    Ok(())
}

impl Verifier {
    pub fn new(layout: GenomeLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &GenomeLayout {
        &self.layout
    }

    pub fn run(&self) -> Result<VerifyReport> {
        let _span = info_span!("verify", root = %self.layout.root().display()).entered();
        let manifest = self.layout.read_manifest()?;
        let mut report = VerifyReport::default();

        check_equal(
            || "manifest chromosome_count".to_string(),
            manifest.chromosome_count as u64,
            manifest.chromosome_names.len() as u64,
        )?;
        report.checks += 1;

        let genome_rollup = read_genome_rollup(&self.layout)?;
        check_equal(
            || "genome rollup length".to_string(),
            manifest.matrix_size as u64,
            genome_rollup.len() as u64,
        )?;
        report.checks += 1;

        let mut residual = genome_rollup.clone();
        let mut chromosome_snps = Vec::with_capacity(manifest.chromosome_names.len());
        let mut chromosome_bins = Vec::with_capacity(manifest.chromosome_names.len());

        for (order, name) in manifest.chromosome_names.iter().enumerate() {
            let paths = self.layout.chromosome(ChromIdx::from(order), name);
            let (meta, chrom) = read_chromosome(&paths)?;
            if meta.sample_names != manifest.sample_names {
                return Err(SnpBinsError::format(format!(
                    "{}: sample names differ from the genome manifest",
                    name
                )));
            }
            check_equal(
                || format!("{}: chromosome order", name),
                order as u64,
                meta.chromosome_order as u64,
            )?;

            report.checks += verify_bins(&chrom, meta.bin_count)?;

            let (rollup_matrix, rollup_totals) = read_rollups(&paths, &meta)?;
            let leaf_matrix = chrom.rollup_matrix();
            check_slices(&format!("{}: rollup matrix", name), &rollup_matrix, &leaf_matrix)?;
            check_slices(
                &format!("{}: rollup totals", name),
                &rollup_totals,
                &chrom.rollup_totals(),
            )?;
            report.checks += 2;

            check_equal(
                || "genome rollup length".to_string(),
                residual.len() as u64,
                leaf_matrix.len() as u64,
            )?;
            for (k, (acc, &v)) in residual.iter_mut().zip(&leaf_matrix).enumerate() {
                *acc = acc.checked_sub(v).ok_or_else(|| {
                    SnpBinsError::consistency(format!("genome rollup[{}] residual", k), genome_rollup[k], v)
                })?;
            }

            chromosome_snps.push(chrom.chromosome_snps);
            chromosome_bins.push(chrom.bin_count());
            report.chromosomes += 1;
            report.bins += chrom.bin_count();
            report.snps += chrom.chromosome_snps;
            debug!(chromosome = %name, bins = chrom.bin_count(), "Chromosome verified");
        }

        check_equal(|| "genome_snps".to_string(), manifest.genome_snps, report.snps)?;
        check_equal(|| "genome_bins".to_string(), manifest.genome_bins, report.bins)?;
        subtract_until_zero("genome_snps", manifest.genome_snps, chromosome_snps)?;
        subtract_until_zero("genome_bins", manifest.genome_bins, chromosome_bins)?;
        report.checks += 4;

        if let Some((k, &left)) = residual.iter().enumerate().find(|(_, v)| **v != 0) {
            return Err(SnpBinsError::consistency(
                format!("genome rollup[{}] residual", k),
                genome_rollup[k],
                genome_rollup[k] - left,
            ));
        }
        report.checks += 1;

        info!(
            chromosomes = report.chromosomes,
            bins = report.bins,
            snps = report.snps,
            checks = report.checks,
            "Verification passed"
        );
        Ok(report)
    }
}

/// Leaf checks of one chromosome; returns the number of checks made
fn verify_bins(chrom: &Chromosome, stored_bin_count: u64) -> Result<u64> {
    let name = &chrom.name;
    let tri = chrom.triangle();
    let mut checks = 0u64;

    let snps: u64 = chrom.bins.iter().map(|b| b.snp_count).sum();
    check_equal(|| format!("{}: chromosome_snps", name), chrom.chromosome_snps, snps)?;
    check_equal(
        || format!("{}: bin count", name),
        stored_bin_count,
        chrom.bins.len() as u64,
    )?;
    checks += 2;

    if let (Some(first), Some(last)) = (
        chrom.bins.iter().map(|b| b.first_position).min(),
        chrom.bins.iter().map(|b| b.last_position).max(),
    ) {
        check_equal(|| format!("{}: first_position", name), chrom.first_position, first)?;
        check_equal(|| format!("{}: last_position", name), chrom.last_position, last)?;
        checks += 2;
    }

    for bin in &chrom.bins {
        check_equal(
            || format!("{}: bin {} matrix length", name, bin.bin_number),
            tri.size() as u64,
            bin.matrix.len() as u64,
        )?;
        for i in 0..chrom.sample_count {
            let row: u64 = bin.sample_row(&tri, i).iter().sum();
            check_equal(
                || format!("{}: bin {} sample {} total", name, bin.bin_number, i),
                bin.totals.get(i),
                row,
            )?;
        }
        if let Some(positions) = bin.recorded_positions() {
            if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
                check_equal(
                    || format!("{}: bin {} first position", name, bin.bin_number),
                    bin.first_position,
                    first,
                )?;
                check_equal(
                    || format!("{}: bin {} last position", name, bin.bin_number),
                    bin.last_position,
                    last,
                )?;
            }
        }
        checks += 1;
    }
    Ok(checks)
}
