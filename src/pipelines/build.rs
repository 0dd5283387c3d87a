//! # Genome Build Pipeline
//!
//! Orchestrates one `(input, bin_width)` build:
//! 1. Read the sample header and locate every chromosome in the BGZF input
//! 2. Skip chromosomes whose artifact already exists
//! 3. Aggregate the rest on a bounded rayon pool, one task per chromosome
//! 4. Poll the result channel with a timeout, accumulating genome totals
//! 5. Reload every artifact and cross-check it against its summary
//! 6. Write the genome rollup and the manifest, then run the verifier
//!
//! A failed build publishes no manifest. Artifacts of chromosomes that did
//! finish stay in place so a rerun resumes from them. A panicking worker is
//! caught and reported like any other failed chromosome.

use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::config::BuildOptions;
use crate::data::chromosome::ChromosomeSummary;
use crate::data::genome::{GenomeManifest, GenomeTotals, FORMAT_VERSION};
use crate::data::genotype::GenotypeDiffTable;
use crate::data::triangle::matrix_size;
use crate::data::ChromIdx;
use crate::error::{Result, SnpBinsError};
use crate::io::artifact::{
    read_chromosome, read_meta, read_rollups, write_chromosome, write_genome_rollup,
    ArtifactWidths, GenomeLayout,
};
use crate::io::block_index::{BlockIndex, ChromosomeLocation};
use crate::io::register::index_path;
use crate::io::variant_stream::VariantStream;
use crate::io::vcf::read_samples;
use crate::model::aggregator::{AggregationConfig, BinAggregator};
use crate::pipelines::verify::{Verifier, VerifyReport};
use crate::utils::telemetry::{Stage, TelemetryBlackboard};
use crate::utils::threading::build_thread_pool;

/// Result of a completed, verified genome build
#[derive(Clone, Debug)]
pub struct GenomeBuild {
    pub manifest: GenomeManifest,
    /// Chromosomes aggregated by this run
    pub built: Vec<String>,
    /// Chromosomes whose artifacts were reused
    pub skipped: Vec<String>,
    pub report: VerifyReport,
}

/// What a worker hands back through the channel
enum WorkerOutcome {
    Done(ChromosomeSummary),
    /// Not started because another chromosome failed
    Cancelled,
}

/// Read-only state shared by every worker
struct WorkerContext {
    input: PathBuf,
    layout: GenomeLayout,
    sample_names: Vec<String>,
    /// Every chromosome the block index located
    chromosomes: Arc<HashSet<String>>,
    diff: Arc<GenotypeDiffTable>,
    aggregation: AggregationConfig,
    widths: ArtifactWidths,
    abort: AtomicBool,
}

/// Runs one aggregation task per chromosome and publishes the genome
pub struct ChromosomeScheduler {
    options: BuildOptions,
    telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl ChromosomeScheduler {
    pub fn new(options: BuildOptions, telemetry: Option<Arc<TelemetryBlackboard>>) -> Self {
        Self { options, telemetry }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    fn set_stage(&self, stage: Stage) {
        if let Some(t) = &self.telemetry {
            t.set_stage(stage);
        }
    }

    pub fn run(&self) -> Result<GenomeBuild> {
        self.options.validate()?;
        let input = &self.options.input;
        self.set_stage(Stage::Indexing);

        let samples = read_samples(input)?;
        if samples.len() < 2 {
            return Err(SnpBinsError::data(format!(
                "{} has {} samples, at least 2 are needed for pairwise counts",
                input.display(),
                samples.len()
            )));
        }
        let index = BlockIndex::open(input)?;
        let names = index.chromosome_names();
        info!(
            samples = samples.len(),
            chromosomes = names.len(),
            bin_width = self.options.bin_width,
            "Located chromosomes"
        );

        let layout = self.options.layout();
        layout.create_dirs()?;
        remove_files(&genome_files(&layout));

        let ctx = Arc::new(WorkerContext {
            input: input.clone(),
            layout: layout.clone(),
            sample_names: samples.names(),
            chromosomes: Arc::new(names.iter().cloned().collect()),
            diff: Arc::new(GenotypeDiffTable::new(self.options.alphabet)),
            aggregation: self.options.aggregation(),
            widths: self.options.widths(),
            abort: AtomicBool::new(false),
        });

        let mut results: Vec<Option<ChromosomeSummary>> = vec![None; names.len()];
        let mut totals = GenomeTotals::default();
        let mut skipped = Vec::new();
        let mut pending = Vec::new();
        for (order, location) in index.locations().iter().enumerate() {
            let paths = layout.chromosome(ChromIdx::from(order), &location.name);
            if paths.exists() {
                let summary = read_meta(&paths)?.summary();
                debug!(chromosome = %location.name, "Artifact exists, skipping");
                totals.add(&summary);
                results[order] = Some(summary);
                skipped.push(location.name.clone());
            } else {
                pending.push(order);
            }
        }
        if let Some(t) = &self.telemetry {
            t.set_chromosomes_total(pending.len() as u64);
        }
        if !skipped.is_empty() {
            info!(skipped = skipped.len(), "Reusing existing chromosome artifacts");
        }

        self.set_stage(Stage::Aggregating);
        let built = self.run_workers(&ctx, index.locations(), &pending, &mut results, &mut totals)?;

        self.set_stage(Stage::Reloading);
        let genome_rollup = self.reload_all(&layout, &names, &ctx.sample_names, &results)?;

        self.set_stage(Stage::WritingManifest);
        let manifest = GenomeManifest {
            format_version: FORMAT_VERSION,
            input_name: layout.input_name().to_string(),
            bin_width: self.options.bin_width,
            sample_names: ctx.sample_names.clone(),
            chromosome_names: names.clone(),
            chromosome_count: names.len(),
            genome_bins: totals.bins,
            genome_snps: totals.snps,
            matrix_size: matrix_size(ctx.sample_names.len()),
        };
        write_genome_rollup(&layout, &genome_rollup)?;
        layout.write_manifest(&manifest)?;

        self.set_stage(Stage::Verifying);
        let report = match Verifier::new(layout.clone()).run() {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Verification failed, withdrawing manifest");
                remove_files(&genome_files(&layout));
                return Err(e);
            }
        };

        self.set_stage(Stage::Complete);
        info!(
            chromosomes = manifest.chromosome_count,
            genome_bins = manifest.genome_bins,
            genome_snps = manifest.genome_snps,
            built = built.len(),
            skipped = skipped.len(),
            "Genome build complete"
        );
        Ok(GenomeBuild {
            manifest,
            built,
            skipped,
            report,
        })
    }

    /// Spawn the pending chromosomes and drain their results
    fn run_workers(
        &self,
        ctx: &Arc<WorkerContext>,
        locations: &[ChromosomeLocation],
        pending: &[usize],
        results: &mut [Option<ChromosomeSummary>],
        totals: &mut GenomeTotals,
    ) -> Result<Vec<String>> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let pool = build_thread_pool(self.options.threads)?;
        let (tx, rx) = mpsc::channel::<(usize, Result<WorkerOutcome>)>();
        for &order in pending {
            let tx = tx.clone();
            let ctx = Arc::clone(ctx);
            let location = locations[order].clone();
            pool.spawn(move || {
                let outcome = build_chromosome(&ctx, order, &location);
                let _ = tx.send((order, outcome));
            });
        }
        drop(tx);

        let mut outstanding: BTreeSet<usize> = pending.iter().copied().collect();
        let mut built = Vec::new();
        let mut first_error: Option<SnpBinsError> = None;
        while !outstanding.is_empty() {
            match rx.recv_timeout(self.options.poll_interval) {
                Ok((order, outcome)) => {
                    outstanding.remove(&order);
                    match outcome {
                        Ok(WorkerOutcome::Done(summary)) => {
                            totals.add(&summary);
                            if let Some(t) = &self.telemetry {
                                t.record_chromosome(summary.bin_count, summary.chromosome_snps);
                            }
                            info!(
                                chromosome = %summary.name,
                                bins = summary.bin_count,
                                snps = summary.chromosome_snps,
                                remaining = outstanding.len(),
                                "Chromosome finished"
                            );
                            built.push(summary.name.clone());
                            results[order] = Some(summary);
                        }
                        Ok(WorkerOutcome::Cancelled) => {}
                        Err(e) => {
                            let name = &locations[order].name;
                            if e.is_data_error() {
                                error!(chromosome = %name, error = %e, "Unsupported data, aborting build");
                            } else {
                                error!(chromosome = %name, error = %e, "Chromosome failed, aborting build");
                            }
                            ctx.abort.store(true, Ordering::Relaxed);
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let waiting: Vec<&str> = outstanding
                        .iter()
                        .map(|&o| locations[o].name.as_str())
                        .collect();
                    info!("Waiting for {} chromosomes: {}", waiting.len(), waiting.join(", "));
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if let Some(&order) = outstanding.iter().next() {
            return Err(SnpBinsError::data(format!(
                "worker for {} exited without a result",
                locations[order].name
            )));
        }
        Ok(built)
    }

    /// Reload every artifact, cross-check it and sum the stored rollups
    /// into the genome rollup
    fn reload_all(
        &self,
        layout: &GenomeLayout,
        names: &[String],
        sample_names: &[String],
        results: &[Option<ChromosomeSummary>],
    ) -> Result<Vec<u64>> {
        let _span = info_span!("reload", chromosomes = names.len()).entered();
        let mut genome_rollup = vec![0u64; matrix_size(sample_names.len())];
        for (order, name) in names.iter().enumerate() {
            let paths = layout.chromosome(ChromIdx::from(order), name);
            let (meta, chrom) = read_chromosome(&paths)?;
            if meta.sample_names != sample_names {
                return Err(SnpBinsError::format(format!(
                    "{}: artifact samples differ from the input header; remove {} to rebuild it",
                    name,
                    paths.meta().display()
                )));
            }
            let reloaded = chrom.summary();
            let Some(expected) = &results[order] else {
                return Err(SnpBinsError::data(format!("{} has no result", name)));
            };
            if reloaded.chromosome_snps != expected.chromosome_snps {
                return Err(SnpBinsError::consistency(
                    format!("{}: chromosome_snps after reload", name),
                    expected.chromosome_snps,
                    reloaded.chromosome_snps,
                ));
            }
            if reloaded.bin_count != expected.bin_count {
                return Err(SnpBinsError::consistency(
                    format!("{}: bin_count after reload", name),
                    expected.bin_count,
                    reloaded.bin_count,
                ));
            }

            let (rollup, _) = read_rollups(&paths, &meta)?;
            if rollup.len() != genome_rollup.len() {
                return Err(SnpBinsError::format(format!(
                    "{}: rollup holds {} values, expected {}",
                    name,
                    rollup.len(),
                    genome_rollup.len()
                )));
            }
            for (acc, v) in genome_rollup.iter_mut().zip(&rollup) {
                *acc += v;
            }
        }
        Ok(genome_rollup)
    }
}

/// Aggregate and write one chromosome; partial files are removed on failure
fn build_chromosome(
    ctx: &WorkerContext,
    order: usize,
    location: &ChromosomeLocation,
) -> Result<WorkerOutcome> {
    if ctx.abort.load(Ordering::Relaxed) {
        return Ok(WorkerOutcome::Cancelled);
    }
    let paths = ctx.layout.chromosome(ChromIdx::from(order), &location.name);
    let span = info_span!("chromosome", name = %location.name, order);
    let result = catch_worker_panic(&location.name, || {
        span.in_scope(|| {
            let mut stream = VariantStream::open(&ctx.input, location)?
                .with_known_chromosomes(Arc::clone(&ctx.chromosomes));
            let aggregator = BinAggregator::new(
                order,
                &location.name,
                ctx.sample_names.len(),
                Arc::clone(&ctx.diff),
                ctx.aggregation,
            );
            let chrom = aggregator.run(&mut stream)?;
            debug!(lines = stream.lines_read(), snps = chrom.chromosome_snps, "Stream finished");
            if chrom.skipped_records > 0 {
                info!(
                    chromosome = %chrom.name,
                    skipped = chrom.skipped_records,
                    "Skipped records that are not single-base substitutions"
                );
            }
            write_chromosome(
                &paths,
                &chrom,
                ctx.layout.input_name(),
                &ctx.sample_names,
                ctx.widths,
            )?;
            Ok(chrom.summary())
        })
    });
    match result {
        Ok(summary) => Ok(WorkerOutcome::Done(summary)),
        Err(e) => {
            remove_files(&paths.files());
            Err(e)
        }
    }
}

/// Run `work`, turning a panic into an error for chromosome `name`
fn catch_worker_panic<T>(name: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        Err(SnpBinsError::data(format!(
            "worker for {} panicked: {}",
            name,
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Manifest and genome rollup files of a layout
fn genome_files(layout: &GenomeLayout) -> Vec<PathBuf> {
    let rollup = layout.genome_rollup_path();
    vec![layout.manifest_path(), index_path(&rollup), rollup]
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        remove_file(path);
    }
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_panic_becomes_error() {
        let result: Result<u64> = catch_worker_panic("chr7", || panic!("bad bin {}", 3));
        let err = result.unwrap_err();
        assert!(err.is_data_error());
        let message = err.to_string();
        assert!(message.contains("chr7"));
        assert!(message.contains("bad bin 3"));

        let result: Result<u64> = catch_worker_panic("chr7", || panic!("static"));
        assert!(result.unwrap_err().to_string().contains("static"));
    }

    #[test]
    fn test_worker_result_passes_through() {
        assert_eq!(catch_worker_panic("chr1", || Ok(5u64)).unwrap(), 5);
        let err = catch_worker_panic::<u64>("chr1", || Err(SnpBinsError::format("x"))).unwrap_err();
        assert!(matches!(err, SnpBinsError::Format { .. }));
    }
}
