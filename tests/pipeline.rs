use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::noodles::bgzf::gzi;
use ::noodles::bgzf as bgzf_io;
use snpbins::config::BuildOptions;
use snpbins::data::ChromIdx;
use snpbins::io::artifact::{read_chromosome, GenomeLayout};
use snpbins::io::block_index::{cache_path, gzi_path, write_block_offsets, BlockIndex};
use snpbins::io::register::HEADER_SIZE;
use snpbins::pipelines::{ChromosomeScheduler, Verifier};
use snpbins::SnpBinsError;
use tempfile::TempDir;

// --- Helpers ---

struct SyntheticVcfBuilder {
    samples: Vec<String>,
    records: Vec<String>,
    lines_per_block: usize,
    write_gzi: bool,
}

impl SyntheticVcfBuilder {
    fn new(n_samples: usize) -> Self {
        Self {
            samples: (0..n_samples).map(|i| format!("S{}", i)).collect(),
            records: Vec::new(),
            lines_per_block: 2,
            write_gzi: true,
        }
    }

    fn record(mut self, chrom: &str, pos: u64, reference: &str, alt: &str, gts: &[&str]) -> Self {
        assert_eq!(gts.len(), self.samples.len());
        self.records.push(format!(
            "{}\t{}\t.\t{}\t{}\t.\tPASS\t.\tGT\t{}\n",
            chrom,
            pos,
            reference,
            alt,
            gts.join("\t")
        ));
        self
    }

    /// SNPs at `positions`, genotypes chosen by `gt(record, sample)`
    fn snps(
        mut self,
        chrom: &str,
        positions: &[u64],
        gt: impl Fn(usize, usize) -> &'static str,
    ) -> Self {
        for (r, &pos) in positions.iter().enumerate() {
            let gts: Vec<&str> = (0..self.samples.len()).map(|s| gt(r, s)).collect();
            self = self.record(chrom, pos, "A", "G", &gts);
        }
        self
    }

    fn lines_per_block(mut self, n: usize) -> Self {
        self.lines_per_block = n;
        self
    }

    fn without_gzi(mut self) -> Self {
        self.write_gzi = false;
        self
    }

    fn header(&self) -> String {
        let mut header = String::from("##fileformat=VCFv4.3\n");
        header.push_str("##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n");
        header.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
        for s in &self.samples {
            header.push('\t');
            header.push_str(s);
        }
        header.push('\n');
        header
    }

    /// Header in its own block, then `lines_per_block` records per block
    fn build(self, dir: &Path) -> PathBuf {
        let path = dir.join("cohort.vcf.gz");
        let mut chunks = vec![self.header()];
        for lines in self.records.chunks(self.lines_per_block) {
            chunks.push(lines.concat());
        }

        let mut writer = bgzf_io::Writer::new(Vec::new());
        let mut entries = Vec::new();
        let mut uncompressed = 0u64;
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                entries.push((writer.get_ref().len() as u64, uncompressed));
            }
            writer.write_all(chunk.as_bytes()).unwrap();
            writer.flush().unwrap();
            uncompressed += chunk.len() as u64;
        }
        fs::write(&path, writer.finish().unwrap()).unwrap();
        if self.write_gzi {
            write_block_offsets(&gzi_path(&path), &gzi::Index::from(entries)).unwrap();
        }
        path
    }
}

fn options(input: &Path, out: &Path, bin_width: u64) -> BuildOptions {
    let mut options = BuildOptions::new(input);
    options.bin_width = bin_width;
    options.threads = 2;
    options.poll_interval = Duration::from_millis(20);
    options.out_dir = Some(out.to_path_buf());
    options
}

/// File name -> contents for every file under `root`
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        files.insert(
            path.file_name().unwrap().to_string_lossy().into_owned(),
            fs::read(&path).unwrap(),
        );
    }
    files
}

/// chr1 bins {0, 1, 2}, chr2 {0}, chr3 {5, 9, 12} at bin width 1000
fn three_chromosome_builder() -> SyntheticVcfBuilder {
    SyntheticVcfBuilder::new(5)
        .snps("chr1", &[100, 1500, 2600, 2700], |r, s| {
            ["0/0", "0/1", "1/1", "0|1", "./."][(r + s) % 5]
        })
        .snps("chr2", &[10, 20, 30], |r, s| if (r * s) % 2 == 0 { "0/1" } else { "1/1" })
        .snps("chr3", &[5000, 5001, 9000, 12000, 12001], |r, s| {
            ["1/1", "0/0", "0/1"][(r + 2 * s) % 3]
        })
}

fn three_chromosomes(dir: &Path) -> PathBuf {
    three_chromosome_builder().build(dir)
}

// --- Tests ---

#[test]
fn test_four_sample_scenario() {
    let dir = TempDir::new().unwrap();
    let input = SyntheticVcfBuilder::new(4)
        .record("chr1", 100, "A", "G", &["0/0", "0/1", "1/1", "./."])
        .record("chr1", 200, "A", "AT", &["0/1", "0/1", "0/1", "0/1"])
        .build(dir.path());
    let out = dir.path().join("out");

    let genome = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();
    assert_eq!(genome.manifest.genome_snps, 1);
    assert_eq!(genome.manifest.genome_bins, 1);
    assert_eq!(genome.manifest.sample_names, vec!["S0", "S1", "S2", "S3"]);
    assert_eq!(genome.manifest.matrix_size, 6);

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    let (meta, chrom) = read_chromosome(&layout.chromosome(ChromIdx(0), "chr1")).unwrap();
    assert_eq!(meta.skipped_records, 1);
    assert_eq!(chrom.chromosome_snps, 1);
    assert_eq!(chrom.bins.len(), 1);

    let bin = &chrom.bins[0];
    let tri = chrom.triangle();
    assert_eq!(bin.bin_number, 0);
    assert_eq!(bin.pair_value(&tri, 0, 1), 2);
    assert_eq!(bin.pair_value(&tri, 0, 2), 0);
    assert_eq!(bin.pair_value(&tri, 1, 2), 2);
    for i in 0..3 {
        assert_eq!(bin.pair_value(&tri, i, 3), 0);
    }
    assert_eq!(bin.totals.to_u64_vec(), vec![2, 4, 2, 0]);
}

#[test]
fn test_multi_chromosome_totals() {
    let dir = TempDir::new().unwrap();
    let input = three_chromosomes(dir.path());
    let out = dir.path().join("out");

    let genome = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();
    assert_eq!(genome.manifest.chromosome_names, vec!["chr1", "chr2", "chr3"]);
    assert_eq!(genome.manifest.genome_snps, 4 + 3 + 5);
    assert_eq!(genome.manifest.genome_bins, 3 + 1 + 3);
    assert_eq!(genome.built.len(), 3);
    assert!(genome.skipped.is_empty());
    assert_eq!(genome.report.chromosomes, 3);

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    let (_, chr3) = read_chromosome(&layout.chromosome(ChromIdx(2), "chr3")).unwrap();
    let numbers: Vec<u64> = chr3.bins.iter().map(|b| b.bin_number).collect();
    assert_eq!(numbers, vec![5, 9, 12]);
    let snps: Vec<u64> = chr3.bins.iter().map(|b| b.snp_count).collect();
    assert_eq!(snps, vec![2, 1, 2]);
    assert_eq!((chr3.first_position, chr3.last_position), (5000, 12001));
}

#[test]
fn test_rebuild_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let input = three_chromosomes(dir.path());
    let out = dir.path().join("out");

    let first = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();
    let root = GenomeLayout::new(&input, 1000, Some(&out)).root().to_path_buf();
    let before = snapshot(&root);

    let second = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();
    assert!(second.built.is_empty());
    assert_eq!(second.skipped, vec!["chr1", "chr2", "chr3"]);
    assert_eq!(second.manifest, first.manifest);
    assert_eq!(snapshot(&root), before);
}

#[test]
fn test_resume_rebuilds_only_missing() {
    let dir = TempDir::new().unwrap();
    let input = three_chromosomes(dir.path());
    let out = dir.path().join("out");
    ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    let chr2 = layout.chromosome(ChromIdx(1), "chr2");
    let before = fs::read(chr2.register("matrix")).unwrap();
    fs::remove_file(chr2.meta()).unwrap();

    let genome = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();
    assert_eq!(genome.built, vec!["chr2"]);
    assert_eq!(genome.skipped, vec!["chr1", "chr3"]);
    assert_eq!(fs::read(chr2.register("matrix")).unwrap(), before);
}

#[test]
fn test_verify_detects_tampered_manifest() {
    let dir = TempDir::new().unwrap();
    let input = three_chromosomes(dir.path());
    let out = dir.path().join("out");
    ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    let mut manifest = layout.read_manifest().unwrap();
    manifest.genome_snps += 1;
    layout.write_manifest(&manifest).unwrap();

    match Verifier::new(layout).run().unwrap_err() {
        SnpBinsError::Consistency { stored, computed, .. } => {
            assert_eq!(stored, 13);
            assert_eq!(computed, 12);
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
}

#[test]
fn test_verify_detects_corrupt_register() {
    let dir = TempDir::new().unwrap();
    let input = three_chromosomes(dir.path());
    let out = dir.path().join("out");
    ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    let matrix = layout.chromosome(ChromIdx(0), "chr1").register("matrix");
    let mut bytes = fs::read(&matrix).unwrap();
    bytes[HEADER_SIZE] ^= 0x01;
    fs::write(&matrix, bytes).unwrap();

    assert!(Verifier::new(layout).run().is_err());
}

#[test]
fn test_failed_chromosome_publishes_no_manifest() {
    let dir = TempDir::new().unwrap();
    let input = SyntheticVcfBuilder::new(3)
        .snps("chr1", &[1, 2, 3], |_, _| "0/1")
        .record("chr2", 10, "A", "G", &["0/1", "0/0", "1/1"])
        .record("chr2", 20, "A", "G", &["0/1", "0/7", "1/1"])
        .record("chr2", 30, "A", "G", &["0/1", "0/0", "1/1"])
        .build(dir.path());
    let out = dir.path().join("out");

    let err = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap_err();
    assert!(err.is_data_error(), "unexpected {err:?}");

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    assert!(!layout.manifest_path().exists());
    let chr2 = layout.chromosome(ChromIdx(1), "chr2");
    assert!(!chr2.exists());
    assert!(!chr2.register("matrix").exists());
}

#[test]
fn test_sample_count_mismatch_is_data_error() {
    let dir = TempDir::new().unwrap();
    let mut builder = SyntheticVcfBuilder::new(3).snps("chr1", &[1, 2], |_, _| "0/0");
    builder
        .records
        .push("chr1\t3\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\n".to_string());
    let input = builder
        .record("chr1", 4, "A", "G", &["0/0", "0/0", "0/0"])
        .build(dir.path());

    let err = ChromosomeScheduler::new(options(&input, &dir.path().join("out"), 1000), None)
        .run()
        .unwrap_err();
    assert!(err.is_data_error(), "unexpected {err:?}");
}

#[test]
fn test_missing_gzi_is_scanned() {
    let dir = TempDir::new().unwrap();
    let with_gzi = TempDir::new().unwrap();
    let input = three_chromosomes(with_gzi.path());
    let expected = BlockIndex::build(&input).unwrap();

    let scanned_input = three_chromosome_builder().without_gzi().build(dir.path());
    assert!(!gzi_path(&scanned_input).exists());

    let genome = ChromosomeScheduler::new(options(&scanned_input, &dir.path().join("out"), 1000), None)
        .run()
        .unwrap();
    assert!(gzi_path(&scanned_input).exists());
    assert_eq!(genome.manifest.genome_snps, 12);

    let scanned = BlockIndex::build(&scanned_input).unwrap();
    assert_eq!(scanned.chromosome_names(), expected.chromosome_names());
    for (a, b) in scanned.locations().iter().zip(expected.locations()) {
        assert_eq!(a.seek_offset(), b.seek_offset());
    }
}

#[test]
fn test_large_blocks_and_positions() {
    let dir = TempDir::new().unwrap();
    let positions: Vec<u64> = (0..40).map(|i| 1 + i * 37).collect();
    let input = SyntheticVcfBuilder::new(4)
        .snps("chr1", &positions, |r, s| ["0/0", "0/1", "1/1"][(r * 7 + s) % 3])
        .snps("chr2", &positions, |r, s| ["0/1", "1/1"][(r + s) % 2])
        .lines_per_block(7)
        .build(dir.path());
    let out = dir.path().join("out");

    let mut opts = options(&input, &out, 500);
    opts.track_positions = true;
    let genome = ChromosomeScheduler::new(opts, None).run().unwrap();
    assert_eq!(genome.manifest.genome_snps, 80);

    let layout = GenomeLayout::new(&input, 500, Some(&out));
    let (meta, chrom) = read_chromosome(&layout.chromosome(ChromIdx(0), "chr1")).unwrap();
    assert!(meta.positions.is_some());
    let widest = chrom.bins.iter().map(|b| b.snp_count).max().unwrap() as usize;
    for bin in &chrom.bins {
        let stored = bin.positions.as_ref().unwrap();
        assert_eq!(stored.len(), widest);
        let recorded = bin.recorded_positions().unwrap();
        assert_eq!(recorded.len() as u64, bin.snp_count);
        assert!(recorded.iter().all(|p| p / 500 == bin.bin_number));
        assert!(stored[recorded.len()..].iter().all(|&p| p == 0));
    }
}

#[test]
fn test_single_record_chromosome_inside_block() {
    let dir = TempDir::new().unwrap();
    let input = SyntheticVcfBuilder::new(2)
        .snps("chr1", &[1, 2], |_, s| ["0/0", "0/1"][s])
        .snps("chr2", &[5], |_, _| "0/1")
        .snps("chr3", &[1, 2, 3], |r, s| ["0/1", "1/1"][(r + s) % 2])
        .lines_per_block(3)
        .build(dir.path());
    let out = dir.path().join("out");

    let genome = ChromosomeScheduler::new(options(&input, &out, 1000), None)
        .run()
        .unwrap();
    assert_eq!(genome.manifest.chromosome_names, vec!["chr1", "chr2", "chr3"]);
    assert_eq!(genome.manifest.genome_snps, 6);
    assert_eq!(genome.manifest.genome_bins, 3);

    let layout = GenomeLayout::new(&input, 1000, Some(&out));
    let (_, chr2) = read_chromosome(&layout.chromosome(ChromIdx(1), "chr2")).unwrap();
    assert_eq!(chr2.chromosome_snps, 1);
    assert_eq!(chr2.bins.len(), 1);
}

#[test]
fn test_stale_location_cache_is_format_error() {
    let dir = TempDir::new().unwrap();
    let input = three_chromosomes(dir.path());
    BlockIndex::rebuild(&input).unwrap();

    let cache = cache_path(&input);
    let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&cache).unwrap()).unwrap();
    json["chromosomes"]
        .as_array_mut()
        .unwrap()
        .retain(|c| c["name"] != "chr2");
    fs::write(&cache, serde_json::to_vec(&json).unwrap()).unwrap();

    let err = ChromosomeScheduler::new(options(&input, &dir.path().join("out"), 1000), None)
        .run()
        .unwrap_err();
    match err {
        SnpBinsError::Format { message } => assert!(message.contains("'chr2'"), "{message}"),
        other => panic!("unexpected {other:?}"),
    }
}
