//! # Chromosome Artifacts
//!
//! ## Role
//! Deterministic on-disk layout for one genome build and the per-chromosome
//! write/reload pair.
//!
//! ## Layout
//! ```text
//! <input>_ib/<bin_width>/
//!   <input name>.genome.json           manifest, written last
//!   <input name>.rollup.{bin,idx}      genome rollup matrix
//!   ib_000000.<chrom>.matrix.{bin,idx}     one record per bin, matrix_size values
//!   ib_000000.<chrom>.totals.{bin,idx}     one record per bin, sample_count values
//!   ib_000000.<chrom>.bins.{bin,idx}       4 records of bin_count values:
//!                                          bin numbers, snp counts, first, last
//!   ib_000000.<chrom>.positions.{bin,idx}  optional, one padded record per bin
//!   ib_000000.<chrom>.rollup.{bin,idx}     matrix rollup
//!   ib_000000.<chrom>.rollup_totals.{bin,idx}
//!   ib_000000.<chrom>.meta.json            metadata, written last
//! ```
//!
//! A chromosome artifact exists once its `meta.json` exists.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::data::chromosome::{Bin, Chromosome, ChromosomeSummary};
use crate::data::counters::{CounterWidth, Counters, WidthPolicy};
use crate::data::genome::{GenomeManifest, FORMAT_VERSION};
use crate::data::triangle::matrix_size;
use crate::data::ChromIdx;
use crate::error::{Result, SnpBinsError};
use crate::io::register::{index_path, record_size, write_register, RegisterIndex, RegisterReader};

/// Root directory and naming for one `(input, bin_width)` build
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenomeLayout {
    root: PathBuf,
    input_name: String,
}

impl GenomeLayout {
    /// `out_dir` replaces the default `<input>_ib` directory
    pub fn new(input: &Path, bin_width: u64, out_dir: Option<&Path>) -> Self {
        let input_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let base = match out_dir {
            Some(dir) => dir.to_path_buf(),
            None => {
                let mut s = input.as_os_str().to_owned();
                s.push("_ib");
                PathBuf::from(s)
            }
        };
        Self {
            root: base.join(bin_width.to_string()),
            input_name,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(format!("{}.genome.json", self.input_name))
    }

    pub fn genome_rollup_path(&self) -> PathBuf {
        self.root.join(format!("{}.rollup.bin", self.input_name))
    }

    pub fn chromosome(&self, order: ChromIdx, name: &str) -> ArtifactPaths {
        ArtifactPaths {
            base: self
                .root
                .join(format!("ib_{:06}.{}", order.as_usize(), sanitize(name))),
        }
    }

    pub fn read_manifest(&self) -> Result<GenomeManifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(SnpBinsError::FileNotFound { path });
        }
        let manifest: GenomeManifest =
            serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(SnpBinsError::format(format!(
                "manifest {} has version {}, expected {}",
                path.display(),
                manifest.format_version,
                FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }

    pub fn write_manifest(&self, manifest: &GenomeManifest) -> Result<()> {
        write_json_atomic(&self.manifest_path(), manifest)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// File names of one chromosome artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    base: PathBuf,
}

impl ArtifactPaths {
    fn with(&self, suffix: &str) -> PathBuf {
        let mut s = self.base.as_os_str().to_owned();
        s.push(suffix);
        PathBuf::from(s)
    }

    pub fn register(&self, family: &str) -> PathBuf {
        self.with(&format!(".{}.bin", family))
    }

    pub fn meta(&self) -> PathBuf {
        self.with(".meta.json")
    }

    pub fn exists(&self) -> bool {
        self.meta().exists()
    }

    /// Every file the artifact may own
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.meta()];
        for family in [MATRIX, TOTALS, BINS, POSITIONS, ROLLUP, ROLLUP_TOTALS] {
            let data = self.register(family);
            files.push(index_path(&data));
            files.push(data);
        }
        files
    }
}

const MATRIX: &str = "matrix";
const TOTALS: &str = "totals";
const BINS: &str = "bins";
const POSITIONS: &str = "positions";
const ROLLUP: &str = "rollup";
const ROLLUP_TOTALS: &str = "rollup_totals";

/// Stored shape and value range of one register family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyInfo {
    pub width_bits: u8,
    pub max_value: u64,
    pub records: u64,
    pub data_length: u64,
}

impl FamilyInfo {
    fn width(&self) -> Result<CounterWidth> {
        CounterWidth::from_bits(self.width_bits)
            .ok_or_else(|| SnpBinsError::format(format!("invalid width {}", self.width_bits)))
    }
}

/// Width selection applied when writing a chromosome
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArtifactWidths {
    pub matrix: WidthPolicy,
    pub totals: WidthPolicy,
    pub positions: WidthPolicy,
}

/// Versioned metadata block of a chromosome artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromosomeMeta {
    pub format_version: u32,
    pub input_name: String,
    pub chromosome_order: usize,
    pub chromosome_name: String,
    pub bin_width: u64,
    pub sample_names: Vec<String>,
    pub sample_count: usize,
    pub matrix_size: usize,
    pub bin_count: u64,
    pub bin_min: Option<u64>,
    pub bin_max: Option<u64>,
    pub bin_snps_min: u64,
    pub bin_snps_max: u64,
    pub chromosome_snps: u64,
    pub first_position: u64,
    pub last_position: u64,
    pub skipped_records: u64,
    pub matrix: FamilyInfo,
    pub totals: FamilyInfo,
    pub bins: FamilyInfo,
    pub positions: Option<FamilyInfo>,
    pub rollup_matrix: FamilyInfo,
    pub rollup_totals: FamilyInfo,
}

impl ChromosomeMeta {
    pub fn summary(&self) -> ChromosomeSummary {
        ChromosomeSummary {
            order: self.chromosome_order,
            name: self.chromosome_name.clone(),
            bin_count: self.bin_count,
            chromosome_snps: self.chromosome_snps,
        }
    }
}

pub fn read_meta(paths: &ArtifactPaths) -> Result<ChromosomeMeta> {
    let path = paths.meta();
    if !path.exists() {
        return Err(SnpBinsError::FileNotFound { path });
    }
    let meta: ChromosomeMeta = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
    if meta.format_version != FORMAT_VERSION {
        return Err(SnpBinsError::format(format!(
            "{} has version {}, expected {}",
            path.display(),
            meta.format_version,
            FORMAT_VERSION
        )));
    }
    Ok(meta)
}

/// File width for a family: the pinned width, or the widest bin
fn family_width(policy: WidthPolicy, widths: impl Iterator<Item = CounterWidth>) -> CounterWidth {
    match policy {
        WidthPolicy::Fixed(w) => w,
        WidthPolicy::Auto => widths.max().unwrap_or(CounterWidth::U16),
    }
}

fn write_family(
    path: &Path,
    width: CounterWidth,
    data_length: usize,
    records: &[Counters],
) -> Result<FamilyInfo> {
    let records_written = write_register(path, width, data_length as u64, records)?;
    Ok(FamilyInfo {
        width_bits: width.bits(),
        max_value: records.iter().map(|r| r.max_value()).max().unwrap_or(0),
        records: records_written,
        data_length: data_length as u64,
    })
}

/// Write every register of `chrom` and then its metadata
pub fn write_chromosome(
    paths: &ArtifactPaths,
    chrom: &Chromosome,
    input_name: &str,
    sample_names: &[String],
    widths: ArtifactWidths,
) -> Result<ChromosomeMeta> {
    info_span!("write_chromosome", chromosome = %chrom.name).in_scope(|| {
        let n = chrom.sample_count;
        let size = chrom.matrix_size();

        let matrices: Vec<Counters> = chrom.bins.iter().map(|b| b.matrix.clone()).collect();
        let matrix_width = family_width(widths.matrix, matrices.iter().map(|c| c.width()));
        let matrix = write_family(&paths.register(MATRIX), matrix_width, size, &matrices)?;

        let totals: Vec<Counters> = chrom.bins.iter().map(|b| b.totals.clone()).collect();
        let totals_width = family_width(widths.totals, totals.iter().map(|c| c.width()));
        let totals = write_family(&paths.register(TOTALS), totals_width, n, &totals)?;

        let columns: [Vec<u64>; 4] = [
            chrom.bins.iter().map(|b| b.bin_number).collect(),
            chrom.bins.iter().map(|b| b.snp_count).collect(),
            chrom.bins.iter().map(|b| b.first_position).collect(),
            chrom.bins.iter().map(|b| b.last_position).collect(),
        ];
        let column_max = columns.iter().flatten().copied().max().unwrap_or(0);
        let bins_width = CounterWidth::smallest_for(column_max);
        let bin_records = columns
            .iter()
            .map(|c| Counters::with_width(BINS, c, bins_width))
            .collect::<Result<Vec<_>>>()?;
        let bins = write_family(&paths.register(BINS), bins_width, chrom.bins.len(), &bin_records)?;

        let positions = if chrom.has_positions() {
            let padded: Vec<&Vec<u64>> = chrom
                .bins
                .iter()
                .map(|b| {
                    b.positions.as_ref().ok_or_else(|| {
                        SnpBinsError::data(format!(
                            "bin {} of {} has no positions",
                            b.bin_number, chrom.name
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            let length = padded.first().map(|p| p.len()).unwrap_or(0);
            let max_pos = padded.iter().flat_map(|p| p.iter()).copied().max().unwrap_or(0);
            let width = widths.positions.resolve(POSITIONS, max_pos)?;
            let records = padded
                .iter()
                .map(|p| Counters::with_width(POSITIONS, p, width))
                .collect::<Result<Vec<_>>>()?;
            Some(write_family(&paths.register(POSITIONS), width, length, &records)?)
        } else {
            None
        };

        let rollup = Counters::freeze(ROLLUP, &chrom.rollup_matrix(), WidthPolicy::Auto)?;
        let rollup_matrix =
            write_family(&paths.register(ROLLUP), rollup.width(), size, &[rollup])?;
        let rollup_t = Counters::freeze(ROLLUP_TOTALS, &chrom.rollup_totals(), WidthPolicy::Auto)?;
        let rollup_totals =
            write_family(&paths.register(ROLLUP_TOTALS), rollup_t.width(), n, &[rollup_t])?;

        let meta = ChromosomeMeta {
            format_version: FORMAT_VERSION,
            input_name: input_name.to_string(),
            chromosome_order: chrom.order,
            chromosome_name: chrom.name.clone(),
            bin_width: chrom.bin_width,
            sample_names: sample_names.to_vec(),
            sample_count: n,
            matrix_size: size,
            bin_count: chrom.bin_count(),
            bin_min: chrom.bin_min(),
            bin_max: chrom.bin_max(),
            bin_snps_min: chrom.bin_snps_min(),
            bin_snps_max: chrom.bin_snps_max(),
            chromosome_snps: chrom.chromosome_snps,
            first_position: chrom.first_position,
            last_position: chrom.last_position,
            skipped_records: chrom.skipped_records,
            matrix,
            totals,
            bins,
            positions,
            rollup_matrix,
            rollup_totals,
        };
        write_json_atomic(&paths.meta(), &meta)?;
        debug!(path = ?paths.meta(), bins = meta.bin_count, "Wrote chromosome artifact");
        Ok(meta)
    })
}

/// Open a register, checking its shape against the metadata and its index
fn open_family(path: &Path, info: &FamilyInfo, family: &str) -> Result<RegisterReader> {
    let width = info.width()?;
    let expected_size = record_size(width, info.data_length)?;
    let reader = RegisterReader::open(path)?;
    if reader.num_registers() != info.records
        || reader.record_size() != expected_size
        || reader.data_length() != info.data_length
        || reader.width() != width
    {
        return Err(SnpBinsError::format(format!(
            "{} register {} holds {} x {} at {}, metadata says {} x {} at {}",
            family,
            path.display(),
            reader.num_registers(),
            reader.data_length(),
            reader.width(),
            info.records,
            info.data_length,
            width
        )));
    }
    RegisterIndex::open(&index_path(path))?.check_against(&reader)?;
    Ok(reader)
}

fn load_assert(ok: bool, what: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(SnpBinsError::format(what()))
    }
}

/// Fully reload a chromosome artifact with its load-time shape checks
pub fn read_chromosome(paths: &ArtifactPaths) -> Result<(ChromosomeMeta, Chromosome)> {
    let meta = read_meta(paths)?;
    let name = meta.chromosome_name.clone();
    let bin_count = meta.bin_count as usize;

    load_assert(meta.sample_names.len() == meta.sample_count, || {
        format!("{}: {} sample names for sample_count {}", name, meta.sample_names.len(), meta.sample_count)
    })?;
    load_assert(matrix_size(meta.sample_count) == meta.matrix_size, || {
        format!("{}: matrix_size {} does not fit {} samples", name, meta.matrix_size, meta.sample_count)
    })?;
    load_assert(meta.matrix.records == meta.bin_count && meta.totals.records == meta.bin_count, || {
        format!("{}: per-bin registers do not hold {} records", name, meta.bin_count)
    })?;
    load_assert(meta.matrix.data_length == meta.matrix_size as u64, || {
        format!("{}: matrix data length {} != matrix_size {}", name, meta.matrix.data_length, meta.matrix_size)
    })?;
    load_assert(meta.totals.data_length == meta.sample_count as u64, || {
        format!("{}: totals data length {} != sample_count {}", name, meta.totals.data_length, meta.sample_count)
    })?;
    load_assert(meta.bins.records == 4 && meta.bins.data_length == meta.bin_count, || {
        format!("{}: bin table shape {} x {}", name, meta.bins.records, meta.bins.data_length)
    })?;

    let matrices = open_family(&paths.register(MATRIX), &meta.matrix, MATRIX)?.read_all()?;
    let totals = open_family(&paths.register(TOTALS), &meta.totals, TOTALS)?.read_all()?;
    let columns = open_family(&paths.register(BINS), &meta.bins, BINS)?.read_all()?;
    let positions = match &meta.positions {
        Some(info) => {
            load_assert(info.records == meta.bin_count, || {
                format!("{}: positions register does not hold {} records", name, meta.bin_count)
            })?;
            Some(open_family(&paths.register(POSITIONS), info, POSITIONS)?.read_all()?)
        }
        None => None,
    };

    let mut bins = Vec::with_capacity(bin_count);
    let mut matrices = matrices.into_iter();
    let mut totals = totals.into_iter();
    let mut positions = positions.map(|p| p.into_iter());
    for k in 0..bin_count {
        let (Some(matrix), Some(totals)) = (matrices.next(), totals.next()) else {
            return Err(SnpBinsError::format(format!("{}: bin {} missing", name, k)));
        };
        let bin_positions = match positions.as_mut() {
            Some(iter) => Some(
                iter.next()
                    .ok_or_else(|| SnpBinsError::format(format!("{}: positions for bin {} missing", name, k)))?
                    .to_u64_vec(),
            ),
            None => None,
        };
        bins.push(Bin {
            bin_number: columns[0].get(k),
            snp_count: columns[1].get(k),
            first_position: columns[2].get(k),
            last_position: columns[3].get(k),
            matrix,
            totals,
            positions: bin_positions,
        });
    }

    load_assert(bins.windows(2).all(|w| w[0].bin_number < w[1].bin_number), || {
        format!("{}: bin numbers are not strictly increasing", name)
    })?;
    if meta.bin_width > 0 {
        load_assert(
            meta.bin_min == bins.first().map(|b| b.bin_number)
                && meta.bin_max == bins.last().map(|b| b.bin_number),
            || format!("{}: bin_min/bin_max disagree with the bin table", name),
        )?;
        if let (Some(first), Some(last)) = (bins.first(), bins.last()) {
            load_assert(
                first.bin_number == meta.first_position / meta.bin_width
                    && last.bin_number == meta.last_position / meta.bin_width,
                || format!("{}: first/last positions fall outside bin_min/bin_max", name),
            )?;
        }
    }

    let chrom = Chromosome {
        order: meta.chromosome_order,
        name,
        bin_width: meta.bin_width,
        sample_count: meta.sample_count,
        bins,
        chromosome_snps: meta.chromosome_snps,
        first_position: meta.first_position,
        last_position: meta.last_position,
        skipped_records: meta.skipped_records,
    };
    Ok((meta, chrom))
}

/// Stored chromosome rollup matrix and totals
pub fn read_rollups(paths: &ArtifactPaths, meta: &ChromosomeMeta) -> Result<(Vec<u64>, Vec<u64>)> {
    let matrix = open_family(&paths.register(ROLLUP), &meta.rollup_matrix, ROLLUP)?.read(0)?;
    let totals =
        open_family(&paths.register(ROLLUP_TOTALS), &meta.rollup_totals, ROLLUP_TOTALS)?.read(0)?;
    Ok((matrix.data.to_u64_vec(), totals.data.to_u64_vec()))
}

/// Write the genome rollup matrix next to the manifest
pub fn write_genome_rollup(layout: &GenomeLayout, rollup: &[u64]) -> Result<()> {
    let counters = Counters::freeze(ROLLUP, rollup, WidthPolicy::Auto)?;
    write_register(
        &layout.genome_rollup_path(),
        counters.width(),
        rollup.len() as u64,
        &[counters],
    )?;
    Ok(())
}

pub fn read_genome_rollup(layout: &GenomeLayout) -> Result<Vec<u64>> {
    let path = layout.genome_rollup_path();
    let reader = RegisterReader::open(&path)?;
    RegisterIndex::open(&index_path(&path))?.check_against(&reader)?;
    if reader.num_registers() != 1 {
        return Err(SnpBinsError::format(format!(
            "genome rollup {} holds {} records, expected 1",
            path.display(),
            reader.num_registers()
        )));
    }
    Ok(reader.read(0)?.data.to_u64_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chromosome(track_positions: bool) -> Chromosome {
        let bin = |bin_number: u64, snps: u64, first: u64, last: u64, m: &[u64], t: &[u64]| Bin {
            bin_number,
            snp_count: snps,
            first_position: first,
            last_position: last,
            matrix: Counters::freeze("matrix", m, WidthPolicy::Auto).unwrap(),
            totals: Counters::freeze("totals", t, WidthPolicy::Auto).unwrap(),
            positions: track_positions.then(|| {
                let mut p: Vec<u64> = (0..snps).map(|k| first + k).collect();
                p.resize(5, 0);
                p
            }),
        };
        Chromosome {
            order: 2,
            name: "chr3".to_string(),
            bin_width: 100,
            sample_count: 3,
            bins: vec![
                bin(0, 3, 10, 12, &[4, 2, 0], &[6, 4, 2]),
                bin(2, 5, 200, 204, &[70_000, 1, 2], &[70_001, 70_002, 3]),
            ],
            chromosome_snps: 8,
            first_position: 10,
            last_position: 204,
            skipped_records: 1,
        }
    }

    fn names() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    #[test]
    fn test_layout_naming() {
        let layout = GenomeLayout::new(Path::new("/data/cohort.vcf.gz"), 250_000, None);
        assert_eq!(layout.root(), Path::new("/data/cohort.vcf.gz_ib/250000"));
        assert_eq!(
            layout.manifest_path(),
            Path::new("/data/cohort.vcf.gz_ib/250000/cohort.vcf.gz.genome.json")
        );
        let paths = layout.chromosome(ChromIdx::new(3), "chr1");
        assert_eq!(
            paths.meta(),
            Path::new("/data/cohort.vcf.gz_ib/250000/ib_000003.chr1.meta.json")
        );
        assert_eq!(
            paths.register("matrix"),
            Path::new("/data/cohort.vcf.gz_ib/250000/ib_000003.chr1.matrix.bin")
        );
        let odd = layout.chromosome(ChromIdx::new(0), "HLA/A*01");
        assert!(odd.meta().to_string_lossy().contains("ib_000000.HLA_A_01.meta.json"));
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GenomeLayout::new(Path::new("x.vcf.gz"), 100, Some(dir.path()));
        layout.create_dirs().unwrap();
        let paths = layout.chromosome(ChromIdx::new(2), "chr3");
        assert!(!paths.exists());

        let chrom = chromosome(true);
        let meta =
            write_chromosome(&paths, &chrom, "x.vcf.gz", &names(), ArtifactWidths::default()).unwrap();
        assert!(paths.exists());
        assert_eq!(meta.matrix.width_bits, 32);
        assert_eq!(meta.matrix.max_value, 70_000);
        assert_eq!(meta.bin_min, Some(0));
        assert_eq!(meta.bin_max, Some(2));
        assert_eq!(meta.bin_snps_max, 5);

        let (loaded_meta, loaded) = read_chromosome(&paths).unwrap();
        assert_eq!(loaded_meta, meta);
        assert_eq!(loaded.bins.len(), 2);
        assert_eq!(loaded.bins[1].matrix.to_u64_vec(), vec![70_000, 1, 2]);
        assert_eq!(loaded.bins[0].matrix.width(), CounterWidth::U32);
        assert_eq!(loaded.bins[1].positions.as_deref(), Some(&[200, 201, 202, 203, 204][..]));
        assert_eq!(loaded.rollup_matrix(), chrom.rollup_matrix());

        let (rollup, rollup_totals) = read_rollups(&paths, &meta).unwrap();
        assert_eq!(rollup, vec![70_004, 3, 2]);
        assert_eq!(rollup_totals, chrom.rollup_totals());
    }

    #[test]
    fn test_truncated_register_fails_reload() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GenomeLayout::new(Path::new("x.vcf.gz"), 100, Some(dir.path()));
        layout.create_dirs().unwrap();
        let paths = layout.chromosome(ChromIdx::new(2), "chr3");
        write_chromosome(&paths, &chromosome(false), "x.vcf.gz", &names(), ArtifactWidths::default())
            .unwrap();

        let totals = paths.register("totals");
        let len = fs::metadata(&totals).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(&totals)
            .unwrap()
            .set_len(len - 3)
            .unwrap();
        assert!(matches!(
            read_chromosome(&paths),
            Err(SnpBinsError::Format { .. })
        ));
    }

    #[test]
    fn test_pinned_positions_width_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GenomeLayout::new(Path::new("x.vcf.gz"), 100, Some(dir.path()));
        layout.create_dirs().unwrap();
        let paths = layout.chromosome(ChromIdx::new(0), "chr3");
        let mut chrom = chromosome(true);
        if let Some(p) = chrom.bins[1].positions.as_mut() {
            p[0] = 100_000;
        }
        let widths = ArtifactWidths {
            positions: WidthPolicy::Fixed(CounterWidth::U16),
            ..ArtifactWidths::default()
        };
        let err = write_chromosome(&paths, &chrom, "x.vcf.gz", &names(), widths).unwrap_err();
        assert!(matches!(err, SnpBinsError::Overflow { .. }));
        assert!(!paths.exists());
    }
}
