//! # Chromosome Block Locator
//!
//! ## Role
//! Finds, for every chromosome of a BGZF-compressed VCF, the compressed block
//! where a reader should seek to start streaming that chromosome's records.
//! Blocks are inflated one at a time and only split into lines; records are
//! not parsed.
//!
//! ## Algorithm
//! 1. Load the block-offset table (`<vcf>.gzi`, read through `noodles`): a
//!    `u64` entry count followed by `(compressed_offset, uncompressed_offset)`
//!    pairs, all little-endian. The first block `(0, 0)` is implicit. When the
//!    table is missing it is rebuilt by walking the BGZF block headers and
//!    written next to the input.
//! 2. Walk consecutive block boundaries, decompressing one block at a time.
//!    The unfinished last line of a block is carried into the next one, so
//!    every line is seen whole exactly once, in the block where it ends.
//! 3. Every chromosome token seen for the first time records the PREVIOUS
//!    block's boundary as its seek point. A line that ends in block `k` began
//!    in block `k` or `k-1`, so seeking to `k-1` and filtering by name never
//!    misses the first record.
//! 4. The block after the last table entry runs to the end of the file and is
//!    scanned too.
//!
//! The result is cached as JSON in `<vcf>.gzj` and reused on later runs.
//!
//! ## Limits
//! A non-empty block without a single line break is rejected as malformed.
//! This happens when one line is longer than a BGZF block (64 KiB of text),
//! e.g. a `#CHROM` or record line of a cohort with roughly 15 000 or more
//! samples.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use noodles::bgzf::gzi;
use noodles::bgzf as bgzf_io;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::data::genome::FORMAT_VERSION;
use crate::error::{Result, SnpBinsError};

const BGZF_MAGIC: [u8; 4] = [0x1f, 0x8b, 0x08, 0x04];
const BGZF_FIXED_HEADER: usize = 12;

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Path of the block-offset table for a compressed input
pub fn gzi_path(input: &Path) -> PathBuf {
    with_suffix(input, ".gzi")
}

/// Path of the chromosome location cache for a compressed input
pub fn cache_path(input: &Path) -> PathBuf {
    with_suffix(input, ".gzj")
}

/// Read a `.gzi` table, rejecting truncated tables and entries that go
/// backwards
pub fn read_block_offsets(path: &Path) -> Result<gzi::Index> {
    if !path.exists() {
        return Err(SnpBinsError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = File::open(path).map(BufReader::new).map(gzi::io::Reader::new)?;
    let index = reader.read_index().map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => SnpBinsError::format(format!(
            "block-offset table {} is malformed: {}",
            path.display(),
            e
        )),
        _ => SnpBinsError::Io(e),
    })?;

    for pair in index.as_ref().windows(2) {
        let ((c0, u0), (c1, u1)) = (pair[0], pair[1]);
        if c1 < c0 || u1 < u0 {
            return Err(SnpBinsError::format(format!(
                "block-offset table {} entry ({}, {}) is not increasing",
                path.display(),
                c1,
                u1
            )));
        }
    }
    Ok(index)
}

/// Persist a `.gzi` table
pub fn write_block_offsets(path: &Path, index: &gzi::Index) -> Result<()> {
    let mut writer = gzi::io::Writer::new(BufWriter::new(File::create(path)?));
    writer.write_index(index)?;
    writer.get_mut().flush()?;
    Ok(())
}

/// Rebuild the block-offset table by walking BGZF block headers.
///
/// Each block carries its compressed size in the `BC` extra subfield and
/// its uncompressed size in the trailing `ISIZE` word, so no payload is
/// inflated. The end-of-file marker block is listed like any other block.
pub fn scan_block_offsets(bgzf_path: &Path) -> Result<gzi::Index> {
    let file = File::open(bgzf_path)?;
    let file_len = file.metadata()?.len() as usize;
    if file_len == 0 {
        return Ok(gzi::Index::default());
    }
    let mmap = unsafe { Mmap::map(&file)? };

    let mut entries = Vec::new();
    let mut compressed = 0usize;
    let mut uncompressed = 0u64;
    while compressed < file_len {
        let block_size = bgzf_block_size(&mmap[compressed..]).map_err(|message| {
            SnpBinsError::format(format!("BGZF block at offset {}: {}", compressed, message))
        })?;
        let end = compressed + block_size;
        if end > file_len {
            return Err(SnpBinsError::format(format!(
                "BGZF block at offset {} runs past end of file",
                compressed
            )));
        }
        let mut isize_bytes = [0u8; 4];
        isize_bytes.copy_from_slice(&mmap[end - 4..end]);

        if compressed > 0 {
            entries.push((compressed as u64, uncompressed));
        }
        uncompressed += u32::from_le_bytes(isize_bytes) as u64;
        compressed = end;
    }
    Ok(gzi::Index::from(entries))
}

/// Total size of the BGZF block starting at `bytes[0]`
fn bgzf_block_size(bytes: &[u8]) -> std::result::Result<usize, String> {
    if bytes.len() < BGZF_FIXED_HEADER || bytes[..4] != BGZF_MAGIC {
        return Err("not a BGZF block header".to_string());
    }
    let xlen = u16::from_le_bytes([bytes[10], bytes[11]]) as usize;
    let extra_end = BGZF_FIXED_HEADER + xlen;
    if bytes.len() < extra_end {
        return Err("truncated extra field".to_string());
    }

    let mut pos = BGZF_FIXED_HEADER;
    while pos + 4 <= extra_end {
        let (si1, si2) = (bytes[pos], bytes[pos + 1]);
        let slen = u16::from_le_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if si1 == b'B' && si2 == b'C' && slen == 2 && pos + 6 <= extra_end {
            let block_size = u16::from_le_bytes([bytes[pos + 4], bytes[pos + 5]]) as usize + 1;
            if block_size < extra_end + 8 {
                return Err(format!("block size {} smaller than its header", block_size));
            }
            return Ok(block_size);
        }
        pos += 4 + slen;
    }
    Err("missing BC subfield".to_string())
}

/// Where one chromosome begins in the compressed input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromosomeLocation {
    pub name: String,
    /// Index of the block boundary at which the chromosome was first seen
    pub entry_num: u64,
    pub previous_compressed_offset: u64,
    pub previous_uncompressed_offset: u64,
    pub previous_compressed_size: u64,
    pub previous_uncompressed_size: u64,
    pub current_compressed_offset: u64,
    pub current_uncompressed_offset: u64,
    pub current_compressed_size: u64,
    pub current_uncompressed_size: u64,
}

impl ChromosomeLocation {
    /// Compressed offset a stream for this chromosome seeks to
    pub fn seek_offset(&self) -> u64 {
        self.previous_compressed_offset
    }
}

#[derive(Serialize, Deserialize)]
struct LocatorCache {
    format_version: u32,
    input_len: u64,
    chromosomes: Vec<ChromosomeLocation>,
}

#[derive(Clone, Copy, Debug, Default)]
struct BlockSpan {
    compressed_offset: u64,
    uncompressed_offset: u64,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Ordered chromosome locations for one compressed input
#[derive(Clone, Debug)]
pub struct BlockIndex {
    locations: Vec<ChromosomeLocation>,
}

impl BlockIndex {
    /// Load the cached locations, or build and cache them
    pub fn open(input: &Path) -> Result<Self> {
        let cache = cache_path(input);
        if cache.exists() {
            match Self::load(&cache, input) {
                Ok(index) => {
                    debug!(path = ?cache, chromosomes = index.len(), "Loaded chromosome locations");
                    return Ok(index);
                }
                Err(e) => warn!(path = ?cache, error = %e, "Ignoring stale chromosome location cache"),
            }
        }
        Self::rebuild(input)
    }

    /// Build from the block-offset table and overwrite the cache
    pub fn rebuild(input: &Path) -> Result<Self> {
        let index = Self::build(input)?;
        index.save(&cache_path(input), input)?;
        Ok(index)
    }

    /// Build without touching the cache
    pub fn build(input: &Path) -> Result<Self> {
        info_span!("block_index", path = ?input).in_scope(|| {
            if !input.exists() {
                return Err(SnpBinsError::FileNotFound {
                    path: input.to_path_buf(),
                });
            }
            let gzi = gzi_path(input);
            let offsets = if gzi.exists() {
                read_block_offsets(&gzi)?
            } else {
                info!(path = ?gzi, "Block-offset table missing, scanning BGZF blocks");
                let offsets = scan_block_offsets(input)?;
                write_block_offsets(&gzi, &offsets)?;
                offsets
            };
            let file_len = fs::metadata(input)?.len();
            let mut file = File::open(input)?;
            let index = Self::from_offsets(&mut file, file_len, &offsets)?;
            info!(
                blocks = offsets.as_ref().len() + 1,
                chromosomes = index.len(),
                "Located chromosome blocks"
            );
            Ok(index)
        })
    }

    /// Scan every block of `source` named by `offsets`
    pub fn from_offsets<R: Read + Seek>(
        source: &mut R,
        file_len: u64,
        offsets: &gzi::Index,
    ) -> Result<Self> {
        let mut locations: Vec<ChromosomeLocation> = Vec::new();
        let mut previous = BlockSpan::default();
        let mut current = BlockSpan::default();
        let mut last_scanned: Option<(u64, BlockSpan, BlockSpan)> = None;
        let mut carry = Vec::new();
        let mut buf = Vec::new();

        let boundaries = offsets
            .as_ref()
            .iter()
            .map(|&(c, u)| (c, Some(u)))
            .chain(std::iter::once((file_len, None)));

        for (entry_num, (next_compressed, next_uncompressed)) in boundaries.enumerate() {
            let entry_num = entry_num as u64;
            if next_compressed < current.compressed_offset || next_compressed > file_len {
                return Err(SnpBinsError::format(format!(
                    "block boundary {} outside [{}, {}]",
                    next_compressed, current.compressed_offset, file_len
                )));
            }
            current.compressed_size = next_compressed - current.compressed_offset;
            current.uncompressed_size = next_uncompressed
                .map(|u| u.saturating_sub(current.uncompressed_offset))
                .unwrap_or(0);

            if current.compressed_size > 0 {
                let text = read_block(source, &current, next_uncompressed.is_some(), &mut buf)?;
                if !text.is_empty() {
                    for name in block_chromosomes(text, &mut carry, current.compressed_offset)? {
                        locate(&mut locations, name, entry_num, &previous, &current);
                    }
                    last_scanned = Some((entry_num, previous, current));
                }
            }

            previous = current;
            current = BlockSpan {
                compressed_offset: next_compressed,
                uncompressed_offset: next_uncompressed.unwrap_or(current.uncompressed_offset),
                ..BlockSpan::default()
            };
        }

        // Input that does not end with a line break
        if let Some((entry_num, previous, current)) = last_scanned.filter(|_| !carry.is_empty()) {
            let mut names = Vec::new();
            note_chromosome(&carry, current.compressed_offset, &mut names)?;
            for name in names {
                locate(&mut locations, name, entry_num, &previous, &current);
            }
        }

        Ok(Self { locations })
    }

    fn load(path: &Path, input: &Path) -> Result<Self> {
        let cache: LocatorCache = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let input_len = fs::metadata(input)?.len();
        if cache.format_version != FORMAT_VERSION || cache.input_len != input_len {
            return Err(SnpBinsError::format(format!(
                "cache written for version {} / {} bytes, input is version {} / {} bytes",
                cache.format_version, cache.input_len, FORMAT_VERSION, input_len
            )));
        }
        let mut chromosomes = cache.chromosomes;
        chromosomes.sort_by_key(|l| l.entry_num);
        Ok(Self {
            locations: chromosomes,
        })
    }

    fn save(&self, path: &Path, input: &Path) -> Result<()> {
        let cache = LocatorCache {
            format_version: FORMAT_VERSION,
            input_len: fs::metadata(input)?.len(),
            chromosomes: self.locations.clone(),
        };
        let mut file = File::create(path)?;
        serde_json::to_writer_pretty(&mut file, &cache)?;
        file.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Locations in first-appearance order
    pub fn locations(&self) -> &[ChromosomeLocation] {
        &self.locations
    }

    pub fn chromosome_names(&self) -> Vec<String> {
        self.locations.iter().map(|l| l.name.clone()).collect()
    }

    pub fn location(&self, name: &str) -> Option<&ChromosomeLocation> {
        self.locations.iter().find(|l| l.name == name)
    }
}

/// Inflate the block(s) in `span`; `exact` checks the inflated length
fn read_block<'a, R: Read + Seek>(
    source: &mut R,
    span: &BlockSpan,
    exact: bool,
    buf: &'a mut Vec<u8>,
) -> Result<&'a [u8]> {
    source.seek(SeekFrom::Start(span.compressed_offset))?;
    let mut compressed = vec![0u8; span.compressed_size as usize];
    source.read_exact(&mut compressed)?;

    buf.clear();
    let mut reader = bgzf_io::Reader::new(&compressed[..]);
    reader.read_to_end(buf).map_err(|e| {
        SnpBinsError::format(format!(
            "cannot inflate block at offset {}: {}",
            span.compressed_offset, e
        ))
    })?;

    if exact && buf.len() as u64 != span.uncompressed_size {
        return Err(SnpBinsError::format(format!(
            "block at offset {} inflates to {} bytes, table says {}",
            span.compressed_offset,
            buf.len(),
            span.uncompressed_size
        )));
    }
    Ok(&buf[..])
}

/// Record `name` at its first sighting, seeking to the block before the
/// one it was seen in
fn locate(
    locations: &mut Vec<ChromosomeLocation>,
    name: String,
    entry_num: u64,
    previous: &BlockSpan,
    current: &BlockSpan,
) {
    if locations.iter().any(|l| l.name == name) {
        return;
    }
    debug!(chromosome = %name, entry_num, "First sighting");
    locations.push(ChromosomeLocation {
        name,
        entry_num,
        previous_compressed_offset: previous.compressed_offset,
        previous_uncompressed_offset: previous.uncompressed_offset,
        previous_compressed_size: previous.compressed_size,
        previous_uncompressed_size: previous.uncompressed_size,
        current_compressed_offset: current.compressed_offset,
        current_uncompressed_offset: current.uncompressed_offset,
        current_compressed_size: current.compressed_size,
        current_uncompressed_size: current.uncompressed_size,
    });
}

/// Chromosome tokens of the lines ending in one block, in order of first
/// appearance.
///
/// `carry` holds the unfinished last line of the previous block. This block's
/// first line completes it, and this block's own unfinished tail replaces it.
/// A non-empty block with no line break at all is a format error.
fn block_chromosomes(text: &[u8], carry: &mut Vec<u8>, block_offset: u64) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if text.is_empty() {
        return Ok(names);
    }
    let Some(first_newline) = text.iter().position(|&b| b == b'\n') else {
        return Err(SnpBinsError::format(format!(
            "block at offset {} holds no line break; lines longer than one BGZF block \
             (64 KiB) are not supported",
            block_offset
        )));
    };

    carry.extend_from_slice(&text[..first_newline]);
    let completed = std::mem::take(carry);
    note_chromosome(&completed, block_offset, &mut names)?;

    let mut rest = &text[first_newline + 1..];
    while let Some(end) = rest.iter().position(|&b| b == b'\n') {
        note_chromosome(&rest[..end], block_offset, &mut names)?;
        rest = &rest[end + 1..];
    }
    carry.extend_from_slice(rest);
    Ok(names)
}

/// Add the chromosome token of one complete line to `names` if it is new.
///
/// Header and blank lines are ignored. A data line without a tab, or with an
/// empty first column, is a format error.
fn note_chromosome(line: &[u8], block_offset: u64, names: &mut Vec<String>) -> Result<()> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() || line[0] == b'#' {
        return Ok(());
    }
    let Some(tab) = line.iter().position(|&b| b == b'\t') else {
        return Err(SnpBinsError::format(format!(
            "block at offset {}: record line has no tab delimiter",
            block_offset
        )));
    };
    if tab == 0 {
        return Err(SnpBinsError::format(format!(
            "block at offset {}: record line has an empty chromosome",
            block_offset
        )));
    }
    let name = std::str::from_utf8(&line[..tab]).map_err(|_| {
        SnpBinsError::format(format!(
            "block at offset {}: chromosome name is not UTF-8",
            block_offset
        ))
    })?;
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
    Ok(())
}
