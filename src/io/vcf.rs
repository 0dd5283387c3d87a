//! # VCF Header and Record Parsing
//!
//! Reads sample names from the VCF header through `noodles` and splits data
//! lines into the columns the aggregation needs. Record lines are parsed by
//! hand: only CHROM, POS, REF, ALT and the sample columns are consulted.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use noodles::bgzf as bgzf_io;
use noodles::vcf::Header;
use tracing::{debug, info_span};

use crate::data::samples::Samples;
use crate::error::{Result, SnpBinsError};

/// Open a VCF as text, inflating BGZF when the extension says so
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    if !path.exists() {
        return Err(SnpBinsError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;

    // Check if gzipped
    let is_gzipped = path
        .extension()
        .map(|e| e == "gz" || e == "bgz")
        .unwrap_or(false);

    Ok(if is_gzipped {
        Box::new(BufReader::new(bgzf_io::Reader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    })
}

/// Read the header block up to and including `#CHROM` and return the samples
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<Samples> {
    let mut header_str = String::new();
    let mut line = String::new();
    let mut line_num = 0usize;
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Err(SnpBinsError::format("VCF header has no #CHROM line"));
        }
        line_num += 1;
        if !line.starts_with('#') {
            return Err(SnpBinsError::parse(
                line_num,
                "record line before the #CHROM header line",
            ));
        }
        header_str.push_str(&line);
        if line.starts_with("#CHROM") {
            break;
        }
    }

    let header: Header = header_str
        .parse()
        .map_err(|e| SnpBinsError::format(format!("invalid VCF header: {}", e)))?;

    let sample_names: Vec<String> = header
        .sample_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    debug!(samples = sample_names.len(), header_lines = line_num, "Parsed VCF header");

    Samples::from_ids(sample_names)
}

/// Open `path` and read its samples
pub fn read_samples(path: &Path) -> Result<Samples> {
    info_span!("vcf_header", path = ?path).in_scope(|| {
        let mut reader = open_text(path)?;
        read_header(&mut reader)
    })
}

/// Borrowed view of one data line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariantRecord<'a> {
    pub chrom: &'a str,
    pub position: u64,
    pub reference: &'a str,
    /// Comma-separated ALT column
    pub alternates: &'a str,
    /// Tab-separated sample columns, FORMAT column excluded
    pub samples: &'a str,
}

impl<'a> VariantRecord<'a> {
    /// Split a tab-delimited data line
    pub fn parse(line: &'a str, line_num: usize) -> Result<Self> {
        let mut fields = line.splitn(10, '\t');
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| SnpBinsError::parse(line_num, format!("missing {} column", name)))
        };

        let chrom = next("CHROM")?;
        let pos = next("POS")?;
        let _id = next("ID")?;
        let reference = next("REF")?;
        let alternates = next("ALT")?;
        let _qual = next("QUAL")?;
        let _filter = next("FILTER")?;
        let _info = next("INFO")?;
        let _format = next("FORMAT")?;
        let samples = next("sample")?;

        let position = pos
            .parse::<u64>()
            .map_err(|_| SnpBinsError::parse(line_num, format!("invalid POS '{}'", pos)))?;

        Ok(Self {
            chrom,
            position,
            reference,
            alternates,
            samples,
        })
    }

    /// Single-base REF and every ALT at most one base
    pub fn is_single_base(&self) -> bool {
        self.reference.len() == 1 && self.alternates.split(',').all(|alt| alt.len() <= 1)
    }
}
