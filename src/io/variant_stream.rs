//! # Per-Chromosome Variant Stream
//!
//! Yields the raw data lines of exactly one chromosome, starting from the
//! compressed block the locator chose. The stream:
//! - skips header and blank lines;
//! - when it did not start at the top of the file, discards its first line,
//!   which may be the tail of a line begun in an earlier block;
//! - skips lines of other chromosomes until the first match;
//! - ends at the first non-matching line after a match, or at end of input.
//!
//! Contiguity of a chromosome's records in the input is assumed. Given the
//! set of chromosomes the block index located, a line naming any other
//! chromosome is a format error, so a stale or incomplete index cannot drop
//! records silently.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use noodles::bgzf as bgzf_io;
use tracing::warn;

use crate::error::{Result, SnpBinsError};
use crate::io::block_index::ChromosomeLocation;

/// Lazy sequence of one chromosome's record lines
pub struct VariantStream {
    reader: Box<dyn BufRead + Send>,
    chromosome: String,
    known: Option<Arc<HashSet<String>>>,
    discard_first: bool,
    found: bool,
    done: bool,
    lines_read: usize,
    line: String,
}

impl VariantStream {
    /// Open `input` at the location's seek offset
    pub fn open(input: &Path, location: &ChromosomeLocation) -> Result<Self> {
        if !input.exists() {
            return Err(SnpBinsError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
        let mut file = File::open(input)?;
        let offset = location.seek_offset();
        file.seek(SeekFrom::Start(offset))?;
        let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(bgzf_io::Reader::new(file)));
        Ok(Self::from_reader(reader, &location.name, offset != 0))
    }

    /// Stream over already-positioned text; `discard_first` drops the first line
    pub fn from_reader(
        reader: Box<dyn BufRead + Send>,
        chromosome: &str,
        discard_first: bool,
    ) -> Self {
        Self {
            reader,
            chromosome: chromosome.to_string(),
            known: None,
            discard_first,
            found: false,
            done: false,
            lines_read: 0,
            line: String::new(),
        }
    }

    /// Reject lines whose chromosome is not in `known`
    pub fn with_known_chromosomes(mut self, known: Arc<HashSet<String>>) -> Self {
        self.known = Some(known);
        self
    }

    /// Lines consumed from the underlying reader so far
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Next matching line without allocating; `None` once the chromosome ends
    pub fn next_line(&mut self) -> Result<Option<&str>> {
        if self.done {
            return Ok(None);
        }
        loop {
            self.line.clear();
            let bytes_read = self.reader.read_line(&mut self.line)?;
            if bytes_read == 0 {
                self.done = true;
                return Ok(None);
            }
            self.lines_read += 1;

            if self.discard_first && self.lines_read == 1 {
                continue;
            }
            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(tab) = line.find('\t') else {
                warn!(
                    chromosome = %self.chromosome,
                    line = self.lines_read,
                    "Skipping line without tab delimiter"
                );
                continue;
            };

            let token = &line[..tab];
            if token == self.chromosome {
                self.found = true;
                let len = line.len();
                return Ok(Some(&self.line[..len]));
            }
            if let Some(known) = &self.known {
                if !known.contains(token) {
                    return Err(SnpBinsError::format(format!(
                        "line {} after the seek point of {} names chromosome '{}', which the \
                         block index does not list; rebuild it with `snpbins index`",
                        self.lines_read, self.chromosome, token
                    )));
                }
            }
            if self.found {
                self.done = true;
                return Ok(None);
            }
        }
    }
}

impl Iterator for VariantStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line.to_string())),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(text: &'static str, chrom: &str, discard_first: bool) -> VariantStream {
        VariantStream::from_reader(Box::new(Cursor::new(text)), chrom, discard_first)
    }

    #[test]
    fn test_yields_only_target_chromosome() {
        let text = "##x\n#CHROM\tPOS\nchr1\t1\nchr2\t5\nchr2\t6\n\nchr3\t1\nchr2\t9\n";
        let lines: Vec<String> = stream(text, "chr2", false).map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["chr2\t5", "chr2\t6"]);
    }

    #[test]
    fn test_discards_partial_first_line() {
        // "2\t4" is the tail of a "chr2\t4" line from an earlier block.
        let text = "chr2\t4\nchr2\t5\n";
        let lines: Vec<String> = stream(text, "chr2", true).map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["chr2\t5"]);
    }

    #[test]
    fn test_first_line_kept_at_file_start() {
        let text = "chr1\t1\nchr1\t2\n";
        assert_eq!(stream(text, "chr1", false).count(), 2);
    }

    #[test]
    fn test_missing_chromosome_is_empty() {
        let text = "chr1\t1\nchr1\t2\n";
        assert_eq!(stream(text, "chrZ", false).count(), 0);
    }

    #[test]
    fn test_no_tab_lines_skipped() {
        let text = "chr1\t1\ngarbage\nchr1\t2\n";
        assert_eq!(stream(text, "chr1", false).count(), 2);
    }

    #[test]
    fn test_crlf_stripped() {
        let text = "chr1\t1\r\n";
        let mut s = stream(text, "chr1", false);
        assert_eq!(s.next_line().unwrap(), Some("chr1\t1"));
        assert_eq!(s.next_line().unwrap(), None);
    }

    fn known(names: &[&str]) -> Arc<HashSet<String>> {
        Arc::new(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_unlisted_chromosome_is_format_error() {
        let text = "chr1\t1\nchr2\t5\nchr3\t1\n";
        let mut s = stream(text, "chr3", false).with_known_chromosomes(known(&["chr1", "chr3"]));
        match s.next_line() {
            Err(SnpBinsError::Format { message }) => assert!(message.contains("'chr2'")),
            other => panic!("unexpected {other:?}"),
        }
        // Ending a listed chromosome at an unlisted one fails too.
        let mut s = stream(text, "chr1", false).with_known_chromosomes(known(&["chr1", "chr3"]));
        assert_eq!(s.next_line().unwrap(), Some("chr1\t1"));
        assert!(s.next_line().is_err());
    }

    #[test]
    fn test_listed_chromosomes_pass() {
        let text = "chr1\t1\nchr2\t5\nchr2\t6\nchr3\t1\n";
        let s = stream(text, "chr2", false).with_known_chromosomes(known(&["chr1", "chr2", "chr3"]));
        assert_eq!(s.map(|l| l.unwrap()).count(), 2);
    }
}
