//! # Register Files
//!
//! Append-only binary files of fixed-size records. Every counter array that
//! leaves memory (bin matrices, totals, bin tables, positions, rollups) goes
//! through this format.
//!
//! Format (all integers little-endian):
//! - Record = [Header 26 bytes] [Payload `data_length * width/8` bytes]
//! - Header = has_data u8, serial u64, counter_bit_width u8, data_length u64,
//!   checksum u64
//! - Payload = delta-encoded values: the first value raw, then the wrapping
//!   difference to the previous value, truncated to the counter width
//! - The last record is a sentinel with `has_data = 0` and a zeroed payload,
//!   so every file, even one with no data records, carries its record shape
//!
//! A companion index file holds the same header sequence without payloads.
//! Record size is constant within a file, so `record_size * serial` is the
//! byte offset of record `serial` and the record count is
//! `file_size / record_size - 1`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::data::counters::{CounterWidth, Counters};
use crate::error::{Result, SnpBinsError};

/// Size of an encoded record header in bytes
pub const HEADER_SIZE: usize = 26;

/// Decoded record header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterHeader {
    pub has_data: bool,
    pub serial: u64,
    pub width: CounterWidth,
    pub data_length: u64,
    /// Wrapping `u64` sum of the decoded values
    pub checksum: u64,
}

impl RegisterHeader {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.has_data as u8;
        buf[1..9].copy_from_slice(&self.serial.to_le_bytes());
        buf[9] = self.width.bits();
        buf[10..18].copy_from_slice(&self.data_length.to_le_bytes());
        buf[18..26].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SnpBinsError::format(format!(
                "register header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let has_data = match bytes[0] {
            0 => false,
            1 => true,
            other => {
                return Err(SnpBinsError::format(format!(
                    "invalid has_data flag {}",
                    other
                )))
            }
        };
        let width = CounterWidth::from_bits(bytes[9]).ok_or_else(|| {
            SnpBinsError::format(format!("invalid counter bit width {}", bytes[9]))
        })?;
        Ok(Self {
            has_data,
            serial: read_u64(&bytes[1..9]),
            width,
            data_length: read_u64(&bytes[10..18]),
            checksum: read_u64(&bytes[18..26]),
        })
    }

    /// Size of the full record this header describes
    pub fn record_size(&self) -> Result<u64> {
        record_size(self.width, self.data_length)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Bytes per record for a given shape; a shape that cannot be addressed is a
/// format error
pub fn record_size(width: CounterWidth, data_length: u64) -> Result<u64> {
    data_length
        .checked_mul(width.bytes() as u64)
        .and_then(|payload| payload.checked_add(HEADER_SIZE as u64))
        .filter(|&size| usize::try_from(size).is_ok())
        .ok_or_else(|| {
            SnpBinsError::format(format!(
                "register data length {} at {} bits overflows the record size",
                data_length,
                width.bits()
            ))
        })
}

/// A decoded data record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Register {
    pub header: RegisterHeader,
    pub data: Counters,
}

fn encode_payload(values: &Counters, width: CounterWidth, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(values.len() * width.bytes());
    let mut last = 0u64;
    for v in values.iter() {
        let delta = v.wrapping_sub(last);
        last = v;
        match width {
            CounterWidth::U16 => out.extend_from_slice(&(delta as u16).to_le_bytes()),
            CounterWidth::U32 => out.extend_from_slice(&(delta as u32).to_le_bytes()),
            CounterWidth::U64 => out.extend_from_slice(&delta.to_le_bytes()),
        }
    }
}

fn decode_payload(bytes: &[u8], width: CounterWidth) -> Counters {
    match width {
        CounterWidth::U16 => {
            let mut acc = 0u16;
            Counters::U16(
                bytes
                    .chunks_exact(2)
                    .map(|c| {
                        acc = acc.wrapping_add(u16::from_le_bytes([c[0], c[1]]));
                        acc
                    })
                    .collect(),
            )
        }
        CounterWidth::U32 => {
            let mut acc = 0u32;
            Counters::U32(
                bytes
                    .chunks_exact(4)
                    .map(|c| {
                        acc = acc.wrapping_add(u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
                        acc
                    })
                    .collect(),
            )
        }
        CounterWidth::U64 => {
            let mut acc = 0u64;
            Counters::U64(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        acc = acc.wrapping_add(read_u64(c));
                        acc
                    })
                    .collect(),
            )
        }
    }
}

/// Path of the index file belonging to a register data file
pub fn index_path(data_path: &Path) -> PathBuf {
    data_path.with_extension("idx")
}

/// Streaming writer for one register file and its index
pub struct RegisterWriter {
    data: BufWriter<File>,
    index: BufWriter<File>,
    width: CounterWidth,
    data_length: u64,
    payload_size: usize,
    serial: u64,
    payload: Vec<u8>,
}

impl RegisterWriter {
    /// Create `data_path` and its `.idx` companion; every record written
    /// will have exactly `data_length` values stored at `width`
    pub fn create(data_path: &Path, width: CounterWidth, data_length: u64) -> Result<Self> {
        let payload_size = (record_size(width, data_length)? - HEADER_SIZE as u64) as usize;
        let data = BufWriter::new(File::create(data_path)?);
        let index = BufWriter::new(File::create(index_path(data_path))?);
        Ok(Self {
            data,
            index,
            width,
            data_length,
            payload_size,
            serial: 0,
            payload: Vec::new(),
        })
    }

    pub fn width(&self) -> CounterWidth {
        self.width
    }

    /// Append one record; returns its serial
    pub fn write(&mut self, values: &Counters) -> Result<u64> {
        if values.len() as u64 != self.data_length {
            return Err(SnpBinsError::format(format!(
                "register record length {} differs from file data length {}",
                values.len(),
                self.data_length
            )));
        }
        if values.width() > self.width {
            let max = values.max_value();
            if max > self.width.max() {
                return Err(SnpBinsError::overflow(
                    "register",
                    max,
                    self.width.max(),
                    self.width.bits(),
                ));
            }
        }

        let header = RegisterHeader {
            has_data: true,
            serial: self.serial,
            width: self.width,
            data_length: self.data_length,
            checksum: values.checksum(),
        };
        encode_payload(values, self.width, &mut self.payload);

        let encoded = header.encode();
        self.data.write_all(&encoded)?;
        self.data.write_all(&self.payload)?;
        self.index.write_all(&encoded)?;

        let serial = self.serial;
        self.serial += 1;
        Ok(serial)
    }

    /// Write `u64` values, checking they fit the file width
    pub fn write_values(&mut self, family: &str, values: &[u64]) -> Result<u64> {
        let counters = Counters::with_width(family, values, self.width)?;
        self.write(&counters)
    }

    /// Write the sentinel and flush both files; returns the number of data records
    pub fn finish(mut self) -> Result<u64> {
        let sentinel = RegisterHeader {
            has_data: false,
            serial: self.serial,
            width: self.width,
            data_length: self.data_length,
            checksum: 0,
        };
        let encoded = sentinel.encode();
        self.data.write_all(&encoded)?;
        let zeros = vec![0u8; self.payload_size];
        self.data.write_all(&zeros)?;
        self.index.write_all(&encoded)?;
        self.data.flush()?;
        self.index.flush()?;
        Ok(self.serial)
    }
}

/// Write a complete register file in one call
pub fn write_register(
    data_path: &Path,
    width: CounterWidth,
    data_length: u64,
    records: &[Counters],
) -> Result<u64> {
    let mut writer = RegisterWriter::create(data_path, width, data_length)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Random-access reader over a memory-mapped register file
pub struct RegisterReader {
    path: PathBuf,
    mmap: Mmap,
    width: CounterWidth,
    data_length: u64,
    record_size: u64,
    num_registers: u64,
}

impl RegisterReader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SnpBinsError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(SnpBinsError::format(format!(
                "register {} is {} bytes, smaller than one header",
                path.display(),
                file_len
            )));
        }
        let mmap = unsafe { Mmap::map(&file)? };

        let first = RegisterHeader::decode(&mmap[..HEADER_SIZE])?;
        let record_size = first.record_size()?;
        if file_len % record_size != 0 {
            return Err(SnpBinsError::format(format!(
                "register {} size {} is not a multiple of record size {}",
                path.display(),
                file_len,
                record_size
            )));
        }
        let num_registers = file_len / record_size - 1;

        let sentinel_at = (num_registers * record_size) as usize;
        let sentinel = RegisterHeader::decode(&mmap[sentinel_at..sentinel_at + HEADER_SIZE])?;
        if sentinel.has_data || sentinel.serial != num_registers {
            return Err(SnpBinsError::format(format!(
                "register {} is missing its end sentinel",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            width: first.width,
            data_length: first.data_length,
            record_size,
            num_registers,
        })
    }

    /// Number of data records (sentinel excluded)
    pub fn num_registers(&self) -> u64 {
        self.num_registers
    }

    pub fn width(&self) -> CounterWidth {
        self.width
    }

    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    /// Header of record `serial` without decoding its payload
    pub fn header(&self, serial: u64) -> Result<RegisterHeader> {
        let offset = self.offset_of(serial)?;
        RegisterHeader::decode(&self.mmap[offset..offset + HEADER_SIZE])
    }

    /// Decode record `serial`, verifying its header and checksum
    pub fn read(&self, serial: u64) -> Result<Register> {
        let offset = self.offset_of(serial)?;
        let header = RegisterHeader::decode(&self.mmap[offset..offset + HEADER_SIZE])?;
        if !header.has_data
            || header.serial != serial
            || header.width != self.width
            || header.data_length != self.data_length
        {
            return Err(SnpBinsError::format(format!(
                "register {} record {} has an inconsistent header {:?}",
                self.path.display(),
                serial,
                header
            )));
        }

        let payload = &self.mmap[offset + HEADER_SIZE..offset + self.record_size as usize];
        let data = decode_payload(payload, self.width);
        let computed = data.checksum();
        if computed != header.checksum {
            return Err(SnpBinsError::format(format!(
                "register {} record {} is corrupt: checksum {} != computed {}",
                self.path.display(),
                serial,
                header.checksum,
                computed
            )));
        }

        Ok(Register { header, data })
    }

    /// Decode every data record in order
    pub fn iter(&self) -> impl Iterator<Item = Result<Register>> + '_ {
        (0..self.num_registers).map(move |serial| self.read(serial))
    }

    /// Decode every record, stopping at the first error
    pub fn read_all(&self) -> Result<Vec<Counters>> {
        self.iter().map(|r| r.map(|reg| reg.data)).collect()
    }

    fn offset_of(&self, serial: u64) -> Result<usize> {
        if serial >= self.num_registers {
            return Err(SnpBinsError::format(format!(
                "register {} has {} records, requested {}",
                self.path.display(),
                self.num_registers,
                serial
            )));
        }
        Ok((serial * self.record_size) as usize)
    }
}

/// Header-only view loaded from a register's index file
#[derive(Clone, Debug)]
pub struct RegisterIndex {
    headers: Vec<RegisterHeader>,
}

impl RegisterIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() || bytes.len() % HEADER_SIZE != 0 {
            return Err(SnpBinsError::format(format!(
                "register index {} size {} is not a multiple of {}",
                path.display(),
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut headers = bytes
            .chunks_exact(HEADER_SIZE)
            .map(RegisterHeader::decode)
            .collect::<Result<Vec<_>>>()?;

        match headers.pop() {
            Some(sentinel) if !sentinel.has_data && sentinel.serial == headers.len() as u64 => {}
            _ => {
                return Err(SnpBinsError::format(format!(
                    "register index {} is missing its end sentinel",
                    path.display()
                )))
            }
        }
        for (i, h) in headers.iter().enumerate() {
            if !h.has_data || h.serial != i as u64 {
                return Err(SnpBinsError::format(format!(
                    "register index {} entry {} is out of order",
                    path.display(),
                    i
                )));
            }
        }
        Ok(Self { headers })
    }

    pub fn num_registers(&self) -> u64 {
        self.headers.len() as u64
    }

    pub fn headers(&self) -> &[RegisterHeader] {
        &self.headers
    }

    /// Check that every header matches the data file's header at the same serial
    pub fn check_against(&self, reader: &RegisterReader) -> Result<()> {
        if self.num_registers() != reader.num_registers() {
            return Err(SnpBinsError::consistency(
                format!("{} index record count", reader.path.display()),
                self.num_registers(),
                reader.num_registers(),
            ));
        }
        for h in &self.headers {
            let data_header = reader.header(h.serial)?;
            if data_header.checksum != h.checksum {
                return Err(SnpBinsError::consistency(
                    format!("{} index checksum of record {}", reader.path.display(), h.serial),
                    h.checksum,
                    data_header.checksum,
                ));
            }
        }
        Ok(())
    }
}
