//! Well-grouped BAM reading.
//!
//! Subread and consensus BAMs are sorted by well, so grouping is a single
//! forward pass that accumulates contiguous same-hole records. The reader
//! optionally restricts itself to a chunk of the well space (for scatter
//! runs across nodes) or to an explicit well filter; the two are mutually
//! exclusive because a chunk is defined over the unfiltered well list.

use crate::bam_io::{self, BamReader};
use crate::errors::{Result, ZmwAlignError};
use crate::pbi::{self, PbiIndex};
use crate::zmw::{ZmwGroup, hole_number, movie_name};
use log::{info, warn};
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;
use std::path::Path;
use std::str::FromStr;

/// One chunk out of `count`, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: usize,
    pub count: usize,
}

impl FromStr for ChunkSpec {
    type Err = ZmwAlignError;

    fn from_str(s: &str) -> Result<Self> {
        let (index, count) = s
            .split_once('/')
            .ok_or_else(|| ZmwAlignError::filter(format!("chunk must be of the form i/N: {s}")))?;
        let index: usize = index
            .parse()
            .map_err(|_| ZmwAlignError::filter(format!("chunk index is not a number: {s}")))?;
        let count: usize = count
            .parse()
            .map_err(|_| ZmwAlignError::filter(format!("chunk count is not a number: {s}")))?;
        if index == 0 || count == 0 {
            return Err(ZmwAlignError::filter(format!("chunk numbers must be positive: {s}")));
        }
        if index > count {
            return Err(ZmwAlignError::filter(format!(
                "chunk index exceeds chunk count: {s}"
            )));
        }
        Ok(Self { index, count })
    }
}

/// Modulo downsampling: keep wells whose hole number satisfies
/// `hole % divisor == remainder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuloSpec {
    pub divisor: u32,
    pub remainder: u32,
}

impl FromStr for ModuloSpec {
    type Err = ZmwAlignError;

    fn from_str(s: &str) -> Result<Self> {
        let (divisor, remainder) = s.split_once('/').ok_or_else(|| {
            ZmwAlignError::filter(format!("modulo filter must be of the form M/V: {s}"))
        })?;
        let divisor: u32 = divisor
            .parse()
            .map_err(|_| ZmwAlignError::filter(format!("modulo divisor is not a number: {s}")))?;
        let remainder: u32 = remainder.parse().map_err(|_| {
            ZmwAlignError::filter(format!("modulo remainder is not a number: {s}"))
        })?;
        if divisor == 0 {
            return Err(ZmwAlignError::filter(format!("modulo divisor must be positive: {s}")));
        }
        if remainder >= divisor {
            return Err(ZmwAlignError::filter(format!(
                "modulo remainder must be less than the divisor: {s}"
            )));
        }
        Ok(Self { divisor, remainder })
    }
}

/// Well filter: inclusive hole-number bounds plus optional modulo
/// downsampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZmwFilter {
    pub min_hole: Option<i32>,
    pub max_hole: Option<i32>,
    pub modulo: Option<ModuloSpec>,
}

impl ZmwFilter {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.min_hole.is_some() || self.max_hole.is_some() || self.modulo.is_some()
    }

    /// Whether the well passes every configured criterion.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn accepts(&self, hole: i32) -> bool {
        if let Some(min) = self.min_hole {
            if hole < min {
                return false;
            }
        }
        if let Some(max) = self.max_hole {
            if hole > max {
                return false;
            }
        }
        if let Some(modulo) = self.modulo {
            if (hole as u32) % modulo.divisor != modulo.remainder {
                return false;
            }
        }
        true
    }

    fn log_active(&self) {
        if let (Some(min), Some(max)) = (self.min_hole, self.max_hole) {
            info!("Keeping wells in range [{min}, {max}]");
        } else if let Some(min) = self.min_hole {
            info!("Keeping wells >= {min}");
        } else if let Some(max) = self.max_hole {
            info!("Keeping wells <= {max}");
        }
        if let Some(modulo) = self.modulo {
            info!(
                "Downsampling wells to {:.1}% (hole % {} == {})",
                100.0 / f64::from(modulo.divisor),
                modulo.divisor,
                modulo.remainder
            );
        }
    }
}

/// Reader configuration: chunk, filter, and BGZF decompression threads.
#[derive(Debug, Clone, Copy)]
pub struct ZmwReaderConfig {
    pub chunk: Option<ChunkSpec>,
    pub filter: ZmwFilter,
    pub decompression_threads: usize,
}

impl Default for ZmwReaderConfig {
    fn default() -> Self {
        Self { chunk: None, filter: ZmwFilter::default(), decompression_threads: 1 }
    }
}

/// Half-open index range `[first, end)` into the unique-well list for a
/// chunk; `None` means the final chunk runs to the end of the file.
///
/// # Errors
///
/// Returns a filter error when there are fewer wells than chunks.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn chunk_bounds(unique_count: usize, spec: ChunkSpec) -> Result<(usize, Option<usize>)> {
    if unique_count < spec.count {
        return Err(ZmwAlignError::filter(format!(
            "cannot split {} wells into {} chunks",
            unique_count, spec.count
        )));
    }

    let chunk_size = unique_count as f64 / spec.count as f64;
    let first = if spec.index == 1 { 0 } else { (chunk_size * (spec.index - 1) as f64).round() as usize };
    let end = if spec.index == spec.count {
        None
    } else {
        Some((chunk_size * spec.index as f64).round() as usize)
    };

    Ok((first, end))
}

enum ReaderState {
    Streaming,
    EndOfFile,
}

/// Streams a well-sorted BAM as per-well record groups.
pub struct BamZmwReader {
    reader: BamReader,
    header: Header,
    pending: Option<RecordBuf>,
    state: ReaderState,
    end_hole: Option<i32>,
    filter: ZmwFilter,
    records_seen: u64,
}

impl std::fmt::Debug for BamZmwReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamZmwReader").finish_non_exhaustive()
    }
}

impl BamZmwReader {
    /// Open a well-grouped reader over `path`.
    ///
    /// With a chunk spec the positional index is consulted for the chunk's
    /// first virtual offset and exclusive end hole, and the underlying BGZF
    /// reader is the seekable single-threaded variant.
    ///
    /// # Errors
    ///
    /// Fails when filters are combined with chunking, when chunking is
    /// requested without a positional index, or on any I/O problem.
    pub fn new<P: AsRef<Path>>(path: P, config: ZmwReaderConfig) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();

        if config.chunk.is_some() && config.filter.is_active() {
            return Err(ZmwAlignError::filter(
                "well filters cannot be combined with chunking",
            )
            .into());
        }

        let (reader, header, end_hole) = if let Some(chunk) = config.chunk {
            let pbi_path = pbi::pbi_path_for(path_ref);
            if !pbi_path.exists() {
                return Err(ZmwAlignError::input_shape(format!(
                    "chunking requires a positional index, none found at {} (generate one with pbindex)",
                    pbi_path.display()
                ))
                .into());
            }
            let index = PbiIndex::open(&pbi_path)?;
            let unique = index.unique_zmws();
            let (first, end) = chunk_bounds(unique.len(), chunk)?;
            info!(
                "Chunk {}/{} covers {} of {} wells",
                chunk.index,
                chunk.count,
                end.unwrap_or(unique.len()) - first,
                unique.len()
            );

            let (mut reader, header) = bam_io::create_seekable_bam_reader(path_ref)?;
            reader.get_mut().seek_to(unique[first].1)?;
            let end_hole = end.map(|e| unique[e].0);
            (reader, header, end_hole)
        } else {
            if config.filter.is_active() {
                config.filter.log_active();
            }
            let (reader, header) = bam_io::create_bam_reader(path_ref, config.decompression_threads)?;
            (reader, header, None)
        };

        Ok(Self {
            reader,
            header,
            pending: None,
            state: ReaderState::Streaming,
            end_hole,
            filter: config.filter,
            records_seen: 0,
        })
    }

    /// The header of the underlying BAM.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the next well's records, or `None` at the end of the chunk
    /// or file. An empty input logs a warning on the first call.
    pub fn get_next(&mut self) -> Result<Option<ZmwGroup>> {
        if matches!(self.state, ReaderState::EndOfFile) {
            return Ok(None);
        }

        loop {
            let Some(first) = self.next_record()? else {
                if self.records_seen == 0 {
                    warn!("Input BAM contains no records");
                }
                self.state = ReaderState::EndOfFile;
                return Ok(None);
            };

            let hole = require_hole(&first)?;
            if self.end_hole == Some(hole) {
                self.state = ReaderState::EndOfFile;
                return Ok(None);
            }

            let movie = movie_name(&first).unwrap_or_default();
            let mut records = vec![first];
            loop {
                let Some(record) = self.next_record()? else {
                    break;
                };
                if require_hole(&record)? == hole {
                    records.push(record);
                } else {
                    self.pending = Some(record);
                    break;
                }
            }

            if self.filter.accepts(hole) {
                return Ok(Some(ZmwGroup { hole, movie, records }));
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        let mut record = RecordBuf::default();
        if self.reader.read_record_buf(&self.header, &mut record)? == 0 {
            return Ok(None);
        }
        self.records_seen += 1;
        Ok(Some(record))
    }
}

pub(crate) fn require_hole(record: &RecordBuf) -> Result<i32> {
    hole_number(record).ok_or_else(|| {
        ZmwAlignError::input_shape("record carries neither a zm tag nor a well-encoded name")
    })
}
