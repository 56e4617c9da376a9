//! Reader for the PBI positional index that accompanies a subreads BAM.
//!
//! The index is a BGZF-compressed column store: a small fixed header followed
//! by one array per field, each `n_reads` long. Only the basic-data section
//! is stored here; the pipeline consumes two views of it, the first-seen
//! unique well list and the well-to-offset map used for direct seeks.

use crate::errors::{Result, ZmwAlignError};
use noodles::bgzf;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const PBI_MAGIC: [u8; 4] = [b'P', b'B', b'I', 0x01];

/// Parsed basic-data section of a PBI file.
#[derive(Debug, Clone)]
pub struct PbiIndex {
    version: u32,
    read_group_ids: Vec<i32>,
    query_starts: Vec<i32>,
    query_ends: Vec<i32>,
    hole_numbers: Vec<i32>,
    read_qualities: Vec<f32>,
    context_flags: Vec<u8>,
    file_offsets: Vec<u64>,
}

impl PbiIndex {
    /// Open and parse the index at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the magic or layout is
    /// wrong, or the index holds zero records.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = bgzf::Reader::new(file);
        Self::read_from(&mut reader)
    }

    /// Parse an index from a BGZF-decompressing reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != PBI_MAGIC {
            return Err(ZmwAlignError::input_shape("not a PBI index (bad magic)"));
        }

        let version = read_u32(reader)?;
        let _flags = read_u16(reader)?;
        let n_reads = read_u32(reader)? as usize;
        let mut reserved = [0u8; 18];
        reader.read_exact(&mut reserved)?;

        if n_reads == 0 {
            return Err(ZmwAlignError::input_shape("PBI index holds zero records"));
        }

        let read_group_ids = read_i32_array(reader, n_reads)?;
        let query_starts = read_i32_array(reader, n_reads)?;
        let query_ends = read_i32_array(reader, n_reads)?;
        let hole_numbers = read_i32_array(reader, n_reads)?;
        let read_qualities = read_f32_array(reader, n_reads)?;
        let mut context_flags = vec![0u8; n_reads];
        reader.read_exact(&mut context_flags)?;
        let file_offsets = read_u64_array(reader, n_reads)?;

        Ok(Self {
            version,
            read_group_ids,
            query_starts,
            query_ends,
            hole_numbers,
            read_qualities,
            context_flags,
            file_offsets,
        })
    }

    /// Format version recorded in the index header.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of records the index covers.
    #[must_use]
    pub fn n_reads(&self) -> usize {
        self.hole_numbers.len()
    }

    /// Hole numbers, one per record, in file order.
    #[must_use]
    pub fn hole_numbers(&self) -> &[i32] {
        &self.hole_numbers
    }

    /// Query intervals, one per record, in file order.
    #[must_use]
    pub fn query_intervals(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.query_starts.iter().copied().zip(self.query_ends.iter().copied())
    }

    /// Read-group ids, one per record, in file order.
    #[must_use]
    pub fn read_group_ids(&self) -> &[i32] {
        &self.read_group_ids
    }

    /// Read qualities, one per record, in file order.
    #[must_use]
    pub fn read_qualities(&self) -> &[f32] {
        &self.read_qualities
    }

    /// Local context flags, one per record, in file order.
    #[must_use]
    pub fn context_flags(&self) -> &[u8] {
        &self.context_flags
    }

    /// Each distinct well in first-seen order, with the BGZF virtual offset
    /// of its first record.
    #[must_use]
    pub fn unique_zmws(&self) -> Vec<(i32, bgzf::VirtualPosition)> {
        let mut seen: HashMap<i32, ()> = HashMap::with_capacity(self.hole_numbers.len());
        let mut unique = Vec::new();
        for (&hole, &offset) in self.hole_numbers.iter().zip(&self.file_offsets) {
            if seen.insert(hole, ()).is_none() {
                unique.push((hole, bgzf::VirtualPosition::from(offset)));
            }
        }
        unique
    }

    /// Map from well number to the virtual offset of its first record.
    #[must_use]
    pub fn hole_to_offset(&self) -> HashMap<i32, bgzf::VirtualPosition> {
        let mut map = HashMap::with_capacity(self.hole_numbers.len());
        for (&hole, &offset) in self.hole_numbers.iter().zip(&self.file_offsets) {
            map.entry(hole).or_insert_with(|| bgzf::VirtualPosition::from(offset));
        }
        map
    }
}

/// Conventional index path for a BAM file: the BAM path with `.pbi` appended.
#[must_use]
pub fn pbi_path_for<P: AsRef<Path>>(bam_path: P) -> PathBuf {
    let mut path = bam_path.as_ref().as_os_str().to_owned();
    path.push(".pbi");
    PathBuf::from(path)
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32_array<R: Read>(reader: &mut R, n: usize) -> Result<Vec<i32>> {
    let mut buf = vec![0u8; n * 4];
    reader.read_exact(&mut buf)?;
    Ok(buf.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

fn read_f32_array<R: Read>(reader: &mut R, n: usize) -> Result<Vec<f32>> {
    let mut buf = vec![0u8; n * 4];
    reader.read_exact(&mut buf)?;
    Ok(buf.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

fn read_u64_array<R: Read>(reader: &mut R, n: usize) -> Result<Vec<u64>> {
    let mut buf = vec![0u8; n * 8];
    reader.read_exact(&mut buf)?;
    Ok(buf
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}
