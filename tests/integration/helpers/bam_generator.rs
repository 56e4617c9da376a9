//! Utilities for generating PacBio-style test BAMs programmatically.
//!
//! Every generated BAM gets a sibling `.pbi` positional index recording the
//! virtual offset of each record, mirroring what `pbindex` produces for real
//! data.

#![allow(dead_code)]

use anyhow::Result;
use bstr::BString;
use noodles::bgzf;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::ReadGroup;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One subread spec: well, query start, sequence.
pub struct Subread {
    pub hole: i32,
    pub query_start: usize,
    pub seq: Vec<u8>,
}

/// A deterministic pseudo-random DNA sequence.
pub fn random_seq(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            other => other,
        })
        .collect()
}

/// A header with a single read group whose DS field carries the read type.
pub fn pacbio_header(read_type: &str, movie: &str) -> Header {
    let ds = format!("READTYPE={read_type};BINDINGKIT=101-789-500;SEQUENCINGKIT=101-826-100");
    let read_group = Map::<ReadGroup>::builder()
        .insert(rg_tag::DESCRIPTION, ds.as_str())
        .build()
        .expect("valid read group");
    Header::builder().add_read_group(movie, read_group).build()
}

fn unmapped_record(name: String, hole: i32, seq: &[u8]) -> RecordBuf {
    let mut record = RecordBuf::builder()
        .set_name(BString::from(name))
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(seq.to_vec()))
        .set_quality_scores(QualityScores::from(vec![30u8; seq.len()]))
        .build();
    record.data_mut().insert(Tag::from([b'z', b'm']), Value::Int32(hole));
    record
}

pub fn subread_record(movie: &str, subread: &Subread) -> RecordBuf {
    let name = format!(
        "{movie}/{}/{}_{}",
        subread.hole,
        subread.query_start,
        subread.query_start + subread.seq.len()
    );
    unmapped_record(name, subread.hole, &subread.seq)
}

pub fn ccs_record(movie: &str, hole: i32, seq: &[u8]) -> RecordBuf {
    unmapped_record(format!("{movie}/{hole}/ccs"), hole, seq)
}

struct PbiRow {
    hole: i32,
    q_start: i32,
    q_end: i32,
    offset: u64,
}

fn pbi_path(bam_path: &Path) -> PathBuf {
    let mut name = OsString::from(bam_path.as_os_str());
    name.push(".pbi");
    PathBuf::from(name)
}

fn write_pbi(path: &Path, rows: &[PbiRow]) -> Result<()> {
    let mut writer = bgzf::Writer::new(File::create(path)?);
    writer.write_all(b"PBI\x01")?;
    writer.write_all(&3_000_001u32.to_le_bytes())?; // version
    writer.write_all(&0u16.to_le_bytes())?; // flags
    writer.write_all(&(rows.len() as u32).to_le_bytes())?;
    writer.write_all(&[0u8; 18])?;

    for _ in rows {
        writer.write_all(&0i32.to_le_bytes())?; // rgId
    }
    for row in rows {
        writer.write_all(&row.q_start.to_le_bytes())?;
    }
    for row in rows {
        writer.write_all(&row.q_end.to_le_bytes())?;
    }
    for row in rows {
        writer.write_all(&row.hole.to_le_bytes())?;
    }
    for _ in rows {
        writer.write_all(&0.8f32.to_le_bytes())?;
    }
    for _ in rows {
        writer.write_all(&[0u8])?;
    }
    for row in rows {
        writer.write_all(&row.offset.to_le_bytes())?;
    }

    writer.finish()?;
    Ok(())
}

fn write_indexed_bam(path: &Path, header: &Header, records: &[RecordBuf]) -> Result<()> {
    let mut writer = noodles::bam::io::Writer::new(File::create(path)?);
    writer.write_header(header)?;

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let offset = u64::from(writer.get_ref().virtual_position());
        let hole = match record.data().get(&Tag::from([b'z', b'm'])) {
            Some(Value::Int32(hole)) => *hole,
            _ => panic!("test record is missing its zm tag"),
        };
        rows.push(PbiRow {
            hole,
            q_start: 0,
            q_end: record.sequence().len() as i32,
            offset,
        });
        writer.write_alignment_record(header, record)?;
    }
    writer.into_inner().finish()?;

    write_pbi(&pbi_path(path), &rows)?;
    Ok(())
}

/// Write a consensus BAM (one read per well) plus its positional index.
pub fn write_ccs_bam(path: &Path, movie: &str, wells: &[(i32, Vec<u8>)]) -> Result<()> {
    let header = pacbio_header("CCS", movie);
    let records: Vec<RecordBuf> =
        wells.iter().map(|(hole, seq)| ccs_record(movie, *hole, seq)).collect();
    write_indexed_bam(path, &header, &records)
}

/// Write a subreads BAM plus its positional index. Subreads must be grouped
/// by well, as they are in real movies.
pub fn write_subreads_bam(path: &Path, movie: &str, subreads: &[Subread]) -> Result<()> {
    let header = pacbio_header("SUBREAD", movie);
    let records: Vec<RecordBuf> = subreads.iter().map(|s| subread_record(movie, s)).collect();
    write_indexed_bam(path, &header, &records)
}

/// Read a whole BAM back into memory.
pub fn read_bam(path: &Path) -> Result<(Header, Vec<RecordBuf>)> {
    let mut reader = noodles::bam::io::Reader::new(File::open(path)?);
    let header = reader.read_header()?;
    let mut records = Vec::new();
    let mut record = RecordBuf::default();
    while reader.read_record_buf(&header, &mut record)? != 0 {
        records.push(record.clone());
    }
    Ok((header, records))
}

/// Read back the names of a FASTA's records.
pub fn read_fasta_names(path: &Path) -> Result<Vec<String>> {
    let mut reader = noodles::fasta::io::Reader::new(std::io::BufReader::new(File::open(path)?));
    let mut names = Vec::new();
    for result in reader.records() {
        let record = result?;
        names.push(String::from_utf8_lossy(record.name()).to_string());
    }
    Ok(names)
}
