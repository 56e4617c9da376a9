//! BAM file I/O utilities.
//!
//! Readers and writers here wrap noodles BGZF streams with a consistent
//! threading model: `threads <= 1` selects the single-threaded codec,
//! `threads > 1` the multithreaded one. Random access (used to pair subread
//! wells with their consensus read) needs BGZF virtual-position seeks, which
//! only the single-threaded reader supports, so seekable readers are always
//! single-threaded.

use anyhow::{Context, Result};
use noodles::bgzf::VirtualPosition;
use noodles::bgzf::{
    MultithreadedReader, MultithreadedWriter, Reader as BgzfReader, Writer as BgzfWriter,
    multithreaded_writer, writer::CompressionLevel,
};
use noodles::fasta;
use noodles::sam::Header;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Read, Write};
use std::num::NonZero;
use std::path::Path;

/// BGZF decompression source that is either seekable or multithreaded.
pub enum BgzfSource {
    /// Single-threaded reader; the only variant that can seek.
    Single(BgzfReader<File>),
    /// Multi-threaded reader for streaming passes.
    Multi(MultithreadedReader<File>),
}

impl BgzfSource {
    /// Repositions the stream at a BGZF virtual position.
    ///
    /// # Errors
    ///
    /// Fails on the multithreaded variant, which cannot seek.
    pub fn seek_to(&mut self, pos: VirtualPosition) -> io::Result<()> {
        match self {
            BgzfSource::Single(reader) => {
                reader.seek(pos)?;
                Ok(())
            }
            BgzfSource::Multi(_) => Err(io::Error::other(
                "seek is not supported on a multithreaded BGZF reader",
            )),
        }
    }
}

impl Read for BgzfSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BgzfSource::Single(r) => r.read(buf),
            BgzfSource::Multi(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            BgzfSource::Single(r) => r.fill_buf(),
            BgzfSource::Multi(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            BgzfSource::Single(r) => r.consume(amt),
            BgzfSource::Multi(r) => r.consume(amt),
        }
    }
}

/// A BAM reader over either BGZF source.
pub type BamReader = noodles::bam::io::Reader<BgzfSource>;

/// Create a BAM reader and read its header.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header cannot be read.
///
/// # Panics
///
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
pub fn create_bam_reader<P: AsRef<Path>>(path: P, threads: usize) -> Result<(BamReader, Header)> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let bgzf_reader = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        BgzfSource::Multi(MultithreadedReader::with_worker_count(worker_count, file))
    } else {
        BgzfSource::Single(BgzfReader::new(file))
    };

    let mut reader = noodles::bam::io::Reader::from(bgzf_reader);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;

    Ok((reader, header))
}

/// Create a single-threaded BAM reader that supports virtual-position seeks.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header cannot be read.
pub fn create_seekable_bam_reader<P: AsRef<Path>>(path: P) -> Result<(BamReader, Header)> {
    create_bam_reader(path, 1)
}

/// BGZF compression sink, single or multithreaded.
pub enum BgzfSink {
    /// Single-threaded BGZF writer.
    Single(BgzfWriter<File>),
    /// Multi-threaded BGZF writer.
    Multi(MultithreadedWriter<File>),
}

impl Write for BgzfSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BgzfSink::Single(w) => w.write(buf),
            BgzfSink::Multi(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BgzfSink::Single(w) => w.flush(),
            BgzfSink::Multi(w) => w.flush(),
        }
    }
}

impl BgzfSink {
    /// Flush remaining blocks and write the BGZF EOF marker.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or finalizing the stream fails.
    pub fn finish(self) -> io::Result<()> {
        match self {
            BgzfSink::Single(w) => {
                w.finish()?;
                Ok(())
            }
            BgzfSink::Multi(mut w) => {
                w.finish()?;
                Ok(())
            }
        }
    }
}

/// A BAM writer over either BGZF sink.
pub type BamWriter = noodles::bam::io::Writer<BgzfSink>;

/// Create a BAM writer and write the header in one operation.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the header cannot be
/// written.
///
/// # Panics
///
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
#[allow(clippy::cast_possible_truncation)]
pub fn create_bam_writer<P: AsRef<Path>>(
    path: P,
    header: &Header,
    threads: usize,
    compression_level: u32,
) -> Result<BamWriter> {
    let path_ref = path.as_ref();
    let output_file = File::create(path_ref)
        .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;

    let bgzf_writer = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        let mut builder = multithreaded_writer::Builder::default().set_worker_count(worker_count);
        if let Some(level) = CompressionLevel::new(compression_level as u8) {
            builder = builder.set_compression_level(level);
        }
        BgzfSink::Multi(builder.build_from_writer(output_file))
    } else {
        let mut builder = noodles::bgzf::writer::Builder::default();
        if let Some(level) = CompressionLevel::new(compression_level as u8) {
            builder = builder.set_compression_level(level);
        }
        BgzfSink::Single(builder.build_from_writer(output_file))
    };

    let mut writer = noodles::bam::io::Writer::from(bgzf_writer);
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;
    Ok(writer)
}

/// Create a plain-text FASTA writer.
///
/// # Errors
///
/// Returns an error if the file cannot be created.
pub fn create_fasta_writer<P: AsRef<Path>>(
    path: P,
) -> Result<fasta::io::Writer<BufWriter<File>>> {
    let path_ref = path.as_ref();
    let file = File::create(path_ref)
        .with_context(|| format!("Failed to create output FASTA: {}", path_ref.display()))?;
    Ok(fasta::io::Writer::new(BufWriter::new(file)))
}
