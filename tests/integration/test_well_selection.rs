//! Chunking and well-filter behavior over real files.

use crate::helpers::bam_generator::{random_seq, read_bam, write_ccs_bam, write_subreads_bam, Subread};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zmwalign_lib::engine::BandedEngine;
use zmwalign_lib::pipeline::{self, PipelineOptions, PipelineSummary};
use zmwalign_lib::zmw_reader::{ChunkSpec, ModuloSpec, ZmwFilter};

const MOVIE: &str = "m54321_190101_000000";
const HOLES: [i32; 4] = [2, 3, 4, 5];

/// Four wells with two subreads each.
fn write_inputs(dir: &TempDir) -> Result<(PathBuf, PathBuf)> {
    let mut wells = Vec::new();
    let mut subreads = Vec::new();
    for hole in HOLES {
        let seq = random_seq(200, u64::try_from(hole).unwrap());
        subreads.push(Subread { hole, query_start: 0, seq: seq[0..160].to_vec() });
        subreads.push(Subread { hole, query_start: 40, seq: seq[40..200].to_vec() });
        wells.push((hole, seq));
    }

    let ccs_path = dir.path().join("ccs.bam");
    write_ccs_bam(&ccs_path, MOVIE, &wells)?;
    let subreads_path = dir.path().join("subreads.bam");
    write_subreads_bam(&subreads_path, MOVIE, &subreads)?;
    Ok((subreads_path, ccs_path))
}

fn run_with(
    subreads: &Path,
    ccs: &Path,
    output: &Path,
    chunk: Option<ChunkSpec>,
    filter: ZmwFilter,
) -> Result<PipelineSummary> {
    let options = PipelineOptions {
        input_a: subreads.to_path_buf(),
        input_b: ccs.to_path_buf(),
        output: output.to_path_buf(),
        threads: 1,
        chunk,
        filter,
        ccs_query: false,
        compression_level: 6,
        version: "0.0.0-test".to_string(),
        command_line: "zmwalign test".to_string(),
    };
    pipeline::run(&options, Arc::new(BandedEngine::new()))
}

fn reference_names(output: &Path) -> Result<Vec<String>> {
    let (header, _) = read_bam(output)?;
    Ok(header.reference_sequences().keys().map(ToString::to_string).collect())
}

#[test]
fn test_chunked_runs_partition_wells() -> Result<()> {
    let dir = TempDir::new()?;
    let (subreads_path, ccs_path) = write_inputs(&dir)?;

    let full_output = dir.path().join("full.bam");
    let full = run_with(&subreads_path, &ccs_path, &full_output, None, ZmwFilter::default())?;
    assert_eq!(full.wells_aligned, 4);

    let mut chunked_names = Vec::new();
    let mut chunked_records = 0;
    for index in 1..=2 {
        let output = dir.path().join(format!("chunk{index}.bam"));
        let summary = run_with(
            &subreads_path,
            &ccs_path,
            &output,
            Some(ChunkSpec { index, count: 2 }),
            ZmwFilter::default(),
        )?;
        chunked_records += summary.records_written;
        chunked_names.extend(reference_names(&output)?);
    }

    // The chunks cover every well exactly once, in order.
    let full_names = reference_names(&full_output)?;
    assert_eq!(chunked_names, full_names);
    assert_eq!(chunked_records, full.records_written);
    Ok(())
}

#[test]
fn test_min_max_zmw_filter() -> Result<()> {
    let dir = TempDir::new()?;
    let (subreads_path, ccs_path) = write_inputs(&dir)?;

    let output = dir.path().join("filtered.bam");
    let filter = ZmwFilter { min_hole: Some(3), max_hole: Some(4), modulo: None };
    let summary = run_with(&subreads_path, &ccs_path, &output, None, filter)?;

    assert_eq!(summary.wells_aligned, 2);
    assert_eq!(
        reference_names(&output)?,
        vec![format!("{MOVIE}/3/ccs"), format!("{MOVIE}/4/ccs")]
    );
    Ok(())
}

#[test]
fn test_zmw_modulo_downsampling() -> Result<()> {
    let dir = TempDir::new()?;
    let (subreads_path, ccs_path) = write_inputs(&dir)?;

    let output = dir.path().join("modulo.bam");
    let filter = ZmwFilter {
        min_hole: None,
        max_hole: None,
        modulo: Some(ModuloSpec { divisor: 2, remainder: 1 }),
    };
    let summary = run_with(&subreads_path, &ccs_path, &output, None, filter)?;

    assert_eq!(summary.wells_aligned, 2);
    assert_eq!(
        reference_names(&output)?,
        vec![format!("{MOVIE}/3/ccs"), format!("{MOVIE}/5/ccs")]
    );
    Ok(())
}

#[test]
fn test_chunk_and_filter_conflict() -> Result<()> {
    let dir = TempDir::new()?;
    let (subreads_path, ccs_path) = write_inputs(&dir)?;

    let output = dir.path().join("conflict.bam");
    let filter = ZmwFilter { min_hole: Some(3), max_hole: None, modulo: None };
    let result = run_with(
        &subreads_path,
        &ccs_path,
        &output,
        Some(ChunkSpec { index: 1, count: 2 }),
        filter,
    );
    let message = result.unwrap_err().to_string();
    assert!(message.contains("cannot be combined"), "got: {message}");
    Ok(())
}
