//! End-to-end pipeline tests: subreads in, aligned BAM and reference FASTA
//! out.

use crate::helpers::assertions::{
    assert_cigar_spans_sequence, assert_mapped_to, records_for_well,
};
use crate::helpers::bam_generator::{
    random_seq, read_bam, read_fasta_names, reverse_complement, write_ccs_bam,
    write_subreads_bam, Subread,
};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use zmwalign_lib::engine::BandedEngine;
use zmwalign_lib::pipeline::{self, PipelineOptions, PipelineSummary};
use zmwalign_lib::zmw_reader::ZmwFilter;

const MOVIE: &str = "m64012_181222_192540";

fn base_options(subreads: &Path, ccs: &Path, output: &Path) -> PipelineOptions {
    PipelineOptions {
        input_a: subreads.to_path_buf(),
        input_b: ccs.to_path_buf(),
        output: output.to_path_buf(),
        threads: 2,
        chunk: None,
        filter: ZmwFilter::default(),
        ccs_query: false,
        compression_level: 6,
        version: "0.0.0-test".to_string(),
        command_line: "zmwalign test".to_string(),
    }
}

fn run_with(options: &PipelineOptions) -> Result<PipelineSummary> {
    pipeline::run(options, Arc::new(BandedEngine::new()))
}

/// Two wells, five subreads, one of them reverse complemented.
fn write_two_well_inputs(dir: &TempDir) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let ccs5 = random_seq(300, 5);
    let ccs7 = random_seq(250, 7);

    let ccs_path = dir.path().join("ccs.bam");
    write_ccs_bam(&ccs_path, MOVIE, &[(5, ccs5.clone()), (7, ccs7.clone())])?;

    let subreads_path = dir.path().join("subreads.bam");
    write_subreads_bam(
        &subreads_path,
        MOVIE,
        &[
            Subread { hole: 5, query_start: 10, seq: ccs5[10..260].to_vec() },
            Subread { hole: 5, query_start: 0, seq: reverse_complement(&ccs5[0..240]) },
            Subread { hole: 5, query_start: 50, seq: ccs5[50..300].to_vec() },
            Subread { hole: 7, query_start: 0, seq: ccs7[0..200].to_vec() },
            Subread { hole: 7, query_start: 30, seq: ccs7[30..250].to_vec() },
        ],
    )?;

    Ok((subreads_path, ccs_path))
}

#[test]
fn test_end_to_end_alignment() -> Result<()> {
    let dir = TempDir::new()?;
    let (subreads_path, ccs_path) = write_two_well_inputs(&dir)?;
    let output = dir.path().join("aligned.bam");

    let summary = run_with(&base_options(&subreads_path, &ccs_path, &output))?;
    assert_eq!(summary.wells_total, 2);
    assert_eq!(summary.wells_aligned, 2);
    assert_eq!(summary.wells_skipped, 0);

    let (header, records) = read_bam(&output)?;
    assert_eq!(summary.records_written, records.len() as u64);

    // One @SQ per well, in well order.
    let reference_names: Vec<String> =
        header.reference_sequences().keys().map(ToString::to_string).collect();
    assert_eq!(reference_names, vec![format!("{MOVIE}/5/ccs"), format!("{MOVIE}/7/ccs")]);
    let lengths: Vec<usize> =
        header.reference_sequences().values().map(|sq| sq.length().get()).collect();
    assert_eq!(lengths, vec![300, 250]);

    // The sidecar FASTA carries the same references.
    let fasta_names = read_fasta_names(&output.with_extension("fasta"))?;
    assert_eq!(fasta_names, reference_names);

    // A @PG entry records the run.
    assert!(header.programs().as_ref().contains_key(b"zmwalign".as_slice()));

    // Exactly one primary alignment per subread.
    let mut primary_names: Vec<String> = records
        .iter()
        .filter(|r| !r.flags().is_secondary() && !r.flags().is_supplementary())
        .filter_map(|r| r.name().map(|n| String::from_utf8_lossy(n.as_ref()).to_string()))
        .collect();
    primary_names.sort();
    let mut expected: Vec<String> = vec![
        format!("{MOVIE}/5/10_260"),
        format!("{MOVIE}/5/0_240"),
        format!("{MOVIE}/5/50_300"),
        format!("{MOVIE}/7/0_200"),
        format!("{MOVIE}/7/30_250"),
    ];
    expected.sort();
    assert_eq!(primary_names, expected);

    for record in &records {
        assert_cigar_spans_sequence(record);
        assert_eq!(record.mapping_quality().map(u8::from), Some(60));
    }
    for record in records_for_well(&records, MOVIE, 5) {
        assert_mapped_to(&header, record, &format!("{MOVIE}/5/ccs"));
    }
    for record in records_for_well(&records, MOVIE, 7) {
        assert_mapped_to(&header, record, &format!("{MOVIE}/7/ccs"));
    }

    // The reverse-complemented subread comes back on the reverse strand.
    let rc_name = format!("{MOVIE}/5/0_240");
    let rc_record = records
        .iter()
        .find(|r| {
            r.name().map(|n| String::from_utf8_lossy(n.as_ref()).to_string()).as_deref()
                == Some(rc_name.as_str())
                && !r.flags().is_secondary()
        })
        .expect("reverse subread should be aligned");
    assert!(rc_record.flags().is_reverse_complemented());

    let fwd_name = format!("{MOVIE}/5/10_260");
    let fwd_record = records
        .iter()
        .find(|r| {
            r.name().map(|n| String::from_utf8_lossy(n.as_ref()).to_string()).as_deref()
                == Some(fwd_name.as_str())
                && !r.flags().is_secondary()
        })
        .expect("forward subread should be aligned");
    assert!(!fwd_record.flags().is_reverse_complemented());

    Ok(())
}

#[test]
fn test_swapped_inputs_are_detected() -> Result<()> {
    let dir = TempDir::new()?;
    let (subreads_path, ccs_path) = write_two_well_inputs(&dir)?;
    let output = dir.path().join("aligned.bam");

    // Consensus first, subreads second: the pipeline swaps them itself.
    let summary = run_with(&base_options(&ccs_path, &subreads_path, &output))?;
    assert_eq!(summary.wells_aligned, 2);

    let (header, records) = read_bam(&output)?;
    assert_eq!(header.reference_sequences().len(), 2);
    assert_eq!(summary.records_written, records.len() as u64);
    Ok(())
}

#[test]
fn test_missing_subreads_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let ccs_path = dir.path().join("ccs.bam");
    write_ccs_bam(
        &ccs_path,
        MOVIE,
        &[(5, random_seq(200, 5)), (9, random_seq(200, 9))],
    )?;

    let seq5 = random_seq(200, 5);
    let subreads_path = dir.path().join("subreads.bam");
    write_subreads_bam(
        &subreads_path,
        MOVIE,
        &[Subread { hole: 5, query_start: 0, seq: seq5[0..150].to_vec() }],
    )?;

    let output = dir.path().join("aligned.bam");
    let result = run_with(&base_options(&subreads_path, &ccs_path, &output));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("no subreads indexed for well 9"), "got: {message}");
    Ok(())
}

#[test]
fn test_ccs_query_skips_missing_wells() -> Result<()> {
    let dir = TempDir::new()?;
    let ccs5 = random_seq(200, 5);
    let ccs_path = dir.path().join("ccs.bam");
    write_ccs_bam(&ccs_path, MOVIE, &[(5, ccs5.clone()), (9, random_seq(200, 9))])?;

    let subreads_path = dir.path().join("subreads.bam");
    write_subreads_bam(
        &subreads_path,
        MOVIE,
        &[Subread { hole: 5, query_start: 0, seq: ccs5[0..150].to_vec() }],
    )?;

    let output = dir.path().join("aligned.bam");
    let mut options = base_options(&subreads_path, &ccs_path, &output);
    options.ccs_query = true;
    let summary = run_with(&options)?;

    assert_eq!(summary.wells_total, 2);
    assert_eq!(summary.wells_aligned, 1);
    assert_eq!(summary.wells_skipped, 1);

    // Both wells still contribute a reference, aligned or not.
    let (header, records) = read_bam(&output)?;
    assert_eq!(header.reference_sequences().len(), 2);
    for record in &records {
        assert_mapped_to(&header, record, &format!("{MOVIE}/5/ccs"));
    }
    Ok(())
}

#[test]
fn test_two_subread_inputs_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path_a = dir.path().join("a.bam");
    let path_b = dir.path().join("b.bam");
    let seq = random_seq(100, 1);
    let subreads = vec![Subread { hole: 5, query_start: 0, seq }];
    write_subreads_bam(&path_a, MOVIE, &subreads)?;
    write_subreads_bam(&path_b, MOVIE, &subreads)?;

    let output = dir.path().join("aligned.bam");
    let result = run_with(&base_options(&path_a, &path_b, &output));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("both inputs contain subreads"), "got: {message}");
    Ok(())
}

#[test]
fn test_multi_read_wells_are_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    let ccs7 = random_seq(200, 7);
    let ccs_path = dir.path().join("ccs.bam");
    // Well 5 has two consensus reads and is dropped; well 7 is normal.
    write_ccs_bam(
        &ccs_path,
        MOVIE,
        &[(5, random_seq(200, 5)), (5, random_seq(200, 50)), (7, ccs7.clone())],
    )?;

    let subreads_path = dir.path().join("subreads.bam");
    write_subreads_bam(
        &subreads_path,
        MOVIE,
        &[Subread { hole: 7, query_start: 0, seq: ccs7[0..150].to_vec() }],
    )?;

    let output = dir.path().join("aligned.bam");
    let summary = run_with(&base_options(&subreads_path, &ccs_path, &output))?;

    assert_eq!(summary.wells_total, 1);
    assert_eq!(summary.wells_aligned, 1);

    let (header, _records) = read_bam(&output)?;
    let reference_names: Vec<String> =
        header.reference_sequences().keys().map(ToString::to_string).collect();
    assert_eq!(reference_names, vec![format!("{MOVIE}/7/ccs")]);
    Ok(())
}
