//! Two-pass alignment pipeline.
//!
//! Pass 1 streams the consensus BAM once to derive the reference set: one
//! FASTA record and one `@SQ` header entry per well with exactly one
//! consensus read. Pass 2 streams the consensus BAM again, pairs each well
//! with its subreads through the subread BAM's positional index, and fans
//! the per-well alignment work out over a bounded worker pool. A single
//! writer thread restores submission order before appending to the output
//! BAM.

use crate::alignment::{aln_to_record, AlignmentResult};
use crate::bam_io::{self, BamReader};
use crate::cigar::reversed;
use crate::engine::{AlignerEngine, RawMapping};
use crate::errors::ZmwAlignError;
use crate::logging::OperationTimer;
use crate::pbi::{self, PbiIndex};
use crate::progress::ProgressTracker;
use crate::validation::validate_files_exist;
use crate::zmw::ZmwGroup;
use noodles::sam::alignment::io::Write as _;
use crate::zmw_reader::{require_hole, BamZmwReader, ChunkSpec, ZmwFilter, ZmwReaderConfig};
use anyhow::{anyhow, Context, Result};
use bstr::{BString, ByteSlice};
use crossbeam_channel::bounded;
use log::{info, warn};
use noodles::bgzf::VirtualPosition;
use noodles::fasta;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::sam::header::record::value::map::program::tag as pg_tag;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
use noodles::sam::header::record::value::map::{Program, ReferenceSequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::Header;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Capacity of the task and result queues; small so both ends feel
/// backpressure.
const QUEUE_CAPACITY: usize = 10;

/// Everything the pipeline needs to run once.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// First positional input (conventionally the subreads BAM).
    pub input_a: PathBuf,
    /// Second positional input (conventionally the consensus BAM).
    pub input_b: PathBuf,
    /// Output BAM path; the reference FASTA lands next to it.
    pub output: PathBuf,
    /// Worker thread count.
    pub threads: usize,
    /// Optional chunk of the well space to process.
    pub chunk: Option<ChunkSpec>,
    /// Optional well filter (mutually exclusive with chunking).
    pub filter: ZmwFilter,
    /// Lenient mode: allow consensus-vs-consensus inputs and skip wells
    /// missing from the subread index instead of failing.
    pub ccs_query: bool,
    /// BGZF compression level for the output BAM.
    pub compression_level: u32,
    /// Version string recorded in the `@PG` header entry.
    pub version: String,
    /// Command line recorded in the `@PG` header entry.
    pub command_line: String,
}

/// Counters reported after a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Wells that produced a reference sequence in pass 1.
    pub wells_total: u64,
    /// Wells whose subreads were aligned and written.
    pub wells_aligned: u64,
    /// Wells skipped in lenient mode for want of indexed subreads.
    pub wells_skipped: u64,
    /// Alignment records appended to the output BAM.
    pub records_written: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadType {
    Ccs,
    Subread,
}

/// One well's worth of alignment work.
struct WellTask {
    seq: u64,
    ref_id: usize,
    ccs_seq: Vec<u8>,
    subreads: Vec<RecordBuf>,
}

/// Run the full pipeline.
///
/// # Errors
///
/// Fails on malformed inputs (wrong read types, missing positional index),
/// on I/O problems, and on engine failures propagated from the workers.
pub fn run(options: &PipelineOptions, engine: Arc<dyn AlignerEngine>) -> Result<PipelineSummary> {
    validate_files_exist(&[
        (&options.input_a, "First input BAM"),
        (&options.input_b, "Second input BAM"),
    ])?;

    let (clr_path, ccs_path, clr_header) = resolve_inputs(options)?;

    let clr_pbi_path = pbi::pbi_path_for(&clr_path);
    if !clr_pbi_path.exists() {
        return Err(ZmwAlignError::input_shape(format!(
            "subreads BAM has no positional index at {} (generate one with pbindex)",
            clr_pbi_path.display()
        ))
        .into());
    }
    let clr_index = PbiIndex::open(&clr_pbi_path)
        .with_context(|| format!("Failed to read {}", clr_pbi_path.display()))?;

    let reader_config = ZmwReaderConfig {
        chunk: options.chunk,
        filter: options.filter,
        decompression_threads: options.threads,
    };

    let timer = OperationTimer::new("Aligning subreads to consensus reads");

    // Pass 1: references, @SQ entries and the sidecar FASTA.
    let fasta_path = options.output.with_extension("fasta");
    let mut out_header = clr_header;
    let ref_base = out_header.reference_sequences().len();
    let total_wells = collect_references(&ccs_path, reader_config, &fasta_path, &mut out_header)?;
    info!("Found {total_wells} consensus reads");

    let out_header =
        add_program_record(out_header, &options.version, &options.command_line)?;

    let writer = bam_io::create_bam_writer(
        &options.output,
        &out_header,
        options.threads,
        options.compression_level,
    )?;

    // Pass 2: pair wells with subreads and align.
    let worker_count = options.threads.max(1);
    let progress = Arc::new(ProgressTracker::new("Aligned wells").with_total(total_wells));
    let (task_tx, task_rx) = bounded::<WellTask>(QUEUE_CAPACITY);
    let (result_tx, result_rx) = bounded::<(u64, Result<Vec<RecordBuf>>)>(QUEUE_CAPACITY);

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let task_rx = task_rx.clone();
        let result_tx = result_tx.clone();
        let engine = Arc::clone(&engine);
        workers.push(thread::spawn(move || {
            for task in &task_rx {
                let outcome = align_well(engine.as_ref(), &task);
                if result_tx.send((task.seq, outcome)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(task_rx);
    drop(result_tx);

    let writer_header = out_header.clone();
    let writer_progress = Arc::clone(&progress);
    let writer_handle = thread::spawn(move || -> Result<(u64, u64)> {
        let mut writer = writer;
        let mut buffered: BTreeMap<u64, Vec<RecordBuf>> = BTreeMap::new();
        let mut next_seq = 0u64;
        let mut wells = 0u64;
        let mut records_written = 0u64;
        for (seq, outcome) in &result_rx {
            buffered.insert(seq, outcome?);
            while let Some(records) = buffered.remove(&next_seq) {
                for record in &records {
                    writer.write_alignment_record(&writer_header, record)?;
                }
                records_written += records.len() as u64;
                wells += 1;
                next_seq += 1;
                writer_progress.log_if_needed(1);
            }
        }
        writer.into_inner().finish()?;
        Ok((wells, records_written))
    });

    let produced = submit_wells(
        &ccs_path,
        &clr_path,
        reader_config,
        &clr_index,
        ref_base,
        options.ccs_query,
        &progress,
        |task| task_tx.send(task).is_err(),
    );
    drop(task_tx);

    for handle in workers {
        handle.join().map_err(|_| anyhow!("alignment worker thread panicked"))?;
    }
    let (wells_aligned, records_written) =
        writer_handle.join().map_err(|_| anyhow!("writer thread panicked"))??;
    let wells_skipped = produced?;

    progress.log_final();
    timer.log_completion(records_written);

    Ok(PipelineSummary { wells_total: total_wells, wells_aligned, wells_skipped, records_written })
}

/// Determine each input's read type and put them in (subreads, consensus)
/// order, swapping if given the other way around.
fn resolve_inputs(options: &PipelineOptions) -> Result<(PathBuf, PathBuf, Header)> {
    let (_, header_a) = bam_io::create_bam_reader(&options.input_a, 1)?;
    let (_, header_b) = bam_io::create_bam_reader(&options.input_b, 1)?;
    let type_a = detect_read_type(&header_a, &options.input_a)?;
    let type_b = detect_read_type(&header_b, &options.input_b)?;

    match (type_a, type_b) {
        (ReadType::Subread, ReadType::Ccs) => {
            Ok((options.input_a.clone(), options.input_b.clone(), header_a))
        }
        (ReadType::Ccs, ReadType::Subread) => {
            info!("Inputs given in consensus-first order, swapping");
            Ok((options.input_b.clone(), options.input_a.clone(), header_b))
        }
        (ReadType::Ccs, ReadType::Ccs) => {
            if options.ccs_query {
                Ok((options.input_a.clone(), options.input_b.clone(), header_a))
            } else {
                Err(ZmwAlignError::input_shape(
                    "both inputs contain consensus reads; aligning them requires --ccs-query",
                )
                .into())
            }
        }
        (ReadType::Subread, ReadType::Subread) => Err(ZmwAlignError::input_shape(
            "both inputs contain subreads; one must be a consensus BAM",
        )
        .into()),
    }
}

fn detect_read_type(header: &Header, path: &Path) -> Result<ReadType> {
    let read_groups = header.read_groups();
    if read_groups.is_empty() {
        return Err(ZmwAlignError::input_shape(format!(
            "{} has no read groups to determine its read type",
            path.display()
        ))
        .into());
    }

    let mut detected = None;
    for (id, read_group) in read_groups {
        let ds = read_group.other_fields().get(&rg_tag::DESCRIPTION).ok_or_else(|| {
            ZmwAlignError::input_shape(format!(
                "read group {id} in {} has no DS field",
                path.display()
            ))
        })?;
        let read_type = parse_read_type(ds.as_ref()).ok_or_else(|| {
            ZmwAlignError::input_shape(format!(
                "read group {id} in {} has no recognized READTYPE",
                path.display()
            ))
        })?;
        match detected {
            None => detected = Some(read_type),
            Some(previous) if previous != read_type => {
                return Err(ZmwAlignError::input_shape(format!(
                    "{} mixes read types across read groups",
                    path.display()
                ))
                .into());
            }
            Some(_) => {}
        }
    }

    detected.ok_or_else(|| {
        ZmwAlignError::input_shape(format!("{} has no usable read groups", path.display())).into()
    })
}

fn parse_read_type(description: &[u8]) -> Option<ReadType> {
    for field in description.split_str(";") {
        if let Some(value) = field.strip_prefix(b"READTYPE=") {
            return match value {
                b"CCS" => Some(ReadType::Ccs),
                b"SUBREAD" => Some(ReadType::Subread),
                _ => None,
            };
        }
    }
    None
}

/// A well's group contributes a reference only when it holds exactly one
/// non-empty consensus read.
fn accept_ccs_group(group: &ZmwGroup, log: bool) -> Option<&RecordBuf> {
    if group.len() != 1 {
        if log {
            warn!("Well {} has {} consensus reads, skipping", group.hole, group.len());
        }
        return None;
    }
    let record = &group.records[0];
    if record.sequence().as_ref().is_empty() {
        if log {
            warn!("Well {} has an empty consensus read, skipping", group.hole);
        }
        return None;
    }
    Some(record)
}

/// Pass 1: write the reference FASTA and append one `@SQ` per accepted well.
fn collect_references(
    ccs_path: &Path,
    reader_config: ZmwReaderConfig,
    fasta_path: &Path,
    out_header: &mut Header,
) -> Result<u64> {
    let mut fasta_writer = bam_io::create_fasta_writer(fasta_path)?;
    let mut ccs_reader = BamZmwReader::new(ccs_path, reader_config)?;
    let mut total = 0u64;

    while let Some(group) = ccs_reader.get_next()? {
        let Some(record) = accept_ccs_group(&group, true) else {
            continue;
        };
        let name = record
            .name()
            .ok_or_else(|| ZmwAlignError::input_shape("consensus record has no name"))?
            .to_owned();
        let sequence = record.sequence().as_ref();
        let length = NonZeroUsize::new(sequence.len())
            .ok_or_else(|| ZmwAlignError::input_shape("consensus record has no sequence"))?;

        out_header
            .reference_sequences_mut()
            .insert(name.clone(), Map::<ReferenceSequence>::new(length));

        let definition = fasta::record::Definition::new(name, None);
        let fasta_sequence = fasta::record::Sequence::from(sequence.to_vec());
        fasta_writer.write_record(&fasta::Record::new(definition, fasta_sequence))?;

        total += 1;
    }

    use std::io::Write;
    fasta_writer.into_inner().flush()?;

    Ok(total)
}

/// Pass 2 producer: replay the consensus stream, fetch each well's subreads
/// and hand tasks to the worker pool. Returns the lenient-skip count.
#[allow(clippy::too_many_arguments)]
fn submit_wells(
    ccs_path: &Path,
    clr_path: &Path,
    reader_config: ZmwReaderConfig,
    clr_index: &PbiIndex,
    ref_base: usize,
    lenient: bool,
    progress: &ProgressTracker,
    mut send: impl FnMut(WellTask) -> bool,
) -> Result<u64> {
    let mut ccs_reader = BamZmwReader::new(ccs_path, reader_config)?;
    let mut cursor = ClrCursor::new(clr_path, clr_index.hole_to_offset())?;
    let mut seq = 0u64;
    let mut skipped = 0u64;
    let mut ref_id = ref_base;

    while let Some(group) = ccs_reader.get_next()? {
        let Some(record) = accept_ccs_group(&group, false) else {
            continue;
        };
        let current_ref = ref_id;
        ref_id += 1;

        let Some(subreads) = cursor.take(group.hole)? else {
            if !lenient {
                return Err(ZmwAlignError::input_shape(format!(
                    "no subreads indexed for well {}; rerun with --ccs-query to skip such wells",
                    group.hole
                ))
                .into());
            }
            warn!("Well {} has no indexed subreads, skipping", group.hole);
            skipped += 1;
            progress.log_if_needed(1);
            continue;
        };

        let task = WellTask {
            seq,
            ref_id: current_ref,
            ccs_seq: record.sequence().as_ref().to_vec(),
            subreads,
        };
        if send(task) {
            // Downstream hung up; its error surfaces at join.
            break;
        }
        seq += 1;
    }

    Ok(skipped)
}

/// Align one well and build its output records.
fn align_well(engine: &dyn AlignerEngine, task: &WellTask) -> Result<Vec<RecordBuf>> {
    let queries: Vec<Vec<u8>> =
        task.subreads.iter().map(|r| r.sequence().as_ref().to_vec()).collect();
    let mappings = engine.map_and_align(std::slice::from_ref(&task.ccs_seq), &queries)?;

    let mut records = Vec::new();
    for (subread, read_mappings) in task.subreads.iter().zip(&mappings) {
        for mapping in read_mappings {
            let aln = mapping_to_alignment(mapping);
            records.push(aln_to_record(task.ref_id, &aln, subread)?);
        }
    }
    Ok(records)
}

/// Express an engine mapping on the forward reference strand: reverse-strand
/// CIGARs are stored in native orientation and need their op order flipped.
fn mapping_to_alignment(mapping: &RawMapping) -> AlignmentResult {
    let cigar = if mapping.target_reversed {
        reversed(&mapping.cigar)
    } else {
        mapping.cigar.clone()
    };
    AlignmentResult {
        ref_id: mapping.target_id,
        ref_reversed: mapping.target_reversed,
        ref_start: mapping.target_start,
        ref_end: mapping.target_end,
        query_start: mapping.query_start,
        query_end: mapping.query_end,
        query_len: mapping.query_len,
        cigar,
        mapq: 60,
        score: mapping.score,
        is_aligned: true,
        is_supplementary: mapping.is_supplementary,
        is_secondary: mapping.priority > 0,
    }
}

/// Sequential subread cursor with index-assisted seeks.
///
/// Wells usually arrive in file order, so the cursor reads straight through;
/// when the requested well is not the next one on the stream it seeks to the
/// well's first record via the positional index.
struct ClrCursor {
    reader: BamReader,
    header: Header,
    pending: Option<RecordBuf>,
    offsets: HashMap<i32, VirtualPosition>,
}

impl ClrCursor {
    fn new(path: &Path, offsets: HashMap<i32, VirtualPosition>) -> Result<Self> {
        let (reader, header) = bam_io::create_seekable_bam_reader(path)?;
        Ok(Self { reader, header, pending: None, offsets })
    }

    /// All contiguous records for `hole`, or `None` when the index does not
    /// know the well.
    fn take(&mut self, hole: i32) -> Result<Option<Vec<RecordBuf>>> {
        let on_stream = match self.peek_hole()? {
            Some(next) => next == hole,
            None => false,
        };
        if !on_stream {
            let Some(&offset) = self.offsets.get(&hole) else {
                return Ok(None);
            };
            self.pending = None;
            self.reader.get_mut().seek_to(offset)?;
            match self.peek_hole()? {
                Some(next) if next == hole => {}
                _ => {
                    return Err(ZmwAlignError::input_shape(format!(
                        "positional index points at no records for well {hole}"
                    ))
                    .into());
                }
            }
        }

        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            if require_hole(&record)? == hole {
                records.push(record);
            } else {
                self.pending = Some(record);
                break;
            }
        }
        Ok(Some(records))
    }

    fn peek_hole(&mut self) -> Result<Option<i32>> {
        if self.pending.is_none() {
            self.pending = self.read_one()?;
        }
        self.pending.as_ref().map(require_hole).transpose().map_err(Into::into)
    }

    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        self.read_one()
    }

    fn read_one(&mut self) -> Result<Option<RecordBuf>> {
        let mut record = RecordBuf::default();
        if self.reader.read_record_buf(&self.header, &mut record)? == 0 {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

/// Append a `@PG` record with a unique id and PP chaining to the last
/// program already in the header.
fn add_program_record(mut header: Header, version: &str, command_line: &str) -> Result<Header> {
    let previous = last_program_id(&header);
    let unique_id = unique_program_id(&header, "zmwalign");

    let mut builder = Map::<Program>::builder()
        .insert(pg_tag::NAME, "zmwalign")
        .insert(pg_tag::VERSION, version)
        .insert(pg_tag::COMMAND_LINE, command_line);
    if let Some(previous) = &previous {
        builder = builder.insert(pg_tag::PREVIOUS_PROGRAM_ID, previous.as_str());
    }
    let record = builder.build()?;

    header.programs_mut().add(BString::from(unique_id), record)?;
    Ok(header)
}

/// The program not referenced by any other program's PP tag.
fn last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let program_map = programs.as_ref();
    if program_map.is_empty() {
        return None;
    }

    let mut referenced: HashSet<&[u8]> = HashSet::new();
    for (_id, pg) in program_map {
        if let Some(pp) = pg.other_fields().get(&pg_tag::PREVIOUS_PROGRAM_ID) {
            referenced.insert(pp.as_ref());
        }
    }

    for (id, _pg) in program_map {
        if !referenced.contains(id.as_slice()) {
            return Some(String::from_utf8_lossy(id).to_string());
        }
    }
    program_map.keys().next().map(|id| String::from_utf8_lossy(id).to_string())
}

fn unique_program_id(header: &Header, base_id: &str) -> String {
    let programs = header.programs();
    let program_map = programs.as_ref();
    if !program_map.contains_key(base_id.as_bytes()) {
        return base_id.to_string();
    }
    for i in 1..=1000 {
        let candidate = format!("{base_id}.{i}");
        if !program_map.contains_key(candidate.as_bytes()) {
            return candidate;
        }
    }
    format!("{base_id}.{}", std::process::id())
}
