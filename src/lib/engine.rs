//! Pairwise mapping engine behind a narrow trait.
//!
//! The pipeline only needs one operation from an aligner: map a batch of
//! query reads against a batch of reference sequences and report mappings
//! with coordinates and a base-level CIGAR. Everything else (seeding, band
//! selection, score tuning) stays behind [`AlignerEngine`], so tests can
//! substitute a mock and the default implementation can change without
//! touching the pipeline.

use crate::cigar::reversed;
use anyhow::Result;
use bio::alignment::pairwise::banded::Aligner;
use bio::alignment::pairwise::MatchParams;
use bio::alignment::AlignmentOperation;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record_buf::Cigar;

/// One raw mapping reported by an engine.
///
/// Coordinates follow the same conventions as
/// [`AlignmentResult`](crate::alignment::AlignmentResult): reference
/// coordinates on the forward reference strand, query coordinates in
/// forward-read space. The CIGAR is stored in the mapping's native
/// orientation: for a reverse-strand mapping its op order walks the reverse
/// reference strand, and the consumer reverses it to obtain the
/// forward-strand walk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMapping {
    /// Index into the reference batch
    pub target_id: i32,
    /// Whether the mapping is on the reverse reference strand
    pub target_reversed: bool,
    /// Half-open reference start, forward strand
    pub target_start: i64,
    /// Half-open reference end, forward strand
    pub target_end: i64,
    /// Half-open query start, forward-read space
    pub query_start: i64,
    /// Half-open query end, forward-read space
    pub query_end: i64,
    /// Full query length
    pub query_len: i64,
    /// Native-orientation CIGAR
    pub cigar: Cigar,
    /// Aligner score
    pub score: i32,
    /// Supplementary mapping flag
    pub is_supplementary: bool,
    /// Rank among this query's mappings; 0 is primary, anything greater is
    /// reported as secondary
    pub priority: u32,
}

/// Maps query sequences onto reference sequences and aligns them base by
/// base.
pub trait AlignerEngine: Send + Sync {
    /// Align every query against every reference, returning one mapping list
    /// per query. Lists may be empty for queries that produced no mapping
    /// above the engine's score floor.
    fn map_and_align(
        &self,
        references: &[Vec<u8>],
        queries: &[Vec<u8>],
    ) -> Result<Vec<Vec<RawMapping>>>;
}

/// Scoring and banding parameters for [`BandedEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// K-mer length used to find band anchors
    pub kmer_size: usize,
    /// Band width around the anchor diagonal
    pub band_width: usize,
    /// Match score (positive)
    pub match_score: i32,
    /// Mismatch score (negative)
    pub mismatch_score: i32,
    /// Gap open score (negative)
    pub gap_open: i32,
    /// Gap extend score (negative)
    pub gap_extend: i32,
    /// Mappings scoring below this are dropped
    pub min_score: i32,
}

/// References shorter than this use the short-insert parameter set.
const SHORT_INSERT_LEN: usize = 200;

impl EngineSettings {
    /// Parameters for aligning noisy subreads against a consensus read.
    #[must_use]
    pub fn subread() -> Self {
        Self {
            kmer_size: 15,
            band_width: 50,
            match_score: 2,
            mismatch_score: -4,
            gap_open: -4,
            gap_extend: -2,
            min_score: 40,
        }
    }

    /// Parameters for short inserts, where 15-mers are too sparse to anchor a
    /// band reliably.
    #[must_use]
    pub fn short_insert() -> Self {
        Self { kmer_size: 4, band_width: 10, min_score: 10, ..Self::subread() }
    }

    /// Pick the parameter set for a reference of the given length.
    #[must_use]
    pub fn for_reference_len(len: usize) -> Self {
        if len < SHORT_INSERT_LEN { Self::short_insert() } else { Self::subread() }
    }
}

/// Default engine: a banded local aligner that tries both query orientations
/// against each reference and keeps the survivors above the score floor, best
/// first.
#[derive(Debug, Default)]
pub struct BandedEngine {
    /// When set, overrides the per-reference parameter selection.
    settings: Option<EngineSettings>,
}

impl BandedEngine {
    /// Engine that picks parameters per reference length.
    #[must_use]
    pub fn new() -> Self {
        Self { settings: None }
    }

    /// Engine with fixed parameters, mainly for tests.
    #[must_use]
    pub fn with_settings(settings: EngineSettings) -> Self {
        Self { settings: Some(settings) }
    }

    fn settings_for(&self, reference_len: usize) -> EngineSettings {
        self.settings.unwrap_or_else(|| EngineSettings::for_reference_len(reference_len))
    }
}

impl AlignerEngine for BandedEngine {
    fn map_and_align(
        &self,
        references: &[Vec<u8>],
        queries: &[Vec<u8>],
    ) -> Result<Vec<Vec<RawMapping>>> {
        let mut results: Vec<Vec<RawMapping>> = vec![Vec::new(); queries.len()];
        if references.is_empty() || queries.is_empty() {
            return Ok(results);
        }

        for (query_id, query) in queries.iter().enumerate() {
            if query.is_empty() {
                continue;
            }
            let mut mappings: Vec<RawMapping> = Vec::new();
            for (target_id, reference) in references.iter().enumerate() {
                if reference.is_empty() {
                    continue;
                }
                let settings = self.settings_for(reference.len());
                for reversed_strand in [false, true] {
                    if let Some(mapping) = align_one(
                        reference,
                        query,
                        target_id as i32,
                        reversed_strand,
                        &settings,
                    ) {
                        mappings.push(mapping);
                    }
                }
            }
            mappings.sort_by(|a, b| b.score.cmp(&a.score));
            for (rank, mapping) in mappings.iter_mut().enumerate() {
                mapping.priority = rank as u32;
            }
            results[query_id] = mappings;
        }

        Ok(results)
    }
}

/// Align one query orientation against one reference. The walk is done on the
/// reverse complement for `reversed_strand`, then the coordinates are mapped
/// back to forward-read space and the CIGAR flipped into its native
/// (reverse-strand) orientation.
fn align_one(
    reference: &[u8],
    query: &[u8],
    target_id: i32,
    reversed_strand: bool,
    settings: &EngineSettings,
) -> Option<RawMapping> {
    let oriented;
    let oriented_query: &[u8] = if reversed_strand {
        oriented = crate::dna::reverse_complement(query);
        &oriented
    } else {
        query
    };

    let match_fn = MatchParams::new(settings.match_score, settings.mismatch_score);
    let mut aligner = Aligner::with_capacity(
        oriented_query.len(),
        reference.len(),
        settings.gap_open,
        settings.gap_extend,
        match_fn,
        settings.kmer_size,
        settings.band_width,
    );
    let alignment = aligner.local(oriented_query, reference);

    if alignment.score < settings.min_score || alignment.xstart == alignment.xend {
        return None;
    }

    let cigar = operations_to_cigar(&alignment.operations);
    let query_len = query.len() as i64;
    let (query_start, query_end) = if reversed_strand {
        (query_len - alignment.xend as i64, query_len - alignment.xstart as i64)
    } else {
        (alignment.xstart as i64, alignment.xend as i64)
    };
    let cigar = if reversed_strand { reversed(&cigar) } else { cigar };

    Some(RawMapping {
        target_id,
        target_reversed: reversed_strand,
        target_start: alignment.ystart as i64,
        target_end: alignment.yend as i64,
        query_start,
        query_end,
        query_len,
        cigar,
        score: alignment.score,
        is_supplementary: false,
        priority: 0,
    })
}

/// Convert rust-bio alignment operations into a run-length CIGAR, dropping
/// clip operations (the coordinates already carry them).
fn operations_to_cigar(operations: &[AlignmentOperation]) -> Cigar {
    let mut ops: Vec<Op> = Vec::new();
    for operation in operations {
        let kind = match operation {
            AlignmentOperation::Match => Kind::SequenceMatch,
            AlignmentOperation::Subst => Kind::SequenceMismatch,
            AlignmentOperation::Ins => Kind::Insertion,
            AlignmentOperation::Del => Kind::Deletion,
            AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_) => continue,
        };
        match ops.last_mut() {
            Some(last) if last.kind() == kind => *last = Op::new(kind, last.len() + 1),
            _ => ops.push(Op::new(kind, 1)),
        }
    }
    Cigar::from(ops)
}
