//! Alignment results and coordinate-exact clipping.
//!
//! An [`AlignmentResult`] describes one mapping of a read against a per-well
//! consensus sequence. Reference coordinates are always on the forward
//! reference strand; query coordinates are always in forward-read space, even
//! for reverse-strand mappings. The stored CIGAR walks the forward reference
//! strand; for a reverse-strand mapping it pairs reference bases with the
//! reverse complement of the read, starting at `query_len - query_end` in
//! reverse-complement space.

use crate::cigar::{from_flat_ops, to_flat_ops, AlnOp};
use crate::dna::reverse_complement;
use anyhow::{Context, Result};
use noodles::core::Position;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record::{Flags, MappingQuality};
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, RecordBuf, Sequence};

/// One mapping of a query read against a reference sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    /// Index of the reference sequence this mapping targets
    pub ref_id: i32,
    /// Whether the mapping is on the reverse reference strand
    pub ref_reversed: bool,
    /// Half-open reference interval start, forward strand
    pub ref_start: i64,
    /// Half-open reference interval end, forward strand
    pub ref_end: i64,
    /// Half-open query interval start, forward-read space
    pub query_start: i64,
    /// Half-open query interval end, forward-read space
    pub query_end: i64,
    /// Full query read length
    pub query_len: i64,
    /// Forward-reference-strand CIGAR covering exactly the two intervals
    pub cigar: Cigar,
    /// Mapping quality
    pub mapq: u8,
    /// Aligner score
    pub score: i32,
    /// Whether this result represents a real alignment
    pub is_aligned: bool,
    /// Supplementary mapping flag
    pub is_supplementary: bool,
    /// Secondary mapping flag
    pub is_secondary: bool,
}

impl AlignmentResult {
    /// Build an aligned, primary result with mapq 60 and score 0. Handy for
    /// tests and for callers that fill in the rest afterwards.
    #[must_use]
    pub fn new_aligned(
        ref_reversed: bool,
        ref_start: i64,
        ref_end: i64,
        query_start: i64,
        query_end: i64,
        query_len: i64,
        cigar: Cigar,
    ) -> Self {
        Self {
            ref_id: 0,
            ref_reversed,
            ref_start,
            ref_end,
            query_start,
            query_end,
            query_len,
            cigar,
            mapq: 60,
            score: 0,
            is_aligned: true,
            is_supplementary: false,
            is_secondary: false,
        }
    }

    /// Restrict this alignment to the window that survives clipping
    /// `front_clip_query`/`back_clip_query` bases of the query and
    /// `front_clip_ref`/`back_clip_ref` bases of the reference, where the back
    /// clip values are exclusive upper bounds in the original coordinate
    /// systems.
    ///
    /// The walk happens in the CIGAR's own coordinate frame: forward-read
    /// space for forward mappings, reverse-complement space for reverse
    /// mappings, with query cursors mirrored back to forward-read space at the
    /// end. A deletion consumes no query base and is never allowed to be the
    /// boundary op of the clipped window; an insertion may be. Reference
    /// coordinates are rebased by subtracting `front_clip_ref`; query
    /// coordinates by subtracting `front_clip_query`.
    ///
    /// Returns `None` when the result is not aligned or when the clip window
    /// is empty or inverted on either axis.
    #[must_use]
    pub fn clip(
        &self,
        front_clip_query: i64,
        back_clip_query: i64,
        front_clip_ref: i64,
        back_clip_ref: i64,
    ) -> Option<AlignmentResult> {
        if !self.is_aligned {
            return None;
        }

        let flat = to_flat_ops(&self.cigar);
        if flat.is_empty() {
            return None;
        }

        // Walk forward to the first op inside the window.
        let mut vec_start = 0;
        let mut q_pos = if self.ref_reversed {
            self.query_len - self.query_end
        } else {
            self.query_start
        };
        let mut r_pos = self.ref_start;
        for (vec_id, &op) in flat.iter().enumerate() {
            vec_start = vec_id;
            if q_pos >= front_clip_query && r_pos >= front_clip_ref && op != AlnOp::Del {
                break;
            }
            match op {
                AlnOp::Match | AlnOp::Mismatch => {
                    q_pos += 1;
                    r_pos += 1;
                }
                AlnOp::Ins => q_pos += 1,
                AlnOp::Del => r_pos += 1,
                AlnOp::Undefined => {}
            }
        }
        let new_q_start = q_pos;
        let new_r_start = r_pos - front_clip_ref;

        // Walk backward to the last op inside the window.
        let mut vec_end = flat.len();
        let mut q_pos =
            (if self.ref_reversed { self.query_len - self.query_start } else { self.query_end })
                - 1;
        let mut r_pos = self.ref_end - 1;
        for vec_id in (0..flat.len()).rev() {
            vec_end = vec_id;
            let op = flat[vec_id];
            if q_pos < back_clip_query && r_pos < back_clip_ref && op != AlnOp::Del {
                break;
            }
            match op {
                AlnOp::Match | AlnOp::Mismatch => {
                    q_pos -= 1;
                    r_pos -= 1;
                }
                AlnOp::Ins => q_pos -= 1,
                AlnOp::Del => r_pos -= 1,
                AlnOp::Undefined => {}
            }
        }
        let new_q_end = q_pos + 1;
        let new_r_end = r_pos + 1 - front_clip_ref;
        vec_end += 1;

        if new_q_end <= new_q_start || new_r_end <= new_r_start || vec_end <= vec_start {
            return None;
        }

        let new_cigar = from_flat_ops(&flat[vec_start..vec_end]);

        // Mirror query cursors back to forward-read space, then rebase.
        let (mut new_q_start, mut new_q_end) = if self.ref_reversed {
            (self.query_len - new_q_end, self.query_len - new_q_start)
        } else {
            (new_q_start, new_q_end)
        };
        new_q_start -= front_clip_query;
        new_q_end -= front_clip_query;

        Some(AlignmentResult {
            ref_id: self.ref_id,
            ref_reversed: self.ref_reversed,
            ref_start: new_r_start,
            ref_end: new_r_end,
            query_start: new_q_start,
            query_end: new_q_end,
            query_len: self.query_len,
            cigar: new_cigar,
            mapq: self.mapq,
            score: self.score,
            is_aligned: self.is_aligned,
            is_supplementary: self.is_supplementary,
            is_secondary: self.is_secondary,
        })
    }
}

/// Build the output BAM record for one alignment of `read`.
///
/// The record keeps the read's full-length sequence, qualities, name, and
/// tags; the unaligned prefix and suffix become soft clips around the
/// alignment's CIGAR, so the CIGAR's query span always equals the read
/// length. For reverse-strand mappings the stored sequence is reverse
/// complemented and the qualities reversed, and the soft clip lengths swap
/// ends to match.
///
/// # Errors
///
/// Returns an error if the alignment start is not a valid 1-based position.
pub fn aln_to_record(ref_id: usize, aln: &AlignmentResult, read: &RecordBuf) -> Result<RecordBuf> {
    let clip_start =
        if aln.ref_reversed { aln.query_len - aln.query_end } else { aln.query_start };
    let clip_end = if aln.ref_reversed { aln.query_start } else { aln.query_len - aln.query_end };

    let mut ops: Vec<Op> = Vec::with_capacity(aln.cigar.as_ref().len() + 2);
    if clip_start > 0 {
        ops.push(Op::new(Kind::SoftClip, clip_start as usize));
    }
    ops.extend_from_slice(aln.cigar.as_ref());
    if clip_end > 0 {
        ops.push(Op::new(Kind::SoftClip, clip_end as usize));
    }

    let mut flags = Flags::empty();
    if aln.ref_reversed {
        flags |= Flags::REVERSE_COMPLEMENTED;
    }
    if aln.is_secondary {
        flags |= Flags::SECONDARY;
    }
    if aln.is_supplementary {
        flags |= Flags::SUPPLEMENTARY;
    }

    let sequence: Vec<u8> = if aln.ref_reversed {
        reverse_complement(read.sequence().as_ref())
    } else {
        read.sequence().as_ref().to_vec()
    };
    let quality_scores: Vec<u8> = if aln.ref_reversed {
        read.quality_scores().as_ref().iter().rev().copied().collect()
    } else {
        read.quality_scores().as_ref().to_vec()
    };

    let start = Position::try_from((aln.ref_start + 1) as usize)
        .with_context(|| format!("invalid alignment start: {}", aln.ref_start))?;

    let mut record = RecordBuf::builder()
        .set_flags(flags)
        .set_reference_sequence_id(ref_id)
        .set_alignment_start(start)
        .set_cigar(Cigar::from(ops))
        .set_sequence(Sequence::from(sequence))
        .set_quality_scores(QualityScores::from(quality_scores))
        .build();
    if let Some(name) = read.name() {
        *record.name_mut() = Some(name.to_owned());
    }
    *record.data_mut() = read.data().clone();
    *record.mapping_quality_mut() = MappingQuality::new(aln.mapq);

    Ok(record)
}
