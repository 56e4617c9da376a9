//! CIGAR algebra for per-well alignments.
//!
//! Alignments move between two representations: the usual run-length CIGAR
//! (`noodles` ops) and a flat per-base vector of [`AlnOp`] codes. The flat form
//! makes coordinate-exact clipping a simple cursor walk; the run-length form is
//! what goes into BAM records.

use crate::dna::reverse_complement;
use crate::errors::{Result, ZmwAlignError};
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record_buf::Cigar;

/// A single per-base alignment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlnOp {
    /// Query base equals the reference base
    Match,
    /// Query base absent from the reference
    Ins,
    /// Reference base absent from the query
    Del,
    /// Query base differs from the reference base
    Mismatch,
    /// Clip, skip, or padding; carries no base-level information
    Undefined,
}

/// Expand a run-length CIGAR into one [`AlnOp`] per base.
///
/// `M` and `=` both map to [`AlnOp::Match`]; clips, skips, and padding map to
/// [`AlnOp::Undefined`].
#[must_use]
pub fn to_flat_ops(cigar: &Cigar) -> Vec<AlnOp> {
    let ops: &[Op] = cigar.as_ref();
    let total: usize = ops.iter().map(|op| op.len()).sum();
    let mut flat = Vec::with_capacity(total);
    for op in ops {
        let code = match op.kind() {
            Kind::Match | Kind::SequenceMatch => AlnOp::Match,
            Kind::SequenceMismatch => AlnOp::Mismatch,
            Kind::Insertion => AlnOp::Ins,
            Kind::Deletion => AlnOp::Del,
            Kind::Skip | Kind::SoftClip | Kind::HardClip | Kind::Pad => AlnOp::Undefined,
        };
        flat.extend(std::iter::repeat_n(code, op.len()));
    }
    flat
}

/// Run-length encode a flat op vector back into a CIGAR.
///
/// Adjacent equal codes merge into a single op, so the result is minimal.
/// Matches are emitted as `=`, never `M`. Only defined over the four-symbol
/// alphabet; [`AlnOp::Undefined`] entries become skips.
#[must_use]
pub fn from_flat_ops(flat: &[AlnOp]) -> Cigar {
    let mut ops: Vec<Op> = Vec::new();
    for &code in flat {
        let kind = match code {
            AlnOp::Match => Kind::SequenceMatch,
            AlnOp::Ins => Kind::Insertion,
            AlnOp::Del => Kind::Deletion,
            AlnOp::Mismatch => Kind::SequenceMismatch,
            AlnOp::Undefined => Kind::Skip,
        };
        match ops.last_mut() {
            Some(last) if last.kind() == kind => *last = Op::new(kind, last.len() + 1),
            _ => ops.push(Op::new(kind, 1)),
        }
    }
    Cigar::from(ops)
}

/// Reverse the op order of a CIGAR.
///
/// Used to express a reverse-strand mapping's CIGAR as a forward-strand walk
/// of the reference.
#[must_use]
pub fn reversed(cigar: &Cigar) -> Cigar {
    let mut ops: Vec<Op> = cigar.as_ref().to_vec();
    ops.reverse();
    Cigar::from(ops)
}

/// Number of query bases the CIGAR consumes.
#[must_use]
pub fn query_span(cigar: &Cigar) -> usize {
    cigar
        .as_ref()
        .iter()
        .filter(|op| {
            matches!(
                op.kind(),
                Kind::Match
                    | Kind::SequenceMatch
                    | Kind::SequenceMismatch
                    | Kind::Insertion
                    | Kind::SoftClip
            )
        })
        .map(|op| op.len())
        .sum()
}

/// Number of reference bases the CIGAR consumes.
#[must_use]
pub fn reference_span(cigar: &Cigar) -> usize {
    cigar
        .as_ref()
        .iter()
        .filter(|op| {
            matches!(
                op.kind(),
                Kind::Match
                    | Kind::SequenceMatch
                    | Kind::SequenceMismatch
                    | Kind::Deletion
                    | Kind::Skip
            )
        })
        .map(|op| op.len())
        .sum()
}

/// Fraction of aligned columns that are exact matches, in `[0, 1]`.
///
/// Computed as `matches / (matches + mismatches + insertions)`. Returns 0.0
/// when the denominator is zero, and 0.0 when the CIGAR contains any op kind
/// outside `=`/`X`/`I`/`D`. An alignment-match (`M`) op is ambiguous about
/// identity and is treated as unsupported rather than guessed at.
#[must_use]
pub fn identity(cigar: &Cigar) -> f64 {
    let mut eq: u64 = 0;
    let mut mismatch: u64 = 0;
    let mut ins: u64 = 0;
    for op in cigar.as_ref() {
        let len = op.len() as u64;
        match op.kind() {
            Kind::SequenceMatch => eq += len,
            Kind::SequenceMismatch => mismatch += len,
            Kind::Insertion => ins += len,
            Kind::Deletion => {}
            _ => return 0.0,
        }
    }
    let denom = eq + mismatch + ins;
    if denom == 0 { 0.0 } else { eq as f64 / denom as f64 }
}

/// Render a CIGAR as its text form, e.g. `5=1X2I3=`.
#[must_use]
pub fn cigar_to_string(cigar: &Cigar) -> String {
    let mut out = String::new();
    for op in cigar.as_ref() {
        let ch = match op.kind() {
            Kind::Match => 'M',
            Kind::Insertion => 'I',
            Kind::Deletion => 'D',
            Kind::Skip => 'N',
            Kind::SoftClip => 'S',
            Kind::HardClip => 'H',
            Kind::Pad => 'P',
            Kind::SequenceMatch => '=',
            Kind::SequenceMismatch => 'X',
        };
        out.push_str(&op.len().to_string());
        out.push(ch);
    }
    out
}

/// Reconstruct the two gapped rows of a pairwise alignment.
///
/// `reference` and `query` are the full sequences; the coordinate window and
/// the CIGAR describe the aligned region, with query coordinates in
/// forward-read space. When `query_reversed` is set the query substring is
/// reverse complemented before the walk, matching how reverse-strand CIGARs
/// are stored. Gap columns are filled with `-`.
///
/// # Errors
///
/// Returns [`ZmwAlignError::MalformedCigar`] for op kinds that cannot appear
/// in a pairwise rendering (hard clips and padding).
#[allow(clippy::too_many_arguments)]
pub fn to_pairwise_strings(
    reference: &[u8],
    query: &[u8],
    r_start: usize,
    r_end: usize,
    q_start: usize,
    q_end: usize,
    query_reversed: bool,
    cigar: &Cigar,
) -> Result<(Vec<u8>, Vec<u8>)> {
    debug_assert_eq!(reference_span(cigar), r_end - r_start);
    debug_assert_eq!(query_span(cigar), q_end - q_start);

    let ref_sub = &reference[r_start..r_end];
    let query_sub = if query_reversed {
        reverse_complement(&query[q_start..q_end])
    } else {
        query[q_start..q_end].to_vec()
    };

    let columns: usize = cigar.as_ref().iter().map(|op| op.len()).sum();
    let mut ref_row = Vec::with_capacity(columns);
    let mut query_row = Vec::with_capacity(columns);

    let mut r_pos = 0;
    let mut q_pos = 0;
    for op in cigar.as_ref() {
        let len = op.len();
        match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                ref_row.extend_from_slice(&ref_sub[r_pos..r_pos + len]);
                query_row.extend_from_slice(&query_sub[q_pos..q_pos + len]);
                r_pos += len;
                q_pos += len;
            }
            Kind::Insertion | Kind::SoftClip => {
                ref_row.extend(std::iter::repeat_n(b'-', len));
                query_row.extend_from_slice(&query_sub[q_pos..q_pos + len]);
                q_pos += len;
            }
            Kind::Deletion | Kind::Skip => {
                ref_row.extend_from_slice(&ref_sub[r_pos..r_pos + len]);
                query_row.extend(std::iter::repeat_n(b'-', len));
                r_pos += len;
            }
            Kind::HardClip => return Err(ZmwAlignError::MalformedCigar { op: 'H' }),
            Kind::Pad => return Err(ZmwAlignError::MalformedCigar { op: 'P' }),
        }
    }

    Ok((ref_row, query_row))
}
