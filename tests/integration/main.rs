//! Integration tests for the zmwalign pipeline.
//!
//! These tests build small PacBio-style BAMs (with positional indexes) on
//! disk, run the full pipeline against them, and inspect the output BAM and
//! reference FASTA.

mod helpers;
mod test_pipeline;
mod test_well_selection;
