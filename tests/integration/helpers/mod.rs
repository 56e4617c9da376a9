//! Shared helpers for integration tests.

pub mod assertions;
pub mod bam_generator;
