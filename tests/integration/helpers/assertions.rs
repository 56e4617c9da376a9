//! Custom assertion helpers for integration tests.

#![allow(dead_code)]

use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;
use zmwalign_lib::cigar::query_span;

/// Asserts that a record's CIGAR query span covers its full stored sequence.
///
/// # Panics
///
/// Panics if the CIGAR (including soft clips) does not account for every
/// base of the sequence.
pub fn assert_cigar_spans_sequence(record: &RecordBuf) {
    assert_eq!(
        query_span(record.cigar()),
        record.sequence().len(),
        "CIGAR query span mismatch for record {:?}",
        record.name()
    );
}

/// Asserts that a record is mapped to the reference with the given name.
///
/// # Panics
///
/// Panics if the record is unmapped or targets a different reference.
pub fn assert_mapped_to(header: &Header, record: &RecordBuf, expected_reference: &str) {
    let ref_id = record
        .reference_sequence_id()
        .unwrap_or_else(|| panic!("record {:?} is unmapped", record.name()));
    let (name, _) = header
        .reference_sequences()
        .get_index(ref_id)
        .unwrap_or_else(|| panic!("record {:?} targets unknown reference {ref_id}", record.name()));
    assert_eq!(
        name.to_string(),
        expected_reference,
        "wrong reference for record {:?}",
        record.name()
    );
}

/// The records belonging to the well-`hole` reference, by name prefix.
pub fn records_for_well<'a>(records: &'a [RecordBuf], movie: &str, hole: i32) -> Vec<&'a RecordBuf> {
    let prefix = format!("{movie}/{hole}/");
    records
        .iter()
        .filter(|r| {
            r.name().is_some_and(|name| String::from_utf8_lossy(name.as_ref()).starts_with(&prefix))
        })
        .collect()
}
