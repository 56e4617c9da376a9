//! Per-well record grouping.
//!
//! PacBio reads carry their well of origin in the `zm` tag and in the read
//! name (`movie/hole/qStart_qEnd` for subreads, `movie/hole/ccs` for
//! consensus reads). The tag is authoritative when present; the name is the
//! fallback for records written without it.

use bstr::ByteSlice;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::RecordBuf;

/// The `zm` auxiliary tag holding the hole number.
pub const HOLE_NUMBER_TAG: Tag = Tag::new(b'z', b'm');

/// All records from one well, in input order.
#[derive(Debug, Clone, Default)]
pub struct ZmwGroup {
    /// Well (hole) number shared by every record in the group.
    pub hole: i32,
    /// Movie name parsed from the read names.
    pub movie: String,
    /// The records themselves.
    pub records: Vec<RecordBuf>,
}

impl ZmwGroup {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Extracts the hole number from a record, preferring the `zm` tag and
/// falling back to the `movie/hole/...` read name convention.
#[must_use]
pub fn hole_number(record: &RecordBuf) -> Option<i32> {
    if let Some(value) = record.data().get(&HOLE_NUMBER_TAG) {
        if let Some(hole) = value_as_i32(value) {
            return Some(hole);
        }
    }

    let name = record.name()?;
    let mut fields = name.as_bstr().split_str("/");
    let _movie = fields.next()?;
    let hole_field = fields.next()?;
    hole_field.to_str().ok()?.parse().ok()
}

/// Extracts the movie name, the read name component before the first `/`.
#[must_use]
pub fn movie_name(record: &RecordBuf) -> Option<String> {
    let name = record.name()?;
    let movie = name.as_bstr().split_str("/").next()?;
    Some(movie.to_str().ok()?.to_string())
}

fn value_as_i32(value: &Value) -> Option<i32> {
    value.as_int().and_then(|v| i32::try_from(v).ok())
}
