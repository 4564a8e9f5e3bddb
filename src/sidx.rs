//! Segment index (`sidx`) decoding.
//!
//! The index maps presentation time ranges to the byte ranges of the
//! sub-segments that follow it, so the fetch layer can request exact ranges.

use crate::boxes::SIDX;
use crate::parser::{ParseError, Result, find_box_header};
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Inclusive byte range `[first, last]`. Never empty: zero-sized
/// references are rejected at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub first: u64,
    pub last: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn size(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Value for an HTTP `Range` header, e.g. `bytes=100-199`.
    pub fn http_header(&self) -> String {
        format!("bytes={}-{}", self.first, self.last)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSegment {
    /// Start time, in `timescale` units.
    pub presentation_time: u64,
    pub duration: u64,
    /// Always 0: every reference becomes its own entry.
    pub repeat_count: u32,
    pub byte_range: ByteRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentIndex {
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    pub segments: Vec<SubSegment>,
}

impl SegmentIndex {
    /// Decode the first top-level `sidx` box of `buf`.
    ///
    /// `anchor` must be the absolute position immediately after the `sidx`
    /// box; it is not validated. Returns `Ok(None)` when there is no index.
    pub fn parse(buf: &[u8], anchor: u64) -> Result<Option<SegmentIndex>> {
        let Some(h) = find_box_header(buf, SIDX)? else {
            tracing::debug!("no sidx box");
            return Ok(None);
        };
        decode(&buf[h.payload_range()], anchor).map(Some)
    }

    /// Like [`SegmentIndex::parse`], with `base` being the absolute position
    /// of `buf[0]`. The anchor is derived from the box's offset and size.
    pub fn parse_at(buf: &[u8], base: u64) -> Result<Option<SegmentIndex>> {
        let Some(h) = find_box_header(buf, SIDX)? else {
            return Ok(None);
        };
        let anchor = base
            .checked_add(h.end() as u64)
            .ok_or(ParseError::Overflow("sidx anchor"))?;
        decode(&buf[h.payload_range()], anchor).map(Some)
    }

    /// Total duration in timescale units. Saturates for hand-built indexes;
    /// decoded ones always fit.
    pub fn duration(&self) -> u64 {
        self.segments.iter().fold(0u64, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn seconds(&self, ticks: u64) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        ticks as f64 / self.timescale as f64
    }

    /// Sub-segment whose time span covers `time` (timescale units).
    pub fn segment_at(&self, time: u64) -> Option<&SubSegment> {
        let idx = self.segments.partition_point(|s| s.presentation_time <= time);
        let seg = self.segments.get(idx.checked_sub(1)?)?;
        (time < seg.presentation_time.saturating_add(seg.duration)).then_some(seg)
    }
}

fn decode(payload: &[u8], anchor: u64) -> Result<SegmentIndex> {
    let mut r = Cursor::new(payload);

    let version = r.read_u8()?;
    let _flags = r.read_u24::<BigEndian>()?;
    let _reference_id = r.read_u32::<BigEndian>()?;
    let timescale = r.read_u32::<BigEndian>()?;

    let (earliest_presentation_time, first_offset) = match version {
        0 => (
            u64::from(r.read_u32::<BigEndian>()?),
            u64::from(r.read_u32::<BigEndian>()?),
        ),
        1 => (r.read_u64::<BigEndian>()?, r.read_u64::<BigEndian>()?),
        v => return Err(ParseError::UnsupportedVersion { name: SIDX, version: v }),
    };

    let _reserved = r.read_u16::<BigEndian>()?;
    let reference_count = r.read_u16::<BigEndian>()?;

    let mut time = earliest_presentation_time;
    let mut offset = anchor
        .checked_add(first_offset)
        .ok_or(ParseError::Overflow("sidx first offset"))?;
    let mut segments = Vec::with_capacity(reference_count as usize);

    for index in 0..reference_count as usize {
        // 1 bit reference_type, 31 bits referenced_size
        let chunk = r.read_u32::<BigEndian>()?;
        if chunk >> 31 == 1 {
            return Err(ParseError::NotImplemented("sidx referencing another sidx"));
        }
        let ref_size = u64::from(chunk & 0x7FFF_FFFF);
        let duration = u64::from(r.read_u32::<BigEndian>()?);
        let _sap = r.read_u32::<BigEndian>()?;

        if ref_size == 0 {
            return Err(ParseError::EmptyReference { index });
        }
        // both ends must fit so the next entry starts after this one
        let end_time = time
            .checked_add(duration)
            .ok_or(ParseError::Overflow("sidx presentation time"))?;
        let end_offset = offset
            .checked_add(ref_size)
            .ok_or(ParseError::Overflow("sidx byte offset"))?;

        segments.push(SubSegment {
            presentation_time: time,
            duration,
            repeat_count: 0,
            byte_range: ByteRange { first: offset, last: end_offset - 1 },
        });
        time = end_time;
        offset = end_offset;
    }

    tracing::debug!(timescale, count = segments.len(), "decoded sidx");
    Ok(SegmentIndex { timescale, earliest_presentation_time, segments })
}
