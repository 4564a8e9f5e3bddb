use mp4seg::boxes::FourCC;
use mp4seg::parser::ParseError;
use mp4seg::sidx::{ByteRange, SegmentIndex};

struct Reference {
    index: bool,
    size: u32,
    duration: u32,
}

const fn media(size: u32, duration: u32) -> Reference {
    Reference { index: false, size, duration }
}

fn make_sidx(version: u8, timescale: u32, ept: u64, first_offset: u64, refs: &[Reference]) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(version);
    body.extend_from_slice(&[0, 0, 0]); // flags
    body.extend_from_slice(&1u32.to_be_bytes()); // reference_ID
    body.extend_from_slice(&timescale.to_be_bytes());
    if version == 0 {
        body.extend_from_slice(&(ept as u32).to_be_bytes());
        body.extend_from_slice(&(first_offset as u32).to_be_bytes());
    } else {
        body.extend_from_slice(&ept.to_be_bytes());
        body.extend_from_slice(&first_offset.to_be_bytes());
    }
    body.extend_from_slice(&0u16.to_be_bytes()); // reserved
    body.extend_from_slice(&(refs.len() as u16).to_be_bytes());
    for r in refs {
        let word = (u32::from(r.index) << 31) | r.size;
        body.extend_from_slice(&word.to_be_bytes());
        body.extend_from_slice(&r.duration.to_be_bytes());
        body.extend_from_slice(&0x9000_0000u32.to_be_bytes()); // SAP, type 1
    }

    let mut v = Vec::new();
    v.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
    v.extend_from_slice(b"sidx");
    v.extend(body);
    v
}

#[test]
fn decodes_version_0() {
    let anchor = 1_000;
    let data = make_sidx(0, 1000, 0, 0, &[media(100, 500), media(150, 500)]);
    let index = SegmentIndex::parse(&data, anchor).unwrap().expect("sidx present");

    assert_eq!(index.timescale, 1000);
    assert_eq!(index.segments.len(), 2);

    let a = &index.segments[0];
    assert_eq!(a.presentation_time, 0);
    assert_eq!(a.duration, 500);
    assert_eq!(a.repeat_count, 0);
    assert_eq!(a.byte_range, ByteRange { first: anchor, last: anchor + 99 });

    let b = &index.segments[1];
    assert_eq!(b.presentation_time, 500);
    assert_eq!(b.duration, 500);
    assert_eq!(b.byte_range, ByteRange { first: anchor + 100, last: anchor + 249 });
}

#[test]
fn decodes_version_1_with_wide_fields() {
    let ept = 5_000_000_000u64;
    let data = make_sidx(1, 90_000, ept, 64, &[media(10, 3000), media(20, 3000), media(30, 3000)]);
    let index = SegmentIndex::parse(&data, 0).unwrap().unwrap();

    assert_eq!(index.earliest_presentation_time, ept);
    let times: Vec<_> = index.segments.iter().map(|s| s.presentation_time).collect();
    assert_eq!(times, vec![ept, ept + 3000, ept + 6000]);
    let ranges: Vec<_> = index.segments.iter().map(|s| (s.byte_range.first, s.byte_range.last)).collect();
    assert_eq!(ranges, vec![(64, 73), (74, 93), (94, 123)]);
    assert_eq!(index.duration(), 9000);
    assert_eq!(index.seconds(index.duration()), 0.1);
}

#[test]
fn parse_at_derives_anchor_from_box_position() {
    let mut data = Vec::new();
    data.extend_from_slice(&16u32.to_be_bytes());
    data.extend_from_slice(b"styp");
    data.extend_from_slice(b"msdhmsix");
    let sidx = make_sidx(0, 1000, 0, 0, &[media(100, 500)]);
    let sidx_len = sidx.len() as u64;
    data.extend(sidx);

    let index = SegmentIndex::parse_at(&data, 200).unwrap().unwrap();
    let first = 200 + 16 + sidx_len;
    assert_eq!(index.segments[0].byte_range, ByteRange { first, last: first + 99 });
}

#[test]
fn ranges_are_contiguous() {
    let refs: Vec<_> = (1..=20).map(|i| media(i * 7, 1000)).collect();
    let data = make_sidx(0, 1000, 0, 0, &refs);
    let index = SegmentIndex::parse(&data, 42).unwrap().unwrap();

    assert_eq!(index.segments[0].byte_range.first, 42);
    for pair in index.segments.windows(2) {
        assert_eq!(pair[0].byte_range.last + 1, pair[1].byte_range.first);
        assert!(pair[0].presentation_time <= pair[1].presentation_time);
    }
}

#[test]
fn missing_sidx_is_not_an_error() {
    let mut data = Vec::new();
    data.extend_from_slice(&12u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&[0; 4]);
    assert_eq!(SegmentIndex::parse(&data, 0).unwrap(), None);
}

#[test]
fn unknown_version_is_rejected() {
    let mut data = make_sidx(0, 1000, 0, 0, &[media(1, 1)]);
    data[8] = 2;
    let err = SegmentIndex::parse(&data, 0).unwrap_err();
    assert!(matches!(
        err,
        ParseError::UnsupportedVersion { name, version: 2 } if name == FourCC(*b"sidx")
    ));
}

#[test]
fn hierarchical_reference_is_not_implemented() {
    let refs = [media(100, 500), Reference { index: true, size: 80, duration: 0 }];
    let data = make_sidx(0, 1000, 0, 0, &refs);
    assert!(matches!(SegmentIndex::parse(&data, 0), Err(ParseError::NotImplemented(_))));
}

#[test]
fn truncated_references_are_rejected() {
    let mut data = make_sidx(0, 1000, 0, 0, &[media(100, 500), media(100, 500)]);
    // drop the last record's SAP word but keep the box size consistent
    data.truncate(data.len() - 4);
    let size = data.len() as u32;
    data[..4].copy_from_slice(&size.to_be_bytes());
    assert!(matches!(SegmentIndex::parse(&data, 0), Err(ParseError::Io(_))));
}

#[test]
fn segment_lookup_by_time() {
    let data = make_sidx(0, 1000, 0, 0, &[media(100, 500), media(150, 500)]);
    let index = SegmentIndex::parse(&data, 0).unwrap().unwrap();

    assert_eq!(index.segment_at(0).map(|s| s.presentation_time), Some(0));
    assert_eq!(index.segment_at(499).map(|s| s.presentation_time), Some(0));
    assert_eq!(index.segment_at(500).map(|s| s.presentation_time), Some(500));
    assert_eq!(index.segment_at(1000), None);
    assert_eq!(index.segments[1].byte_range.http_header(), "bytes=100-249");
}

#[test]
fn serializes_to_json() {
    let data = make_sidx(0, 1000, 0, 0, &[media(100, 500)]);
    let index = SegmentIndex::parse(&data, 10).unwrap().unwrap();
    let json = serde_json::to_value(&index).unwrap();
    assert_eq!(json["timescale"], 1000);
    assert_eq!(json["segments"][0]["byte_range"]["first"], 10);
    assert_eq!(json["segments"][0]["byte_range"]["last"], 109);
}

#[test]
fn first_offset_past_u64_is_rejected() {
    let data = make_sidx(1, 1000, 0, u64::MAX, &[media(100, 500)]);
    assert!(matches!(SegmentIndex::parse(&data, 1000), Err(ParseError::Overflow(_))));
}

#[test]
fn presentation_time_past_u64_is_rejected() {
    let data = make_sidx(1, 1000, u64::MAX - 10, 0, &[media(100, 500), media(100, 500)]);
    assert!(matches!(SegmentIndex::parse(&data, 0), Err(ParseError::Overflow(_))));
}

#[test]
fn byte_offset_past_u64_is_rejected() {
    let data = make_sidx(1, 1000, 0, u64::MAX - 150, &[media(100, 500), media(100, 500)]);
    assert!(matches!(SegmentIndex::parse(&data, 0), Err(ParseError::Overflow(_))));
}

#[test]
fn ranges_up_to_u64_max_still_decode() {
    let data = make_sidx(1, 1000, u64::MAX - 1000, u64::MAX - 250, &[media(100, 500), media(150, 500)]);
    let index = SegmentIndex::parse(&data, 0).unwrap().unwrap();
    assert_eq!(index.segments[1].presentation_time, u64::MAX - 500);
    assert_eq!(index.segments[1].byte_range, ByteRange { first: u64::MAX - 150, last: u64::MAX - 1 });
    assert_eq!(index.duration(), 1000);
    assert_eq!(index.segment_at(u64::MAX - 1).map(|s| s.duration), Some(500));
}

#[test]
fn zero_sized_reference_is_rejected() {
    for anchor in [0, 500] {
        let data = make_sidx(0, 1000, 0, 0, &[media(0, 500), media(100, 500)]);
        assert!(matches!(
            SegmentIndex::parse(&data, anchor),
            Err(ParseError::EmptyReference { index: 0 })
        ));
    }
}

#[test]
fn byte_range_size_is_inclusive() {
    let data = make_sidx(0, 1000, 0, 0, &[media(1, 500), media(150, 500)]);
    let index = SegmentIndex::parse(&data, 0).unwrap().unwrap();
    assert_eq!(index.segments[0].byte_range, ByteRange { first: 0, last: 0 });
    assert_eq!(index.segments[0].byte_range.size(), 1);
    assert_eq!(index.segments[1].byte_range.size(), 150);
}
