use crate::boxes::{BoxHeader, FourCC, HEADER_SIZE, MDAT};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid box size {size} at offset {offset}")]
    InvalidSize { offset: usize, size: u32 },
    #[error("box '{typ}' at offset {offset} declares {size} bytes but only {available} remain")]
    Overrun { offset: usize, typ: FourCC, size: u32, available: usize },
    #[error("truncated box header at offset {offset}")]
    TruncatedHeader { offset: usize },
    #[error("unsupported {name} version {version}")]
    UnsupportedVersion { name: FourCC, version: u8 },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("{0} overflows 64 bits")]
    Overflow(&'static str),
    #[error("sidx reference {index} has zero size")]
    EmptyReference { index: usize },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Decode the header of the box starting at `offset`.
///
/// Size 0 ("to end of file") and size 1 (64-bit largesize) are both rejected,
/// as is any box that would extend past the end of `buf`.
pub fn read_box_header(buf: &[u8], offset: usize) -> Result<BoxHeader> {
    let available = buf.len().saturating_sub(offset);
    if available < HEADER_SIZE {
        return Err(ParseError::TruncatedHeader { offset });
    }

    let mut r = Cursor::new(&buf[offset..offset + HEADER_SIZE]);
    let size = r.read_u32::<BigEndian>()?;
    let mut typ = [0u8; 4]; r.read_exact(&mut typ)?;
    let typ = FourCC(typ);

    if (size as usize) < HEADER_SIZE {
        return Err(ParseError::InvalidSize { offset, size });
    }
    if size as usize > available {
        return Err(ParseError::Overrun { offset, typ, size, available });
    }

    Ok(BoxHeader { start: offset, size, typ })
}

/// Iterator over the top-level boxes of a buffer.
///
/// Yields at most one error, after which iteration ends.
pub struct TopLevelBoxes<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

pub fn top_level_boxes(buf: &[u8]) -> TopLevelBoxes<'_> {
    TopLevelBoxes { buf, pos: 0, failed: false }
}

impl Iterator for TopLevelBoxes<'_> {
    type Item = Result<BoxHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        match read_box_header(self.buf, self.pos) {
            Ok(h) => {
                tracing::trace!(typ = %h.typ, offset = h.start, size = h.size, "box");
                self.pos = h.end();
                Some(Ok(h))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Header of the first top-level box named `name`, if any.
pub fn find_box_header(buf: &[u8], name: FourCC) -> Result<Option<BoxHeader>> {
    for h in top_level_boxes(buf) {
        let h = h?;
        if h.typ == name {
            return Ok(Some(h));
        }
    }
    Ok(None)
}

/// Offset of the size field of the first top-level box named `name`.
pub fn find_box(buf: &[u8], name: FourCC) -> Result<Option<usize>> {
    Ok(find_box_header(buf, name)?.map(|h| h.start))
}

/// Body (header excluded) of the first top-level box named `name`.
pub fn find_box_content(buf: &[u8], name: FourCC) -> Result<Option<&[u8]>> {
    Ok(find_box_header(buf, name)?.map(|h| &buf[h.payload_range()]))
}

/// Media payload of the first top-level `mdat` box.
pub fn find_mdat(buf: &[u8]) -> Result<Option<&[u8]>> {
    find_box_content(buf, MDAT)
}
