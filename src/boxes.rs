use std::fmt;
use std::ops::Range;

/// Size of the only header form we accept: 32-bit size + 4CC.
pub const HEADER_SIZE: usize = 8;

pub const MOOV: FourCC = FourCC(*b"moov");
pub const MDAT: FourCC = FourCC(*b"mdat");
pub const SIDX: FourCC = FourCC(*b"sidx");
pub const PSSH: FourCC = FourCC(*b"pssh");

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else { None }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0.iter().map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }
impl fmt::Display for FourCC { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str_lossy()) } }

/// A top-level box as seen by a scan. Never stored; recomputed per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub start: usize,       // offset of the size field within the scanned buffer
    pub size: u32,          // declared size, header included
    pub typ: FourCC,
}

impl BoxHeader {
    pub fn end(&self) -> usize {
        self.start + self.size as usize
    }

    /// Byte range of the whole box, header included.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Byte range of the box body.
    pub fn payload_range(&self) -> Range<usize> {
        self.start + HEADER_SIZE..self.end()
    }
}
