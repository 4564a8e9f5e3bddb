//! Building `pssh` boxes and splicing them into a `moov`.

use crate::boxes::{FourCC, HEADER_SIZE, MOOV, PSSH};
use crate::parser::{ParseError, find_box_header, read_box_header};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

const SYSTEM_ID_LEN: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum PsshError {
    #[error("system id must be 32 hex characters, got {0:?}")]
    InvalidSystemId(String),
    #[error("{what} of {len} bytes does not fit a 32-bit length field")]
    TooLarge { what: &'static str, len: usize },
    #[error("expected a pssh box, found '{0}'")]
    NotPssh(FourCC),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PsshError>;

/// One content-protection system's initialization data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionData {
    /// 32 hex digits, hyphens allowed (UUID form).
    pub system_id: String,
    pub private_data: Vec<u8>,
}

impl ProtectionData {
    pub fn new(system_id: impl Into<String>, private_data: impl Into<Vec<u8>>) -> Self {
        Self { system_id: system_id.into(), private_data: private_data.into() }
    }

    /// System id without hyphens, lowercased.
    pub fn normalized_system_id(&self) -> String {
        self.system_id.replace('-', "").to_ascii_lowercase()
    }

    fn system_id_bytes(&self) -> Result<[u8; SYSTEM_ID_LEN]> {
        let id = self.system_id.replace('-', "");
        let mut out = [0u8; SYSTEM_ID_LEN];
        if id.len() != SYSTEM_ID_LEN * 2 {
            return Err(PsshError::InvalidSystemId(self.system_id.clone()));
        }
        hex::decode_to_slice(&id, &mut out)
            .map_err(|_| PsshError::InvalidSystemId(self.system_id.clone()))?;
        Ok(out)
    }
}

fn len_u32(what: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| PsshError::TooLarge { what, len })
}

/// Build a standalone `pssh` box:
/// `size | 'pssh' | system_id[16] | data_len: u32 | data`.
pub fn build_pssh(data: &ProtectionData) -> Result<Vec<u8>> {
    let system_id = data.system_id_bytes()?;
    let data_len = len_u32("private data", data.private_data.len())?;
    let total = HEADER_SIZE + SYSTEM_ID_LEN + 4 + data.private_data.len();
    let size = len_u32("pssh box", total)?;

    let mut out = Vec::with_capacity(total);
    out.write_u32::<BigEndian>(size)?;
    out.extend_from_slice(&PSSH.0);
    out.extend_from_slice(&system_id);
    out.write_u32::<BigEndian>(data_len)?;
    out.extend_from_slice(&data.private_data);
    Ok(out)
}

/// Decode a box produced by [`build_pssh`]. `bytes` must start at the size field.
pub fn parse_pssh(bytes: &[u8]) -> Result<ProtectionData> {
    let h = read_box_header(bytes, 0)?;
    if h.typ != PSSH {
        return Err(PsshError::NotPssh(h.typ));
    }
    let mut r = Cursor::new(&bytes[h.payload_range()]);
    let mut system_id = [0u8; SYSTEM_ID_LEN];
    r.read_exact(&mut system_id)?;
    let len = r.read_u32::<BigEndian>()? as usize;
    let mut private_data = vec![0u8; len];
    r.read_exact(&mut private_data)?;
    Ok(ProtectionData { system_id: hex::encode(system_id), private_data })
}

/// Append one `pssh` box per entry to the end of the top-level `moov` box.
///
/// The input is left untouched. Without entries, or without a `moov`, the
/// output is a copy of the input.
pub fn patch_moov(buf: &[u8], entries: &[ProtectionData]) -> Result<Vec<u8>> {
    if entries.is_empty() {
        return Ok(buf.to_vec());
    }
    let Some(moov) = find_box_header(buf, MOOV)? else {
        tracing::debug!("no moov box, leaving container unpatched");
        return Ok(buf.to_vec());
    };

    let mut region = buf[moov.range()].to_vec();
    for entry in entries {
        region.extend_from_slice(&build_pssh(entry)?);
    }
    let size = len_u32("moov box", region.len())?;
    region[..4].copy_from_slice(&size.to_be_bytes());

    tracing::debug!(
        count = entries.len(),
        old_size = moov.size,
        new_size = size,
        "injected pssh boxes into moov"
    );

    let mut out = Vec::with_capacity(buf.len() - moov.size as usize + region.len());
    out.extend_from_slice(&buf[..moov.start]);
    out.extend_from_slice(&region);
    out.extend_from_slice(&buf[moov.end()..]);
    Ok(out)
}
