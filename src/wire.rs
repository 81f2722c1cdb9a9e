//! PTP container framing: the 12-byte header plus little-endian field access.
//!
//! Grounded on the byteorder-based chunk parsing in the teacher's PNG text-chunk
//! reader (`scanner.rs::extract_text_chunks`, which reads big-endian PNG chunk
//! lengths with `byteorder::ReadBytesExt`); here the same crate reads/writes
//! little-endian PTP fields instead.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PtpError, Result};
use crate::ptp_constants::{ContainerType, HEADER_LEN};

/// Decoded fixed-size portion of a PTP container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u32,
    pub container_type: ContainerType,
    pub code: u16,
    pub transaction_id: u32,
}

/// Parses the 12-byte header out of `bytes`. `bytes` must contain at least
/// `HEADER_LEN` bytes; trailing payload bytes are ignored.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < HEADER_LEN as usize {
        return Err(PtpError::MalformedContainer(format!(
            "container too short: {} bytes",
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let length = cursor.read_u32::<LittleEndian>().unwrap();
    let raw_type = cursor.read_u16::<LittleEndian>().unwrap();
    let code = cursor.read_u16::<LittleEndian>().unwrap();
    let transaction_id = cursor.read_u32::<LittleEndian>().unwrap();

    let container_type = ContainerType::from_u16(raw_type)
        .ok_or_else(|| PtpError::MalformedContainer(format!("unknown container type {raw_type}")))?;

    if length < HEADER_LEN {
        return Err(PtpError::MalformedContainer(format!(
            "declared length {length} shorter than header"
        )));
    }

    Ok(Header {
        length,
        container_type,
        code,
        transaction_id,
    })
}

/// Writes a 12-byte header to `out`.
pub fn encode_header(out: &mut Vec<u8>, container_type: ContainerType, code: u16, transaction_id: u32, length: u32) {
    out.write_u32::<LittleEndian>(length).unwrap();
    out.write_u16::<LittleEndian>(container_type as u16).unwrap();
    out.write_u16::<LittleEndian>(code).unwrap();
    out.write_u32::<LittleEndian>(transaction_id).unwrap();
}

pub fn encode_le_u16(out: &mut Vec<u8>, value: u16) {
    out.write_u16::<LittleEndian>(value).unwrap();
}

pub fn encode_le_u32(out: &mut Vec<u8>, value: u32) {
    out.write_u32::<LittleEndian>(value).unwrap();
}

pub fn encode_le_u64(out: &mut Vec<u8>, value: u64) {
    out.write_u64::<LittleEndian>(value).unwrap();
}

pub fn read_le_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = bytes.get(offset..offset + 4).ok_or_else(|| {
        PtpError::MalformedContainer(format!("parameter at offset {offset} out of bounds"))
    })?;
    let mut cursor = Cursor::new(slice);
    Ok(cursor.read_u32::<LittleEndian>().unwrap())
}

/// Appends a length-prefixed UCS-2LE string: one byte giving the number of
/// 16-bit code units including the terminating NUL, followed by those units.
/// `s` must already be the ISO-8859-1 source string (ASCII-only in practice);
/// the actual byte-widening is delegated to an [`crate::encoding::Encoder`].
pub fn encode_string(out: &mut Vec<u8>, encoder: &dyn crate::encoding::Encoder, s: &str) -> Result<usize> {
    if s.len() > 255 {
        return Err(PtpError::MalformedContainer(format!(
            "string {s:?} exceeds 255 source bytes"
        )));
    }
    if s.is_empty() {
        out.write_u8(0).unwrap();
        return Ok(1);
    }

    let units = encoder.encode_with_nul(s);
    let unit_count = units.len() / 2;
    out.write_u8(unit_count as u8).unwrap();
    out.extend_from_slice(&units);
    Ok(1 + units.len())
}

/// Reads exactly `len` bytes from `reader`, appending to `buf`, tolerating
/// short reads the way a blocking bulk endpoint would deliver them in chunks.
pub fn read_exact_accumulating<R: Read>(reader: &mut R, buf: &mut Vec<u8>, len: usize) -> io::Result<()> {
    let start = buf.len();
    buf.resize(start + len, 0);
    reader.read_exact(&mut buf[start..])
}

/// Writes `buf` to `writer`, tolerating short writes by looping until all
/// bytes are sent (mirrors the bulk worker's resumable write loop).
pub fn write_all_resumable<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    writer.write_all(buf)
}
