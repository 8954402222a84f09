//! The binary wire format spoken between clients and the server.
//!
//! Every integer is little-endian and fixed width. A byte string is a `u64`
//! length followed by the raw bytes; a list of byte strings is a `u64` count
//! followed by that many byte strings. Readers surface end-of-stream as the
//! underlying [`UnexpectedEof`] IO error so callers can tell a closed peer
//! from a malformed frame.
//!
//! [`UnexpectedEof`]: std::io::ErrorKind::UnexpectedEof

use crate::error::{Result, StoreError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::io::{Read, Write};

/// magic number a client must present in its VALIDATE message
pub const VALIDATION_MAGIC: u32 = 0x3C85_F7CE;

/// status byte written after a WAIT request unblocks
pub const STOP_WAITING: u8 = 0;

/// reserved status byte for a cancelled wait; never sent
pub const WAIT_CANCELED: u8 = 1;

// upper bound on a single length or count field; anything larger is a
// malformed or hostile frame, not a real request
const MAX_FRAME_LEN: u64 = 1 << 30;

/// The command byte leading every request.
///
/// Only a subset is implemented; the rest are reserved slots in the protocol
/// enumeration and are rejected at dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// handshake: `u32` magic, no response
    Validate = 0,
    /// store a value: key + value, no response
    Set = 1,
    /// reserved
    CompareSet = 2,
    /// point-in-time read: key, responds with the value
    Get = 3,
    /// counter increment: key + `i64` delta, responds with the new value
    Add = 4,
    /// reserved
    Check = 5,
    /// block until every key has a value: key list, responds with a status byte
    Wait = 6,
    /// reserved
    GetNumKeys = 7,
    /// reserved
    DeleteKey = 8,
    /// reserved
    Append = 9,
    /// reserved
    MultiGet = 10,
    /// reserved
    MultiSet = 11,
    /// reserved
    CancelWait = 12,
    /// liveness probe: `u32` nonce, echoed back
    Ping = 13,
}

impl Opcode {
    /// decodes a command byte, returning `None` for bytes outside the enumeration
    pub fn from_u8(cmd: u8) -> Option<Opcode> {
        match cmd {
            0 => Some(Opcode::Validate),
            1 => Some(Opcode::Set),
            2 => Some(Opcode::CompareSet),
            3 => Some(Opcode::Get),
            4 => Some(Opcode::Add),
            5 => Some(Opcode::Check),
            6 => Some(Opcode::Wait),
            7 => Some(Opcode::GetNumKeys),
            8 => Some(Opcode::DeleteKey),
            9 => Some(Opcode::Append),
            10 => Some(Opcode::MultiGet),
            11 => Some(Opcode::MultiSet),
            12 => Some(Opcode::CancelWait),
            13 => Some(Opcode::Ping),
            _ => None,
        }
    }
}

/// reads a single byte
pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    Ok(r.read_u8()?)
}

/// writes a single byte
pub fn write_u8<W: Write>(w: &mut W, data: u8) -> Result<()> {
    Ok(w.write_u8(data)?)
}

/// reads a little-endian `u32`
pub fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    Ok(r.read_u32::<LittleEndian>()?)
}

/// writes a little-endian `u32`
pub fn write_u32<W: Write>(w: &mut W, data: u32) -> Result<()> {
    Ok(w.write_u32::<LittleEndian>(data)?)
}

/// reads a little-endian `u64`
pub fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    Ok(r.read_u64::<LittleEndian>()?)
}

/// writes a little-endian `u64`
pub fn write_u64<W: Write>(w: &mut W, data: u64) -> Result<()> {
    Ok(w.write_u64::<LittleEndian>(data)?)
}

/// reads a little-endian two's-complement `i64`
pub fn read_i64<R: Read>(r: &mut R) -> Result<i64> {
    Ok(r.read_i64::<LittleEndian>()?)
}

/// writes a little-endian two's-complement `i64`
pub fn write_i64<W: Write>(w: &mut W, data: i64) -> Result<()> {
    Ok(w.write_i64::<LittleEndian>(data)?)
}

/// reads a length-prefixed byte string
pub fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let length = read_u64(r)?;
    if length > MAX_FRAME_LEN {
        return Err(StoreError::Protocol(format!(
            "byte string length {} exceeds frame limit",
            length
        )));
    }

    let mut buf = vec![0u8; length as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// writes a length-prefixed byte string
pub fn write_bytes<W: Write>(w: &mut W, data: &[u8]) -> Result<()> {
    write_u64(w, data.len() as u64)?;
    w.write_all(data)?;
    Ok(())
}

/// reads a count-prefixed list of byte strings
pub fn read_bytes_list<R: Read>(r: &mut R) -> Result<Vec<Vec<u8>>> {
    let count = read_u64(r)?;
    if count > MAX_FRAME_LEN {
        return Err(StoreError::Protocol(format!(
            "byte string count {} exceeds frame limit",
            count
        )));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(read_bytes(r)?);
    }
    Ok(items)
}

/// writes a count-prefixed list of byte strings
pub fn write_bytes_list<W: Write, B: AsRef<[u8]>>(w: &mut W, items: &[B]) -> Result<()> {
    write_u64(w, items.len() as u64)?;
    for item in items {
        write_bytes(w, item.as_ref())?;
    }
    Ok(())
}

/// encodes a counter as the 8 little-endian bytes stored for its key
pub fn counter_to_bytes(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

/// decodes a stored value as a counter.
/// A value that is not exactly 8 bytes counts as 0, the same as an absent entry.
pub fn counter_from_bytes(data: &[u8]) -> u64 {
    match <[u8; 8]>::try_from(data) {
        Ok(bytes) => u64::from_le_bytes(bytes),
        Err(_) => 0,
    }
}
