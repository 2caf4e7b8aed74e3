//! Variable-length byte encoding for non-negative integers.
//!
//! Each byte carries 7 value bits, least significant group first. The high
//! bit marks the *final* byte of a value (the inverse of LEB128), which keeps
//! the encoding wire-compatible with HDT files.
//!
//! ```text
//! 300 = 0b10_0101100  ->  [0b0_0101100, 0b1_0000010]
//! ```

use std::io::{Read, Write};

use crate::error::{Error, Result};

const FINAL_BYTE: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;

/// Maximum encoded length of a `u64`.
pub const MAX_LEN: usize = 10;

/// Append the encoding of `value` to `out`.
pub fn encode(mut value: u64, out: &mut Vec<u8>) {
    while value > PAYLOAD as u64 {
        out.push((value as u8) & PAYLOAD);
        value >>= 7;
    }
    out.push(value as u8 | FINAL_BYTE);
}

/// Encode a signed value, rejecting negatives.
pub fn encode_signed(value: i64, out: &mut Vec<u8>) -> Result<()> {
    if value < 0 {
        return Err(Error::InvalidArgument(format!(
            "cannot vbyte-encode negative value {value}"
        )));
    }
    encode(value as u64, out);
    Ok(())
}

/// Return the encoding of `value` as a fresh buffer.
pub fn to_vec(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_LEN);
    encode(value, &mut out);
    out
}

/// Write the encoding of `value` and return the number of bytes written.
pub fn write<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let bytes = to_vec(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Decode a `u64` from the front of `bytes`, returning it and the bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize)> {
    decode_bounded(bytes, u64::BITS)
}

/// Decode a value that must fit in a `u32`.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, used) = decode_bounded(bytes, u32::BITS)?;
    Ok((value as u32, used))
}

fn decode_bounded(bytes: &[u8], bits: u32) -> Result<(u64, usize)> {
    if bytes.is_empty() {
        return Err(Error::EndOfStream);
    }
    let mut state = Decoder::new(bits);
    for (i, &byte) in bytes.iter().enumerate() {
        if let Some(value) = state.push(byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(Error::EndOfStream)
}

/// Read one value from `reader`.
pub fn read<R: Read>(reader: &mut R) -> Result<u64> {
    read_bounded(reader, u64::BITS)
}

/// Read one value from `reader` that must fit in `usize`.
pub fn read_usize<R: Read>(reader: &mut R) -> Result<usize> {
    let value = read_bounded(reader, usize::BITS)?;
    Ok(value as usize)
}

fn read_bounded<R: Read>(reader: &mut R, bits: u32) -> Result<u64> {
    let mut state = Decoder::new(bits);
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if let Some(value) = state.push(byte[0])? {
            return Ok(value);
        }
    }
}

struct Decoder {
    value: u64,
    shift: u32,
    bits: u32,
}

impl Decoder {
    fn new(bits: u32) -> Self {
        Self {
            value: 0,
            shift: 0,
            bits,
        }
    }

    fn push(&mut self, byte: u8) -> Result<Option<u64>> {
        if self.shift >= self.bits {
            return Err(self.overflow());
        }
        let part = (byte & PAYLOAD) as u64;
        let room = self.bits - self.shift;
        if room < 7 && part >> room != 0 {
            return Err(self.overflow());
        }
        self.value |= part << self.shift;
        self.shift += 7;
        if byte & FINAL_BYTE != 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }

    fn overflow(&self) -> Error {
        Error::InvalidEncoding(format!("vbyte value exceeds {} bits", self.bits))
    }
}
