//! CRC checksums and checksummed stream wrappers.
//!
//! Every persisted section ends with a trailer holding the CRC of exactly the
//! payload bytes before it. [`ChecksumWriter`] folds bytes as they are written
//! and appends the trailer on [`ChecksumWriter::finish`]; [`ChecksumReader`]
//! folds bytes as they are read and compares the trailer on
//! [`ChecksumReader::verify`], returning whether it matched so the caller
//! decides if a mismatch is fatal.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use crc::{Crc, Digest, CRC_16_ARC, CRC_32_ISCSI, CRC_8_SMBUS};

use crate::error::{Error, Result};

static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// CRC polynomial variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Checksum {
    /// CRC-8/SMBUS.
    Crc8,
    /// CRC-16/ARC.
    Crc16,
    /// CRC-32/ISCSI (CRC-32C).
    #[default]
    Crc32,
}

impl Checksum {
    /// Trailer length in bytes.
    pub fn width(self) -> usize {
        match self {
            Checksum::Crc8 => 1,
            Checksum::Crc16 => 2,
            Checksum::Crc32 => 4,
        }
    }

    /// One-shot checksum of `bytes`.
    pub fn compute(self, bytes: &[u8]) -> u32 {
        match self {
            Checksum::Crc8 => CRC8.checksum(bytes) as u32,
            Checksum::Crc16 => CRC16.checksum(bytes) as u32,
            Checksum::Crc32 => CRC32.checksum(bytes),
        }
    }

    fn digest(self) -> Running {
        match self {
            Checksum::Crc8 => Running::Crc8(CRC8.digest()),
            Checksum::Crc16 => Running::Crc16(CRC16.digest()),
            Checksum::Crc32 => Running::Crc32(CRC32.digest()),
        }
    }

    fn encode(self, value: u32) -> Vec<u8> {
        value.to_le_bytes()[..self.width()].to_vec()
    }

    fn decode(self, bytes: &[u8]) -> u32 {
        let mut buf = [0u8; 4];
        buf[..bytes.len()].copy_from_slice(bytes);
        u32::from_le_bytes(buf)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Checksum::Crc8 => "crc8",
            Checksum::Crc16 => "crc16",
            Checksum::Crc32 => "crc32",
        };
        f.write_str(name)
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "crc8" => Ok(Checksum::Crc8),
            "crc16" => Ok(Checksum::Crc16),
            "crc32" => Ok(Checksum::Crc32),
            other => Err(Error::InvalidEncoding(format!(
                "unknown checksum kind {other:?}"
            ))),
        }
    }
}

#[derive(Clone)]
enum Running {
    Crc8(Digest<'static, u8>),
    Crc16(Digest<'static, u16>),
    Crc32(Digest<'static, u32>),
}

impl Running {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Running::Crc8(d) => d.update(bytes),
            Running::Crc16(d) => d.update(bytes),
            Running::Crc32(d) => d.update(bytes),
        }
    }

    fn value(&self) -> u32 {
        match self.clone() {
            Running::Crc8(d) => d.finalize() as u32,
            Running::Crc16(d) => d.finalize() as u32,
            Running::Crc32(d) => d.finalize(),
        }
    }
}

/// Writer that folds every written byte into a running checksum.
pub struct ChecksumWriter<W> {
    inner: W,
    kind: Checksum,
    running: Running,
}

impl<W: Write> ChecksumWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W, kind: Checksum) -> Self {
        Self {
            inner,
            kind,
            running: kind.digest(),
        }
    }

    /// Checksum of the bytes written so far.
    pub fn checksum(&self) -> u32 {
        self.running.value()
    }

    /// Append the trailer and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let trailer = self.kind.encode(self.running.value());
        self.inner.write_all(&trailer)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.running.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that folds every read byte into a running checksum.
pub struct ChecksumReader<R> {
    inner: R,
    kind: Checksum,
    running: Running,
}

impl<R: Read> ChecksumReader<R> {
    /// Wrap `inner`.
    pub fn new(inner: R, kind: Checksum) -> Self {
        Self {
            inner,
            kind,
            running: kind.digest(),
        }
    }

    /// Checksum of the bytes read so far.
    pub fn checksum(&self) -> u32 {
        self.running.value()
    }

    /// Fold bytes that were consumed from the inner source without copying.
    pub fn fold(&mut self, bytes: &[u8]) {
        self.running.update(bytes);
    }

    /// Mutable access to the inner reader. Bytes read through it are not folded.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Shared access to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Read the trailer and report whether it matches the running checksum.
    pub fn verify(&mut self) -> Result<bool> {
        let mut trailer = [0u8; 4];
        let width = self.kind.width();
        self.inner.read_exact(&mut trailer[..width])?;
        Ok(self.kind.decode(&trailer[..width]) == self.running.value())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.running.update(&buf[..n]);
        Ok(n)
    }
}

/// Turn a failed verification into an error, or log it when not strict.
pub(crate) fn enforce(matched: bool, section: &'static str, strict: bool) -> Result<()> {
    if matched {
        return Ok(());
    }
    if strict {
        return Err(Error::ChecksumMismatch(section));
    }
    log::warn!("checksum mismatch in {section} section, continuing");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Checksum; 3] = [Checksum::Crc8, Checksum::Crc16, Checksum::Crc32];

    #[test]
    fn test_check_values() {
        // Catalogue check values over "123456789".
        assert_eq!(Checksum::Crc8.compute(b"123456789"), 0xF4);
        assert_eq!(Checksum::Crc16.compute(b"123456789"), 0xBB3D);
        assert_eq!(Checksum::Crc32.compute(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        for kind in ALL {
            let mut writer = ChecksumWriter::new(Vec::new(), kind);
            writer.write_all(b"hello ").unwrap();
            writer.write_all(b"world").unwrap();
            assert_eq!(writer.checksum(), kind.compute(b"hello world"));

            let out = writer.finish().unwrap();
            assert_eq!(out.len(), 11 + kind.width());
        }
    }

    #[test]
    fn test_reader_verifies_trailer() {
        for kind in ALL {
            let mut writer = ChecksumWriter::new(Vec::new(), kind);
            writer.write_all(b"payload").unwrap();
            let bytes = writer.finish().unwrap();

            let mut reader = ChecksumReader::new(&bytes[..], kind);
            let mut payload = [0u8; 7];
            reader.read_exact(&mut payload).unwrap();
            assert!(reader.verify().unwrap());
        }
    }

    #[test]
    fn test_reader_reports_mismatch_without_error() {
        let mut writer = ChecksumWriter::new(Vec::new(), Checksum::Crc32);
        writer.write_all(b"payload").unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes[2] ^= 0x10;

        let mut reader = ChecksumReader::new(&bytes[..], Checksum::Crc32);
        let mut payload = [0u8; 7];
        reader.read_exact(&mut payload).unwrap();
        assert!(!reader.verify().unwrap());
    }

    #[test]
    fn test_fold_equals_read() {
        let mut a = ChecksumReader::new(&b"abc"[..], Checksum::Crc16);
        a.fold(b"xyz");
        let mut rest = Vec::new();
        a.read_to_end(&mut rest).unwrap();
        assert_eq!(a.checksum(), Checksum::Crc16.compute(b"xyzabc"));
    }

    #[test]
    fn test_crc8_detects_every_single_bit_flip() {
        let payload: Vec<u8> = (0u8..32).collect();
        let expected = Checksum::Crc8.compute(&payload);
        for bit in 0..payload.len() * 8 {
            let mut flipped = payload.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(Checksum::Crc8.compute(&flipped), expected, "bit {bit}");
        }
    }

    #[test]
    fn test_enforce() {
        assert!(enforce(true, "bitmap", true).is_ok());
        assert!(enforce(false, "bitmap", false).is_ok());
        assert!(matches!(
            enforce(false, "bitmap", true),
            Err(Error::ChecksumMismatch("bitmap"))
        ));
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ALL {
            assert_eq!(kind.to_string().parse::<Checksum>().unwrap(), kind);
        }
        assert!("md5".parse::<Checksum>().is_err());
    }
}
