//! Self-describing header written before every persisted section.
//!
//! # Layout
//!
//! ```text
//! magic    4 bytes  "$TRI"
//! kind     u8       SectionKind
//! version  u8       FORMAT_VERSION
//! count    vbyte    number of properties
//! (klen vbyte, key, vlen vbyte, value) * count
//! crc16    2 bytes  CRC-16/ARC over everything above
//! ```

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::checksum::{self, Checksum, ChecksumReader, ChecksumWriter};
use crate::error::{Error, Result};
use crate::vbyte;

/// Leading bytes of every section.
pub const MAGIC: &[u8; 4] = b"$TRI";

/// Current format version; newer versions are rejected.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_CHECKSUM: Checksum = Checksum::Crc16;
const MAX_PROPERTY_LEN: usize = 1 << 16;

/// What a section contains.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// A rank/select bitmap.
    Bitmap = 1,
    /// A bit-packed integer sequence.
    Sequence = 2,
    /// A bitmap triples structure.
    Triples = 3,
    /// A predicate index.
    PredicateIndex = 4,
}

impl SectionKind {
    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Bitmap => "bitmap",
            SectionKind::Sequence => "sequence",
            SectionKind::Triples => "triples",
            SectionKind::PredicateIndex => "predicate index",
        }
    }
}

impl TryFrom<u8> for SectionKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(SectionKind::Bitmap),
            2 => Ok(SectionKind::Sequence),
            3 => Ok(SectionKind::Triples),
            4 => Ok(SectionKind::PredicateIndex),
            _ => Err(Error::InvalidEncoding(format!("unknown section kind {tag}"))),
        }
    }
}

/// Section header: kind, version and free-form properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section kind.
    pub kind: SectionKind,
    /// Format version the section was written with.
    pub version: u8,
    /// Key/value properties, kept sorted so the encoding is deterministic.
    pub properties: BTreeMap<String, String>,
}

impl SectionHeader {
    /// Create a header of the current version with no properties.
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            version: FORMAT_VERSION,
            properties: BTreeMap::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, key: &str, value: impl ToString) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Raw property value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Parse a required property.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.get(key).ok_or_else(|| {
            Error::InvalidEncoding(format!(
                "{} header is missing property {key:?}",
                self.kind.name()
            ))
        })?;
        raw.parse().map_err(|_| {
            Error::InvalidEncoding(format!(
                "{} header has malformed property {key}={raw:?}",
                self.kind.name()
            ))
        })
    }

    /// Payload checksum recorded in the header.
    pub fn checksum(&self) -> Result<Checksum> {
        match self.get("checksum") {
            Some(name) => name.parse(),
            None => Ok(Checksum::default()),
        }
    }

    /// Fail unless this header has the expected kind.
    pub fn require(self, kind: SectionKind) -> Result<Self> {
        if self.kind != kind {
            return Err(Error::InvalidEncoding(format!(
                "expected {} section, found {}",
                kind.name(),
                self.kind.name()
            )));
        }
        Ok(self)
    }

    /// Serialize the header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut out = ChecksumWriter::new(writer, HEADER_CHECKSUM);
        out.write_all(MAGIC)?;
        out.write_all(&[self.kind as u8, self.version])?;
        vbyte::write(&mut out, self.properties.len() as u64)?;
        for (key, value) in &self.properties {
            vbyte::write(&mut out, key.len() as u64)?;
            out.write_all(key.as_bytes())?;
            vbyte::write(&mut out, value.len() as u64)?;
            out.write_all(value.as_bytes())?;
        }
        out.finish()?;
        Ok(())
    }

    /// Deserialize a header; `strict` decides whether a bad CRC is fatal.
    pub fn read<R: Read>(reader: &mut R, strict: bool) -> Result<Self> {
        let mut input = ChecksumReader::new(reader, HEADER_CHECKSUM);

        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::InvalidEncoding("bad section magic".to_string()));
        }

        let mut tag = [0u8; 2];
        input.read_exact(&mut tag)?;
        let kind = SectionKind::try_from(tag[0])?;
        let version = tag[1];
        if version == 0 || version > FORMAT_VERSION {
            return Err(Error::InvalidEncoding(format!(
                "unsupported {} version {version}",
                kind.name()
            )));
        }

        let count = vbyte::read_usize(&mut input)?;
        let mut properties = BTreeMap::new();
        for _ in 0..count {
            let key = read_string(&mut input)?;
            let value = read_string(&mut input)?;
            properties.insert(key, value);
        }

        let matched = input.verify()?;
        checksum::enforce(matched, "header", strict)?;

        Ok(Self {
            kind,
            version,
            properties,
        })
    }
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = vbyte::read_usize(reader)?;
    if len > MAX_PROPERTY_LEN {
        return Err(Error::InvalidEncoding(format!(
            "header property of {len} bytes"
        )));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| Error::InvalidEncoding("header property is not utf-8".to_string()))
}
