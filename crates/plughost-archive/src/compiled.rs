//! Header format for precompiled module entries.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "PHC\x01"
//! 4       4     flags (LE u32, reserved, always 0)
//! 8       4     source mtime (LE u32, seconds)
//! 12      4     payload size (LE u32)
//! 16      ..    payload
//! ```
//!
//! The script engine cannot serialize a compiled AST, so the payload is the
//! normalized script text. The header still lets the loader reject units
//! produced by an incompatible toolchain before anything is evaluated.

use crate::error::{ArchiveError, ArchiveResult};

/// Magic bytes identifying a compiled unit of the current format.
pub const MAGIC: [u8; 4] = *b"PHC\x01";

/// Length of the fixed header preceding the payload.
pub const HEADER_LEN: usize = 16;

/// A decoded compiled module entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub flags: u32,
    pub mtime: u32,
    pub payload: Vec<u8>,
}

impl CompiledUnit {
    /// Wrap script text into a unit.
    pub fn from_source(source: &str, mtime: u32) -> Self {
        Self {
            flags: 0,
            mtime,
            payload: source.as_bytes().to_vec(),
        }
    }

    /// Serialize the unit with its header. Fails if the payload does not
    /// fit the size field.
    pub fn encode(&self) -> ArchiveResult<Vec<u8>> {
        let size = u32::try_from(self.payload.len()).map_err(|_| ArchiveError::PayloadTooLarge {
            len: self.payload.len(),
        })?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Validate the header of `data` and split off the payload.
    ///
    /// `name` identifies the module in errors.
    pub fn decode(name: &str, data: &[u8]) -> ArchiveResult<Self> {
        if data.len() < 4 {
            return Err(ArchiveError::Truncated {
                name: name.to_string(),
                len: data.len(),
            });
        }
        let magic = [data[0], data[1], data[2], data[3]];
        if magic != MAGIC {
            return Err(ArchiveError::BadMagic {
                name: name.to_string(),
                magic,
            });
        }
        if data.len() < HEADER_LEN {
            return Err(ArchiveError::Truncated {
                name: name.to_string(),
                len: data.len(),
            });
        }

        let word = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let declared = word(12);
        let payload = &data[HEADER_LEN..];
        if usize::try_from(declared).ok() != Some(payload.len()) {
            return Err(ArchiveError::SizeMismatch {
                name: name.to_string(),
                declared,
                actual: payload.len(),
            });
        }
        Ok(Self {
            flags: word(4),
            mtime: word(8),
            payload: payload.to_vec(),
        })
    }

    /// The payload as script text.
    pub fn source(&self, name: &str) -> ArchiveResult<&str> {
        std::str::from_utf8(&self.payload).map_err(|_| ArchiveError::Undecodable {
            path: name.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = CompiledUnit::from_source("let x = 1;", 7).encode().unwrap();
        assert_eq!(&bytes[0..4], b"PHC\x01");
        assert_eq!(&bytes[8..12], &7u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &10u32.to_le_bytes());
        assert_eq!(&bytes[HEADER_LEN..], b"let x = 1;");
    }

    #[test]
    fn test_bad_magic() {
        let err = CompiledUnit::decode("Pkg.mod", b"XXXX000000000000").unwrap_err();
        assert!(matches!(err, ArchiveError::BadMagic { magic, .. } if &magic == b"XXXX"));
    }

    #[test]
    fn test_truncated_header() {
        let err = CompiledUnit::decode("Pkg.mod", b"PHC\x01\0\0").unwrap_err();
        assert!(matches!(err, ArchiveError::Truncated { len: 6, .. }));
    }

    #[test]
    fn test_size_field_must_match_payload() {
        let mut bytes = CompiledUnit::from_source("let x = 1;", 7).encode().unwrap();
        assert_eq!(CompiledUnit::decode("Pkg.mod", &bytes).unwrap().source("Pkg.mod").unwrap(), "let x = 1;");

        bytes.truncate(bytes.len() - 3);
        let err = CompiledUnit::decode("Pkg.mod", &bytes).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::SizeMismatch { declared: 10, actual: 7, .. }
        ));

        bytes.extend_from_slice(b"1;;;;");
        assert!(matches!(
            CompiledUnit::decode("Pkg.mod", &bytes),
            Err(ArchiveError::SizeMismatch { actual: 12, .. })
        ));
    }
}
