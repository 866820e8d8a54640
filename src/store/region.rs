//! Region codes and the configured set of allowed regions.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::errors::{Result, SyncError};

/// Byte offset of the region field inside a record.
pub const REGION_OFFSET: usize = 8;
/// Width of the region field.
pub const REGION_LEN: usize = 3;
/// Smallest buffer that can carry a region field.
pub const MIN_RECORD_LEN: usize = REGION_OFFSET + REGION_LEN;

/// A 3-byte region code as stored at offsets 8..11 of a record.
///
/// Codes parsed from user input are guaranteed ASCII. Codes decoded from
/// record bytes may hold arbitrary bytes; those are never members of a
/// [`RegionSet`] and only exist to report what an invalid record contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCode([u8; REGION_LEN]);

impl RegionCode {
    pub const USA: Self = Self(*b"USA");
    pub const KOR: Self = Self(*b"KOR");
    pub const RUS: Self = Self(*b"RUS");

    /// Parse a user-supplied code. Must be exactly three ASCII characters.
    pub fn parse(raw: &str) -> Result<Self> {
        let bytes = raw.as_bytes();
        if bytes.len() != REGION_LEN {
            return Err(SyncError::InvalidRegion {
                code: raw.to_string(),
                reason: format!("must be exactly {REGION_LEN} characters"),
            });
        }
        if !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(SyncError::InvalidRegion {
                code: raw.to_string(),
                reason: "must be printable ASCII".to_string(),
            });
        }
        let mut code = [0u8; REGION_LEN];
        code.copy_from_slice(bytes);
        Ok(Self(code))
    }

    /// Read the region field of a buffer. `None` when the buffer is too short.
    pub fn read_from(buffer: &[u8]) -> Option<Self> {
        let field = buffer.get(REGION_OFFSET..MIN_RECORD_LEN)?;
        let mut code = [0u8; REGION_LEN];
        code.copy_from_slice(field);
        Some(Self(code))
    }

    /// Overwrite the region field of a buffer in place.
    ///
    /// Returns `false` (and leaves the buffer untouched) when it is too short.
    pub fn write_into(self, buffer: &mut [u8]) -> bool {
        match buffer.get_mut(REGION_OFFSET..MIN_RECORD_LEN) {
            Some(field) => {
                field.copy_from_slice(&self.0);
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for RegionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ordered set of region codes a record may carry.
///
/// Order is the configured order and drives the ordering of flattened views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet {
    codes: Vec<RegionCode>,
}

impl RegionSet {
    /// Build a set from configured strings. Rejects malformed and duplicate codes.
    pub fn from_codes<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let mut codes = Vec::with_capacity(raw.len());
        for entry in raw {
            let code = RegionCode::parse(entry.as_ref())?;
            if codes.contains(&code) {
                return Err(SyncError::InvalidRegion {
                    code: code.to_string(),
                    reason: "listed more than once".to_string(),
                });
            }
            codes.push(code);
        }
        if codes.is_empty() {
            return Err(SyncError::InvalidConfig {
                details: "at least one allowed region is required".to_string(),
            });
        }
        Ok(Self { codes })
    }

    pub fn contains(&self, code: &RegionCode) -> bool {
        self.codes.contains(code)
    }

    /// Parse `raw` and require membership.
    pub fn resolve(&self, raw: &str) -> Result<RegionCode> {
        let code = RegionCode::parse(raw)?;
        if self.contains(&code) {
            Ok(code)
        } else {
            Err(SyncError::InvalidRegion {
                code: raw.to_string(),
                reason: format!("not one of {self}"),
            })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionCode> {
        self.codes.iter()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for RegionSet {
    fn default() -> Self {
        Self {
            codes: vec![RegionCode::USA, RegionCode::KOR, RegionCode::RUS],
        }
    }
}

impl fmt::Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.codes.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", joined.join(", "))
    }
}
