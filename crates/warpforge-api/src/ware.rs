//! Content-addressed artifact identity.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::impl_string_serde;

/// The family of packing and hashing used for a ware, e.g. `tar` or `git`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Packtype(pub String);

impl Packtype {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Packtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Packtype {
    fn from(s: &str) -> Self {
        Packtype(s.to_string())
    }
}

/// An opaque URL-like address where a ware may be fetched.
///
/// Never part of ware identity; two wares fetched from different addresses
/// with the same hash are the same ware.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseAddr(pub String);

impl WarehouseAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WarehouseAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WarehouseAddr {
    fn from(s: &str) -> Self {
        WarehouseAddr(s.to_string())
    }
}

/// Identity of an immutable content-addressed artifact.
///
/// String form is `<packtype>:<hash>`. Equal fields denote identical content.
/// The hash format is the packer's concern and is treated as opaque here,
/// except that hashes shorter than 7 characters are rejected wherever a cache
/// path is derived (see the workspace crate).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WareID {
    pub packtype: Packtype,
    pub hash: String,
}

impl WareID {
    pub fn new(packtype: impl Into<String>, hash: impl Into<String>) -> Self {
        WareID {
            packtype: Packtype(packtype.into()),
            hash: hash.into(),
        }
    }
}

impl fmt::Display for WareID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.packtype, self.hash)
    }
}

impl FromStr for WareID {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((packtype, hash)) if !packtype.is_empty() && !hash.is_empty() => Ok(WareID {
                packtype: Packtype(packtype.to_string()),
                hash: hash.to_string(),
            }),
            _ => Err(ApiError::WareIdInvalid {
                ware: s.to_string(),
                reason: "expected `<packtype>:<hash>`".to_string(),
            }),
        }
    }
}

impl_string_serde!(WareID);
