//! Catalog records: modules, releases, mirrors, and references into them.
//!
//! On disk a catalog is a tree of JSON documents (see the workspace crate for
//! the layout); the types here are their wire shapes. Catalog module and
//! mirror documents travel in single-key capsule envelopes that version the
//! payload (`catalogmodule.v1`, `catalogmirrors.v1`).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::impl_string_serde;
use crate::ordered::OrderedMap;
use crate::ware::Packtype;
use crate::ware::WareID;
use crate::ware::WarehouseAddr;

/// A slash-path module identifier, e.g. `example.com/foo`.
pub type ModuleName = String;
/// An arbitrary user-chosen version label. Not ordered, not SemVer.
pub type ReleaseName = String;
/// Selects one ware within a release, often an architecture label.
pub type ItemLabel = String;

/// A symbolic reference to one ware: `module:release:item`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogRef {
    pub module_name: ModuleName,
    pub release_name: ReleaseName,
    pub item_name: ItemLabel,
}

impl CatalogRef {
    pub fn new(
        module_name: impl Into<String>,
        release_name: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        CatalogRef {
            module_name: module_name.into(),
            release_name: release_name.into(),
            item_name: item_name.into(),
        }
    }
}

impl fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module_name, self.release_name, self.item_name)
    }
}

impl FromStr for CatalogRef {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Module names may not contain `:`, so the first two colons delimit.
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(module), Some(release), Some(item)) if !module.is_empty() => {
                Ok(CatalogRef::new(module, release, item))
            }
            _ => Err(ApiError::CodecSchema {
                detail: format!("invalid catalog reference {s:?}: expected `module:release:item`"),
            }),
        }
    }
}

impl_string_serde!(CatalogRef);

/// The `module.wf` document: the identity of the module being worked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: ModuleName,
}

/// Capsule envelope for [`Module`]: `{"module.v1": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleCapsule {
    #[serde(rename = "module.v1")]
    V1(Module),
}

/// A catalog's record of one module: its named releases, each pinned to the
/// content hash of its release document for tamper detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogModule {
    pub name: ModuleName,
    #[serde(default)]
    pub metadata: OrderedMap<String, String>,
    pub releases: OrderedMap<ReleaseName, String>,
}

/// Capsule envelope for [`CatalogModule`]: `{"catalogmodule.v1": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogModuleCapsule {
    #[serde(rename = "catalogmodule.v1")]
    V1(CatalogModule),
}

/// A named snapshot of a module: one or more items, each a ware.
///
/// `metadata` may carry a `replay` key whose value is the content hash of a
/// plot stored in the catalog's `_replays` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(rename = "releaseName")]
    pub release_name: ReleaseName,
    #[serde(default)]
    pub metadata: OrderedMap<String, String>,
    pub items: OrderedMap<ItemLabel, WareID>,
}

/// The key in release metadata that points at the release's replay plot.
pub const RELEASE_METADATA_REPLAY: &str = "replay";

/// Per-module mirror indexes: where wares of this module can be fetched.
///
/// `by_ware` lists addresses per individual ware (tar-like packtypes);
/// `by_module` lists addresses for the whole module per packtype (git-like
/// packtypes, where one address serves every release).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogMirrors {
    #[serde(rename = "byWare", default, skip_serializing_if = "Option::is_none")]
    pub by_ware: Option<OrderedMap<WareID, Vec<WarehouseAddr>>>,
    #[serde(rename = "byModule", default, skip_serializing_if = "Option::is_none")]
    pub by_module: Option<OrderedMap<Packtype, Vec<WarehouseAddr>>>,
}

/// Capsule envelope for [`CatalogMirrors`]: `{"catalogmirrors.v1": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogMirrorsCapsule {
    #[serde(rename = "catalogmirrors.v1")]
    V1(CatalogMirrors),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ref_roundtrip() {
        let r: CatalogRef = "example.com/module:v1.0:x86_64".parse().unwrap();
        assert_eq!(r.module_name, "example.com/module");
        assert_eq!(r.release_name, "v1.0");
        assert_eq!(r.item_name, "x86_64");
        assert_eq!(r.to_string(), "example.com/module:v1.0:x86_64");
    }

    #[test]
    fn test_catalog_ref_empty_release_and_item_parse() {
        // Empty release/item are representable; resolution rejects them later.
        let r: CatalogRef = "example.com/module::".parse().unwrap();
        assert_eq!(r.release_name, "");
        assert_eq!(r.item_name, "");
    }

    #[test]
    fn test_catalog_ref_rejects_too_few_parts() {
        assert!("example.com/module:v1.0".parse::<CatalogRef>().is_err());
        assert!("".parse::<CatalogRef>().is_err());
    }

    #[test]
    fn test_catalog_module_capsule_decodes_fixture() {
        let data = r#"{"catalogmodule.v1":{"name":"example.com/module","metadata":{},"releases":{"v1.0":"zM5K3aw"}}}"#;
        let CatalogModuleCapsule::V1(module) = serde_json::from_str(data).unwrap();
        assert_eq!(module.name, "example.com/module");
        assert_eq!(module.releases.get("v1.0").unwrap().as_str(), "zM5K3aw");
    }

    #[test]
    fn test_release_decodes_fixture() {
        let data = r#"{"releaseName":"v1.0","metadata":{"replay":"zM5K3aX"},"items":{"x86_64":"tar:abcd"}}"#;
        let release: Release = serde_json::from_str(data).unwrap();
        assert_eq!(release.release_name, "v1.0");
        assert_eq!(release.metadata.get(RELEASE_METADATA_REPLAY).unwrap().as_str(), "zM5K3aX");
        assert_eq!(*release.items.get("x86_64").unwrap(), WareID::new("tar", "abcd"));
    }

    #[test]
    fn test_mirrors_decode_fixture() {
        let data = r#"{"catalogmirrors.v1":{"byWare":{"tar:abcd":["https://example.com/module-v1.0-x86_64.tgz"]}}}"#;
        let CatalogMirrorsCapsule::V1(mirrors) = serde_json::from_str(data).unwrap();
        let by_ware = mirrors.by_ware.as_ref().unwrap();
        let addrs = by_ware.get(&WareID::new("tar", "abcd")).unwrap();
        assert_eq!(addrs[0].as_str(), "https://example.com/module-v1.0-x86_64.tgz");
        assert!(mirrors.by_module.is_none());
        // Absent byModule stays absent through a round-trip.
        let bytes = serde_json::to_vec(&CatalogMirrorsCapsule::V1(mirrors)).unwrap();
        assert!(!String::from_utf8(bytes).unwrap().contains("byModule"));
    }
}
