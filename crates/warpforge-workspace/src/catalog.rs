//! The on-disk catalog: a registry of module/release/mirror/replay documents.
//!
//! Layout under a catalog root:
//!
//! ```text
//! <catalog>/
//!   <module-path>/
//!     _module.json              {"catalogmodule.v1": ...}
//!     _releases/<release>.json  bare Release document
//!     _replays/<hash>.json      {"plot.v1": ...}
//!     _mirrors.json             {"catalogmirrors.v1": ...}
//! ```
//!
//! Mutations take the catalog's advisory lock and write temp-then-rename, so
//! cancellation leaves the catalog in its prior consistent state. The module
//! document pins each release to the content hash of its release file; every
//! mutation of a release recomputes that pin.

use std::path::Path;
use std::path::PathBuf;

use snafu::ResultExt;
use tracing::debug;
use warpforge_api::CatalogMirrors;
use warpforge_api::CatalogMirrorsCapsule;
use warpforge_api::CatalogModule;
use warpforge_api::CatalogModuleCapsule;
use warpforge_api::CatalogRef;
use warpforge_api::OrderedMap;
use warpforge_api::Packtype;
use warpforge_api::PlotCapsule;
use warpforge_api::Release;
use warpforge_api::WareID;
use warpforge_api::WarehouseAddr;
use warpforge_api::catalog::RELEASE_METADATA_REPLAY;
use warpforge_api::codec;

use crate::error::CatalogInvalidSnafu;
use crate::error::CatalogItemAlreadyExistsSnafu;
use crate::error::CatalogMissingSnafu;
use crate::error::CodecSnafu;
use crate::error::IoSnafu;
use crate::error::Result;
use crate::fsutil;
use crate::fsutil::Lockfile;

const MODULE_FILENAME: &str = "_module.json";
const MIRRORS_FILENAME: &str = "_mirrors.json";
const RELEASES_DIRNAME: &str = "_releases";
const REPLAYS_DIRNAME: &str = "_replays";
const LOCK_FILENAME: &str = ".lock";

/// Handle to one catalog directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    base_path: PathBuf,
}

impl Catalog {
    pub fn new(base_path: PathBuf) -> Catalog {
        Catalog { base_path }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn module_dir(&self, module_name: &str) -> Result<PathBuf> {
        validate_module_name(module_name)?;
        Ok(self.base_path.join(module_name))
    }

    fn release_path(&self, reference: &CatalogRef) -> Result<PathBuf> {
        let dir = self.module_dir(&reference.module_name)?;
        Ok(dir.join(RELEASES_DIRNAME).join(format!("{}.json", reference.release_name)))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).context(IoSnafu {
                    context: "failed to read catalog file",
                    path: path.to_path_buf(),
                });
            }
        };
        let value = codec::decode(&bytes).context(CodecSnafu { path: path.to_path_buf() })?;
        Ok(Some(value))
    }

    // --- reads ---

    /// The module record, if this catalog carries the module.
    pub async fn get_module(&self, module_name: &str) -> Result<Option<CatalogModule>> {
        let path = self.module_dir(module_name)?.join(MODULE_FILENAME);
        let capsule: Option<CatalogModuleCapsule> = self.read_json(&path).await?;
        Ok(capsule.map(|CatalogModuleCapsule::V1(module)| module))
    }

    /// The release document for a reference, if present.
    pub async fn get_release(&self, reference: &CatalogRef) -> Result<Option<Release>> {
        if reference.release_name.is_empty() {
            return Ok(None);
        }
        self.read_json(&self.release_path(reference)?).await
    }

    /// The mirror indexes for a module, if present.
    pub async fn get_mirrors(&self, module_name: &str) -> Result<Option<CatalogMirrors>> {
        let path = self.module_dir(module_name)?.join(MIRRORS_FILENAME);
        let capsule: Option<CatalogMirrorsCapsule> = self.read_json(&path).await?;
        Ok(capsule.map(|CatalogMirrorsCapsule::V1(mirrors)| mirrors))
    }

    /// Look up one ware and the first mirror address able to serve it.
    ///
    /// `by_ware` mirrors win; failing that, a `by_module` mirror whose
    /// packtype matches the ware's. A ware with no mirror is still a hit;
    /// fetching may find it in a local cache.
    pub async fn get_ware(&self, reference: &CatalogRef) -> Result<Option<(WareID, Option<WarehouseAddr>)>> {
        let Some(release) = self.get_release(reference).await? else {
            return Ok(None);
        };
        let Some(ware) = release.items.get(&reference.item_name) else {
            return Ok(None);
        };

        let addr = match self.get_mirrors(&reference.module_name).await? {
            Some(mirrors) => {
                let by_ware_hit = mirrors
                    .by_ware
                    .as_ref()
                    .and_then(|m| m.get(ware))
                    .and_then(|addrs| addrs.first())
                    .cloned();
                by_ware_hit.or_else(|| {
                    mirrors
                        .by_module
                        .as_ref()
                        .and_then(|m| m.get(&ware.packtype))
                        .and_then(|addrs| addrs.first())
                        .cloned()
                })
            }
            None => None,
        };

        Ok(Some((ware.clone(), addr)))
    }

    /// The replay plot attached to a reference's release, if any.
    pub async fn get_replay(&self, reference: &CatalogRef) -> Result<Option<PlotCapsule>> {
        let Some(release) = self.get_release(reference).await? else {
            return Ok(None);
        };
        let Some(replay_hash) = release.metadata.get(RELEASE_METADATA_REPLAY) else {
            return Ok(None);
        };
        let path = self
            .module_dir(&reference.module_name)?
            .join(REPLAYS_DIRNAME)
            .join(format!("{replay_hash}.json"));
        self.read_json(&path).await
    }

    /// Every module in this catalog, as names sorted by path.
    pub async fn list_modules(&self) -> Result<Vec<String>> {
        let mut modules = Vec::new();
        let mut pending = vec![self.base_path.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err).context(IoSnafu {
                        context: "failed to walk catalog",
                        path: dir,
                    });
                }
            };
            while let Some(entry) = entries.next_entry().await.context(IoSnafu {
                context: "failed to walk catalog",
                path: dir.clone(),
            })? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.starts_with('_') || name.starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir {
                    continue;
                }
                if tokio::fs::metadata(path.join(MODULE_FILENAME)).await.is_ok()
                    && let Ok(rel) = path.strip_prefix(&self.base_path)
                {
                    modules.push(rel.to_string_lossy().into_owned());
                }
                pending.push(path);
            }
        }
        modules.sort();
        Ok(modules)
    }

    // --- mutations ---

    /// Insert one item into a release, creating module and release documents
    /// as needed. Fails with `catalog-item-already-exists` when the item is
    /// occupied and `force` is false; with `force`, overwrites atomically.
    pub async fn add_item(&self, reference: &CatalogRef, ware: WareID, force: bool) -> Result<()> {
        if reference.release_name.is_empty() || reference.item_name.is_empty() {
            return CatalogInvalidSnafu {
                name: reference.to_string(),
                reason: "release and item names must be nonempty",
            }
            .fail();
        }
        let _lock = self.lock().await?;

        let mut release = self.get_release(reference).await?.unwrap_or_else(|| Release {
            release_name: reference.release_name.clone(),
            metadata: OrderedMap::new(),
            items: OrderedMap::new(),
        });

        if release.items.contains_key(&reference.item_name) && !force {
            return CatalogItemAlreadyExistsSnafu {
                reference: reference.to_string(),
            }
            .fail();
        }

        release.items.insert(reference.item_name.clone(), ware);
        self.write_release_and_repin(reference, &release).await?;
        debug!(reference = %reference, catalog = %self.base_path.display(), "catalog item added");
        Ok(())
    }

    /// Record that a specific ware can be fetched from `addr`. Set semantics:
    /// re-adding an address is a no-op.
    pub async fn add_by_ware_mirror(
        &self,
        reference: &CatalogRef,
        ware: WareID,
        addr: WarehouseAddr,
    ) -> Result<()> {
        let _lock = self.lock().await?;
        let mut mirrors = self.get_mirrors(&reference.module_name).await?.unwrap_or_default();
        let by_ware = mirrors.by_ware.get_or_insert_with(OrderedMap::new);
        if by_ware.get(&ware).is_none() {
            by_ware.insert(ware.clone(), Vec::new());
        }
        let addrs = by_ware.get_mut(&ware).expect("just inserted");
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
        self.write_mirrors(&reference.module_name, &mirrors).await
    }

    /// Record that a whole module lives at `addr` for a given packtype
    /// (git-like wares). Set semantics.
    pub async fn add_by_module_mirror(
        &self,
        reference: &CatalogRef,
        packtype: Packtype,
        addr: WarehouseAddr,
    ) -> Result<()> {
        let _lock = self.lock().await?;
        let mut mirrors = self.get_mirrors(&reference.module_name).await?.unwrap_or_default();
        let by_module = mirrors.by_module.get_or_insert_with(OrderedMap::new);
        if by_module.get(&packtype).is_none() {
            by_module.insert(packtype.clone(), Vec::new());
        }
        let addrs = by_module.get_mut(&packtype).expect("just inserted");
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
        self.write_mirrors(&reference.module_name, &mirrors).await
    }

    /// Store a plot under its content hash and attach that hash to the
    /// release named by `reference` (whose item name is ignored).
    pub async fn add_replay(&self, reference: &CatalogRef, plot: &PlotCapsule, force: bool) -> Result<()> {
        let _lock = self.lock().await?;

        let Some(mut release) = self.get_release(reference).await? else {
            return CatalogMissingSnafu {
                reference: reference.to_string(),
            }
            .fail();
        };

        let bytes = codec::encode(plot).context(CodecSnafu {
            path: self.base_path.clone(),
        })?;
        let replay_hash = codec::content_hash(&bytes);

        if let Some(existing) = release.metadata.get(RELEASE_METADATA_REPLAY)
            && *existing != replay_hash
            && !force
        {
            return CatalogItemAlreadyExistsSnafu {
                reference: format!("{}:{}(replay)", reference.module_name, reference.release_name),
            }
            .fail();
        }

        let replay_path = self
            .module_dir(&reference.module_name)?
            .join(REPLAYS_DIRNAME)
            .join(format!("{replay_hash}.json"));
        fsutil::write_atomic(&replay_path, &bytes).await?;

        release.metadata.insert(RELEASE_METADATA_REPLAY.to_string(), replay_hash);
        self.write_release_and_repin(reference, &release).await
    }

    /// Write a release document and refresh the module's content-hash pin for
    /// it, creating the module record if this is its first release.
    async fn write_release_and_repin(&self, reference: &CatalogRef, release: &Release) -> Result<()> {
        let release_path = self.release_path(reference)?;
        let release_bytes = codec::encode(release).context(CodecSnafu {
            path: release_path.clone(),
        })?;
        fsutil::write_atomic(&release_path, &release_bytes).await?;

        let mut module = self
            .get_module(&reference.module_name)
            .await?
            .unwrap_or_else(|| CatalogModule {
                name: reference.module_name.clone(),
                metadata: OrderedMap::new(),
                releases: OrderedMap::new(),
            });
        module
            .releases
            .insert(reference.release_name.clone(), codec::content_hash(&release_bytes));

        let module_path = self.module_dir(&reference.module_name)?.join(MODULE_FILENAME);
        let module_bytes = codec::encode(&CatalogModuleCapsule::V1(module)).context(CodecSnafu {
            path: module_path.clone(),
        })?;
        fsutil::write_atomic(&module_path, &module_bytes).await
    }

    async fn write_mirrors(&self, module_name: &str, mirrors: &CatalogMirrors) -> Result<()> {
        let path = self.module_dir(module_name)?.join(MIRRORS_FILENAME);
        let bytes = codec::encode(&CatalogMirrorsCapsule::V1(mirrors.clone()))
            .context(CodecSnafu { path: path.clone() })?;
        fsutil::write_atomic(&path, &bytes).await
    }

    async fn lock(&self) -> Result<Lockfile> {
        Lockfile::acquire(self.base_path.join(LOCK_FILENAME)).await
    }
}

/// Module names are slash paths (`example.com/foo`); each segment follows the
/// catalog-name rules.
pub fn validate_module_name(name: &str) -> Result<()> {
    let segments: Vec<&str> = name.split('/').collect();
    let well_formed = !name.is_empty()
        && segments.iter().all(|seg| {
            !seg.is_empty()
                && *seg != "."
                && *seg != ".."
                && seg.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        });
    if well_formed {
        Ok(())
    } else {
        CatalogInvalidSnafu {
            name,
            reason: "module name segments must match [A-Za-z0-9_.-]+",
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ref() -> CatalogRef {
        CatalogRef::new("example.com/module", "v1.0", "x86_64")
    }

    fn catalog(dir: &tempfile::TempDir) -> Catalog {
        Catalog::new(dir.path().join("catalog"))
    }

    #[test]
    fn test_module_name_validation() {
        assert!(validate_module_name("example.com/module").is_ok());
        assert!(validate_module_name("warpsys.org/bootstrap-rootfs").is_ok());
        assert!(validate_module_name("a/../b").is_err());
        assert!(validate_module_name("/leading").is_err());
        assert!(validate_module_name("trailing/").is_err());
        assert!(validate_module_name("").is_err());
    }

    #[tokio::test]
    async fn test_add_item_then_get_ware() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);

        cat.add_item(&test_ref(), WareID::new("tar", "abcd123"), false).await.unwrap();
        let (ware, addr) = cat.get_ware(&test_ref()).await.unwrap().unwrap();
        assert_eq!(ware, WareID::new("tar", "abcd123"));
        assert!(addr.is_none());

        // The module record exists and pins the release's content hash.
        let module = cat.get_module("example.com/module").await.unwrap().unwrap();
        let release_bytes = tokio::fs::read(cat.release_path(&test_ref()).unwrap()).await.unwrap();
        assert_eq!(*module.releases.get("v1.0").unwrap(), codec::content_hash(&release_bytes));
    }

    #[tokio::test]
    async fn test_add_item_conflict_and_force() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);

        cat.add_item(&test_ref(), WareID::new("tar", "aaa1234"), false).await.unwrap();

        let err = cat.add_item(&test_ref(), WareID::new("tar", "bbb1234"), false).await.unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::CatalogItemAlreadyExists);
        // Conflict leaves the original in place.
        let (ware, _) = cat.get_ware(&test_ref()).await.unwrap().unwrap();
        assert_eq!(ware, WareID::new("tar", "aaa1234"));

        cat.add_item(&test_ref(), WareID::new("tar", "bbb1234"), true).await.unwrap();
        let (ware, _) = cat.get_ware(&test_ref()).await.unwrap().unwrap();
        assert_eq!(ware, WareID::new("tar", "bbb1234"));
    }

    #[tokio::test]
    async fn test_mirror_set_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        let ware = WareID::new("tar", "abcd123");
        let addr = WarehouseAddr::from("https://example.com/w.tgz");

        cat.add_by_ware_mirror(&test_ref(), ware.clone(), addr.clone()).await.unwrap();
        cat.add_by_ware_mirror(&test_ref(), ware.clone(), addr.clone()).await.unwrap();

        let mirrors = cat.get_mirrors("example.com/module").await.unwrap().unwrap();
        assert_eq!(mirrors.by_ware.unwrap().get(&ware).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_ware_prefers_by_ware_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        let ware = WareID::new("git", "abcdef0123456789");

        cat.add_item(&test_ref(), ware.clone(), false).await.unwrap();
        cat.add_by_module_mirror(&test_ref(), Packtype::from("git"), WarehouseAddr::from("https://module.git"))
            .await
            .unwrap();
        let (_, addr) = cat.get_ware(&test_ref()).await.unwrap().unwrap();
        assert_eq!(addr.unwrap().as_str(), "https://module.git");

        cat.add_by_ware_mirror(&test_ref(), ware.clone(), WarehouseAddr::from("https://direct.git"))
            .await
            .unwrap();
        let (_, addr) = cat.get_ware(&test_ref()).await.unwrap().unwrap();
        assert_eq!(addr.unwrap().as_str(), "https://direct.git");
    }

    #[tokio::test]
    async fn test_replay_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        cat.add_item(&test_ref(), WareID::new("tar", "abcd123"), false).await.unwrap();

        let plot: PlotCapsule = codec::decode(
            br#"{"plot.v1":{"inputs":{},"steps":{},"outputs":{}}}"#,
        )
        .unwrap();
        cat.add_replay(&test_ref(), &plot, false).await.unwrap();

        let got = cat.get_replay(&test_ref()).await.unwrap().unwrap();
        assert_eq!(got, plot);

        // Same plot again: metadata hash unchanged, so no force needed.
        cat.add_replay(&test_ref(), &plot, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_lookups_are_none_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        assert!(cat.get_ware(&test_ref()).await.unwrap().is_none());
        assert!(cat.get_module("example.com/module").await.unwrap().is_none());
        assert!(cat.get_replay(&test_ref()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_modules_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog(&dir);
        cat.add_item(&CatalogRef::new("example.com/zeta", "v1", "x"), WareID::new("tar", "aaaa111"), false)
            .await
            .unwrap();
        cat.add_item(&CatalogRef::new("example.com/alpha", "v1", "x"), WareID::new("tar", "bbbb222"), false)
            .await
            .unwrap();

        let modules = cat.list_modules().await.unwrap();
        assert_eq!(modules, vec!["example.com/alpha", "example.com/zeta"]);
    }
}
