//! One workspace: the paths it owns and the catalogs inside it.

use std::path::Path;
use std::path::PathBuf;

use snafu::ResultExt;
use tracing::debug;
use warpforge_api::CatalogRef;
use warpforge_api::PlotCapsule;
use warpforge_api::WareID;
use warpforge_api::WarehouseAddr;

use crate::MAGIC_WORKSPACE_DIRNAME;
use crate::ROOT_MARKER_FILENAME;
use crate::catalog::Catalog;
use crate::error::IoSnafu;
use crate::error::NoWorkspaceSnafu;
use crate::error::Result;
use crate::error::WorkspaceError;

/// A directory marked by `.warpforge`, holding caches, memos, and catalogs.
///
/// The handle exclusively owns its on-disk root; catalog handles derived from
/// it borrow nothing back (they carry their own paths) but writes are always
/// addressed to one explicitly chosen workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root_path: PathBuf,
    is_home: bool,
    is_root: bool,
}

impl Workspace {
    /// Open the workspace at exactly `path`. No searching; see
    /// [`crate::fsdetect`] for discovery.
    pub async fn open(home: &Path, path: &Path) -> Result<Workspace> {
        let magic = path.join(MAGIC_WORKSPACE_DIRNAME);
        match tokio::fs::metadata(&magic).await {
            Ok(meta) if meta.is_dir() => Ok(Self::open_unchecked(home, path).await),
            _ => NoWorkspaceSnafu { path: path.to_path_buf() }.fail(),
        }
    }

    /// Open without checking that `.warpforge` exists. The root/home status
    /// is fixed at open time and not affected by later filesystem changes.
    pub(crate) async fn open_unchecked(home: &Path, path: &Path) -> Workspace {
        let is_home = path == home;
        let marker = path.join(MAGIC_WORKSPACE_DIRNAME).join(ROOT_MARKER_FILENAME);
        let is_root = is_home || tokio::fs::metadata(&marker).await.is_ok();
        Workspace {
            root_path: path.to_path_buf(),
            is_home,
            is_root,
        }
    }

    /// Lay down the `.warpforge` directory structure at `path`, optionally
    /// with the root marker (the `init` command).
    pub async fn create(home: &Path, path: &Path, root: bool) -> Result<Workspace> {
        let magic = path.join(MAGIC_WORKSPACE_DIRNAME);
        tokio::fs::create_dir_all(&magic).await.context(IoSnafu {
            context: "could not create workspace internals directory",
            path: magic.clone(),
        })?;
        if root {
            let marker = magic.join(ROOT_MARKER_FILENAME);
            tokio::fs::write(&marker, b"").await.context(IoSnafu {
                context: "cannot make workspace root indicator",
                path: marker,
            })?;
        }
        Workspace::open(home, path).await
    }

    /// The directory that is this workspace's root. Does *not* include the
    /// `.warpforge` segment.
    pub fn path(&self) -> &Path {
        &self.root_path
    }

    /// The home workspace is always last in a stack and always treated as a
    /// root workspace.
    pub fn is_home_workspace(&self) -> bool {
        self.is_home
    }

    pub fn is_root_workspace(&self) -> bool {
        self.is_root
    }

    fn internal_path(&self) -> PathBuf {
        self.root_path.join(MAGIC_WORKSPACE_DIRNAME)
    }

    // --- ware cache ---

    /// Cache location for a ware: three-level hash fan-out under
    /// `.warpforge/cache/<packtype>/fileset/`.
    pub fn cache_path(&self, ware: &WareID) -> Result<PathBuf> {
        if ware.hash.len() < 7 {
            return Err(WorkspaceError::WareIdInvalid {
                ware: ware.to_string(),
                reason: "hash shorter than 7 characters".to_string(),
            });
        }
        Ok(self
            .internal_path()
            .join("cache")
            .join(ware.packtype.as_str())
            .join("fileset")
            .join(&ware.hash[0..3])
            .join(&ware.hash[3..6])
            .join(&ware.hash))
    }

    /// A ware is present iff its cache directory exists and is nonempty.
    pub async fn has_ware(&self, ware: &WareID) -> Result<bool> {
        let path = self.cache_path(ware)?;
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(_) => return Ok(false),
        };
        Ok(entries.next_entry().await.ok().flatten().is_some())
    }

    // --- memo cache ---

    /// Base path for memoized runrecords (`.warpforge/memos`).
    pub fn memo_base_path(&self) -> PathBuf {
        self.internal_path().join("memos")
    }

    /// Path of the memo for a given formula id.
    pub fn memo_path(&self, formula_id: &str) -> PathBuf {
        self.memo_base_path().join(format!("{formula_id}.json"))
    }

    // --- catalogs ---

    /// Base path for named catalogs (`.warpforge/catalogs`).
    pub fn catalog_base_path(&self) -> PathBuf {
        self.internal_path().join("catalogs")
    }

    /// Path of a catalog. `None` selects the unnamed default catalog
    /// (`.warpforge/catalog`); names are validated.
    pub fn catalog_path(&self, name: Option<&str>) -> Result<PathBuf> {
        match name {
            None => Ok(self.internal_path().join("catalog")),
            Some(name) => {
                validate_catalog_name(name)?;
                Ok(self.catalog_base_path().join(name))
            }
        }
    }

    /// Open a catalog within this workspace.
    pub fn open_catalog(&self, name: Option<&str>) -> Result<Catalog> {
        Ok(Catalog::new(self.catalog_path(name)?))
    }

    /// Whether a named catalog exists.
    pub async fn has_catalog(&self, name: &str) -> Result<bool> {
        let path = self.catalog_path(Some(name))?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Create a named catalog directory. Fails if it already exists.
    pub async fn create_catalog(&self, name: &str) -> Result<Catalog> {
        let path = self.catalog_path(Some(name))?;
        if tokio::fs::metadata(&path).await.is_ok() {
            return Err(WorkspaceError::CatalogInvalid {
                name: name.to_string(),
                reason: "catalog already exists".to_string(),
            });
        }
        tokio::fs::create_dir_all(&path).await.context(IoSnafu {
            context: "could not create catalog directory",
            path: path.clone(),
        })?;
        Ok(Catalog::new(path))
    }

    /// Names of catalogs under `catalogs/`, in directory order. Empty when
    /// the directory is absent.
    pub async fn list_catalogs(&self) -> Result<Vec<String>> {
        let base = self.catalog_base_path();
        let mut entries = match tokio::fs::read_dir(&base).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).context(IoSnafu {
                    context: "failed to read catalogs dir",
                    path: base,
                });
            }
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.context(IoSnafu {
            context: "failed to read catalogs dir",
            path: base.clone(),
        })? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Every catalog in this workspace in lookup order: named catalogs first
    /// (directory order), then the unnamed catalog if it exists.
    pub async fn catalogs_in_lookup_order(&self) -> Result<Vec<Catalog>> {
        let mut catalogs = Vec::new();
        for name in self.list_catalogs().await? {
            catalogs.push(self.open_catalog(Some(&name))?);
        }
        let unnamed = self.catalog_path(None)?;
        if tokio::fs::metadata(&unnamed).await.is_ok() {
            catalogs.push(Catalog::new(unnamed));
        }
        Ok(catalogs)
    }

    /// Look up a ware by reference across this workspace's catalogs. First
    /// catalog to answer wins; a miss is `Ok(None)`.
    pub async fn get_catalog_ware(&self, reference: &CatalogRef) -> Result<Option<(WareID, Option<WarehouseAddr>)>> {
        for catalog in self.catalogs_in_lookup_order().await? {
            if let Some(hit) = catalog.get_ware(reference).await? {
                debug!(reference = %reference, catalog = %catalog.path().display(), "catalog hit");
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Look up a release's replay plot across this workspace's catalogs.
    pub async fn get_catalog_replay(&self, reference: &CatalogRef) -> Result<Option<PlotCapsule>> {
        for catalog in self.catalogs_in_lookup_order().await? {
            if let Some(replay) = catalog.get_replay(reference).await? {
                return Ok(Some(replay));
            }
        }
        Ok(None)
    }
}

/// Catalog names are single path segments: letters, digits, `_`, `.`, `-`.
/// Anything path normalization would touch (`.`, `..`, separators) is
/// rejected.
pub fn validate_catalog_name(name: &str) -> Result<()> {
    let well_formed = !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if well_formed {
        Ok(())
    } else {
        Err(WorkspaceError::CatalogInvalid {
            name: name.to_string(),
            reason: "catalog name must match [A-Za-z0-9_.-]+ and not be a dot path".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_requires_magic_dir() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let err = Workspace::open(&home, dir.path()).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NoWorkspace { .. }));

        tokio::fs::create_dir_all(dir.path().join(".warpforge")).await.unwrap();
        let ws = Workspace::open(&home, dir.path()).await.unwrap();
        assert!(!ws.is_root_workspace());
    }

    #[tokio::test]
    async fn test_root_marker_detected() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), true).await.unwrap();
        assert!(ws.is_root_workspace());
        assert!(!ws.is_home_workspace());
    }

    #[tokio::test]
    async fn test_home_workspace_is_always_root() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join(".warpforge")).await.unwrap();
        let ws = Workspace::open(dir.path(), dir.path()).await.unwrap();
        assert!(ws.is_home_workspace());
        assert!(ws.is_root_workspace());
    }

    #[tokio::test]
    async fn test_cache_path_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), false).await.unwrap();

        let path = ws.cache_path(&WareID::new("tar", "abcdefgh")).unwrap();
        let expected = dir.path().join(".warpforge/cache/tar/fileset/abc/def/abcdefgh");
        assert_eq!(path, expected);
    }

    #[tokio::test]
    async fn test_cache_path_rejects_short_hash() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), false).await.unwrap();

        // Boundary: 6 characters rejected, 7 accepted.
        let err = ws.cache_path(&WareID::new("tar", "abcdef")).unwrap_err();
        assert!(matches!(err, WorkspaceError::WareIdInvalid { .. }));
        assert!(ws.cache_path(&WareID::new("tar", "abcdefg")).is_ok());
    }

    #[tokio::test]
    async fn test_has_ware_requires_nonempty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), false).await.unwrap();
        let ware = WareID::new("tar", "abcdefgh");

        assert!(!ws.has_ware(&ware).await.unwrap());
        let cache = ws.cache_path(&ware).unwrap();
        tokio::fs::create_dir_all(&cache).await.unwrap();
        assert!(!ws.has_ware(&ware).await.unwrap());
        tokio::fs::write(cache.join("file"), b"x").await.unwrap();
        assert!(ws.has_ware(&ware).await.unwrap());
    }

    #[test]
    fn test_catalog_name_validation() {
        assert!(validate_catalog_name("a_b.c-d").is_ok());
        assert!(validate_catalog_name("..").is_err());
        assert!(validate_catalog_name(".").is_err());
        assert!(validate_catalog_name("a/b").is_err());
        assert!(validate_catalog_name("").is_err());
    }

    #[tokio::test]
    async fn test_list_catalogs_empty_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), false).await.unwrap();
        assert!(ws.list_catalogs().await.unwrap().is_empty());
    }
}
