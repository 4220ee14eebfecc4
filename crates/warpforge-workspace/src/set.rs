//! The ordered workspace stack.

use warpforge_api::CatalogRef;
use warpforge_api::PlotCapsule;
use warpforge_api::WareID;
use warpforge_api::WarehouseAddr;

use crate::error::Result;
use crate::workspace::Workspace;

/// An ordered list of workspaces: nearest first, a root workspace (or the
/// home workspace) last.
///
/// Lookups traverse from nearest outward and the first hit wins; catalogs
/// are never merged across workspaces. Misses are `Ok(None)`, not errors.
#[derive(Debug, Clone)]
pub struct WorkspaceSet {
    stack: Vec<Workspace>,
}

impl WorkspaceSet {
    /// Build a set from an ordered stack. The stack must be nonempty and end
    /// in a root workspace; [`crate::fsdetect::find_workspace_stack`]
    /// guarantees both.
    pub fn new(stack: Vec<Workspace>) -> WorkspaceSet {
        debug_assert!(!stack.is_empty());
        WorkspaceSet { stack }
    }

    /// The nearest workspace.
    pub fn local(&self) -> &Workspace {
        &self.stack[0]
    }

    /// The root workspace: always the last entry.
    pub fn root(&self) -> &Workspace {
        self.stack.last().expect("workspace set is never empty")
    }

    /// Consume the set, keeping only the root workspace.
    pub fn into_root(mut self) -> Workspace {
        self.stack.pop().expect("workspace set is never empty")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.stack.iter()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Resolve a catalog reference: workspaces nearest-first, and within each
    /// workspace named catalogs before the unnamed one. First hit wins.
    pub async fn get_catalog_ware(
        &self,
        reference: &CatalogRef,
    ) -> Result<Option<(WareID, Option<WarehouseAddr>)>> {
        for ws in &self.stack {
            if let Some(hit) = ws.get_catalog_ware(reference).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// Find a release's replay plot anywhere in the stack.
    pub async fn get_catalog_replay(&self, reference: &CatalogRef) -> Result<Option<PlotCapsule>> {
        for ws in &self.stack {
            if let Some(replay) = ws.get_catalog_replay(reference).await? {
                return Ok(Some(replay));
            }
        }
        Ok(None)
    }

    /// Whether any workspace in the stack has the ware cached.
    pub async fn has_ware(&self, ware: &WareID) -> Result<bool> {
        for ws in &self.stack {
            if ws.has_ware(ware).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The workspace memo writes go to: the innermost workspace that already
    /// has a memo directory, or, absent one, the root workspace.
    pub async fn memo_write_workspace(&self) -> &Workspace {
        for ws in &self.stack {
            if tokio::fs::metadata(ws.memo_base_path()).await.is_ok() {
                return ws;
            }
        }
        self.root()
    }
}
