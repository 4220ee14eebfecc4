//! Finding workspaces on the filesystem.

use std::path::Path;
use std::path::PathBuf;

use snafu::ResultExt;
use tracing::debug;

use crate::MAGIC_WORKSPACE_DIRNAME;
use crate::error::Result;
use crate::error::SearchingFilesystemSnafu;
use crate::set::WorkspaceSet;
use crate::workspace::Workspace;

/// True when `path/.warpforge` exists and is a directory.
async fn has_magic_dir(path: &Path) -> Result<bool> {
    let magic = path.join(MAGIC_WORKSPACE_DIRNAME);
    match tokio::fs::metadata(&magic).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        // A failure that is not plain absence leaves the search with blind
        // spots; surface it.
        Err(err) => Err(err).context(SearchingFilesystemSnafu { path: magic }),
    }
}

/// Search upward for the nearest workspace.
///
/// The walk starts at `basis.join(search)` and pops one path segment per
/// round, never rising above `basis`. An empty `search` means "start at the
/// basis itself". Returns the workspace and the directory the search should
/// continue from (its parent), or `None` when nothing was found. A miss is
/// not an error.
pub async fn find_workspace(
    home: &Path,
    basis: &Path,
    search: &Path,
) -> Result<Option<(Workspace, Option<PathBuf>)>> {
    let mut candidate = basis.join(search);
    loop {
        if has_magic_dir(&candidate).await? {
            let ws = Workspace::open_unchecked(home, &candidate).await;
            let remaining = if candidate == *basis {
                None
            } else {
                candidate.parent().map(Path::to_path_buf)
            };
            debug!(path = %candidate.display(), "found workspace");
            return Ok(Some((ws, remaining)));
        }
        if candidate == *basis {
            return Ok(None);
        }
        match candidate.parent() {
            Some(parent) => candidate = parent.to_path_buf(),
            None => return Ok(None),
        }
    }
}

/// Find every workspace from `basis.join(search)` upward: nearest first,
/// stopping at (and including) the first root workspace.
///
/// If no root workspace is found before the walk ends, the home workspace is
/// appended (even when no `.warpforge` exists there yet), so the returned
/// stack always ends in a workspace that reports itself root.
pub async fn find_workspace_stack(home: &Path, basis: &Path, search: &Path) -> Result<WorkspaceSet> {
    let mut stack: Vec<Workspace> = Vec::new();
    let mut search_from = Some(search.to_path_buf());

    while let Some(search_path) = search_from {
        match find_workspace(home, basis, &search_path).await? {
            Some((ws, remaining)) => {
                let done = ws.is_root_workspace();
                // The home dir can appear mid-walk; it is a root, so the loop
                // ends there and it is never pushed twice.
                stack.push(ws);
                if done {
                    break;
                }
                search_from = remaining;
            }
            None => break,
        }
    }

    if stack.last().is_none_or(|ws| !ws.is_root_workspace()) {
        stack.push(Workspace::open_unchecked(home, home).await);
    }

    Ok(WorkspaceSet::new(stack))
}

/// Find the root workspace governing `basis.join(search)`: the last entry of
/// the workspace stack.
pub async fn find_root_workspace(home: &Path, basis: &Path, search: &Path) -> Result<Workspace> {
    let stack = find_workspace_stack(home, basis, search).await?;
    Ok(stack.into_root())
}
