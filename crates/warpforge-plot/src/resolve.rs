//! Binding symbolic plot inputs to concrete formula inputs.
//!
//! Catalog references resolve through the workspace stack (first catalog to
//! answer wins); ingests read the named ref out of a host git repository at
//! resolution time. Both remember enough for later stages: the warehouse
//! address for fetching, and the impurity of having ingested at all.

use std::path::Path;

use snafu::ResultExt;
use tracing::debug;
use warpforge_api::CatalogRef;
use warpforge_api::FormulaInput;
use warpforge_api::Ingest;
use warpforge_api::Plot;
use warpforge_api::PlotInput;
use warpforge_api::Step;
use warpforge_api::WareID;
use warpforge_api::WarehouseAddr;
use warpforge_workspace::WorkspaceSet;
use warpforge_workspace::error::CatalogMissingSnafu;

use crate::error::IngestFailedSnafu;
use crate::error::PlotInvalidSnafu;
use crate::error::Result;

/// A plot input bound to something executable.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub input: FormulaInput,
    /// Where the ware can be fetched, when the catalog knew a mirror.
    pub addr: Option<WarehouseAddr>,
    /// Ingests taint the consuming formula: its result must not be memoized.
    pub ingested: bool,
}

impl ResolvedInput {
    fn plain(input: FormulaInput) -> ResolvedInput {
        ResolvedInput {
            input,
            addr: None,
            ingested: false,
        }
    }
}

/// Resolve one non-pipe plot input. Pipes are wired during lowering instead.
pub async fn resolve_input(
    wss: &WorkspaceSet,
    working_directory: &Path,
    input: &PlotInput,
) -> Result<ResolvedInput> {
    match input {
        PlotInput::CatalogRef(reference) => {
            let (ware, addr) = resolve_catalog_ref(wss, reference).await?;
            Ok(ResolvedInput {
                input: FormulaInput::Ware(ware),
                addr,
                ingested: false,
            })
        }
        PlotInput::Ware(ware) => Ok(ResolvedInput::plain(FormulaInput::Ware(ware.clone()))),
        PlotInput::Mount(mount) => Ok(ResolvedInput::plain(FormulaInput::Mount(mount.clone()))),
        PlotInput::Literal(value) => Ok(ResolvedInput::plain(FormulaInput::Literal(value.clone()))),
        PlotInput::Ingest(ingest) => {
            let (ware, addr) = resolve_git_ingest(working_directory, ingest)?;
            Ok(ResolvedInput {
                input: FormulaInput::Ware(ware),
                addr: Some(addr),
                ingested: true,
            })
        }
        PlotInput::Pipe(pipe) => PlotInvalidSnafu {
            reason: format!("pipe {pipe} cannot be resolved outside a step"),
        }
        .fail(),
    }
}

/// Resolve a catalog reference through the stack. Empty release or item names
/// are malformed; a miss after every source is `catalog-missing`.
pub async fn resolve_catalog_ref(
    wss: &WorkspaceSet,
    reference: &CatalogRef,
) -> Result<(WareID, Option<WarehouseAddr>)> {
    if reference.release_name.is_empty() || reference.item_name.is_empty() {
        return PlotInvalidSnafu {
            reason: format!("catalog reference {reference} must name a release and an item"),
        }
        .fail();
    }
    match wss.get_catalog_ware(reference).await? {
        Some((ware, addr)) => {
            debug!(reference = %reference, ware = %ware, "resolved catalog reference");
            Ok((ware, addr))
        }
        None => Err(CatalogMissingSnafu {
            reference: reference.to_string(),
        }
        .build()
        .into()),
    }
}

/// Read a ref from a host git repository, yielding a `git` ware pinned to the
/// commit it points at right now. The repository path doubles as the
/// warehouse address.
fn resolve_git_ingest(working_directory: &Path, ingest: &Ingest) -> Result<(WareID, WarehouseAddr)> {
    let repo_path = if Path::new(&ingest.host_path).is_absolute() {
        Path::new(&ingest.host_path).to_path_buf()
    } else {
        working_directory.join(&ingest.host_path)
    };

    let context = || IngestFailedSnafu {
        host_path: ingest.host_path.clone(),
        git_ref: ingest.git_ref.clone(),
    };
    let repo = git2::Repository::open(&repo_path).context(context())?;
    let object = repo.revparse_single(&ingest.git_ref).context(context())?;
    let commit = object.peel_to_commit().context(context())?;

    let ware = WareID::new("git", commit.id().to_string());
    let addr = WarehouseAddr(repo_path.to_string_lossy().into_owned());
    Ok((ware, addr))
}

/// Every catalog reference reachable from a plot, nested plots included,
/// deduplicated in first-seen order. Used by `catalog bundle`.
pub fn gather_catalog_refs(plot: &Plot) -> Vec<CatalogRef> {
    let mut refs: Vec<CatalogRef> = Vec::new();
    collect_refs(plot, &mut refs);
    refs
}

fn collect_refs(plot: &Plot, refs: &mut Vec<CatalogRef>) {
    for input in plot.inputs.values() {
        if let PlotInput::CatalogRef(reference) = input
            && !refs.contains(reference)
        {
            refs.push(reference.clone());
        }
    }
    for step in plot.steps.values() {
        match step {
            Step::Protoformula(pf) => {
                for input in pf.inputs.values() {
                    if let PlotInput::CatalogRef(reference) = input
                        && !refs.contains(reference)
                    {
                        refs.push(reference.clone());
                    }
                }
            }
            Step::Plot(sub) => collect_refs(sub, refs),
        }
    }
}
