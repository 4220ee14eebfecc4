//! Loading the files warpforge recognizes by name: `module.wf`, `plot.wf`,
//! and `formula.wf`.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use warpforge_api::FormulaAndContext;
use warpforge_api::Module;
use warpforge_api::ModuleCapsule;
use warpforge_api::Plot;
use warpforge_api::PlotCapsule;
use warpforge_api::codec;

pub const MODULE_FILENAME: &str = "module.wf";
pub const PLOT_FILENAME: &str = "plot.wf";
pub const FORMULA_FILENAME: &str = "formula.wf";

/// What a `run`/`check` target turned out to be.
pub enum Loaded {
    Plot(Plot),
    Formula(FormulaAndContext),
}

pub async fn module_from_file(path: &Path) -> Result<Module> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("could not read {}", path.display()))?;
    let ModuleCapsule::V1(module) =
        codec::decode(&bytes).with_context(|| format!("could not decode {}", path.display()))?;
    Ok(module)
}

pub async fn plot_from_file(path: &Path) -> Result<Plot> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("could not read {}", path.display()))?;
    let PlotCapsule::V1(plot) =
        codec::decode(&bytes).with_context(|| format!("could not decode {}", path.display()))?;
    Ok(plot)
}

pub async fn formula_from_file(path: &Path) -> Result<FormulaAndContext> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("could not read {}", path.display()))?;
    codec::decode(&bytes).with_context(|| format!("could not decode {}", path.display()))
}

/// Figure out what to run at `path` (default: the current directory).
///
/// A directory is searched for `plot.wf` then `formula.wf`; a file is
/// dispatched on its name.
pub async fn load_target(cwd: &Path, path: Option<&Path>) -> Result<Loaded> {
    let target: PathBuf = match path {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cwd.join(path),
        None => cwd.to_path_buf(),
    };

    let meta = tokio::fs::metadata(&target)
        .await
        .with_context(|| format!("no such file or directory: {}", target.display()))?;

    if meta.is_dir() {
        let plot_path = target.join(PLOT_FILENAME);
        if tokio::fs::metadata(&plot_path).await.is_ok() {
            return Ok(Loaded::Plot(plot_from_file(&plot_path).await?));
        }
        let formula_path = target.join(FORMULA_FILENAME);
        if tokio::fs::metadata(&formula_path).await.is_ok() {
            return Ok(Loaded::Formula(formula_from_file(&formula_path).await?));
        }
        bail!("no {PLOT_FILENAME} or {FORMULA_FILENAME} in {}", target.display());
    }

    match target.file_name().and_then(|n| n.to_str()) {
        Some(PLOT_FILENAME) => Ok(Loaded::Plot(plot_from_file(&target).await?)),
        Some(FORMULA_FILENAME) => Ok(Loaded::Formula(formula_from_file(&target).await?)),
        _ => bail!(
            "unrecognized file name {} (expected {PLOT_FILENAME} or {FORMULA_FILENAME})",
            target.display()
        ),
    }
}
