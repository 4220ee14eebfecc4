//! `warpforge status` - report the workspace stack and this module's
//! resolvability.

use anyhow::Result;
use serde_json::json;
use warpforge_plot::gather_catalog_refs;
use warpforge_plot::resolve_catalog_ref;

use crate::context::CliContext;
use crate::files;
use crate::files::MODULE_FILENAME;
use crate::files::PLOT_FILENAME;
use crate::output;

pub async fn run(context: &CliContext) -> Result<()> {
    let wss = context.workspace_stack().await?;

    let module_path = context.cwd.join(MODULE_FILENAME);
    let module = if tokio::fs::metadata(&module_path).await.is_ok() {
        Some(files::module_from_file(&module_path).await?)
    } else {
        None
    };

    let plot_path = context.cwd.join(PLOT_FILENAME);
    let mut inputs = Vec::new();
    let mut all_resolved = true;
    let plot_present = tokio::fs::metadata(&plot_path).await.is_ok();
    if plot_present {
        let plot = files::plot_from_file(&plot_path).await?;
        for reference in gather_catalog_refs(&plot) {
            match resolve_catalog_ref(&wss, &reference).await {
                Ok((ware, addr)) => inputs.push(json!({
                    "ref": reference.to_string(),
                    "resolved": ware.to_string(),
                    "warehouse": addr.map(|a| a.to_string()),
                })),
                Err(err) => {
                    all_resolved = false;
                    inputs.push(json!({
                        "ref": reference.to_string(),
                        "error": err.to_string(),
                    }));
                }
            }
        }
    }

    let doc = json!({
        "workspaces": wss.iter().map(|ws| ws.path().to_string_lossy().into_owned()).collect::<Vec<_>>(),
        "module": module.map(|m| m.name),
        "plot": plot_present,
        "inputs": inputs,
        "ok": all_resolved,
    });
    output::render_result(&doc, context.json);
    Ok(())
}
