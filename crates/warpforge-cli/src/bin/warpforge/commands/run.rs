//! `warpforge run` - execute a plot or formula file.

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use warpforge_api::FormulaExecConfig;
use warpforge_api::PlotExecConfig;

use crate::context::CliContext;
use crate::files;
use crate::files::Loaded;
use crate::output;

pub async fn run(
    context: &CliContext,
    path: Option<&Path>,
    recursive: bool,
    no_memo: bool,
    keep_run_dir: bool,
) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let mut exec_cfg = context.exec.clone();
    exec_cfg.keep_run_dir = keep_run_dir;

    let formula_exec_config = FormulaExecConfig {
        interactive: false,
        disable_memoization: no_memo,
        timeout: None,
    };

    match files::load_target(&context.cwd, path).await? {
        Loaded::Plot(plot) => {
            let plot_cfg = PlotExecConfig {
                recursive,
                formula_exec_config,
            };
            let outputs = warpforge_plot::execute_plot(&exec_cfg, &wss, &plot, &plot_cfg, &context.cancel).await?;

            let doc: serde_json::Value = outputs
                .iter()
                .map(|(name, ware)| (name.clone(), json!(ware.to_string())))
                .collect::<serde_json::Map<String, serde_json::Value>>()
                .into();
            output::render_result(&doc, context.json);
        }
        Loaded::Formula(formula_and_context) => {
            let record =
                warpforge_exec::execute(&exec_cfg, &wss, formula_and_context, &formula_exec_config, &context.cancel)
                    .await?;
            let doc = serde_json::to_value(&record)?;
            output::render_result(&doc, context.json);
        }
    }
    Ok(())
}
