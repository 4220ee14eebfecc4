//! `warpforge watch` - re-run a plot when its ingest inputs change.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use anyhow::bail;
use tracing::warn;
use warpforge_api::FormulaExecConfig;
use warpforge_api::Ingest;
use warpforge_api::Plot;
use warpforge_api::PlotExecConfig;
use warpforge_api::PlotInput;
use warpforge_api::Step;

use crate::context::CliContext;
use crate::files;
use crate::files::PLOT_FILENAME;

/// How often ingests are polled.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(context: &CliContext, path: Option<&Path>) -> Result<()> {
    let dir = match path {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => context.cwd.join(path),
        None => context.cwd.clone(),
    };
    let plot_path = dir.join(PLOT_FILENAME);
    let plot = files::plot_from_file(&plot_path).await?;

    let ingests = collect_ingests(&plot);
    if ingests.is_empty() {
        bail!("plot has no ingest inputs to watch");
    }

    let wss = context.workspace_stack().await?;
    let plot_cfg = PlotExecConfig {
        recursive: false,
        formula_exec_config: FormulaExecConfig::default(),
    };

    let mut seen: HashMap<String, String> = HashMap::new();
    loop {
        if context.cancel.is_cancelled() {
            return Ok(());
        }

        let mut changed = false;
        for ingest in &ingests {
            match current_commit(&dir, ingest) {
                Ok(commit) => {
                    let key = format!("{}:{}", ingest.host_path, ingest.git_ref);
                    if seen.get(&key) != Some(&commit) {
                        seen.insert(key, commit);
                        changed = true;
                    }
                }
                Err(err) => warn!(host_path = %ingest.host_path, "could not poll ingest: {err}"),
            }
        }

        if changed {
            if !context.quiet {
                println!("ingest changed; running plot");
            }
            // Reload so edits to the plot file itself are picked up too.
            let plot = files::plot_from_file(&plot_path).await?;
            match warpforge_plot::execute_plot(&context.exec, &wss, &plot, &plot_cfg, &context.cancel).await {
                Ok(outputs) => {
                    if !context.quiet {
                        for (name, ware) in &outputs {
                            println!("{name} -> {ware}");
                        }
                    }
                }
                Err(err) => eprintln!("error: {err}"),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = context.cancel.cancelled() => return Ok(()),
        }
    }
}

fn collect_ingests(plot: &Plot) -> Vec<Ingest> {
    let mut ingests = Vec::new();
    for input in plot.inputs.values() {
        if let PlotInput::Ingest(ingest) = input {
            ingests.push(ingest.clone());
        }
    }
    for step in plot.steps.values() {
        if let Step::Protoformula(pf) = step {
            for input in pf.inputs.values() {
                if let PlotInput::Ingest(ingest) = input {
                    ingests.push(ingest.clone());
                }
            }
        }
    }
    ingests
}

fn current_commit(base: &Path, ingest: &Ingest) -> Result<String> {
    let repo_path = if Path::new(&ingest.host_path).is_absolute() {
        Path::new(&ingest.host_path).to_path_buf()
    } else {
        base.join(&ingest.host_path)
    };
    let repo = git2::Repository::open(&repo_path)?;
    let commit = repo.revparse_single(&ingest.git_ref)?.peel_to_commit()?;
    Ok(commit.id().to_string())
}
