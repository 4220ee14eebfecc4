//! The plot executor: order steps, lower each to a formula, wire pipes.

use std::collections::HashMap;

use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warpforge_api::Formula;
use warpforge_api::FormulaAndContext;
use warpforge_api::FormulaCapsule;
use warpforge_api::FormulaContext;
use warpforge_api::FormulaContextCapsule;
use warpforge_api::FormulaExecConfig;
use warpforge_api::FormulaInput;
use warpforge_api::OrderedMap;
use warpforge_api::Pipe;
use warpforge_api::Plot;
use warpforge_api::PlotExecConfig;
use warpforge_api::PlotInput;
use warpforge_api::Step;
use warpforge_api::WareID;
use warpforge_exec::ExecConfig;
use warpforge_workspace::WorkspaceSet;

use crate::error::PlotInvalidSnafu;
use crate::error::PlotNotLoweredSnafu;
use crate::error::Result;
use crate::error::StepFailedSnafu;
use crate::order;
use crate::resolve;
use crate::resolve::ResolvedInput;

/// Execute a plot against a workspace stack, returning its wired outputs.
///
/// Steps run sequentially in topological order with declaration order as the
/// tie-break; a consumer only starts once every producer's outputs are in the
/// ware cache. The pipe graph is validated, cycles included, before any
/// sandbox launches.
pub async fn execute_plot(
    cfg: &ExecConfig,
    wss: &WorkspaceSet,
    plot: &Plot,
    plot_cfg: &PlotExecConfig,
    cancel: &CancellationToken,
) -> Result<OrderedMap<String, WareID>> {
    // Structure first: bad pipes and cycles must fail before resolution or
    // execution does any work.
    let deps = order::step_dependencies(plot)?;
    order::validate_plot_outputs(plot)?;
    let step_order = order::topological_order(&deps)?;

    let mut plot_inputs: OrderedMap<String, ResolvedInput> = OrderedMap::new();
    for (label, input) in &plot.inputs {
        let resolved = resolve::resolve_input(wss, &cfg.working_directory, input).await?;
        plot_inputs.insert(label.clone(), resolved);
    }

    let mut step_results: HashMap<String, OrderedMap<String, FormulaInput>> = HashMap::new();

    for step_name in &step_order {
        let step = plot.steps.get(step_name).expect("ordered steps come from the plot");
        info!(step = %step_name, "running step");
        match step {
            Step::Plot(sub) => {
                if !plot_cfg.recursive {
                    return PlotNotLoweredSnafu { step: step_name.clone() }.fail();
                }
                let outputs = Box::pin(execute_plot(cfg, wss, sub, plot_cfg, cancel)).await?;
                let results = outputs
                    .into_iter()
                    .map(|(name, ware)| (name, FormulaInput::Ware(ware)))
                    .collect();
                step_results.insert(step_name.clone(), results);
            }
            Step::Protoformula(pf) => {
                let mut inputs: OrderedMap<warpforge_api::SandboxPort, FormulaInput> = OrderedMap::new();
                let mut warehouses: OrderedMap<WareID, warpforge_api::WarehouseAddr> = OrderedMap::new();
                let mut tainted = false;

                for (port, input) in &pf.inputs {
                    let resolved = match input {
                        PlotInput::Pipe(pipe) => {
                            wire_pipe(step_name, pipe, &plot_inputs, &step_results)?
                        }
                        other => {
                            let resolved = resolve::resolve_input(wss, &cfg.working_directory, other).await?;
                            tainted |= resolved.ingested;
                            if let (FormulaInput::Ware(ware), Some(addr)) = (&resolved.input, &resolved.addr) {
                                warehouses.insert(ware.clone(), addr.clone());
                            }
                            resolved.input
                        }
                    };
                    inputs.insert(port.clone(), resolved);
                }

                let formula = Formula {
                    inputs,
                    action: pf.action.clone(),
                    outputs: pf.outputs.clone(),
                };
                let formula_and_context = FormulaAndContext {
                    formula: FormulaCapsule::V1(formula),
                    context: Some(FormulaContextCapsule::V1(FormulaContext { warehouses })),
                };
                let exec_cfg = FormulaExecConfig {
                    interactive: plot_cfg.formula_exec_config.interactive,
                    // Ingested inputs taint the step: it always re-executes.
                    disable_memoization: plot_cfg.formula_exec_config.disable_memoization || tainted,
                    timeout: plot_cfg.formula_exec_config.timeout,
                };

                let record = warpforge_exec::execute(cfg, wss, formula_and_context, &exec_cfg, cancel)
                    .await
                    .context(StepFailedSnafu { step: step_name.clone() })?;
                step_results.insert(step_name.clone(), record.results);
            }
        }
    }

    let mut outputs: OrderedMap<String, WareID> = OrderedMap::new();
    for (output_name, pipe) in &plot.outputs {
        let value = wire_pipe(&format!("(plot output {output_name})"), pipe, &plot_inputs, &step_results)?;
        match value {
            FormulaInput::Ware(ware) => {
                outputs.insert(output_name.clone(), ware);
            }
            other => {
                return PlotInvalidSnafu {
                    reason: format!("plot output {output_name} is {other}, not a ware"),
                }
                .fail();
            }
        }
    }
    Ok(outputs)
}

/// Follow one pipe to the value it names: a plot-level input (empty step
/// name) or a prior step's output.
fn wire_pipe(
    consumer: &str,
    pipe: &Pipe,
    plot_inputs: &OrderedMap<String, ResolvedInput>,
    step_results: &HashMap<String, OrderedMap<String, FormulaInput>>,
) -> Result<FormulaInput> {
    if pipe.step_name.is_empty() {
        let resolved = plot_inputs.get(&pipe.output_name).ok_or_else(|| {
            PlotInvalidSnafu {
                reason: format!("{consumer} pipes from plot input {:?}, which does not exist", pipe.output_name),
            }
            .build()
        })?;
        return Ok(resolved.input.clone());
    }
    let results = step_results.get(&pipe.step_name).ok_or_else(|| {
        PlotInvalidSnafu {
            reason: format!("{consumer} pipes from step {:?} which has not produced results", pipe.step_name),
        }
        .build()
    })?;
    results
        .get(&pipe.output_name)
        .cloned()
        .ok_or_else(|| {
            PlotInvalidSnafu {
                reason: format!(
                    "{consumer} pipes from {}:{}, but the step produced no such output",
                    pipe.step_name, pipe.output_name
                ),
            }
            .build()
        })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use warpforge_api::decode;

    use super::*;

    fn plot(json: &str) -> Plot {
        let warpforge_api::PlotCapsule::V1(plot) = decode(json.as_bytes()).unwrap();
        plot
    }

    async fn scratch_stack(dir: &tempfile::TempDir) -> WorkspaceSet {
        let home = dir.path().join("home");
        tokio::fs::create_dir_all(home.join(".warpforge")).await.unwrap();
        warpforge_workspace::find_workspace_stack(&home, dir.path(), Path::new("")).await.unwrap()
    }

    fn exec_config(dir: &tempfile::TempDir) -> ExecConfig {
        ExecConfig {
            bin_path: dir.path().join("bin"),
            run_path_base: dir.path().join("runs"),
            keep_run_dir: false,
            working_directory: dir.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_empty_plot_yields_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let wss = scratch_stack(&dir).await;
        let p = plot(r#"{"plot.v1":{"inputs":{},"steps":{},"outputs":{}}}"#);

        let outputs = execute_plot(&exec_config(&dir), &wss, &p, &PlotExecConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_execution() {
        let dir = tempfile::tempdir().unwrap();
        let wss = scratch_stack(&dir).await;
        // The catalog references could never resolve; the cycle must win
        // because ordering runs before resolution.
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{},
                "steps":{
                    "a":{"protoformula":{"inputs":{"/":"pipe:b:x"},"action":{"echo":{}},"outputs":{"y":{"from":"/y","packtype":"tar"}}}},
                    "b":{"protoformula":{"inputs":{"/":"pipe:a:y"},"action":{"echo":{}},"outputs":{"x":{"from":"/x","packtype":"tar"}}}}
                },
                "outputs":{}
            }}"#,
        );

        let err = execute_plot(&exec_config(&dir), &wss, &p, &PlotExecConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PlotCyclic);
    }

    #[tokio::test]
    async fn test_nested_plot_requires_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let wss = scratch_stack(&dir).await;
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{},
                "steps":{"sub":{"plot":{"inputs":{},"steps":{},"outputs":{}}}},
                "outputs":{}
            }}"#,
        );

        let err = execute_plot(&exec_config(&dir), &wss, &p, &PlotExecConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PlotNotLowered);

        let recursive = PlotExecConfig {
            recursive: true,
            ..Default::default()
        };
        let outputs = execute_plot(&exec_config(&dir), &wss, &p, &recursive, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_plot_outputs_wire_from_plot_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let wss = scratch_stack(&dir).await;
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{"rootfs":"ware:tar:abcd123"},
                "steps":{},
                "outputs":{"o":"pipe::rootfs"}
            }}"#,
        );

        let outputs = execute_plot(&exec_config(&dir), &wss, &p, &PlotExecConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*outputs.get("o").unwrap(), WareID::new("tar", "abcd123"));
    }

    #[tokio::test]
    async fn test_unresolvable_catalog_input_is_catalog_missing() {
        let dir = tempfile::tempdir().unwrap();
        let wss = scratch_stack(&dir).await;
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{"rootfs":"catalog:example.com/nope:v1:amd64"},
                "steps":{},
                "outputs":{}
            }}"#,
        );

        let err = execute_plot(&exec_config(&dir), &wss, &p, &PlotExecConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::CatalogMissing);
    }

    #[tokio::test]
    async fn test_literal_plot_output_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let wss = scratch_stack(&dir).await;
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{"greeting":"literal:hello"},
                "steps":{},
                "outputs":{"o":"pipe::greeting"}
            }}"#,
        );

        let err = execute_plot(&exec_config(&dir), &wss, &p, &PlotExecConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PlotInvalid);
    }
}
