//! Pure pipe-graph validation and ordering.
//!
//! These functions validate a plot's dataflow edges and compute a
//! deterministic execution order without side effects: Kahn's algorithm with
//! step insertion order as the tie-break, so a sequential run is reproducible
//! and any valid concurrent schedule must agree with it.

use warpforge_api::Pipe;
use warpforge_api::Plot;
use warpforge_api::PlotInput;
use warpforge_api::Step;

use crate::error::PlotCyclicSnafu;
use crate::error::PlotInvalidSnafu;
use crate::error::Result;

/// The pipe edges into one step: which earlier steps it consumes.
pub fn step_dependencies(plot: &Plot) -> Result<Vec<(String, Vec<String>)>> {
    let mut deps = Vec::with_capacity(plot.steps.len());
    for (step_name, step) in &plot.steps {
        let mut step_deps = Vec::new();
        if let Step::Protoformula(pf) = step {
            for input in pf.inputs.values() {
                if let PlotInput::Pipe(pipe) = input {
                    validate_pipe(plot, step_name, pipe)?;
                    if !pipe.step_name.is_empty() && !step_deps.contains(&pipe.step_name) {
                        step_deps.push(pipe.step_name.clone());
                    }
                }
            }
        }
        deps.push((step_name.clone(), step_deps));
    }
    Ok(deps)
}

/// Check that a pipe points at something that exists: the plot's own inputs
/// (empty step name) or a named step's declared output.
fn validate_pipe(plot: &Plot, consumer: &str, pipe: &Pipe) -> Result<()> {
    if pipe.step_name.is_empty() {
        if !plot.inputs.contains_key(&pipe.output_name) {
            return PlotInvalidSnafu {
                reason: format!("step {consumer} pipes from plot input {:?}, which does not exist", pipe.output_name),
            }
            .fail();
        }
        return Ok(());
    }

    let Some(producer) = plot.steps.get(&pipe.step_name) else {
        return PlotInvalidSnafu {
            reason: format!("step {consumer} pipes from unknown step {:?}", pipe.step_name),
        }
        .fail();
    };

    let has_output = match producer {
        Step::Protoformula(pf) => pf.outputs.contains_key(&pipe.output_name),
        Step::Plot(sub) => sub.outputs.contains_key(&pipe.output_name),
    };
    if !has_output {
        return PlotInvalidSnafu {
            reason: format!(
                "step {consumer} pipes from {}:{}, but that step has no such output",
                pipe.step_name, pipe.output_name
            ),
        }
        .fail();
    }
    Ok(())
}

/// Validate the plot's own output pipes.
pub fn validate_plot_outputs(plot: &Plot) -> Result<()> {
    for (output_name, pipe) in &plot.outputs {
        validate_pipe(plot, &format!("(plot output {output_name})"), pipe)?;
    }
    Ok(())
}

/// Compute the execution order: every producer before its consumers, ties
/// broken by step insertion order. Rejects cycles, naming the steps left
/// stranded.
pub fn topological_order(deps: &[(String, Vec<String>)]) -> Result<Vec<String>> {
    let index_of = |name: &str| deps.iter().position(|(step, _)| step.as_str() == name);

    let mut in_degree: Vec<usize> = deps.iter().map(|(_, step_deps)| step_deps.len()).collect();
    let mut done = vec![false; deps.len()];
    let mut order = Vec::with_capacity(deps.len());

    loop {
        // The lowest-index ready step keeps the schedule deterministic.
        let Some(next) = (0..deps.len()).find(|&i| !done[i] && in_degree[i] == 0) else {
            break;
        };
        done[next] = true;
        order.push(deps[next].0.clone());

        for (i, (_, step_deps)) in deps.iter().enumerate() {
            if !done[i] && step_deps.iter().any(|dep| index_of(dep) == Some(next)) {
                in_degree[i] -= 1;
            }
        }
    }

    if order.len() != deps.len() {
        let cycle: Vec<String> = deps
            .iter()
            .enumerate()
            .filter(|(i, _)| !done[*i])
            .map(|(_, (step, _))| step.clone())
            .collect();
        return PlotCyclicSnafu { cycle }.fail();
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use warpforge_api::decode;

    use super::*;

    fn plot(json: &str) -> Plot {
        let warpforge_api::PlotCapsule::V1(plot) = decode(json.as_bytes()).unwrap();
        plot
    }

    fn deps_of(entries: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        entries
            .iter()
            .map(|(step, deps)| (step.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_linear_order() {
        let deps = deps_of(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        assert_eq!(topological_order(&deps).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insertion_order_tie_break() {
        // Both y and x are immediately ready; declaration order wins.
        let deps = deps_of(&[("y", &[]), ("x", &[]), ("z", &["x", "y"])]);
        assert_eq!(topological_order(&deps).unwrap(), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let deps = deps_of(&[("a", &["b"]), ("b", &["a"])]);
        let err = topological_order(&deps).unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PlotCyclic);
        assert!(err.to_string().contains("a"));
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let deps = deps_of(&[("a", &["a"])]);
        assert_eq!(topological_order(&deps).unwrap_err().code(), warpforge_api::ErrorCode::PlotCyclic);
    }

    #[test]
    fn test_empty_plot_orders_empty() {
        assert!(topological_order(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_step_dependencies_from_pipes() {
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{"rootfs":"ware:tar:abcd123"},
                "steps":{
                    "build":{"protoformula":{"inputs":{"/":"pipe::rootfs"},"action":{"echo":{}},"outputs":{"out":{"from":"/out","packtype":"tar"}}}},
                    "test":{"protoformula":{"inputs":{"/":"pipe::rootfs","/built":"pipe:build:out"},"action":{"echo":{}},"outputs":{}}}
                },
                "outputs":{}
            }}"#,
        );
        let deps = step_dependencies(&p).unwrap();
        assert_eq!(deps, deps_of(&[("build", &[]), ("test", &["build"])]));
    }

    #[test]
    fn test_pipe_to_unknown_step_rejected() {
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{},
                "steps":{"a":{"protoformula":{"inputs":{"/":"pipe:ghost:out"},"action":{"echo":{}},"outputs":{}}}},
                "outputs":{}
            }}"#,
        );
        let err = step_dependencies(&p).unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PlotInvalid);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_pipe_to_unknown_output_rejected() {
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{},
                "steps":{
                    "a":{"protoformula":{"inputs":{},"action":{"echo":{}},"outputs":{}}},
                    "b":{"protoformula":{"inputs":{"/":"pipe:a:missing"},"action":{"echo":{}},"outputs":{}}}
                },
                "outputs":{}
            }}"#,
        );
        assert_eq!(step_dependencies(&p).unwrap_err().code(), warpforge_api::ErrorCode::PlotInvalid);
    }

    #[test]
    fn test_pipe_to_missing_plot_input_rejected() {
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{},
                "steps":{"a":{"protoformula":{"inputs":{"/":"pipe::rootfs"},"action":{"echo":{}},"outputs":{}}}},
                "outputs":{}
            }}"#,
        );
        assert_eq!(step_dependencies(&p).unwrap_err().code(), warpforge_api::ErrorCode::PlotInvalid);
    }

    #[test]
    fn test_plot_output_validation() {
        let p = plot(
            r#"{"plot.v1":{
                "inputs":{},
                "steps":{"a":{"protoformula":{"inputs":{},"action":{"echo":{}},"outputs":{"out":{"from":"/out","packtype":"tar"}}}}},
                "outputs":{"result":"pipe:a:out","broken":"pipe:a:nope"}
            }}"#,
        );
        let err = validate_plot_outputs(&p).unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PlotInvalid);
        assert!(err.to_string().contains("nope"));
    }
}
