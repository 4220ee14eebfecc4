//! `warpforge check` - validate a plot or formula without executing it.

use std::path::Path;

use anyhow::Result;
use warpforge_api::FormulaCapsule;

use crate::context::CliContext;
use crate::files;
use crate::files::Loaded;

pub async fn run(context: &CliContext, path: Option<&Path>) -> Result<()> {
    match files::load_target(&context.cwd, path).await? {
        Loaded::Plot(plot) => {
            let deps = warpforge_plot::order::step_dependencies(&plot)?;
            warpforge_plot::order::validate_plot_outputs(&plot)?;
            warpforge_plot::order::topological_order(&deps)?;
        }
        Loaded::Formula(formula_and_context) => {
            let FormulaCapsule::V1(ref formula) = formula_and_context.formula;
            warpforge_exec::validate_formula(formula)?;
        }
    }
    if !context.quiet {
        println!("ok");
    }
    Ok(())
}
