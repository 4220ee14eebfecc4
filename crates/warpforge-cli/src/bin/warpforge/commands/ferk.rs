//! `warpforge ferk` - an interactive debug container.
//!
//! Runs a template plot with the current directory overlaid at `/pwd`,
//! network on, and a shell as the action. Flags swap out the rootfs, the
//! command, add a persistent host directory, or replace the template with a
//! plot file.

use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use warpforge_api::Action;
use warpforge_api::FormulaExecConfig;
use warpforge_api::Mount;
use warpforge_api::MountMode;
use warpforge_api::PlotCapsule;
use warpforge_api::PlotExecConfig;
use warpforge_api::PlotInput;
use warpforge_api::SandboxPort;
use warpforge_api::Step;
use warpforge_api::codec;

use crate::context::CliContext;
use crate::files;

/// The name of the single step in the template plot.
const FERK_STEP: &str = "ferk";

const FERK_PLOT_TEMPLATE: &str = r#"{
    "plot.v1": {
        "inputs": {
            "rootfs": "catalog:warpsys.org/bootstrap-rootfs:bullseye-1646092800:amd64"
        },
        "steps": {
            "ferk": {
                "protoformula": {
                    "inputs": {
                        "/": "pipe::rootfs",
                        "/pwd": "mount:overlay:."
                    },
                    "action": {
                        "script": {
                            "interpreter": "/bin/bash",
                            "contents": [
                                "echo 'APT::Sandbox::User \"root\";' > /etc/apt/apt.conf.d/01ferk",
                                "echo 'Dir::Log::Terminal \"\";' >> /etc/apt/apt.conf.d/01ferk",
                                "/bin/bash"
                            ],
                            "network": true
                        }
                    },
                    "outputs": {}
                }
            }
        },
        "outputs": {}
    }
}"#;

pub async fn run(
    context: &CliContext,
    rootfs: Option<&str>,
    cmd: Option<&str>,
    persist: bool,
    plot_file: Option<&Path>,
) -> Result<()> {
    let wss = context.workspace_stack().await?;

    let mut plot = match plot_file {
        Some(path) => files::plot_from_file(path).await?,
        None => {
            let PlotCapsule::V1(plot) =
                codec::decode(FERK_PLOT_TEMPLATE.as_bytes()).context("error parsing template plot")?;
            plot
        }
    };

    if let Some(rootfs) = rootfs {
        let input: PlotInput = rootfs.parse().context("error parsing rootfs input")?;
        plot.inputs.insert("rootfs".to_string(), input);
    }

    let step = plot.steps.get_mut(FERK_STEP);
    if let Some(Step::Protoformula(pf)) = step {
        if let Some(cmd) = cmd {
            pf.action = Action::Exec {
                command: cmd.split(' ').map(str::to_string).collect(),
                network: Some(true),
            };
        }
        if persist {
            tokio::fs::create_dir_all(context.cwd.join("wf-persist"))
                .await
                .context("failed to create persist directory")?;
            pf.inputs.insert(
                SandboxPort::Path("/persist".to_string()),
                PlotInput::Mount(Mount {
                    mode: MountMode::Rw,
                    host_path: "./wf-persist".to_string(),
                }),
            );
        }
    }

    let plot_cfg = PlotExecConfig {
        recursive: false,
        formula_exec_config: FormulaExecConfig {
            interactive: true,
            // An interactive shell is never a reproducible build.
            disable_memoization: true,
            timeout: None,
        },
    };
    warpforge_plot::execute_plot(&context.exec, &wss, &plot, &plot_cfg, &context.cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ferk_template_parses_strictly() {
        let capsule: PlotCapsule = codec::decode(FERK_PLOT_TEMPLATE.as_bytes()).unwrap();
        let PlotCapsule::V1(plot) = capsule;
        let Some(Step::Protoformula(pf)) = plot.steps.get(FERK_STEP) else {
            panic!("template must have a ferk protoformula step");
        };
        assert!(pf.action.wants_network());
        assert!(pf.inputs.contains_key(&SandboxPort::Path("/pwd".to_string())));
    }
}
