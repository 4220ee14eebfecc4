//! `warpforge quickstart` - scaffold a module and a hello-world plot.

use anyhow::Result;
use anyhow::bail;
use warpforge_api::Module;
use warpforge_api::ModuleCapsule;
use warpforge_api::PlotCapsule;
use warpforge_api::codec;

use crate::context::CliContext;
use crate::files::MODULE_FILENAME;
use crate::files::PLOT_FILENAME;

const DEFAULT_PLOT: &str = r#"{
    "plot.v1": {
        "inputs": {
            "rootfs": "catalog:min.warpforge.io/alpinelinux/rootfs:v3.15.4:amd64"
        },
        "steps": {
            "hello-world": {
                "protoformula": {
                    "inputs": {
                        "/": "pipe::rootfs"
                    },
                    "action": {
                        "script": {
                            "interpreter": "/bin/sh",
                            "contents": [
                                "mkdir /output",
                                "echo 'hello world' | tee /output/file"
                            ],
                            "network": false
                        }
                    },
                    "outputs": {
                        "out": {
                            "from": "/output",
                            "packtype": "tar"
                        }
                    }
                }
            }
        },
        "outputs": {
            "output": "pipe:hello-world:out"
        }
    }
}"#;

pub async fn run(context: &CliContext, module_name: &str) -> Result<()> {
    let module_path = context.cwd.join(MODULE_FILENAME);
    let plot_path = context.cwd.join(PLOT_FILENAME);
    if tokio::fs::metadata(&module_path).await.is_ok() {
        bail!("{MODULE_FILENAME} file already exists");
    }
    if tokio::fs::metadata(&plot_path).await.is_ok() {
        bail!("{PLOT_FILENAME} file already exists");
    }

    let module = ModuleCapsule::V1(Module {
        name: module_name.to_string(),
    });
    tokio::fs::write(&module_path, codec::encode(&module)?).await?;

    // The template goes through decode → encode so the file on disk is in
    // canonical form.
    let plot: PlotCapsule = codec::decode(DEFAULT_PLOT.as_bytes())?;
    tokio::fs::write(&plot_path, codec::encode(&plot)?).await?;

    if !context.quiet {
        println!("Successfully created {MODULE_FILENAME} and {PLOT_FILENAME} for module {module_name:?}.");
        println!("Ensure your catalogs are up to date by running `warpforge update`.");
        println!("You can check the status of this module with `warpforge status`.");
        println!("You can run this module with `warpforge run`.");
        println!("Once you've run the Hello World example, edit the 'script' section of {PLOT_FILENAME} to customize what happens.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plot_template_is_canonical_json() {
        let plot: PlotCapsule = codec::decode(DEFAULT_PLOT.as_bytes()).unwrap();
        let PlotCapsule::V1(ref inner) = plot;
        assert!(inner.steps.contains_key("hello-world"));
        // Encoding the decoded template must be stable.
        let once = codec::encode(&plot).unwrap();
        let again: PlotCapsule = codec::decode(&once).unwrap();
        assert_eq!(codec::encode(&again).unwrap(), once);
    }
}
