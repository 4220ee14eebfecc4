//! Shared per-invocation state, gathered once in `main` and passed through
//! explicitly.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warpforge_exec::ExecConfig;
use warpforge_workspace::WorkspaceSet;
use warpforge_workspace::find_workspace_stack;

use crate::cli::GlobalOptions;

/// Everything a command needs: the discovered home directory, the working
/// directory, the execution environment, and the cancellation token wired to
/// ctrl-c.
pub struct CliContext {
    pub home: PathBuf,
    pub cwd: PathBuf,
    pub exec: ExecConfig,
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub cancel: CancellationToken,
}

impl CliContext {
    /// Discover the environment once at startup. The home directory and the
    /// packer/runtime bin path are never read from globals after this.
    pub async fn gather(global: &GlobalOptions) -> Result<CliContext> {
        let home = dirs::home_dir().context("could not determine the home directory")?;
        let cwd = std::env::current_dir().context("could not determine the working directory")?;

        let bin_path = match &global.bin_path {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| cwd.clone()),
        };

        let cancel = CancellationToken::new();
        let ctrl_c_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received; cancelling");
                ctrl_c_token.cancel();
            }
        });

        Ok(CliContext {
            home,
            cwd: cwd.clone(),
            exec: ExecConfig {
                bin_path,
                run_path_base: std::env::temp_dir(),
                keep_run_dir: false,
                working_directory: cwd,
            },
            json: global.json,
            quiet: global.quiet,
            verbose: global.verbose,
            cancel,
        })
    }

    /// The workspace stack governing the current directory.
    pub async fn workspace_stack(&self) -> Result<WorkspaceSet> {
        let stack = find_workspace_stack(&self.home, Path::new("/"), &self.cwd).await?;
        Ok(stack)
    }
}
