//! `warpforge init` - create a workspace in the current directory.

use anyhow::Result;
use warpforge_workspace::Workspace;

use crate::context::CliContext;

pub async fn run(context: &CliContext, root: bool) -> Result<()> {
    let ws = Workspace::create(&context.home, &context.cwd, root).await?;
    if !context.quiet {
        let kind = if ws.is_root_workspace() { "root workspace" } else { "workspace" };
        println!("created {kind} at {}", ws.path().display());
    }
    Ok(())
}
