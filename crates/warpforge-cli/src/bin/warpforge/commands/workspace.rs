//! `warpforge workspace inspect` - print the discovered workspace stack.

use anyhow::Result;
use serde_json::json;

use crate::context::CliContext;
use crate::output;

pub async fn inspect(context: &CliContext) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let stack: Vec<_> = wss
        .iter()
        .map(|ws| {
            json!({
                "path": ws.path().to_string_lossy(),
                "root": ws.is_root_workspace(),
                "home": ws.is_home_workspace(),
            })
        })
        .collect();
    output::render_result(&json!({ "workspaces": stack }), context.json);
    Ok(())
}
