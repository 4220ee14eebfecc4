//! `warpforge generate-html` - a static, browsable rendering of a catalog.

use std::path::Path;

use anyhow::Result;
use warpforge_api::CatalogRef;
use warpforge_workspace::Catalog;

use crate::context::CliContext;

pub async fn run(context: &CliContext, catalog_name: &str, output: Option<&Path>) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let root = wss.root();
    if !root.has_catalog(catalog_name).await? {
        anyhow::bail!("catalog {catalog_name:?} not found");
    }
    let catalog = root.open_catalog(Some(catalog_name))?;

    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => catalog.path().join("_html"),
    };
    let _ = tokio::fs::remove_dir_all(&output_path).await;
    tokio::fs::create_dir_all(&output_path).await?;

    let modules = catalog.list_modules().await?;
    let mut index = String::from("<!doctype html>\n<html><head><title>catalog</title></head><body>\n<h1>Catalog</h1>\n<ul>\n");
    for module_name in &modules {
        let page_name = format!("{}.html", module_name.replace('/', "_"));
        index.push_str(&format!("<li><a href=\"{page_name}\">{}</a></li>\n", escape(module_name)));
        write_module_page(&catalog, module_name, &output_path.join(&page_name)).await?;
    }
    index.push_str("</ul>\n</body></html>\n");
    tokio::fs::write(output_path.join("index.html"), index).await?;

    if !context.quiet {
        println!("published HTML for catalog {catalog_name:?} to {}", output_path.display());
    }
    Ok(())
}

async fn write_module_page(catalog: &Catalog, module_name: &str, path: &Path) -> Result<()> {
    let Some(module) = catalog.get_module(module_name).await? else {
        return Ok(());
    };

    let mut page = format!(
        "<!doctype html>\n<html><head><title>{0}</title></head><body>\n<h1>{0}</h1>\n",
        escape(&module.name)
    );
    for release_name in module.releases.keys() {
        page.push_str(&format!("<h2>{}</h2>\n<ul>\n", escape(release_name)));
        let reference = CatalogRef::new(module.name.clone(), release_name.clone(), "");
        if let Some(release) = catalog.get_release(&reference).await? {
            for (item_name, ware) in &release.items {
                page.push_str(&format!("<li><code>{}</code>: <code>{}</code></li>\n", escape(item_name), escape(&ware.to_string())));
            }
        }
        page.push_str("</ul>\n");
    }
    page.push_str("</body></html>\n");
    tokio::fs::write(path, page).await?;
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
