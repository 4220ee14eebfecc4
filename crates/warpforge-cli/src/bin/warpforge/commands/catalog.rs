//! Catalog commands: add, release, ls, show, bundle, update,
//! ingest-git-tags.
//!
//! Mutations address the root workspace's catalogs; `bundle` is the
//! exception, copying entries into the local workspace so a module can travel
//! with its dependencies.

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use warpforge_api::CatalogRef;
use warpforge_api::ErrorCode;
use warpforge_api::Packtype;
use warpforge_api::PlotCapsule;
use warpforge_api::PlotExecConfig;
use warpforge_api::WareID;
use warpforge_api::WarehouseAddr;
use warpforge_exec::Rio;
use warpforge_plot::gather_catalog_refs;
use warpforge_workspace::Catalog;
use warpforge_workspace::Workspace;
use warpforge_workspace::WorkspaceError;

use crate::context::CliContext;
use crate::files;
use crate::files::MODULE_FILENAME;
use crate::files::PLOT_FILENAME;
use crate::gitops;

const DEFAULT_CATALOG_URL: &str = "https://github.com/warpsys/catalog.git";
const DEFAULT_CATALOG_NAME: &str = "warpsys";

/// `warpforge catalog-init <name>`.
pub async fn init(context: &CliContext, name: &str) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let catalog = wss.root().create_catalog(name).await?;
    if !context.quiet {
        println!("created catalog at {}", catalog.path().display());
    }
    Ok(())
}

/// Open (creating if needed) a named catalog on the root workspace.
async fn open_or_create(root: &Workspace, name: &str) -> Result<Catalog> {
    if !root.has_catalog(name).await? {
        root.create_catalog(name).await?;
    }
    Ok(root.open_catalog(Some(name))?)
}

/// `warpforge add <packtype> <ref> <url> [gitref]`.
pub async fn add(
    context: &CliContext,
    packtype: &str,
    reference: &str,
    url: &str,
    git_ref: Option<&str>,
    catalog_name: &str,
    force: bool,
) -> Result<()> {
    let reference: CatalogRef = reference.parse()?;
    let wss = context.workspace_stack().await?;
    let catalog = open_or_create(wss.root(), catalog_name).await?;
    let addr = WarehouseAddr::from(url);

    match packtype {
        "tar" => {
            // The packer hashes the remote content; the address only ever
            // lands in the mirror index, never in identity.
            let rio = Rio::new(&context.exec.bin_path);
            let ware = rio.scan(packtype, &addr).await.with_context(|| format!("scanning {url:?} failed"))?;
            catalog.add_item(&reference, ware.clone(), force).await?;
            catalog.add_by_ware_mirror(&reference, ware, addr).await?;
        }
        "git" => {
            let Some(git_ref) = git_ref else {
                bail!("no git reference provided");
            };
            let refs = gitops::ls_remote(url).await?;
            let hash = refs
                .iter()
                .find(|(name, _)| short_ref_name(name) == git_ref)
                .map(|(_, hash)| hash.clone())
                .with_context(|| format!("git reference {git_ref:?} not found in repository {url:?}"))?;

            catalog.add_item(&reference, WareID::new("git", hash), force).await?;
            catalog.add_by_module_mirror(&reference, Packtype::from("git"), addr).await?;
        }
        other => bail!("unsupported packtype: {other:?}"),
    }

    if context.verbose {
        println!("added item to catalog {}", catalog.path().display());
    }
    Ok(())
}

fn short_ref_name(full: &str) -> &str {
    full.strip_prefix("refs/heads/")
        .or_else(|| full.strip_prefix("refs/tags/"))
        .unwrap_or(full)
}

/// `warpforge release <name>`: execute this module's plot and record every
/// plot output as an item of the release, with the plot attached as replay.
pub async fn release(context: &CliContext, release_name: &str, catalog_name: &str, force: bool) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let module = files::module_from_file(&context.cwd.join(MODULE_FILENAME)).await?;
    let plot = files::plot_from_file(&context.cwd.join(PLOT_FILENAME)).await?;

    if !context.quiet {
        println!("building replay for module = {:?}, release = {release_name:?}, executing plot...", module.name);
    }
    let results =
        warpforge_plot::execute_plot(&context.exec, &wss, &plot, &PlotExecConfig::default(), &context.cancel).await?;

    let catalog = open_or_create(wss.root(), catalog_name).await?;
    for (item_name, ware) in &results {
        let reference = CatalogRef::new(module.name.clone(), release_name, item_name.clone());
        if !context.quiet {
            println!("{reference} -> {ware}");
        }
        catalog.add_item(&reference, ware.clone(), force).await?;
    }

    let parent = CatalogRef::new(module.name, release_name, "");
    catalog.add_replay(&parent, &PlotCapsule::V1(plot), force).await?;
    Ok(())
}

/// `warpforge ls`.
pub async fn ls(context: &CliContext) -> Result<()> {
    let wss = context.workspace_stack().await?;
    for name in wss.root().list_catalogs().await? {
        println!("{name}");
    }
    Ok(())
}

/// `warpforge show <module>`: render a module's releases and items as a tree.
pub async fn show(context: &CliContext, module_name: &str, catalog_name: &str) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let catalog = wss.root().open_catalog(Some(catalog_name))?;

    let Some(module) = catalog.get_module(module_name).await? else {
        println!("module {module_name:?} not found");
        return Ok(());
    };

    println!("{}", module.name);
    let release_names: Vec<_> = module.releases.keys().cloned().collect();
    for (ri, release_name) in release_names.iter().enumerate() {
        let last_release = ri + 1 == release_names.len();
        let (branch, trunk) = if last_release { ("└─", " ") } else { ("├─", "│") };
        println!(" {branch} {}:{release_name}", module.name);

        let reference = CatalogRef::new(module.name.clone(), release_name.clone(), "");
        let Some(release) = catalog.get_release(&reference).await? else {
            continue;
        };
        let item_names: Vec<_> = release.items.keys().cloned().collect();
        for (ii, item_name) in item_names.iter().enumerate() {
            let leaf = if ii + 1 == item_names.len() { "└─" } else { "├─" };
            if context.verbose {
                let ware = release.items.get(item_name).expect("iterating keys");
                println!(" {trunk}   {leaf} {}:{release_name}:{item_name} ({ware})", module.name);
            } else {
                println!(" {trunk}   {leaf} {}:{release_name}:{item_name}", module.name);
            }
        }
    }
    Ok(())
}

/// `warpforge bundle`: copy every catalog entry this plot references into the
/// current workspace's unnamed catalog.
pub async fn bundle(context: &CliContext, force: bool) -> Result<()> {
    let plot = files::plot_from_file(&context.cwd.join(PLOT_FILENAME)).await?;
    let refs = gather_catalog_refs(&plot);

    // Make sure the local workspace and its unnamed catalog exist before the
    // stack is opened, so `local()` is the directory we are standing in.
    let local_catalog_path = context.cwd.join(".warpforge/catalog");
    tokio::fs::create_dir_all(&local_catalog_path).await?;
    let wss = context.workspace_stack().await?;
    let local = wss.local().open_catalog(None)?;

    for reference in refs {
        let (ware, addr) = warpforge_plot::resolve_catalog_ref(&wss, &reference).await?;
        if !context.quiet {
            println!("bundled {reference:?}");
        }
        match local.add_item(&reference, ware.clone(), force).await {
            Ok(()) => {}
            Err(err) if matches!(err.code(), ErrorCode::CatalogItemAlreadyExists) => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(addr) = addr {
            local.add_by_ware_mirror(&reference, ware, addr).await?;
        }
    }
    Ok(())
}

/// `warpforge update`: install the default remote catalog when missing, then
/// refresh every named catalog that is a git checkout.
pub async fn update(context: &CliContext) -> Result<()> {
    let wss = context.workspace_stack().await?;
    let root = wss.root();
    let base = root.catalog_base_path();
    tokio::fs::create_dir_all(&base).await?;

    let default_path = base.join(DEFAULT_CATALOG_NAME);
    if tokio::fs::metadata(&default_path).await.is_err() {
        if !context.quiet {
            println!("installing default catalog to {}...", default_path.display());
        }
        gitops::clone(DEFAULT_CATALOG_URL, &default_path).await?;
    }

    for name in root.list_catalogs().await? {
        let path = root.catalog_path(Some(&name))?;
        match gitops::pull_fast_forward(&path).await? {
            gitops::PullOutcome::NotARepository => {
                if !context.quiet {
                    println!("{name}: local catalog");
                }
            }
            gitops::PullOutcome::UpToDate => {
                if !context.quiet {
                    println!("{name}: already up to date");
                }
            }
            gitops::PullOutcome::Updated => {
                if !context.quiet {
                    println!("{name}: updated");
                }
            }
        }
    }
    Ok(())
}

/// `warpforge ingest-git-tags <module> <url> <item>`: one release per remote
/// tag, each holding a `git` ware pinned to the tagged commit.
pub async fn ingest_git_tags(
    context: &CliContext,
    module: &str,
    url: &str,
    item: &str,
    catalog_name: &str,
    force: bool,
) -> Result<()> {
    let tags = gitops::ls_remote_tags(url).await?;
    let wss = context.workspace_stack().await?;
    let catalog = open_or_create(wss.root(), catalog_name).await?;

    for (tag, hash) in tags {
        let reference = CatalogRef::new(module, tag.as_str(), item);
        let ware = WareID::new("git", hash);
        match catalog.add_item(&reference, ware.clone(), force).await {
            Ok(()) => {
                if !context.quiet {
                    println!("adding item {reference} \t-> {ware}");
                }
            }
            Err(WorkspaceError::CatalogItemAlreadyExists { .. }) => {
                if !context.quiet {
                    println!("catalog already has item {reference}");
                }
                continue;
            }
            Err(err) => return Err(err).context("failed to add item to catalog"),
        }
        catalog
            .add_by_module_mirror(&reference, Packtype::from("git"), WarehouseAddr::from(url))
            .await?;
    }
    Ok(())
}
