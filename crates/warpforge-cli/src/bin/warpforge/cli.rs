//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definition with global
//! options shared by every command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

use crate::commands;
use crate::context::CliContext;

/// Putting things together. Consistently.
#[derive(Parser)]
#[command(name = "warpforge")]
#[command(version)]
#[command(about = "Putting things together. Consistently.")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options available to all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Suppress all logging output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Emit results and errors as JSON.
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Write span events as JSON lines to this file.
    #[arg(long = "trace", value_name = "FILE", global = true)]
    pub trace: Option<PathBuf>,

    /// Directory holding the `runc` and `rio` binaries.
    ///
    /// Defaults to the directory the warpforge executable lives in.
    #[arg(long = "bin-path", env = "WARPFORGE_BIN_PATH", global = true)]
    pub bin_path: Option<PathBuf>,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a workspace in the current directory.
    Init {
        /// Mark the new workspace as a root workspace.
        #[arg(long)]
        root: bool,
    },

    /// Generate a basic module and plot.
    Quickstart {
        /// The module name, e.g. `foo.org/group/theproject`.
        module_name: String,
    },

    /// Run a plot (or formula) file.
    Run {
        /// Path to a plot/formula file or a directory containing one.
        path: Option<PathBuf>,
        /// Execute nested plot steps too.
        #[arg(long)]
        recursive: bool,
        /// Skip the memoization cache entirely.
        #[arg(long = "no-memo")]
        no_memo: bool,
        /// Keep run directories around for debugging.
        #[arg(long = "keep-rundir")]
        keep_run_dir: bool,
    },

    /// Parse and validate a plot or formula without executing it.
    Check {
        /// Path to a plot/formula file or a directory containing one.
        path: Option<PathBuf>,
    },

    /// Report the workspace stack and this module's resolvability.
    Status,

    /// Create a named catalog in the root workspace.
    #[command(name = "catalog-init")]
    CatalogInit {
        /// Name of the catalog to create.
        name: String,
    },

    /// Add an item to a catalog in the root workspace.
    Add {
        /// The pack family of the content (`tar` or `git`).
        packtype: String,
        /// The catalog reference, as `module:release:item`.
        reference: String,
        /// Where to fetch the content from.
        url: String,
        /// Git reference (required for `git` packtype).
        git_ref: Option<String>,
        /// Catalog to operate on.
        #[arg(short = 'n', long = "name", default_value = "default")]
        catalog_name: String,
        /// Overwrite an existing item.
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Execute this module's plot and record the results as a release.
    Release {
        /// The release name to publish under.
        release_name: String,
        /// Catalog to operate on.
        #[arg(short = 'n', long = "name", default_value = "default")]
        catalog_name: String,
        /// Overwrite existing items.
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// List catalogs in the root workspace.
    Ls,

    /// Show the contents of a module in the root workspace catalog.
    Show {
        /// The module to show.
        module: String,
        /// Catalog to operate on.
        #[arg(short = 'n', long = "name", default_value = "default")]
        catalog_name: String,
    },

    /// Copy this plot's catalog dependencies into the local workspace.
    Bundle {
        /// Overwrite existing items.
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Install and refresh remote catalogs in the root workspace.
    Update,

    /// Ingest all tags of a git repository as releases of a module.
    #[command(name = "ingest-git-tags")]
    IngestGitTags {
        /// Module to add releases under.
        module: String,
        /// Git repository URL.
        url: String,
        /// Item label each release's ware is stored under.
        item: String,
        /// Catalog to operate on.
        #[arg(short = 'n', long = "name", default_value = "default")]
        catalog_name: String,
        /// Overwrite existing items.
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Generate a browsable HTML rendering of a catalog.
    #[command(name = "generate-html")]
    GenerateHtml {
        /// Catalog to render.
        #[arg(short = 'n', long = "name", default_value = "default")]
        catalog_name: String,
        /// Output directory (defaults to `_html` inside the catalog).
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Drop into an interactive debug container.
    Ferk {
        /// Override the rootfs input (any plot input string form).
        #[arg(long)]
        rootfs: Option<String>,
        /// Command to run instead of the template's shell.
        #[arg(long)]
        cmd: Option<String>,
        /// Mount a persistent `./wf-persist` directory at `/persist`.
        #[arg(long)]
        persist: bool,
        /// Use a plot file instead of the built-in template.
        #[arg(long)]
        plot: Option<PathBuf>,
    },

    /// Watch a plot's ingest inputs and re-run on change.
    Watch {
        /// Path to the module directory to watch.
        path: Option<PathBuf>,
    },

    /// Subcommands that inspect or affect a whole workspace.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
}

/// Workspace inspection commands.
#[derive(Subcommand)]
pub enum WorkspaceCommand {
    /// Print the discovered workspace stack.
    Inspect,
}

impl Cli {
    pub async fn run(self, context: &CliContext) -> Result<()> {
        match self.command {
            Commands::Init { root } => commands::init::run(context, root).await,
            Commands::Quickstart { module_name } => commands::quickstart::run(context, &module_name).await,
            Commands::Run {
                path,
                recursive,
                no_memo,
                keep_run_dir,
            } => commands::run::run(context, path.as_deref(), recursive, no_memo, keep_run_dir).await,
            Commands::Check { path } => commands::check::run(context, path.as_deref()).await,
            Commands::Status => commands::status::run(context).await,
            Commands::CatalogInit { name } => commands::catalog::init(context, &name).await,
            Commands::Add {
                packtype,
                reference,
                url,
                git_ref,
                catalog_name,
                force,
            } => commands::catalog::add(context, &packtype, &reference, &url, git_ref.as_deref(), &catalog_name, force).await,
            Commands::Release {
                release_name,
                catalog_name,
                force,
            } => commands::catalog::release(context, &release_name, &catalog_name, force).await,
            Commands::Ls => commands::catalog::ls(context).await,
            Commands::Show { module, catalog_name } => commands::catalog::show(context, &module, &catalog_name).await,
            Commands::Bundle { force } => commands::catalog::bundle(context, force).await,
            Commands::Update => commands::catalog::update(context).await,
            Commands::IngestGitTags {
                module,
                url,
                item,
                catalog_name,
                force,
            } => commands::catalog::ingest_git_tags(context, &module, &url, &item, &catalog_name, force).await,
            Commands::GenerateHtml { catalog_name, output } => {
                commands::html::run(context, &catalog_name, output.as_deref()).await
            }
            Commands::Ferk {
                rootfs,
                cmd,
                persist,
                plot,
            } => commands::ferk::run(context, rootfs.as_deref(), cmd.as_deref(), persist, plot.as_deref()).await,
            Commands::Watch { path } => commands::watch::run(context, path.as_deref()).await,
            Commands::Workspace(WorkspaceCommand::Inspect) => commands::workspace::inspect(context).await,
        }
    }
}
