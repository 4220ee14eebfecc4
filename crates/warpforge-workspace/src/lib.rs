//! Workspace discovery and the layered stores that live inside a workspace.
//!
//! A *workspace* is any directory containing a `.warpforge` subdirectory. A
//! workspace whose `.warpforge/root` marker exists is a *root workspace*; the
//! user's home workspace counts as root unconditionally. Walking from a
//! starting directory up to the first root workspace yields the ordered
//! *workspace set* that all lookups (catalog, memo, ware cache) traverse
//! nearest-first.
//!
//! # Modules
//!
//! - [`fsdetect`] - Finding workspaces on the filesystem
//! - [`workspace`] - One workspace: paths, caches, catalogs it owns
//! - [`set`] - The ordered workspace stack and cross-workspace lookup
//! - [`catalog`] - The on-disk module/release/mirror/replay registry
//! - [`memo`] - The formula-id keyed runrecord cache
//! - [`fsutil`] - Atomic writes and advisory lockfiles
//!
//! # Ownership
//!
//! A [`Workspace`] exclusively owns its on-disk root. Writes go to one
//! explicitly chosen workspace; the stack only ever grants read access
//! outward.

pub mod catalog;
pub mod error;
pub mod fsdetect;
pub mod fsutil;
pub mod memo;
pub mod set;
pub mod workspace;

pub use catalog::Catalog;
pub use error::Result;
pub use error::WorkspaceError;
pub use fsdetect::find_root_workspace;
pub use fsdetect::find_workspace;
pub use fsdetect::find_workspace_stack;
pub use fsutil::Lockfile;
pub use fsutil::write_atomic;
pub use set::WorkspaceSet;
pub use workspace::Workspace;

/// The directory that marks a workspace.
pub const MAGIC_WORKSPACE_DIRNAME: &str = ".warpforge";
/// The file inside `.warpforge` that marks a root workspace.
pub const ROOT_MARKER_FILENAME: &str = "root";
