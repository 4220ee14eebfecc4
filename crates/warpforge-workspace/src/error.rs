//! Error types for workspace, catalog, and memo operations.

use std::path::PathBuf;

use snafu::Snafu;
use warpforge_api::ApiError;
use warpforge_api::ErrorCode;

pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;

/// Failures from the workspace layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WorkspaceError {
    /// The named directory is not a workspace or cannot be opened.
    #[snafu(display("no workspace at {}", path.display()))]
    NoWorkspace {
        /// Directory that was expected to contain `.warpforge`.
        path: PathBuf,
    },

    /// Unexpected I/O while walking directories looking for workspaces.
    #[snafu(display("error searching filesystem at {}: {source}", path.display()))]
    SearchingFilesystem {
        /// Where the walk was when it failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Any other filesystem failure.
    #[snafu(display("{context} ({}): {source}", path.display()))]
    Io {
        /// What was being attempted.
        context: String,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A persisted document failed to decode.
    #[snafu(display("failed to decode {}: {source}", path.display()))]
    Codec {
        /// File that failed to decode.
        path: PathBuf,
        /// Parse or schema failure from the codec.
        source: ApiError,
    },

    /// A catalog name or document violates the schema.
    #[snafu(display("invalid catalog {name:?}: {reason}"))]
    CatalogInvalid {
        /// Offending catalog (or module) name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A catalog reference did not resolve anywhere in the stack.
    #[snafu(display("no catalog entry for {reference}"))]
    CatalogMissing {
        /// The unresolved reference.
        reference: String,
    },

    /// An insert would overwrite an existing item and `force` was not given.
    #[snafu(display("catalog item {reference} already exists"))]
    CatalogItemAlreadyExists {
        /// The occupied reference.
        reference: String,
    },

    /// A ware id unusable for deriving cache paths.
    #[snafu(display("invalid ware id {ware:?}: {reason}"))]
    WareIdInvalid {
        /// The offending ware id string.
        ware: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl WorkspaceError {
    /// The taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkspaceError::NoWorkspace { .. } => ErrorCode::Workspace,
            WorkspaceError::SearchingFilesystem { .. } => ErrorCode::SearchingFilesystem,
            WorkspaceError::Io { .. } => ErrorCode::Io,
            WorkspaceError::Codec { source, .. } => source.code(),
            WorkspaceError::CatalogInvalid { .. } => ErrorCode::CatalogInvalid,
            WorkspaceError::CatalogMissing { .. } => ErrorCode::CatalogMissing,
            WorkspaceError::CatalogItemAlreadyExists { .. } => ErrorCode::CatalogItemAlreadyExists,
            WorkspaceError::WareIdInvalid { .. } => ErrorCode::WareIdInvalid,
        }
    }
}
