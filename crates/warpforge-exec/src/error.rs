//! Error types for formula execution.

use std::path::PathBuf;

use snafu::Snafu;
use warpforge_api::ApiError;
use warpforge_api::ErrorCode;
use warpforge_api::RunRecord;
use warpforge_workspace::WorkspaceError;

pub type Result<T, E = ExecError> = std::result::Result<T, E>;

/// Failures from staging, running, or gathering a formula.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExecError {
    /// The formula itself is unusable: no rootfs input, overlapping mounts,
    /// a packtype on a variable output, and similar.
    #[snafu(display("invalid formula: {reason}"))]
    FormulaInvalid {
        /// What is wrong with the formula.
        reason: String,
    },

    /// The action ran and exited nonzero. Carries the runrecord so callers
    /// can inspect exit code and any outputs gathered before the failure.
    #[snafu(display("formula execution failed with exit code {}", record.exitcode))]
    FormulaExecFailed {
        /// The record of the failed run.
        record: Box<RunRecord>,
    },

    /// The external packer reported an error.
    #[snafu(display("packer {operation} failed (exit {exitcode}): {stderr}"))]
    PackerFailed {
        /// Which packer operation was running (scan, pack, unpack).
        operation: String,
        /// The packer's exit code, or -1 when it died to a signal.
        exitcode: i32,
        /// The packer's diagnostics.
        stderr: String,
    },

    /// Execution was cancelled by the user or a parent.
    #[snafu(display("execution cancelled"))]
    Cancelled,

    /// The sandbox exceeded its wall-clock budget.
    #[snafu(display("formula timed out after {seconds}s"))]
    Timeout {
        /// The configured budget in seconds.
        seconds: u64,
    },

    /// Filesystem trouble while staging or gathering.
    #[snafu(display("{context} ({}): {source}", path.display()))]
    Io {
        /// What was being attempted.
        context: String,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Codec failure while hashing or recording.
    #[snafu(display("codec failure: {source}"))]
    Codec {
        /// Parse or schema failure from the codec.
        source: ApiError,
    },

    /// A workspace-layer failure (cache paths, memos, locks).
    #[snafu(display("{source}"), context(false))]
    Workspace {
        /// The underlying workspace error.
        source: WorkspaceError,
    },
}

impl ExecError {
    /// The taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecError::FormulaInvalid { .. } => ErrorCode::FormulaInvalid,
            ExecError::FormulaExecFailed { .. } | ExecError::Timeout { .. } => ErrorCode::FormulaExecFailed,
            ExecError::PackerFailed { .. } => ErrorCode::PackerFailed,
            ExecError::Cancelled => ErrorCode::Cancelled,
            ExecError::Io { .. } => ErrorCode::Io,
            ExecError::Codec { source } => source.code(),
            ExecError::Workspace { source } => source.code(),
        }
    }
}
