//! Error types for plot resolution and execution.

use snafu::Snafu;
use warpforge_api::ErrorCode;
use warpforge_exec::ExecError;
use warpforge_workspace::WorkspaceError;

pub type Result<T, E = PlotError> = std::result::Result<T, E>;

/// Failures from resolving, ordering, or executing a plot.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PlotError {
    /// The plot is structurally unusable: a pipe names an unknown step or
    /// output, a plot input is itself a pipe, an output is not a ware.
    #[snafu(display("invalid plot: {reason}"))]
    PlotInvalid {
        /// What is wrong with the plot.
        reason: String,
    },

    /// The pipe graph contains a cycle. Rejected before anything executes.
    #[snafu(display("plot contains a dependency cycle through: {}", cycle.join(", ")))]
    PlotCyclic {
        /// Steps participating in (or downstream of) the cycle.
        cycle: Vec<String>,
    },

    /// A nested plot step was encountered without recursion enabled.
    #[snafu(display("step {step} is a nested plot and recursion is not enabled"))]
    PlotNotLowered {
        /// The offending step name.
        step: String,
    },

    /// A git ingest could not be resolved on the host.
    #[snafu(display("could not ingest {git_ref} from {host_path}: {source}"))]
    IngestFailed {
        /// The host repository path.
        host_path: String,
        /// The requested ref.
        git_ref: String,
        /// Underlying git failure.
        source: git2::Error,
    },

    /// A formula execution failure, bubbled up with its step context intact.
    #[snafu(display("step {step} failed: {source}"))]
    StepFailed {
        /// The step whose formula failed.
        step: String,
        /// The underlying execution error.
        source: ExecError,
    },

    /// A workspace-layer failure (catalog lookup, memo, cache paths).
    #[snafu(display("{source}"), context(false))]
    Workspace {
        /// The underlying workspace error.
        source: WorkspaceError,
    },
}

impl PlotError {
    /// The taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PlotError::PlotInvalid { .. } => ErrorCode::PlotInvalid,
            PlotError::PlotCyclic { .. } => ErrorCode::PlotCyclic,
            PlotError::PlotNotLowered { .. } => ErrorCode::PlotNotLowered,
            PlotError::IngestFailed { .. } => ErrorCode::Io,
            PlotError::StepFailed { source, .. } => source.code(),
            PlotError::Workspace { source } => source.code(),
        }
    }
}
