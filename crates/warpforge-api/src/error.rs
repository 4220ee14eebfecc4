//! Coded error taxonomy.
//!
//! Every failure anywhere in the tool maps to exactly one [`ErrorCode`]. The
//! code is what `--json` output reports and what tests assert on; the
//! per-crate snafu enums carry the human-readable context.

use std::fmt;

use snafu::Snafu;

/// The closed set of failure codes.
///
/// Codes render in kebab-case (`catalog-item-already-exists`) in JSON error
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No workspace found or unreadable.
    Workspace,
    /// I/O while walking directories.
    SearchingFilesystem,
    /// Any other filesystem I/O failure.
    Io,
    /// Malformed input bytes.
    CodecParse,
    /// Valid JSON, wrong shape.
    CodecSchema,
    /// Catalog name or content violates schema.
    CatalogInvalid,
    /// Catalog reference unresolved.
    CatalogMissing,
    /// Overwrite attempted without force.
    CatalogItemAlreadyExists,
    /// Ware hash too short or malformed.
    WareIdInvalid,
    /// Structural plot error.
    PlotInvalid,
    /// Plot pipe graph contains a cycle.
    PlotCyclic,
    /// Nested plot encountered without recursion enabled.
    PlotNotLowered,
    /// Missing rootfs input, overlapping mounts, and similar.
    FormulaInvalid,
    /// Action exited nonzero.
    FormulaExecFailed,
    /// External packer reported an error.
    PackerFailed,
    /// User or parent cancellation.
    Cancelled,
}

impl ErrorCode {
    /// The stable string form used in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Workspace => "workspace",
            ErrorCode::SearchingFilesystem => "searching-filesystem",
            ErrorCode::Io => "io",
            ErrorCode::CodecParse => "codec-parse",
            ErrorCode::CodecSchema => "codec-schema",
            ErrorCode::CatalogInvalid => "catalog-invalid",
            ErrorCode::CatalogMissing => "catalog-missing",
            ErrorCode::CatalogItemAlreadyExists => "catalog-item-already-exists",
            ErrorCode::WareIdInvalid => "ware-id-invalid",
            ErrorCode::PlotInvalid => "plot-invalid",
            ErrorCode::PlotCyclic => "plot-cyclic",
            ErrorCode::PlotNotLowered => "plot-not-lowered",
            ErrorCode::FormulaInvalid => "formula-invalid",
            ErrorCode::FormulaExecFailed => "formula-exec-failed",
            ErrorCode::PackerFailed => "packer-failed",
            ErrorCode::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the codec and type layer itself.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApiError {
    /// Input bytes are not well-formed JSON.
    #[snafu(display("parse error at line {line} column {column}: {message}"))]
    CodecParse {
        /// 1-indexed line of the failure.
        line: usize,
        /// 1-indexed column of the failure.
        column: usize,
        /// Underlying parser message.
        message: String,
    },

    /// Well-formed JSON that does not match the expected shape.
    #[snafu(display("schema mismatch: {detail}"))]
    CodecSchema {
        /// What the decoder objected to.
        detail: String,
    },

    /// A ware identifier that cannot be used.
    #[snafu(display("invalid ware id {ware:?}: {reason}"))]
    WareIdInvalid {
        /// The offending ware id string.
        ware: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ApiError {
    /// The taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::CodecParse { .. } => ErrorCode::CodecParse,
            ApiError::CodecSchema { .. } => ErrorCode::CodecSchema,
            ApiError::WareIdInvalid { .. } => ErrorCode::WareIdInvalid,
        }
    }
}
