//! Rendering results and errors, human or JSON.

use serde_json::json;
use warpforge_api::ApiError;
use warpforge_api::ErrorCode;
use warpforge_exec::ExecError;
use warpforge_plot::PlotError;
use warpforge_workspace::WorkspaceError;

/// Print a result document to stdout. JSON mode prints it verbatim; human
/// mode pretty-prints.
pub fn render_result(value: &serde_json::Value, is_json: bool) {
    if is_json {
        println!("{value}");
    } else {
        println!("{value:#}");
    }
}

/// Print an error to stderr: `error: <msg>` normally, or a coded JSON object
/// under `--json`.
pub fn render_error(err: &anyhow::Error, is_json: bool) {
    if is_json {
        let mut doc = json!({
            "code": error_code(err).as_str(),
            "msg": err.to_string(),
        });
        if let Some(cause) = err.chain().nth(1) {
            doc["cause"] = json!(cause.to_string());
        }
        eprintln!("{doc}");
    } else {
        eprintln!("error: {err:#}");
    }
}

/// The taxonomy code of the first coded error in the chain. Errors from
/// outside the core (argument handling, stray I/O) report as plain `io`.
fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PlotError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<ExecError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<WorkspaceError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<ApiError>() {
            return e.code();
        }
    }
    ErrorCode::Io
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_from_chain() {
        let source = WorkspaceError::CatalogMissing {
            reference: "example.com/m:v1:x".to_string(),
        };
        let err = anyhow::Error::new(source).context("while resolving inputs");
        assert_eq!(error_code(&err), ErrorCode::CatalogMissing);
    }

    #[test]
    fn test_error_code_fallback_is_io() {
        let err = anyhow::anyhow!("something unstructured");
        assert_eq!(error_code(&err), ErrorCode::Io);
    }
}
