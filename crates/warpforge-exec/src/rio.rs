//! Client for the external packer subprocess (`rio`).
//!
//! The packer owns ware hashing and (un)packing; its stdout contract is a
//! single line `<packtype>:<hash>` on success, diagnostics on stderr, nonzero
//! exit on failure. Invocations that fail in a transient, network-flavored
//! way are retried once.

use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use snafu::ResultExt;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;
use warpforge_api::WareID;
use warpforge_api::WarehouseAddr;

use crate::error::IoSnafu;
use crate::error::Result;
use crate::error::{self};

/// Name of the packer binary, found on the configured bin path.
const RIO_BINARY: &str = "rio";

/// Substrings of packer stderr that mark a failure worth one retry.
const TRANSIENT_MARKERS: &[&str] = &["network", "connection", "timeout", "temporarily"];

/// Handle to the packer binary.
#[derive(Debug, Clone)]
pub struct Rio {
    binary: PathBuf,
}

impl Rio {
    /// A packer located on `bin_path`.
    pub fn new(bin_path: &Path) -> Rio {
        Rio {
            binary: bin_path.join(RIO_BINARY),
        }
    }

    /// `rio scan --source=<addr> <packtype>`: hash the content at an address,
    /// populating the packer's cache as a side effect.
    pub async fn scan(&self, packtype: &str, addr: &WarehouseAddr) -> Result<WareID> {
        let args = vec![
            "scan".to_string(),
            format!("--source={addr}"),
            packtype.to_string(),
        ];
        let stdout = self.run("scan", &args).await?;
        parse_ware_id("scan", &stdout)
    }

    /// `rio pack <packtype> <src>`: pack a filesystem tree and report its
    /// ware id.
    pub async fn pack(&self, packtype: &str, src: &Path) -> Result<WareID> {
        let args = vec![
            "pack".to_string(),
            packtype.to_string(),
            src.to_string_lossy().into_owned(),
        ];
        let stdout = self.run("pack", &args).await?;
        parse_ware_id("pack", &stdout)
    }

    /// `rio unpack [--source=<addr>] <packtype>:<hash> <dest>`: materialize a
    /// ware, fetching from `source` when it is not already cached.
    pub async fn unpack(&self, ware: &WareID, dest: &Path, source: Option<&WarehouseAddr>) -> Result<()> {
        let mut args = vec!["unpack".to_string()];
        if let Some(addr) = source {
            args.push(format!("--source={addr}"));
        }
        args.push(ware.to_string());
        args.push(dest.to_string_lossy().into_owned());
        self.run("unpack", &args).await?;
        Ok(())
    }

    /// Run the packer once, retrying a single time on transient failures.
    async fn run(&self, operation: &'static str, args: &[String]) -> Result<String> {
        match self.run_once(operation, args).await {
            Err(crate::ExecError::PackerFailed { stderr, .. }) if is_transient(&stderr) => {
                warn!(operation, "packer failed transiently; retrying once");
                self.run_once(operation, args).await
            }
            other => other,
        }
    }

    async fn run_once(&self, operation: &'static str, args: &[String]) -> Result<String> {
        debug!(binary = %self.binary.display(), ?args, "invoking packer");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context(IoSnafu {
                context: "failed to spawn packer",
                path: self.binary.clone(),
            })?;

        if !output.status.success() {
            return error::PackerFailedSnafu {
                operation,
                exitcode: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .fail();
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_ware_id(operation: &'static str, stdout: &str) -> Result<WareID> {
    let line = stdout.trim();
    line.parse().map_err(|_| {
        error::PackerFailedSnafu {
            operation,
            exitcode: 0,
            stderr: format!("unparseable packer output {line:?}"),
        }
        .build()
    })
}

fn is_transient(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ware_id_trims_newline() {
        let ware = parse_ware_id("scan", "tar:abcd1234\n").unwrap();
        assert_eq!(ware, WareID::new("tar", "abcd1234"));
    }

    #[test]
    fn test_parse_ware_id_rejects_garbage() {
        let err = parse_ware_id("pack", "no ware here").unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::PackerFailed);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient("dial tcp: connection refused"));
        assert!(is_transient("Network unreachable"));
        assert!(!is_transient("no such file or directory"));
    }
}
