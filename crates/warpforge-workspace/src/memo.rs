//! The memoization cache: formula-id keyed runrecords.
//!
//! One file per formula id under `.warpforge/memos/`. Reads traverse the
//! workspace stack nearest-first; writes go to the stack's memo write
//! workspace (see [`WorkspaceSet::memo_write_workspace`]). Records are
//! append-only: a memo file is only ever replaced by an identical record for
//! the same formula.

use snafu::ResultExt;
use tracing::debug;
use warpforge_api::RunRecord;
use warpforge_api::codec;

use crate::error::CodecSnafu;
use crate::error::IoSnafu;
use crate::error::Result;
use crate::fsutil;
use crate::set::WorkspaceSet;
use crate::workspace::Workspace;

impl Workspace {
    /// Read this workspace's memo for a formula id, if any.
    pub async fn load_memo(&self, formula_id: &str) -> Result<Option<RunRecord>> {
        let path = self.memo_path(formula_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).context(IoSnafu {
                    context: "failed to read memo",
                    path,
                });
            }
        };
        let record = codec::decode(&bytes).context(CodecSnafu { path })?;
        Ok(Some(record))
    }

    /// Persist a runrecord under its formula id, atomically.
    pub async fn store_memo(&self, record: &RunRecord) -> Result<()> {
        let bytes = codec::encode(record).context(CodecSnafu {
            path: self.memo_path(&record.formula_id),
        })?;
        let path = self.memo_path(&record.formula_id);
        fsutil::write_atomic(&path, &bytes).await?;
        debug!(formula_id = %record.formula_id, path = %path.display(), "memo stored");
        Ok(())
    }
}

impl WorkspaceSet {
    /// Find a memo anywhere in the stack, nearest workspace first.
    pub async fn load_memo(&self, formula_id: &str) -> Result<Option<RunRecord>> {
        for ws in self.iter() {
            if let Some(record) = ws.load_memo(formula_id).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Persist a runrecord to the stack's memo write workspace.
    pub async fn store_memo(&self, record: &RunRecord) -> Result<()> {
        self.memo_write_workspace().await.store_memo(record).await
    }
}

#[cfg(test)]
mod tests {
    use warpforge_api::FormulaInput;
    use warpforge_api::WareID;

    use super::*;
    use crate::fsdetect::find_workspace_stack;

    fn record(formula_id: &str) -> RunRecord {
        RunRecord {
            guid: "test-guid".into(),
            time: 1234,
            formula_id: formula_id.into(),
            exitcode: 0,
            results: [("out".to_string(), FormulaInput::Ware(WareID::new("tar", "abcdefg")))]
                .into_iter()
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_memo_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), true).await.unwrap();

        assert!(ws.load_memo("fid1").await.unwrap().is_none());
        ws.store_memo(&record("fid1")).await.unwrap();
        let loaded = ws.load_memo("fid1").await.unwrap().unwrap();
        assert_eq!(loaded, record("fid1"));
    }

    #[tokio::test]
    async fn test_memo_file_is_canonical_json() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let ws = Workspace::create(&home, dir.path(), true).await.unwrap();

        ws.store_memo(&record("fid2")).await.unwrap();
        let bytes = tokio::fs::read(ws.memo_path("fid2")).await.unwrap();
        let reencoded = codec::encode(&codec::decode::<RunRecord>(&bytes).unwrap()).unwrap();
        assert_eq!(bytes, reencoded);
    }

    #[tokio::test]
    async fn test_stack_reads_nearest_first_and_writes_innermost_memo_dir() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        tokio::fs::create_dir_all(home.join(".warpforge")).await.unwrap();
        Workspace::create(&home, &dir.path().join("proj"), false).await.unwrap();

        let stack = find_workspace_stack(&home, dir.path(), std::path::Path::new("proj")).await.unwrap();
        assert_eq!(stack.len(), 2);

        // No memo dir anywhere yet: writes land in the root (home) workspace.
        stack.store_memo(&record("fid3")).await.unwrap();
        assert!(stack.root().load_memo("fid3").await.unwrap().is_some());
        assert!(stack.local().load_memo("fid3").await.unwrap().is_none());
        assert_eq!(stack.load_memo("fid3").await.unwrap().unwrap(), record("fid3"));

        // Once the local workspace grows a memo dir, it becomes the target.
        tokio::fs::create_dir_all(stack.local().memo_base_path()).await.unwrap();
        stack.store_memo(&record("fid4")).await.unwrap();
        assert!(stack.local().load_memo("fid4").await.unwrap().is_some());
    }
}
