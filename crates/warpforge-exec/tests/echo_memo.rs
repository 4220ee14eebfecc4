//! End-to-end memoization behavior, using echo actions so no container
//! runtime or packer binary is needed: staging, fingerprinting, the memo
//! probe, and the purity gate all run for real against a scratch workspace.

use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use warpforge_api::FormulaAndContext;
use warpforge_api::FormulaExecConfig;
use warpforge_api::codec;
use warpforge_exec::ExecConfig;
use warpforge_workspace::WorkspaceSet;
use warpforge_workspace::find_workspace_stack;

struct Scratch {
    _dir: TempDir,
    exec: ExecConfig,
    wss: WorkspaceSet,
}

async fn scratch() -> Scratch {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home");
    tokio::fs::create_dir_all(home.join(".warpforge")).await.unwrap();
    tokio::fs::create_dir_all(dir.path().join("rootfs")).await.unwrap();
    let wss = find_workspace_stack(&home, dir.path(), Path::new("")).await.unwrap();
    let exec = ExecConfig {
        bin_path: dir.path().join("bin"),
        run_path_base: dir.path().join("runs"),
        keep_run_dir: false,
        working_directory: dir.path().to_path_buf(),
    };
    Scratch { _dir: dir, exec, wss }
}

fn echo_formula(scratch: &Scratch, mode: &str) -> FormulaAndContext {
    let rootfs = scratch.exec.working_directory.join("rootfs");
    let json = format!(
        r#"{{"formula":{{"formula.v1":{{"inputs":{{"/":"mount:{mode}:{}"}},"action":{{"echo":{{}}}},"outputs":{{}}}}}}}}"#,
        rootfs.display()
    );
    codec::decode(json.as_bytes()).unwrap()
}

#[tokio::test]
async fn test_pure_echo_formula_is_memoized() {
    let scratch = scratch().await;
    let cancel = CancellationToken::new();
    let cfg = FormulaExecConfig::default();

    let first = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "ro"), &cfg, &cancel)
        .await
        .unwrap();
    assert_eq!(first.exitcode, 0);
    assert!(first.results.is_empty());

    // Same formula again: the memo answers, down to the guid.
    let second = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "ro"), &cfg, &cancel)
        .await
        .unwrap();
    assert_eq!(second, first);

    // The record round-trips bit-exact through the memo file.
    let stored = scratch.wss.load_memo(&first.formula_id).await.unwrap().unwrap();
    assert_eq!(stored, first);
}

#[tokio::test]
async fn test_impure_formula_runs_but_is_not_memoized() {
    let scratch = scratch().await;
    let cancel = CancellationToken::new();
    let cfg = FormulaExecConfig::default();

    let first = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "rw"), &cfg, &cancel)
        .await
        .unwrap();
    let second = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "rw"), &cfg, &cancel)
        .await
        .unwrap();

    // Executed both times; nothing was recorded in the memo cache.
    assert_ne!(first.guid, second.guid);
    assert_eq!(first.formula_id, second.formula_id);
    assert!(scratch.wss.load_memo(&first.formula_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_disable_memoization_skips_probe_and_write() {
    let scratch = scratch().await;
    let cancel = CancellationToken::new();
    let cfg = FormulaExecConfig {
        disable_memoization: true,
        ..Default::default()
    };

    let first = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "ro"), &cfg, &cancel)
        .await
        .unwrap();
    let second = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "ro"), &cfg, &cancel)
        .await
        .unwrap();

    assert_ne!(first.guid, second.guid);
    assert!(scratch.wss.load_memo(&first.formula_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_formula_id_stable_across_runs_and_roundtrip() {
    let scratch = scratch().await;
    let cancel = CancellationToken::new();
    let cfg = FormulaExecConfig {
        disable_memoization: true,
        ..Default::default()
    };

    let record = warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "ro"), &cfg, &cancel)
        .await
        .unwrap();

    // The fingerprint matches an independent computation over the decoded
    // formula.
    let FormulaAndContext {
        formula: warpforge_api::FormulaCapsule::V1(formula),
        ..
    } = echo_formula(&scratch, "ro");
    assert_eq!(codec::formula_id(&formula).unwrap(), record.formula_id);

    let reparsed: warpforge_api::Formula = codec::decode(&codec::encode(&formula).unwrap()).unwrap();
    assert_eq!(codec::formula_id(&reparsed).unwrap(), record.formula_id);
}

#[tokio::test]
async fn test_run_directories_are_cleaned_up() {
    let scratch = scratch().await;
    let cancel = CancellationToken::new();
    let cfg = FormulaExecConfig {
        disable_memoization: true,
        ..Default::default()
    };

    warpforge_exec::execute(&scratch.exec, &scratch.wss, echo_formula(&scratch, "ro"), &cfg, &cancel)
        .await
        .unwrap();

    let mut entries = tokio::fs::read_dir(&scratch.exec.run_path_base).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none(), "run dir should be removed");
}
