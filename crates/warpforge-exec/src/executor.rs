//! The formula executor: stage inputs, run the sandbox, gather outputs,
//! record the run.
//!
//! ```text
//! Formula ──► fingerprint ──► memo probe ──► stage ──► launch ──► gather
//!                │ hit                         │                    │
//!                ▼                             ▼                    ▼
//!            RunRecord                   <rundir>/...          RunRecord
//!                                        (bundle, overlays,    (+ memo write
//!                                         literals, script)     when pure)
//! ```
//!
//! A run directory holds everything ephemeral: the OCI bundle, overlay
//! upper/work layers, materialized literals and script, and the variable
//! output sidecar. It is removed at the end unless configured otherwise.

use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use command_group::AsyncCommandGroup;
use command_group::AsyncGroupChild;
use snafu::ResultExt;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use warpforge_api::Action;
use warpforge_api::Formula;
use warpforge_api::FormulaAndContext;
use warpforge_api::FormulaCapsule;
use warpforge_api::FormulaContext;
use warpforge_api::FormulaContextCapsule;
use warpforge_api::FormulaExecConfig;
use warpforge_api::FormulaInput;
use warpforge_api::MountMode;
use warpforge_api::RunRecord;
use warpforge_api::SandboxPort;
use warpforge_api::WareID;
use warpforge_api::codec;
use warpforge_workspace::Lockfile;
use warpforge_workspace::WorkspaceSet;

use crate::error::CodecSnafu;
use crate::error::ExecError;
use crate::error::FormulaInvalidSnafu;
use crate::error::IoSnafu;
use crate::error::Result;
use crate::error::{self};
use crate::oci::OciSpec;
use crate::rio::Rio;

/// Name of the container runtime binary, found on the configured bin path.
const RUNTIME_BINARY: &str = "runc";
/// Where the script action's file appears inside the sandbox.
const SCRIPT_SANDBOX_PATH: &str = "/.warpforge.script";
/// Where the variable-output sidecar directory appears inside the sandbox.
const VAR_OUTPUT_SANDBOX_PATH: &str = "/.warpforge.outputs";
/// Grace period between SIGTERM and SIGKILL on teardown.
const GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Longest stdout/stderr line kept when buffering sandbox output.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Tool-level execution environment, passed through explicitly (no globals).
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Directory holding the `runc` and `rio` binaries.
    pub bin_path: PathBuf,
    /// Where run directories are allocated.
    pub run_path_base: PathBuf,
    /// Keep the run directory around for debugging.
    pub keep_run_dir: bool,
    /// Base for resolving relative host paths in mount inputs.
    pub working_directory: PathBuf,
}

/// Execute one formula, consulting and feeding the memo cache.
pub async fn execute(
    cfg: &ExecConfig,
    wss: &WorkspaceSet,
    formula_and_context: FormulaAndContext,
    exec_cfg: &FormulaExecConfig,
    cancel: &CancellationToken,
) -> Result<RunRecord> {
    let FormulaCapsule::V1(formula) = formula_and_context.formula;
    let context = match formula_and_context.context {
        Some(FormulaContextCapsule::V1(context)) => context,
        None => FormulaContext::default(),
    };

    validate_formula(&formula)?;
    let fid = codec::formula_id(&formula).context(CodecSnafu)?;

    // The per-formula lease: at most one execution of a given formula at a
    // time on this machine. Held across probe, run, and memo write.
    let _lease = if exec_cfg.disable_memoization {
        None
    } else {
        let lock_path = wss.memo_write_workspace().await.memo_base_path().join(format!("{fid}.lock"));
        Some(Lockfile::acquire(lock_path).await?)
    };

    if !exec_cfg.disable_memoization
        && let Some(record) = wss.load_memo(&fid).await?
    {
        if outputs_resolvable(wss, &context, &record).await? {
            info!(formula_id = %fid, "memo hit; skipping execution");
            return Ok(record);
        }
        debug!(formula_id = %fid, "memo hit but outputs unresolvable; re-executing");
    }

    let guid = uuid::Uuid::new_v4().to_string();
    let run_dir = cfg.run_path_base.join(format!("warpforge-run-{guid}"));

    let result = run_in_dir(cfg, wss, &formula, &context, exec_cfg, cancel, &fid, &guid, &run_dir).await;

    if !cfg.keep_run_dir {
        let _ = tokio::fs::remove_dir_all(&run_dir).await;
    }

    let record = result?;
    if record.exitcode != 0 {
        return error::FormulaExecFailedSnafu {
            record: Box::new(record),
        }
        .fail();
    }
    if !exec_cfg.disable_memoization && formula.is_pure() {
        wss.store_memo(&record).await?;
    }
    Ok(record)
}

/// What one path input became on the host side, kept for gather resolution.
#[derive(Debug)]
enum StagedSource {
    /// Reads and writes resolve through an overlay; gathers read the upper.
    Overlay { upper: PathBuf },
    /// A direct host directory (ware cache dir, or a ro/rw mount).
    Host { path: PathBuf },
}

#[derive(Debug)]
struct StagedMount {
    sandbox_path: String,
    source: StagedSource,
}

#[allow(clippy::too_many_arguments)]
async fn run_in_dir(
    cfg: &ExecConfig,
    wss: &WorkspaceSet,
    formula: &Formula,
    context: &FormulaContext,
    exec_cfg: &FormulaExecConfig,
    cancel: &CancellationToken,
    fid: &str,
    guid: &str,
    run_dir: &Path,
) -> Result<RunRecord> {
    let staged = stage(cfg, wss, formula, context, exec_cfg, run_dir).await?;

    let exitcode = match &formula.action {
        // The debug action runs nothing and reports success.
        Action::Echo {} => {
            info!(formula_id = %fid, "echo action; nothing to execute");
            0
        }
        _ => launch(cfg, exec_cfg, cancel, run_dir, guid).await?,
    };

    let mut results = warpforge_api::OrderedMap::new();
    if exitcode == 0 {
        for (name, directive) in &formula.outputs {
            let output = gather_one(wss, &staged, run_dir, cfg, directive).await?;
            results.insert(name.clone(), output);
        }
    }

    Ok(RunRecord {
        guid: guid.to_string(),
        time: chrono::Utc::now().timestamp(),
        formula_id: fid.to_string(),
        exitcode,
        results,
    })
}

/// Materialize every input and write the OCI bundle.
async fn stage(
    cfg: &ExecConfig,
    wss: &WorkspaceSet,
    formula: &Formula,
    context: &FormulaContext,
    exec_cfg: &FormulaExecConfig,
    run_dir: &Path,
) -> Result<Vec<StagedMount>> {
    let bundle_dir = run_dir.join("bundle");
    let root_dir = run_dir.join("root");
    for dir in [&bundle_dir, &root_dir] {
        tokio::fs::create_dir_all(dir).await.context(IoSnafu {
            context: "could not create run directory",
            path: dir.clone(),
        })?;
    }

    let mut spec = OciSpec::new(&root_dir, exec_cfg.interactive, formula.action.wants_network());
    let mut staged: Vec<StagedMount> = Vec::new();
    let rio = Rio::new(&cfg.bin_path);

    // Deeper mount targets must be applied after their parents; the map is
    // walked in path-depth order (the rootfs port first).
    let mut path_ports: Vec<(&String, &FormulaInput)> = Vec::new();
    for (port, input) in &formula.inputs {
        match port {
            SandboxPort::Var(name) => match input {
                FormulaInput::Literal(value) => spec.add_env(name, value),
                other => {
                    return FormulaInvalidSnafu {
                        reason: format!("variable port ${name} requires a literal input, got {other}"),
                    }
                    .fail();
                }
            },
            SandboxPort::Path(path) => path_ports.push((path, input)),
        }
    }
    path_ports.sort_by_key(|(path, _)| path.matches('/').count() + usize::from(path.as_str() != "/"));

    let mut overlay_counter = 0usize;
    let mut literal_counter = 0usize;
    for (path, input) in path_ports {
        let is_root = path.as_str() == "/";
        match input {
            FormulaInput::Ware(ware) => {
                let cache_dir = ensure_ware_cached(wss, context, &rio, ware).await?;
                if is_root {
                    let (upper, work) = overlay_dirs(run_dir, &mut overlay_counter).await?;
                    spec.set_root_overlay(&cache_dir, &upper, &work);
                    staged.push(StagedMount {
                        sandbox_path: path.clone(),
                        source: StagedSource::Overlay { upper },
                    });
                } else {
                    spec.add_bind_mount(path, &cache_dir, true);
                    staged.push(StagedMount {
                        sandbox_path: path.clone(),
                        source: StagedSource::Host { path: cache_dir },
                    });
                }
            }
            FormulaInput::Mount(mount) => {
                let host = resolve_host_path(&cfg.working_directory, &mount.host_path);
                match mount.mode {
                    MountMode::Ro | MountMode::Rw => {
                        let read_only = mount.mode == MountMode::Ro;
                        if is_root {
                            spec.set_root_bind(&host, read_only);
                        } else {
                            spec.add_bind_mount(path, &host, read_only);
                        }
                        staged.push(StagedMount {
                            sandbox_path: path.clone(),
                            source: StagedSource::Host { path: host },
                        });
                    }
                    MountMode::Overlay => {
                        let (upper, work) = overlay_dirs(run_dir, &mut overlay_counter).await?;
                        if is_root {
                            spec.set_root_overlay(&host, &upper, &work);
                        } else {
                            spec.add_overlay_mount(path, &host, &upper, &work);
                        }
                        staged.push(StagedMount {
                            sandbox_path: path.clone(),
                            source: StagedSource::Overlay { upper },
                        });
                    }
                }
            }
            FormulaInput::Literal(value) => {
                if is_root {
                    return FormulaInvalidSnafu {
                        reason: "the rootfs port `/` cannot be a literal",
                    }
                    .fail();
                }
                let file = run_dir.join(format!("literals/{literal_counter}"));
                literal_counter += 1;
                warpforge_workspace::write_atomic(&file, value.as_bytes()).await?;
                spec.add_bind_mount(path, &file, true);
                staged.push(StagedMount {
                    sandbox_path: path.clone(),
                    source: StagedSource::Host { path: file },
                });
            }
        }
    }

    // Script actions get their file materialized and bound in.
    match &formula.action {
        Action::Exec { command, .. } => spec.set_args(command.clone()),
        Action::Script { interpreter, contents, .. } => {
            let script_path = run_dir.join("script");
            warpforge_workspace::write_atomic(&script_path, script_bytes(contents).as_bytes()).await?;
            spec.add_bind_mount(SCRIPT_SANDBOX_PATH, &script_path, true);
            spec.set_args(vec![interpreter.clone(), SCRIPT_SANDBOX_PATH.to_string()]);
        }
        Action::Echo {} => {}
    }

    // Variable gathers read files the action writes under the sidecar dir.
    if formula.outputs.values().any(|d| matches!(d.from, SandboxPort::Var(_))) {
        let sidecar = run_dir.join("var-outputs");
        tokio::fs::create_dir_all(&sidecar).await.context(IoSnafu {
            context: "could not create var output sidecar",
            path: sidecar.clone(),
        })?;
        spec.add_bind_mount(VAR_OUTPUT_SANDBOX_PATH, &sidecar, false);
    }

    let config_path = run_dir.join("bundle/config.json");
    let config_bytes = serde_json::to_vec_pretty(&spec).map_err(|err| ExecError::FormulaInvalid {
        reason: format!("could not serialize container config: {err}"),
    })?;
    warpforge_workspace::write_atomic(&config_path, &config_bytes).await?;

    Ok(staged)
}

/// Make sure a ware is present in some workspace cache, fetching it through
/// the packer if needed. Returns the cache directory holding it.
async fn ensure_ware_cached(
    wss: &WorkspaceSet,
    context: &FormulaContext,
    rio: &Rio,
    ware: &WareID,
) -> Result<PathBuf> {
    for ws in wss.iter() {
        if ws.has_ware(ware).await? {
            return Ok(ws.cache_path(ware)?);
        }
    }
    let dest = wss.root().cache_path(ware)?;
    let source = context.warehouses.get(ware);
    info!(ware = %ware, source = source.map(|s| s.as_str()).unwrap_or("<cache only>"), "fetching ware");
    rio.unpack(ware, &dest, source).await?;
    Ok(dest)
}

async fn overlay_dirs(run_dir: &Path, counter: &mut usize) -> Result<(PathBuf, PathBuf)> {
    let upper = run_dir.join(format!("overlays/upper-{counter}"));
    let work = run_dir.join(format!("overlays/work-{counter}"));
    *counter += 1;
    for dir in [&upper, &work] {
        tokio::fs::create_dir_all(dir).await.context(IoSnafu {
            context: "could not create overlay directory",
            path: dir.clone(),
        })?;
    }
    Ok((upper, work))
}

/// Spawn the container runtime and wait for it, honoring cancellation and the
/// per-formula timeout. Returns the action's exit code.
async fn launch(
    cfg: &ExecConfig,
    exec_cfg: &FormulaExecConfig,
    cancel: &CancellationToken,
    run_dir: &Path,
    guid: &str,
) -> Result<i32> {
    let runtime = cfg.bin_path.join(RUNTIME_BINARY);
    let bundle = run_dir.join("bundle");
    let state_root = run_dir.join("runtime-state");

    let mut cmd = Command::new(&runtime);
    cmd.arg("--root")
        .arg(&state_root)
        .arg("run")
        .arg("--bundle")
        .arg(&bundle)
        .arg(format!("warpforge-{guid}"))
        .kill_on_drop(true);

    if exec_cfg.interactive {
        cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    // Process group, so teardown reaches the whole sandbox tree.
    let mut child: AsyncGroupChild = cmd.group_spawn().context(IoSnafu {
        context: "failed to spawn container runtime",
        path: runtime.clone(),
    })?;

    let stdout_task = child.inner().stdout.take().map(|stdout| {
        tokio::spawn(drain_lines(stdout, "sandbox stdout"))
    });
    let stderr_task = child.inner().stderr.take().map(|stderr| {
        tokio::spawn(drain_lines(stderr, "sandbox stderr"))
    });

    enum ExitReason {
        Completed(std::process::ExitStatus),
        WaitError(std::io::Error),
        Timeout,
        Cancelled,
    }

    let timeout = exec_cfg.timeout.unwrap_or(Duration::MAX);
    let exit_reason = tokio::select! {
        wait_result = child.wait() => match wait_result {
            Ok(status) => ExitReason::Completed(status),
            Err(err) => ExitReason::WaitError(err),
        },
        _ = tokio::time::sleep(timeout) => ExitReason::Timeout,
        _ = cancel.cancelled() => ExitReason::Cancelled,
    };

    let result = match exit_reason {
        ExitReason::Completed(status) => Ok(status.code().unwrap_or(-1)),
        ExitReason::WaitError(err) => Err(err).context(IoSnafu {
            context: "failed waiting for container runtime",
            path: runtime,
        }),
        ExitReason::Timeout => {
            warn!(guid, timeout_secs = timeout.as_secs(), "formula timed out");
            terminate_process_group(&mut child, GRACE_PERIOD).await;
            error::TimeoutSnafu { seconds: timeout.as_secs() }.fail()
        }
        ExitReason::Cancelled => {
            info!(guid, "formula cancelled");
            terminate_process_group(&mut child, GRACE_PERIOD).await;
            Err(ExecError::Cancelled)
        }
    };

    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }
    result
}

/// Read a sandbox stream to EOF, forwarding lines to tracing.
async fn drain_lines<R: tokio::io::AsyncRead + Unpin>(reader: R, label: &'static str) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.len() > MAX_LINE_LENGTH {
                    line.truncate(MAX_LINE_LENGTH);
                }
                debug!(target: "warpforge::sandbox", "{label}: {}", line.trim_end());
            }
            Err(err) => {
                warn!("error reading {label}: {err}");
                break;
            }
        }
    }
}

/// Capture one output after a successful run.
async fn gather_one(
    wss: &WorkspaceSet,
    staged: &[StagedMount],
    run_dir: &Path,
    cfg: &ExecConfig,
    directive: &warpforge_api::GatherDirective,
) -> Result<FormulaInput> {
    match &directive.from {
        SandboxPort::Var(name) => {
            let path = run_dir.join("var-outputs").join(name);
            let value = tokio::fs::read_to_string(&path).await.context(IoSnafu {
                context: "variable output was not written by the action",
                path,
            })?;
            Ok(FormulaInput::Literal(value.trim_end_matches('\n').to_string()))
        }
        SandboxPort::Path(path) => {
            let packtype = directive.packtype.as_ref().ok_or_else(|| ExecError::FormulaInvalid {
                reason: format!("gather from {path} needs a packtype"),
            })?;
            let source = resolve_gather_source(staged, path).ok_or_else(|| ExecError::FormulaInvalid {
                reason: format!("gather path {path} is not under any input"),
            })?;

            let rio = Rio::new(&cfg.bin_path);
            let ware = rio.pack(packtype.as_str(), &source).await?;
            if !wss.has_ware(&ware).await? {
                let cache_dir = wss.root().cache_path(&ware)?;
                move_tree(&source, &cache_dir).await?;
            }
            Ok(FormulaInput::Ware(ware))
        }
    }
}

/// Map a sandbox path to the host location that backs it: the innermost
/// staged mount whose sandbox path is a prefix.
fn resolve_gather_source(staged: &[StagedMount], sandbox_path: &str) -> Option<PathBuf> {
    let mut best: Option<(&StagedMount, usize)> = None;
    for mount in staged {
        let prefix = &mount.sandbox_path;
        let matches = sandbox_path == *prefix
            || prefix.as_str() == "/"
            || sandbox_path.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'));
        if matches && best.is_none_or(|(_, len)| prefix.len() > len) {
            best = Some((mount, prefix.len()));
        }
    }
    let (mount, _) = best?;
    let rel = sandbox_path.strip_prefix(mount.sandbox_path.as_str()).unwrap_or(sandbox_path);
    let rel = rel.trim_start_matches('/');
    let base = match &mount.source {
        StagedSource::Overlay { upper } => upper,
        StagedSource::Host { path } => path,
    };
    Some(if rel.is_empty() { base.clone() } else { base.join(rel) })
}

/// Move a directory tree, falling back to copy when the rename crosses
/// filesystems. The destination appears atomically (copy to temp sibling,
/// then rename).
async fn move_tree(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.context(IoSnafu {
            context: "could not create cache directory",
            path: parent.to_path_buf(),
        })?;
    }
    match tokio::fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(_) => {
            let temp = dest.with_extension(format!("tmp-{}", std::process::id()));
            copy_tree(src, &temp).await?;
            tokio::fs::rename(&temp, dest).await.context(IoSnafu {
                context: "could not move tree into cache",
                path: dest.to_path_buf(),
            })
        }
    }
}

async fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let mut pending = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await.context(IoSnafu {
            context: "could not create directory",
            path: to.clone(),
        })?;
        let mut entries = tokio::fs::read_dir(&from).await.context(IoSnafu {
            context: "could not read directory",
            path: from.clone(),
        })?;
        while let Some(entry) = entries.next_entry().await.context(IoSnafu {
            context: "could not read directory",
            path: from.clone(),
        })? {
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            let file_type = entry.file_type().await.context(IoSnafu {
                context: "could not stat",
                path: from_path.clone(),
            })?;
            if file_type.is_dir() {
                pending.push((from_path, to_path));
            } else if file_type.is_symlink() {
                let target = tokio::fs::read_link(&from_path).await.context(IoSnafu {
                    context: "could not read symlink",
                    path: from_path.clone(),
                })?;
                tokio::fs::symlink(&target, &to_path).await.context(IoSnafu {
                    context: "could not create symlink",
                    path: to_path,
                })?;
            } else {
                tokio::fs::copy(&from_path, &to_path).await.context(IoSnafu {
                    context: "could not copy file",
                    path: to_path,
                })?;
            }
        }
    }
    Ok(())
}

/// Terminate a process group: SIGTERM, a grace period, then SIGKILL, then
/// reap. Nothing is left orphaned.
#[cfg(unix)]
async fn terminate_process_group(child: &mut AsyncGroupChild, grace: Duration) {
    use nix::sys::signal::Signal;
    use nix::sys::signal::{self};
    use nix::unistd::Pid;

    let Some(pid) = child.inner().id() else {
        return; // Already exited.
    };
    let pgid = Pid::from_raw(-(pid as i32));

    if let Err(err) = signal::kill(pgid, Signal::SIGTERM)
        && err != nix::errno::Errno::ESRCH
    {
        warn!(pid, error = ?err, "SIGTERM to process group failed");
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if child.inner().try_wait().ok().flatten().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if let Err(err) = signal::kill(pgid, Signal::SIGKILL)
        && err != nix::errno::Errno::ESRCH
    {
        warn!(pid, error = ?err, "SIGKILL to process group failed");
    }

    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &mut AsyncGroupChild, _grace: Duration) {
    let _ = child.kill();
    let _ = child.wait().await;
}

/// Structural checks that do not touch the filesystem.
pub fn validate_formula(formula: &Formula) -> Result<()> {
    let mut has_rootfs = false;
    let mut paths: Vec<(&str, bool)> = Vec::new();

    for (port, input) in &formula.inputs {
        if let SandboxPort::Path(path) = port {
            if path.as_str() == "/" {
                has_rootfs = true;
            }
            let is_overlay = matches!(
                input,
                FormulaInput::Mount(warpforge_api::Mount {
                    mode: MountMode::Overlay,
                    ..
                })
            );
            paths.push((path.as_str(), is_overlay));
        }
    }

    if !has_rootfs {
        return FormulaInvalidSnafu {
            reason: "no input supplies the rootfs port `/`",
        }
        .fail();
    }

    // Overlapping mount targets are only tolerated when one side is an
    // overlay layer.
    for (i, (a, a_overlay)) in paths.iter().enumerate() {
        for (b, b_overlay) in paths.iter().skip(i + 1) {
            if *a == "/" || *b == "/" {
                continue;
            }
            let nested = b.strip_prefix(a).is_some_and(|rest| rest.starts_with('/'))
                || a.strip_prefix(b).is_some_and(|rest| rest.starts_with('/'));
            if nested && !(*a_overlay || *b_overlay) {
                return FormulaInvalidSnafu {
                    reason: format!("mount targets {a} and {b} overlap"),
                }
                .fail();
            }
        }
    }

    for (name, directive) in &formula.outputs {
        match &directive.from {
            SandboxPort::Var(_) if directive.packtype.is_some() || directive.filters.is_some() => {
                return FormulaInvalidSnafu {
                    reason: format!("output {name} gathers a variable; packtype and filters must be absent"),
                }
                .fail();
            }
            SandboxPort::Path(_) if directive.packtype.is_none() => {
                return FormulaInvalidSnafu {
                    reason: format!("output {name} gathers a path and needs a packtype"),
                }
                .fail();
            }
            _ => {}
        }
    }

    Ok(())
}

/// Whether a memoized record's outputs can still be produced without
/// re-running: every ware is cached somewhere in the stack or has a known
/// warehouse address.
async fn outputs_resolvable(wss: &WorkspaceSet, context: &FormulaContext, record: &RunRecord) -> Result<bool> {
    for output in record.results.values() {
        if let FormulaInput::Ware(ware) = output {
            let reachable = wss.has_ware(ware).await? || context.warehouses.get(ware).is_some();
            if !reachable {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// The bytes of a script action's file: lines joined with Unix newlines,
/// newline-terminated.
pub fn script_bytes(contents: &[String]) -> String {
    let mut script = contents.join("\n");
    script.push('\n');
    script
}

fn resolve_host_path(working_directory: &Path, host_path: &str) -> PathBuf {
    let path = Path::new(host_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_directory.join(path)
    }
}

#[cfg(test)]
mod tests {
    use warpforge_api::decode;

    use super::*;

    fn formula(json: &str) -> Formula {
        decode(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_validate_requires_rootfs() {
        let f = formula(r#"{"inputs":{"/src":"mount:ro:."},"action":{"echo":{}},"outputs":{}}"#);
        let err = validate_formula(&f).unwrap_err();
        assert_eq!(err.code(), warpforge_api::ErrorCode::FormulaInvalid);
        assert!(err.to_string().contains("rootfs"));
    }

    #[test]
    fn test_validate_rejects_overlapping_mounts() {
        let f = formula(
            r#"{"inputs":{"/":"ware:tar:abcd123","/pkg":"ware:tar:beef456","/pkg/sub":"mount:ro:."},"action":{"echo":{}},"outputs":{}}"#,
        );
        let err = validate_formula(&f).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_validate_allows_overlap_with_overlay() {
        let f = formula(
            r#"{"inputs":{"/":"ware:tar:abcd123","/pkg":"mount:overlay:.","/pkg/sub":"mount:ro:."},"action":{"echo":{}},"outputs":{}}"#,
        );
        assert!(validate_formula(&f).is_ok());
    }

    #[test]
    fn test_validate_disjoint_sibling_paths_ok() {
        // `/out` and `/output` share a string prefix but are not nested.
        let f = formula(
            r#"{"inputs":{"/":"ware:tar:abcd123","/out":"mount:ro:.","/output":"mount:ro:.."},"action":{"echo":{}},"outputs":{}}"#,
        );
        assert!(validate_formula(&f).is_ok());
    }

    #[test]
    fn test_validate_var_gather_must_be_bare() {
        let f = formula(
            r#"{"inputs":{"/":"ware:tar:abcd123"},"action":{"echo":{}},"outputs":{"v":{"from":"$OUT","packtype":"tar"}}}"#,
        );
        let err = validate_formula(&f).unwrap_err();
        assert!(err.to_string().contains("must be absent"));
    }

    #[test]
    fn test_validate_path_gather_needs_packtype() {
        let f = formula(
            r#"{"inputs":{"/":"ware:tar:abcd123"},"action":{"echo":{}},"outputs":{"out":{"from":"/out"}}}"#,
        );
        let err = validate_formula(&f).unwrap_err();
        assert!(err.to_string().contains("needs a packtype"));
    }

    #[test]
    fn test_script_bytes_unix_newlines() {
        let lines = vec!["mkdir /out".to_string(), "echo hi > /out/f".to_string()];
        assert_eq!(script_bytes(&lines), "mkdir /out\necho hi > /out/f\n");
        assert_eq!(script_bytes(&[]), "\n");
    }

    #[test]
    fn test_resolve_gather_source_prefers_innermost() {
        let staged = vec![
            StagedMount {
                sandbox_path: "/".to_string(),
                source: StagedSource::Overlay {
                    upper: PathBuf::from("/run/upper"),
                },
            },
            StagedMount {
                sandbox_path: "/work".to_string(),
                source: StagedSource::Host {
                    path: PathBuf::from("/host/work"),
                },
            },
        ];
        assert_eq!(resolve_gather_source(&staged, "/out"), Some(PathBuf::from("/run/upper/out")));
        assert_eq!(resolve_gather_source(&staged, "/work/out"), Some(PathBuf::from("/host/work/out")));
        assert_eq!(resolve_gather_source(&staged, "/work"), Some(PathBuf::from("/host/work")));
        // `/workspace` is not under `/work`; it falls through to the rootfs.
        assert_eq!(
            resolve_gather_source(&staged, "/workspace"),
            Some(PathBuf::from("/run/upper/workspace"))
        );
    }

    #[test]
    fn test_resolve_host_path_relative_vs_absolute() {
        let cwd = Path::new("/proj");
        assert_eq!(resolve_host_path(cwd, "."), PathBuf::from("/proj/."));
        assert_eq!(resolve_host_path(cwd, "/abs"), PathBuf::from("/abs"));
    }
}
