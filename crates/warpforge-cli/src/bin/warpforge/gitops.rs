//! Git operations for remote catalogs: ls-remote, clone, and fast-forward
//! pull. All libgit2 calls run on blocking threads.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use git2::Repository;

/// One advertised ref on a remote: `(full_ref_name, commit_hash)`.
pub type RemoteRef = (String, String);

/// List every ref a remote advertises (the `git ls-remote` protocol
/// exchange).
pub async fn ls_remote(url: &str) -> Result<Vec<RemoteRef>> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut remote = git2::Remote::create_detached(url.as_str())
            .with_context(|| format!("could not open remote {url:?}"))?;
        remote
            .connect(git2::Direction::Fetch)
            .with_context(|| format!("could not connect to {url:?}"))?;
        let refs = remote
            .list()
            .context("could not list remote refs")?
            .iter()
            .map(|head| (head.name().to_string(), head.oid().to_string()))
            .collect();
        Ok(refs)
    })
    .await?
}

/// The tags a remote advertises, as `(short_tag_name, commit_hash)`, peeled
/// annotated tags included.
pub async fn ls_remote_tags(url: &str) -> Result<Vec<RemoteRef>> {
    let refs = ls_remote(url).await?;
    let mut tags: Vec<RemoteRef> = Vec::new();
    for (name, hash) in refs {
        // Peeled entries (`refs/tags/v1^{}`) carry the commit an annotated
        // tag points at; they override the tag object's own hash.
        if let Some(peeled) = name.strip_prefix("refs/tags/").and_then(|t| t.strip_suffix("^{}")) {
            if let Some(existing) = tags.iter_mut().find(|(tag, _)| tag.as_str() == peeled) {
                existing.1 = hash;
            } else {
                tags.push((peeled.to_string(), hash));
            }
        } else if let Some(tag) = name.strip_prefix("refs/tags/") {
            if !tags.iter().any(|(existing, _)| existing.as_str() == tag) {
                tags.push((tag.to_string(), hash));
            }
        }
    }
    Ok(tags)
}

/// Clone a repository.
pub async fn clone(url: &str, dest: &Path) -> Result<()> {
    let url = url.to_string();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        Repository::clone(&url, &dest).with_context(|| format!("could not clone {url:?}"))?;
        Ok(())
    })
    .await?
}

/// Result of a pull attempt on a local checkout.
#[derive(Debug, PartialEq, Eq)]
pub enum PullOutcome {
    /// The directory is not a git checkout at all.
    NotARepository,
    /// Nothing new on the remote.
    UpToDate,
    /// Fast-forwarded to the remote's head.
    Updated,
}

/// Fetch `origin` and fast-forward the checked-out branch. Diverged local
/// history is an error; catalogs are consumed, not edited.
pub async fn pull_fast_forward(path: &Path) -> Result<PullOutcome> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let repo = match Repository::open(&path) {
            Ok(repo) => repo,
            Err(_) => return Ok(PullOutcome::NotARepository),
        };

        let mut remote = repo.find_remote("origin").context("checkout has no origin remote")?;
        remote.fetch(&[] as &[&str], None, None).context("fetch failed")?;

        let fetch_head = repo.find_reference("FETCH_HEAD").context("no FETCH_HEAD after fetch")?;
        let annotated = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(PullOutcome::UpToDate);
        }
        if !analysis.is_fast_forward() {
            anyhow::bail!("local catalog checkout {} has diverged from its remote", path.display());
        }

        let head = repo.head().context("could not read HEAD")?;
        let branch_ref = head.name().context("HEAD is not a named reference")?.to_string();
        repo.find_reference(&branch_ref)?
            .set_target(annotated.id(), "warpforge catalog update: fast-forward")?;
        repo.set_head(&branch_ref)?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
        Ok(PullOutcome::Updated)
    })
    .await?
}
