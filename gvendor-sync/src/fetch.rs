//! Shallow-first fetch with a full-history fallback.
//!
//! Every fetch gets its own scratch repository. The returned [`Checkout`]
//! owns it and removes it on drop, so all exit paths clean up.

use std::path::Path;

use tempfile::TempDir;

use crate::error::{io_err, SyncError};
use crate::process::CancelFlag;
use crate::vcs::{VcsClient, VcsError};

/// A materialised working tree at a known revision.
#[derive(Debug)]
pub struct Checkout {
    dir: TempDir,
    pub revision: String,
}

impl Checkout {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Fetch `git_ref` from `url` and check out `pinned` (or the ref's tip).
///
/// Tries a depth-1 fetch first. If that fetch, or the checkout after it,
/// fails, retries with full history. A pinned revision still missing after
/// the full fetch is reported as [`SyncError::StaleRevision`].
pub fn fetch_revision(
    vcs: &dyn VcsClient,
    url: &str,
    git_ref: &str,
    pinned: Option<&str>,
    cancel: &CancelFlag,
) -> Result<Checkout, SyncError> {
    let dir = tempfile::Builder::new()
        .prefix("gvendor-")
        .tempdir()
        .map_err(|e| io_err(std::env::temp_dir(), e))?;
    let fetch_failed = |e: VcsError| match e {
        VcsError::Cancelled => SyncError::Cancelled,
        other => SyncError::Fetch {
            url: url.to_string(),
            git_ref: git_ref.to_string(),
            message: other.to_string(),
        },
    };

    vcs.init(dir.path(), cancel).map_err(fetch_failed)?;

    let target = pinned.unwrap_or(git_ref);
    let checkout_target = pinned.unwrap_or("FETCH_HEAD");

    let shallow = vcs
        .fetch(dir.path(), url, target, true, cancel)
        .and_then(|()| vcs.checkout(dir.path(), checkout_target, cancel));
    match shallow {
        Ok(()) => {}
        Err(VcsError::Cancelled) => return Err(SyncError::Cancelled),
        Err(e) => {
            tracing::warn!("shallow fetch of {url}@{target} failed ({e}); retrying with full history");
            vcs.fetch(dir.path(), url, git_ref, false, cancel)
                .map_err(fetch_failed)?;
            match vcs.checkout(dir.path(), checkout_target, cancel) {
                Ok(()) => {}
                Err(VcsError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    return Err(match pinned {
                        Some(revision) => SyncError::StaleRevision {
                            url: url.to_string(),
                            revision: revision.to_string(),
                        },
                        None => fetch_failed(e),
                    })
                }
            }
        }
    }

    let revision = vcs
        .resolve(dir.path(), "HEAD", cancel)
        .map_err(fetch_failed)?;
    tracing::debug!("{url}@{git_ref} checked out at {revision}");
    Ok(Checkout { dir, revision })
}
