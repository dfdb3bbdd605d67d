//! In-memory VCS double for driving sync without a network.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use gvendor_core::{HookSpec, PathMapping, RefSpec, VendorName, VendorSpec};
use gvendor_sync::{CancelFlag, VcsClient, VcsError};

/// One fake remote: revisions with full file trees, and refs pointing at
/// them.
#[derive(Debug, Default, Clone)]
pub struct FakeRepo {
    pub revisions: HashMap<String, BTreeMap<String, Vec<u8>>>,
    pub refs: HashMap<String, String>,
    /// Revisions a depth-1 fetch cannot reach.
    pub deep: HashSet<String>,
}

impl FakeRepo {
    pub fn with_revision(mut self, rev: &str, files: &[(&str, &str)]) -> Self {
        self.revisions.insert(
            rev.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect(),
        );
        self
    }

    pub fn with_deep_revision(mut self, rev: &str, files: &[(&str, &str)]) -> Self {
        self.deep.insert(rev.to_string());
        self.with_revision(rev, files)
    }

    pub fn with_ref(mut self, name: &str, rev: &str) -> Self {
        self.refs.insert(name.to_string(), rev.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct DirState {
    fetched: HashSet<String>,
    fetch_head: Option<String>,
    head: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeVcs {
    repos: Mutex<HashMap<String, FakeRepo>>,
    dirs: Mutex<HashMap<PathBuf, DirState>>,
    pub shallow_fetches: AtomicUsize,
    pub full_fetches: AtomicUsize,
    pub ls_remote_calls: AtomicUsize,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, url: &str, repo: FakeRepo) -> Self {
        self.repos.lock().unwrap().insert(url.to_string(), repo);
        self
    }

    /// Point `name` at `rev` on an existing remote.
    pub fn move_ref(&self, url: &str, name: &str, rev: &str) {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.get_mut(url).expect("known repo");
        repo.refs.insert(name.to_string(), rev.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.shallow_fetches.load(Ordering::SeqCst) + self.full_fetches.load(Ordering::SeqCst)
    }

    fn fail(command: &str, stderr: &str) -> VcsError {
        VcsError::Command {
            command: command.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

impl VcsClient for FakeVcs {
    fn init(&self, dir: &Path, cancel: &CancelFlag) -> Result<(), VcsError> {
        if cancel.is_cancelled() {
            return Err(VcsError::Cancelled);
        }
        self.dirs
            .lock()
            .unwrap()
            .insert(dir.to_path_buf(), DirState::default());
        Ok(())
    }

    fn fetch(
        &self,
        dir: &Path,
        url: &str,
        git_ref: &str,
        shallow: bool,
        cancel: &CancelFlag,
    ) -> Result<(), VcsError> {
        if cancel.is_cancelled() {
            return Err(VcsError::Cancelled);
        }
        if shallow {
            self.shallow_fetches.fetch_add(1, Ordering::SeqCst);
        } else {
            self.full_fetches.fetch_add(1, Ordering::SeqCst);
        }
        let repos = self.repos.lock().unwrap();
        let repo = repos
            .get(url)
            .ok_or_else(|| Self::fail("fetch", "repository not found"))?;

        let rev = match repo.refs.get(git_ref) {
            Some(rev) => rev.clone(),
            None if repo.revisions.contains_key(git_ref) => git_ref.to_string(),
            None => return Err(Self::fail("fetch", "couldn't find remote ref")),
        };
        if shallow && repo.deep.contains(&rev) {
            return Err(Self::fail("fetch", "unadvertised object"));
        }

        let mut dirs = self.dirs.lock().unwrap();
        let state = dirs.get_mut(dir).ok_or_else(|| Self::fail("fetch", "not a repository"))?;
        if shallow {
            state.fetched.insert(rev.clone());
        } else {
            state.fetched.extend(repo.revisions.keys().cloned());
        }
        state.fetch_head = Some(rev);
        Ok(())
    }

    fn checkout(&self, dir: &Path, revision: &str, cancel: &CancelFlag) -> Result<(), VcsError> {
        if cancel.is_cancelled() {
            return Err(VcsError::Cancelled);
        }
        // Locks are taken one at a time; fetch holds repos then dirs.
        let rev = {
            let dirs = self.dirs.lock().unwrap();
            let state = dirs.get(dir).ok_or_else(|| Self::fail("checkout", "not a repository"))?;
            let rev = if revision == "FETCH_HEAD" {
                state
                    .fetch_head
                    .clone()
                    .ok_or_else(|| Self::fail("checkout", "no FETCH_HEAD"))?
            } else {
                revision.to_string()
            };
            if !state.fetched.contains(&rev) {
                return Err(Self::fail("checkout", "reference is not a tree"));
            }
            rev
        };

        let files = self
            .repos
            .lock()
            .unwrap()
            .values()
            .find_map(|r| r.revisions.get(&rev).cloned())
            .ok_or_else(|| Self::fail("checkout", "unknown revision"))?;
        for (path, content) in &files {
            let target = dir.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }

        if let Some(state) = self.dirs.lock().unwrap().get_mut(dir) {
            state.head = Some(rev);
        }
        Ok(())
    }

    fn resolve(&self, dir: &Path, git_ref: &str, _cancel: &CancelFlag) -> Result<String, VcsError> {
        assert_eq!(git_ref, "HEAD");
        self.dirs
            .lock()
            .unwrap()
            .get(dir)
            .and_then(|s| s.head.clone())
            .ok_or_else(|| Self::fail("rev-parse", "no HEAD"))
    }

    fn ls_remote(
        &self,
        url: &str,
        git_ref: &str,
        _cancel: &CancelFlag,
    ) -> Result<Option<String>, VcsError> {
        self.ls_remote_calls.fetch_add(1, Ordering::SeqCst);
        let repos = self.repos.lock().unwrap();
        Ok(repos.get(url).and_then(|r| r.refs.get(git_ref).cloned()))
    }
}

// ---------------------------------------------------------------------------
// Config builders
// ---------------------------------------------------------------------------

pub fn url(name: &str) -> String {
    format!("https://example.com/{name}.git")
}

pub fn vendor(name: &str, git_ref: &str, mappings: &[(&str, &str)]) -> VendorSpec {
    VendorSpec {
        name: VendorName::from(name),
        url: url(name),
        license: "MIT".to_string(),
        groups: vec![],
        hooks: None,
        specs: vec![RefSpec {
            git_ref: git_ref.to_string(),
            default_target: String::new(),
            mapping: mappings
                .iter()
                .map(|(from, to)| PathMapping::new(*from, *to))
                .collect(),
        }],
    }
}

pub fn with_hooks(mut spec: VendorSpec, pre: Option<&str>, post: Option<&str>) -> VendorSpec {
    spec.hooks = Some(HookSpec {
        pre_sync: pre.map(str::to_string),
        post_sync: post.map(str::to_string),
    });
    spec
}

/// `line1\nline2\n...lineN\n`
pub fn numbered_lines(n: usize) -> String {
    (1..=n).map(|i| format!("line{i}\n")).collect()
}
