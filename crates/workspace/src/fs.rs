//! Filesystem workspace over a checked-out repository.

use async_trait::async_trait;
use patchwright_core::error::WorkspaceError;
use patchwright_core::store::FileCache;
use patchwright_core::workspace::Workspace;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::diff::{DiffMode, unified_diff};

/// What `diff()` compares the working tree against.
enum Baseline {
    /// Files already modified (per `git status`) when the workspace opened
    Git { modified_at_open: HashSet<PathBuf> },
    /// Text content of every file at open time
    Snapshot(BTreeMap<PathBuf, String>),
}

struct CacheBinding {
    cache: Arc<dyn FileCache>,
    repo: String,
    revision: String,
}

/// A [`Workspace`] backed by a real directory.
///
/// Files this workspace writes are tracked as dirty; dirty files never go
/// through the content cache.
pub struct FsWorkspace {
    root: PathBuf,
    baseline: Baseline,
    cache: Option<CacheBinding>,
    dirty: Mutex<HashSet<PathBuf>>,
}

impl FsWorkspace {
    /// Open a git checkout. Diffs are computed with `git diff HEAD`.
    pub async fn open_git(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        if !root.join(".git").exists() {
            return Err(WorkspaceError::Unavailable(format!(
                "{} is not a git checkout",
                root.display()
            )));
        }

        let status = run_git(&root, &["status", "--porcelain", "-uall", "-z"]).await?;
        let modified_at_open = parse_porcelain_z(&status);
        debug!(
            root = %root.display(),
            modified = modified_at_open.len(),
            "Opened git workspace"
        );

        Ok(Self {
            root,
            baseline: Baseline::Git { modified_at_open },
            cache: None,
            dirty: Mutex::new(HashSet::new()),
        })
    }

    /// Open any directory, snapshotting its text files for later diffs.
    pub async fn open_snapshot(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let walk_root = root.clone();
        let snapshot = tokio::task::spawn_blocking(move || snapshot_tree(&walk_root))
            .await
            .map_err(|e| WorkspaceError::Unavailable(format!("snapshot task failed: {e}")))??;
        debug!(root = %root.display(), files = snapshot.len(), "Opened snapshot workspace");

        Ok(Self {
            root,
            baseline: Baseline::Snapshot(snapshot),
            cache: None,
            dirty: Mutex::new(HashSet::new()),
        })
    }

    pub async fn open(root: impl Into<PathBuf>, mode: DiffMode) -> Result<Self, WorkspaceError> {
        match mode {
            DiffMode::Git => Self::open_git(root).await,
            DiffMode::Snapshot => Self::open_snapshot(root).await,
        }
    }

    /// Serve reads of unmodified files through `cache`, keyed by
    /// (`repo`, `revision`, path).
    pub fn with_cache(
        mut self,
        cache: Arc<dyn FileCache>,
        repo: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        self.cache = Some(CacheBinding {
            cache,
            repo: repo.into(),
            revision: revision.into(),
        });
        self
    }

    pub fn diff_mode(&self) -> DiffMode {
        match self.baseline {
            Baseline::Git { .. } => DiffMode::Git,
            Baseline::Snapshot(_) => DiffMode::Snapshot,
        }
    }

    async fn is_clean(&self, path: &Path) -> bool {
        if let Baseline::Git { modified_at_open } = &self.baseline
            && modified_at_open.contains(path)
        {
            return false;
        }
        !self.dirty.lock().await.contains(path)
    }

    async fn mark_dirty(&self, path: &Path) {
        self.dirty.lock().await.insert(path.to_path_buf());
    }

    async fn ensure_file(&self, path: &Path) -> Result<PathBuf, WorkspaceError> {
        let absolute = self.root.join(path);
        let meta = tokio::fs::metadata(&absolute)
            .await
            .map_err(|e| WorkspaceError::from_io(path, e))?;
        if !meta.is_file() {
            return Err(WorkspaceError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(absolute)
    }

    async fn git_diff(&self) -> Result<String, WorkspaceError> {
        // Untracked files only show up in `git diff` once they are in the index
        run_git(&self.root, &["add", "--intent-to-add", "--all"]).await?;
        run_git(&self.root, &["diff", "--no-color", "--no-ext-diff", "HEAD"]).await
    }

    async fn snapshot_diff(&self, snapshot: &BTreeMap<PathBuf, String>) -> Result<String, WorkspaceError> {
        let dirty: BTreeSet<PathBuf> = self.dirty.lock().await.iter().cloned().collect();

        let mut out = String::new();
        for path in dirty {
            let before = snapshot.get(&path).map(String::as_str);
            let after = match tokio::fs::read(self.root.join(&path)).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => Some(text),
                    Err(_) => continue,
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(WorkspaceError::from_io(&path, e)),
            };
            out.push_str(&unified_diff(&path_key(&path), before, after.as_deref()));
        }
        Ok(out)
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, WorkspaceError> {
        let absolute = self.ensure_file(path).await?;

        let binding = if self.is_clean(path).await {
            self.cache.as_ref()
        } else {
            None
        };
        let key = path_key(path);

        if let Some(b) = binding {
            match b.cache.cached_file(&b.repo, &b.revision, &key).await {
                Ok(Some(entry)) => {
                    debug!(path = %key, "File cache hit");
                    return Ok(entry.content.into_bytes());
                }
                Ok(None) => {}
                Err(e) => warn!(path = %key, error = %e, "File cache lookup failed"),
            }
        }

        let bytes = tokio::fs::read(&absolute)
            .await
            .map_err(|e| WorkspaceError::from_io(path, e))?;

        if let Some(b) = binding
            && let Ok(text) = std::str::from_utf8(&bytes)
            && let Err(e) = b.cache.cache_file(&b.repo, &b.revision, &key, text).await
        {
            warn!(path = %key, error = %e, "File cache store failed");
        }

        Ok(bytes)
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), WorkspaceError> {
        let absolute = self.ensure_file(path).await?;
        self.mark_dirty(path).await;
        tokio::fs::write(&absolute, content)
            .await
            .map_err(|e| WorkspaceError::from_io(path, e))
    }

    async fn create(&self, path: &Path, content: &str) -> Result<(), WorkspaceError> {
        let absolute = self.root.join(path);
        if tokio::fs::symlink_metadata(&absolute).await.is_ok() {
            return Err(WorkspaceError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::from_io(path, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&absolute)
            .await
            .map_err(|e| WorkspaceError::from_io(path, e))?;
        self.mark_dirty(path).await;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| WorkspaceError::from_io(path, e))?;
        file.flush()
            .await
            .map_err(|e| WorkspaceError::from_io(path, e))
    }

    async fn list(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_tree(&root))
            .await
            .map_err(|e| WorkspaceError::Unavailable(format!("listing task failed: {e}")))?
    }

    async fn diff(&self) -> Result<String, WorkspaceError> {
        match &self.baseline {
            Baseline::Git { .. } => self.git_diff().await,
            Baseline::Snapshot(snapshot) => self.snapshot_diff(snapshot).await,
        }
    }

    /// A snapshot only knows the tree as it was at open.
    fn baseline_survives_reopen(&self) -> bool {
        matches!(self.baseline, Baseline::Git { .. })
    }
}

/// Forward-slash form of a relative path, as used in diffs and cache keys.
fn path_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_tree(root: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            match e.into_io_error() {
                Some(io) => WorkspaceError::from_io(path, io),
                None => WorkspaceError::Unavailable(format!("filesystem loop at {}", path.display())),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn snapshot_tree(root: &Path) -> Result<BTreeMap<PathBuf, String>, WorkspaceError> {
    let mut snapshot = BTreeMap::new();
    for relative in list_tree(root)? {
        let bytes = std::fs::read(root.join(&relative))
            .map_err(|e| WorkspaceError::from_io(&relative, e))?;
        // Binary files are left out of the snapshot and of diffs
        if let Ok(text) = String::from_utf8(bytes) {
            snapshot.insert(relative, text);
        }
    }
    Ok(snapshot)
}

async fn run_git(root: &Path, args: &[&str]) -> Result<String, WorkspaceError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .await
        .map_err(|e| WorkspaceError::Vcs(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(command = %args.join(" "), exit_code = code, "git failed");
        return Err(WorkspaceError::Vcs(format!(
            "git {} exited with {code}: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Paths named by `git status --porcelain -z`. Rename and copy entries are
/// followed by their source path, which is collected too.
fn parse_porcelain_z(status: &str) -> HashSet<PathBuf> {
    let mut paths = HashSet::new();
    let mut entries = status.split('\0').filter(|e| !e.is_empty());
    while let Some(entry) = entries.next() {
        let Some(path) = entry.get(3..) else { continue };
        paths.insert(PathBuf::from(path));
        if matches!(entry.as_bytes().first(), Some(b'R' | b'C'))
            && let Some(source) = entries.next()
        {
            paths.insert(PathBuf::from(source));
        }
    }
    paths
}
