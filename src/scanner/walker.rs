//! Profile-tree walker: lazy file enumeration that never fails.
//!
//! Unreadable directories and entries are recorded as [`WalkIssue`]s and the
//! walk moves on. Reparse points (symlinks, junctions, mount points) below the
//! root are never followed, which keeps redirected folders from being counted
//! twice and breaks `Application Data`-style junction loops. The root itself
//! is always resolved, so a profile folder that is a junction is still walked.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::fs::{self, Metadata, ReadDir};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{RecvTimeoutError, unbounded};
use parking_lot::Mutex;

/// `FILE_ATTRIBUTE_SYSTEM`.
const FILE_ATTRIBUTE_SYSTEM: u32 = 0x0004;
/// `FILE_ATTRIBUTE_REPARSE_POINT`.
const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x0400;

/// Traversal switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub skip_reparse_points: bool,
    pub skip_system_files: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            skip_reparse_points: true,
            skip_system_files: false,
        }
    }
}

/// One regular file seen during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub last_write: SystemTime,
    pub size_bytes: u64,
}

/// A node that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkIssue {
    pub path: PathBuf,
    pub details: String,
}

impl WalkIssue {
    fn new(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            details: error.to_string(),
        }
    }
}

/// Depth-first lazy walk over the files under one root.
///
/// Files of a directory are yielded before any of its subdirectories are
/// opened, so a caller that stops early never pays for deeper levels.
#[derive(Debug)]
pub struct FileWalker {
    options: WalkOptions,
    pending_dirs: Vec<PathBuf>,
    current: Option<(PathBuf, ReadDir)>,
    deferred_dirs: VecDeque<PathBuf>,
    issues: Vec<WalkIssue>,
    root_file: Option<FileEntry>,
}

impl FileWalker {
    #[must_use]
    pub fn new(root: impl AsRef<Path>, options: WalkOptions) -> Self {
        let root = root.as_ref();
        let mut walker = Self {
            options,
            pending_dirs: Vec::new(),
            current: None,
            deferred_dirs: VecDeque::new(),
            issues: Vec::new(),
            root_file: None,
        };
        match classify_root(root, options) {
            Ok((NodeKind::Dir, _)) => walker.pending_dirs.push(root.to_path_buf()),
            Ok((NodeKind::File, meta)) => walker.root_file = Some(file_entry(root, &meta)),
            Ok((NodeKind::Skip, _)) => {}
            Err(issue) => walker.issues.push(issue),
        }
        walker
    }

    /// Nodes that could not be read so far.
    #[must_use]
    pub fn issues(&self) -> &[WalkIssue] {
        &self.issues
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<WalkIssue> {
        self.issues
    }

    fn open_next_dir(&mut self) -> bool {
        // Subdirectories found in the directory just finished go on the
        // stack in discovery order, so the walk stays depth-first.
        while let Some(dir) = self.deferred_dirs.pop_back() {
            self.pending_dirs.push(dir);
        }
        while let Some(dir) = self.pending_dirs.pop() {
            match fs::read_dir(&dir) {
                Ok(read_dir) => {
                    self.current = Some((dir, read_dir));
                    return true;
                }
                Err(e) => self.issues.push(WalkIssue::new(&dir, &e)),
            }
        }
        false
    }
}

impl Iterator for FileWalker {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        if let Some(entry) = self.root_file.take() {
            return Some(entry);
        }
        loop {
            let Some((dir, read_dir)) = self.current.as_mut() else {
                if self.open_next_dir() {
                    continue;
                }
                return None;
            };
            match read_dir.next() {
                Some(Ok(entry)) => {
                    let path = entry.path();
                    // DirEntry metadata does not traverse links.
                    let meta = match entry.metadata() {
                        Ok(meta) => meta,
                        Err(e) => {
                            self.issues.push(WalkIssue::new(&path, &e));
                            continue;
                        }
                    };
                    match classify(&meta, self.options) {
                        NodeKind::Dir => self.deferred_dirs.push_back(path),
                        NodeKind::File => return Some(file_entry(&path, &meta)),
                        NodeKind::Skip => {}
                    }
                }
                Some(Err(e)) => {
                    let dir = dir.clone();
                    self.issues.push(WalkIssue::new(dir, &e));
                }
                None => self.current = None,
            }
        }
    }
}

/// Total file bytes under `root`, walking directories on `parallelism`
/// worker threads. Returns the sum and every node that could not be read.
pub fn parallel_total_size(
    root: &Path,
    options: WalkOptions,
    parallelism: usize,
) -> (u64, Vec<WalkIssue>) {
    if parallelism <= 1 {
        let mut walker = FileWalker::new(root, options);
        let total = walker
            .by_ref()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.size_bytes));
        return (total, walker.into_issues());
    }

    match classify_root(root, options) {
        Ok((NodeKind::Dir, _)) => {}
        Ok((NodeKind::File, meta)) => return (meta.len(), Vec::new()),
        Ok((NodeKind::Skip, _)) => return (0, Vec::new()),
        Err(issue) => return (0, vec![issue]),
    }

    let total = AtomicU64::new(0);
    let pending = AtomicUsize::new(1);
    let issues = Mutex::new(Vec::new());
    let (tx, rx) = unbounded::<PathBuf>();
    // Cannot fail: the receiver is alive for the whole scope.
    let _ = tx.send(root.to_path_buf());

    thread::scope(|scope| {
        for _ in 0..parallelism {
            let tx = tx.clone();
            let rx = rx.clone();
            let (total, pending, issues) = (&total, &pending, &issues);
            scope.spawn(move || {
                loop {
                    match rx.recv_timeout(Duration::from_millis(10)) {
                        Ok(dir) => {
                            size_one_dir(&dir, options, &tx, total, pending, issues);
                            pending.fetch_sub(1, Ordering::AcqRel);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if pending.load(Ordering::Acquire) == 0 {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });
        }
    });

    (total.into_inner(), issues.into_inner())
}

fn size_one_dir(
    dir: &Path,
    options: WalkOptions,
    tx: &crossbeam_channel::Sender<PathBuf>,
    total: &AtomicU64,
    pending: &AtomicUsize,
    issues: &Mutex<Vec<WalkIssue>>,
) {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            issues.lock().push(WalkIssue::new(dir, &e));
            return;
        }
    };
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                issues.lock().push(WalkIssue::new(dir, &e));
                continue;
            }
        };
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                issues.lock().push(WalkIssue::new(&path, &e));
                continue;
            }
        };
        match classify(&meta, options) {
            NodeKind::Dir => {
                pending.fetch_add(1, Ordering::AcqRel);
                if tx.send(path).is_err() {
                    pending.fetch_sub(1, Ordering::AcqRel);
                }
            }
            NodeKind::File => {
                total.fetch_add(meta.len(), Ordering::Relaxed);
            }
            NodeKind::Skip => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Dir,
    File,
    Skip,
}

fn classify(meta: &Metadata, options: WalkOptions) -> NodeKind {
    let attributes = file_attributes(meta);
    let reparse =
        meta.file_type().is_symlink() || attributes & FILE_ATTRIBUTE_REPARSE_POINT != 0;
    if reparse && options.skip_reparse_points {
        return NodeKind::Skip;
    }
    if meta.is_dir() {
        return NodeKind::Dir;
    }
    if !meta.is_file() {
        // Sockets, fifos, devices, and links when not skipping reparse points.
        return NodeKind::Skip;
    }
    if options.skip_system_files && attributes & FILE_ATTRIBUTE_SYSTEM != 0 {
        return NodeKind::Skip;
    }
    NodeKind::File
}

/// Classifies the walk root after resolving links. A dangling root link is an
/// issue, not an empty tree.
fn classify_root(root: &Path, options: WalkOptions) -> Result<(NodeKind, Metadata), WalkIssue> {
    let meta = fs::metadata(root).map_err(|e| WalkIssue::new(root, &e))?;
    let options = WalkOptions {
        skip_reparse_points: false,
        ..options
    };
    Ok((classify(&meta, options), meta))
}

fn file_entry(path: &Path, meta: &Metadata) -> FileEntry {
    FileEntry {
        path: path.to_path_buf(),
        last_write: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        size_bytes: meta.len(),
    }
}

#[cfg(windows)]
fn file_attributes(meta: &Metadata) -> u32 {
    use std::os::windows::fs::MetadataExt;
    meta.file_attributes()
}

#[cfg(not(windows))]
fn file_attributes(_meta: &Metadata) -> u32 {
    0
}
