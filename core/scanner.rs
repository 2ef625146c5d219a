use crate::config::Config;
use crate::descriptor::FileDescriptor;
use crate::error::{AppError, Result};
use crate::extensions::ExtensionRegistry;
use crate::template::Template;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use walkdir::{DirEntry, WalkDir};

/// Capacity of the queue between the directory walk and the workers.
pub const QUEUE_CAPACITY: usize = 1000;

/// Searches shorter than this match every file.
pub const MIN_SEARCH_LEN: usize = 3;

/// Receives the scan percentage in `0.0..=100.0`.
pub type ProgressCallback<'a> = &'a (dyn Fn(f64) + Sync);

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_workers: usize,
    pub batch_size: usize,
    pub excluded_dirs: BTreeSet<String>,
    pub registry: ExtensionRegistry,
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            batch_size: config.batch_size.max(1),
            excluded_dirs: config.excluded_directories.iter().cloned().collect(),
            registry: ExtensionRegistry::with_defaults(&config.supported_extensions),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Shared flag that stops a running scan from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ScanState {
    results: Vec<FileDescriptor>,
    processed: usize,
    /// Known once the walk has finished.
    total: Option<usize>,
}

impl ScanState {
    fn report(&self, progress: Option<ProgressCallback<'_>>, cancel: &CancelHandle) {
        let (Some(total), Some(callback)) = (self.total, progress) else {
            return;
        };
        if cancel.is_cancelled() {
            return;
        }
        let percent = if total == 0 {
            100.0
        } else {
            self.processed as f64 / total as f64 * 100.0
        };
        callback(percent);
    }
}

#[derive(Debug, Default)]
pub struct Scanner {
    options: ScanOptions,
    root: Option<PathBuf>,
    files: Vec<FileDescriptor>,
    cancel: CancelHandle,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Replaces the current result set with the supported files under `root`.
    ///
    /// The walk runs on its own thread and feeds a bounded queue; the calling
    /// thread batches queued paths onto a pool of `max_workers` threads that
    /// stat each file. Progress is reported after every finished batch once
    /// the total is known, so the reported percentage never decreases.
    pub fn scan(
        &mut self,
        root: &Path,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<&[FileDescriptor]> {
        self.files.clear();
        self.root = None;
        self.cancel.reset();

        if !root.is_dir() {
            return Err(AppError::InvalidRoot(root.to_path_buf()));
        }
        log::info!(
            "Scanning {} ({} workers, batches of {})",
            root.display(),
            self.options.max_workers,
            self.options.batch_size
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_workers.max(1))
            .thread_name(|i| format!("codepack-scan-{}", i))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to start scan workers: {}", e)))?;

        let options = &self.options;
        let cancel = &self.cancel;
        let state = Mutex::new(ScanState::default());
        let (tx, rx) = mpsc::sync_channel::<PathBuf>(QUEUE_CAPACITY);

        let walked = thread::scope(|scope| {
            let walker = scope.spawn(move || walk_candidates(root, options, tx, cancel));
            pool.in_place_scope(|s| {
                let batch_size = options.batch_size.max(1);
                let state = &state;
                let permits = BatchPermits::new(options.max_workers.max(1));
                let received = consume_queue(rx, batch_size, cancel, |batch| {
                    let permit = permits.acquire();
                    s.spawn(move |_| {
                        let _permit = permit;
                        process_batch(batch, state, progress, cancel);
                    });
                });
                // The queue is closed, so the walk is over and the total is fixed.
                // Batches that finished before this point are covered by one report.
                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                guard.total = Some(received);
                guard.report(progress, cancel);
            });
            walker
                .join()
                .map_err(|_| AppError::WalkDir("directory walker thread panicked".into()))
        })?;

        let state = state.into_inner().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            log::info!(
                "Scan of {} cancelled after {} of {} files",
                root.display(),
                state.processed,
                walked
            );
            return Err(AppError::ScanCancelled);
        }

        let mut files = state.results;
        files.par_sort_unstable_by(|a, b| a.path.cmp(&b.path));
        log::info!(
            "Scan complete: {} files found ({} candidates)",
            files.len(),
            walked
        );
        self.files = files;
        self.root = Some(root.to_path_buf());
        Ok(&self.files)
    }

    pub fn select_all(&mut self, selected: bool) {
        for file in &mut self.files {
            file.is_selected = selected;
        }
    }

    /// Sets the flag on every listed path that is part of the scan result and
    /// returns how many were found.
    pub fn set_selected<I, P>(&mut self, paths: I, selected: bool) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let wanted: HashSet<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        let mut count = 0;
        for file in self.files.iter_mut().filter(|f| wanted.contains(&f.path)) {
            file.is_selected = selected;
            count += 1;
        }
        count
    }

    pub fn selected_files(&self) -> Vec<FileDescriptor> {
        self.files
            .iter()
            .filter(|f| f.is_selected)
            .cloned()
            .collect()
    }

    pub fn get_file_by_path(&self, path: &Path) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn filter(&self, text: &str) -> Vec<&FileDescriptor> {
        let text = text.trim();
        if text.chars().count() < MIN_SEARCH_LEN {
            return self.files.iter().collect();
        }
        self.files
            .iter()
            .filter(|f| f.matches_search(text))
            .collect()
    }

    /// Selects every file whose root-relative path matches one of `patterns`.
    pub fn select_matching_globs(&mut self, patterns: &[String]) -> Result<usize> {
        let set = build_glob_set(patterns)?;
        let Some(root) = self.root.clone() else {
            return Ok(0);
        };
        let mut count = 0;
        for file in &mut self.files {
            let relative =
                pathdiff::diff_paths(&file.path, &root).unwrap_or_else(|| file.path.clone());
            if set.is_match(&relative) {
                log::trace!("Glob selected {}", relative.display());
                file.is_selected = true;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Selects every file the template matches and returns how many that was.
    pub fn apply_template(&mut self, template: &Template) -> usize {
        let mut count = 0;
        for file in self.files.iter_mut().filter(|f| template.matches_file(f)) {
            file.is_selected = true;
            count += 1;
        }
        log::debug!("Template '{}' selected {} files", template.name, count);
        count
    }
}

/// Caps the batches handed to the pool and not yet finished. Once every
/// permit is out the consumer stops draining the queue, so the walker blocks
/// on the bounded channel instead of piling work onto the pool.
struct BatchPermits {
    release: SyncSender<()>,
    acquire: Receiver<()>,
}

impl BatchPermits {
    fn new(count: usize) -> Self {
        let (release, acquire) = mpsc::sync_channel(count);
        for _ in 0..count {
            let _ = release.try_send(());
        }
        Self { release, acquire }
    }

    /// Blocks until an earlier batch has finished.
    fn acquire(&self) -> BatchPermit {
        // `self.release` keeps the channel open, so this only returns on a token.
        let _ = self.acquire.recv();
        BatchPermit(self.release.clone())
    }
}

/// Returns its slot when dropped, including when the batch panics.
struct BatchPermit(SyncSender<()>);

impl Drop for BatchPermit {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Reads queued paths into batches and hands each full batch to `dispatch`.
/// Dropping the receiver on exit unblocks a walker waiting on a full queue.
fn consume_queue<F>(
    rx: Receiver<PathBuf>,
    batch_size: usize,
    cancel: &CancelHandle,
    mut dispatch: F,
) -> usize
where
    F: FnMut(Vec<PathBuf>),
{
    let mut received = 0;
    let mut batch = Vec::with_capacity(batch_size);
    for path in rx.iter() {
        if cancel.is_cancelled() {
            log::debug!("Scan cancelled, no more batches are queued");
            return received;
        }
        received += 1;
        batch.push(path);
        if batch.len() >= batch_size {
            dispatch(mem::replace(&mut batch, Vec::with_capacity(batch_size)));
        }
    }
    if !batch.is_empty() && !cancel.is_cancelled() {
        dispatch(batch);
    }
    received
}

fn process_batch(
    batch: Vec<PathBuf>,
    state: &Mutex<ScanState>,
    progress: Option<ProgressCallback<'_>>,
    cancel: &CancelHandle,
) {
    let count = batch.len();
    let descriptors: Vec<FileDescriptor> = batch
        .into_iter()
        .filter_map(|path| match FileDescriptor::stat(&path) {
            Ok(descriptor) => Some(descriptor),
            Err(AppError::FileRead { path, source })
                if source.kind() == io::ErrorKind::PermissionDenied =>
            {
                log::warn!("Permission denied reading {}, skipping", path.display());
                None
            }
            Err(e) => {
                log::error!("Dropping {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    guard.results.extend(descriptors);
    guard.processed += count;
    guard.report(progress, cancel);
}

fn walk_candidates(
    root: &Path,
    options: &ScanOptions,
    tx: SyncSender<PathBuf>,
    cancel: &CancelHandle,
) -> usize {
    let mut enqueued = 0;
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry, &options.excluded_dirs));

    for entry in walker {
        if cancel.is_cancelled() {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let denied = e
                    .io_error()
                    .is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied);
                if denied {
                    log::warn!("Permission denied while walking: {}", e);
                } else {
                    log::error!("Error walking directory: {}", e);
                }
                continue;
            }
        };
        // Symlinked files count; symlinked directories are not descended.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        if !options.registry.is_supported_path(entry.path()) {
            log::trace!("Unsupported extension: {}", entry.path().display());
            continue;
        }
        if tx.send(entry.into_path()).is_err() {
            log::debug!("Scan queue closed, stopping walk early");
            break;
        }
        enqueued += 1;
    }
    log::debug!("Directory walk finished with {} candidates", enqueued);
    enqueued
}

fn is_skipped_dir(entry: &DirEntry, excluded: &BTreeSet<String>) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    let skip = name.starts_with('.') || excluded.contains(name.as_ref());
    if skip {
        log::trace!("Skipping directory {}", entry.path().display());
    }
    skip
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let mut processed = pattern.trim().replace('\\', "/");
        if processed.ends_with('/') && processed.len() > 1 {
            processed.push_str("**");
        }
        let glob = Glob::new(&processed).map_err(|e| {
            AppError::Glob(format!(
                "Invalid glob pattern \"{}\" (processed as \"{}\"): {}",
                pattern, processed, e
            ))
        })?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("// {}\n", rel)).unwrap();
        path
    }

    fn options(workers: usize, batch: usize) -> ScanOptions {
        ScanOptions {
            max_workers: workers,
            batch_size: batch,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn invalid_root_fails_without_results() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "a.py");
        let mut scanner = Scanner::default();
        assert!(matches!(
            scanner.scan(&dir.path().join("missing"), None),
            Err(AppError::InvalidRoot(_))
        ));
        assert!(matches!(
            scanner.scan(&file, None),
            Err(AppError::InvalidRoot(_))
        ));
        assert!(scanner.files().is_empty());
    }

    #[test]
    fn filters_extensions_and_skipped_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/a.py");
        touch(dir.path(), "src/App.TSX");
        touch(dir.path(), "src/readme.md");
        touch(dir.path(), "dist/bundle.js");
        touch(dir.path(), ".cache/x.py");
        touch(dir.path(), "lib/.hidden/y.py");

        let mut scanner = Scanner::new(options(2, 1));
        let names: BTreeSet<String> = scanner
            .scan(dir.path(), None)
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, BTreeSet::from(["App.TSX".into(), "a.py".into()]));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_included() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = touch(outside.path(), "shared.py");
        std::os::unix::fs::symlink(&target, dir.path().join("linked.py")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked_dir")).unwrap();
        touch(dir.path(), "own.py");

        let mut scanner = Scanner::default();
        let names: BTreeSet<String> = scanner
            .scan(dir.path(), None)
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, BTreeSet::from(["linked.py".into(), "own.py".into()]));
    }

    #[test]
    fn rescan_discards_previous_results() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(first.path(), "one.py");
        touch(first.path(), "two.py");
        touch(second.path(), "three.cs");

        let mut scanner = Scanner::default();
        assert_eq!(scanner.scan(first.path(), None).unwrap().len(), 2);
        scanner.select_all(true);
        let files = scanner.scan(second.path(), None).unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].is_selected);
        assert_eq!(scanner.root(), Some(second.path()));
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_100() {
        let dir = TempDir::new().unwrap();
        for i in 0..25 {
            touch(dir.path(), &format!("pkg{}/f{}.py", i % 4, i));
        }
        let seen = Mutex::new(Vec::new());
        let record = |p: f64| seen.lock().unwrap().push(p);

        let mut scanner = Scanner::new(options(3, 4));
        scanner.scan(dir.path(), Some(&record)).unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[test]
    fn busy_workers_hold_back_the_queue_consumer() {
        let dir = TempDir::new().unwrap();
        let total = QUEUE_CAPACITY + 500;
        for i in 0..total {
            touch(dir.path(), &format!("pkg{}/f{}.py", i % 10, i));
        }
        let first = Mutex::new(None);
        let record = |p: f64| {
            first.lock().unwrap().get_or_insert(p);
        };

        let mut scanner = Scanner::new(options(1, 1));
        assert_eq!(scanner.scan(dir.path(), Some(&record)).unwrap().len(), total);

        // The first report comes once the queue is drained. With a single
        // permit at most one batch can still be running at that point.
        let first = first.into_inner().unwrap().unwrap();
        let floor = (total - 1) as f64 / total as f64 * 100.0;
        assert!(first >= floor, "first report {} below {}", first, floor);
    }

    #[test]
    fn permits_block_until_released() {
        let permits = BatchPermits::new(2);
        let a = permits.acquire();
        let _b = permits.acquire();
        assert!(permits.acquire.try_recv().is_err());
        drop(a);
        assert!(permits.acquire.try_recv().is_ok());
    }

    #[test]
    fn empty_tree_reports_completion() {
        let dir = TempDir::new().unwrap();
        let calls = AtomicUsize::new(0);
        let record = |p: f64| {
            assert_eq!(p, 100.0);
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let mut scanner = Scanner::default();
        assert!(scanner.scan(dir.path(), Some(&record)).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_scan_returns_no_results() {
        let dir = TempDir::new().unwrap();
        for i in 0..50 {
            touch(dir.path(), &format!("f{}.py", i));
        }
        let mut scanner = Scanner::new(options(1, 1));
        let handle = scanner.cancel_handle();
        let after_cancel = AtomicUsize::new(0);
        let cancel_on_first = |_: f64| {
            if handle.is_cancelled() {
                after_cancel.fetch_add(1, Ordering::SeqCst);
            }
            handle.cancel();
        };
        // Progress only starts once the walk is done, so cancel from the first callback.
        let result = scanner.scan(dir.path(), Some(&cancel_on_first));
        assert!(matches!(result, Err(AppError::ScanCancelled)));
        assert!(scanner.files().is_empty());
        assert_eq!(after_cancel.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn selection_operations() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "app/service/Billing.java");
        let b = touch(dir.path(), "app/web/index.ts");
        touch(dir.path(), "tools/gen.py");

        let mut scanner = Scanner::default();
        scanner.scan(dir.path(), None).unwrap();

        assert_eq!(scanner.set_selected([&a, &dir.path().join("nope.py")], true), 1);
        assert_eq!(scanner.selected_files().len(), 1);
        assert!(scanner.get_file_by_path(&a).unwrap().is_selected);

        assert_eq!(scanner.filter("bi").len(), 3);
        assert_eq!(scanner.filter("billing").len(), 1);
        assert_eq!(scanner.filter("SERVICE").len(), 1);

        scanner.select_all(false);
        let n = scanner
            .select_matching_globs(&["app/**/*.ts".to_string(), "tools/".to_string()])
            .unwrap();
        assert_eq!(n, 2);
        assert!(scanner.get_file_by_path(&b).unwrap().is_selected);
        assert!(!scanner.get_file_by_path(&a).unwrap().is_selected);

        assert!(matches!(
            scanner.select_matching_globs(&["a[".to_string()]),
            Err(AppError::Glob(_))
        ));
    }
}
