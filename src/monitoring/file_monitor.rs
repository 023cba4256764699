//! File Monitor
//!
//! Watches workflow directories for structural changes and tails log
//! files for appended lines.
//!
//! Two threads run while the monitor is started: the `notify` watcher
//! thread, which reports raw filesystem events, and a polling thread,
//! which reads new lines from every tailed file once per poll interval.
//! Each new line is parsed and handed to the injected [`LogProcessor`],
//! or recorded in the [`StateManager`] against the file's workflow when
//! no processor is set.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::json;

use super::tailer::TailedFile;
use crate::config::Config;
use crate::error::MonitorError;
use crate::events::{Event, EventBus, FILE_CHANGED, LOG_LINE_ADDED};
use crate::logs::{parse_log_line, LogProcessor};
use crate::state::StateManager;

/// Extensions of files registered for tailing when a directory is watched.
pub const LOG_EXTENSIONS: &[&str] = &["log", "out", "err"];

/// Longest `stop` waits for the polling thread.
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Maps a raw filesystem event kind to the change name reported downstream.
pub fn change_kind(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(_) => Some("created"),
        EventKind::Modify(ModifyKind::Name(_)) => Some("moved"),
        EventKind::Modify(_) => Some("modified"),
        EventKind::Remove(_) => Some("deleted"),
        _ => None,
    }
}

/// Directory watched for a path: the path itself for directories, the
/// parent for files.
fn watch_target(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        path.to_path_buf()
    }
}

/// Watched directory for `path`: its own watch target if that is watched,
/// otherwise the directory recorded when `path` itself was added. The
/// second lookup covers files deleted after they were added.
fn resolve_watched(watched: &BTreeMap<PathBuf, PathBuf>, path: &Path) -> Option<PathBuf> {
    let target = watch_target(path);
    if watched.contains_key(&target) {
        return Some(target);
    }
    watched
        .iter()
        .find(|(_, added)| added.as_path() == path)
        .map(|(target, _)| target.clone())
}

fn is_log_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| LOG_EXTENSIONS.contains(&ext))
}

struct Shared {
    state: Arc<StateManager>,
    bus: Option<Arc<EventBus>>,
    processor: Mutex<Option<Arc<dyn LogProcessor>>>,
    tailed: Mutex<BTreeMap<PathBuf, TailedFile>>,
}

impl Shared {
    fn handle_fs_event(&self, event: notify::Event) {
        let Some(kind) = change_kind(&event.kind) else {
            return;
        };

        for path in &event.paths {
            debug!("File {}: {}", kind, path.display());
            self.state.update_from_file_change(kind, path);
            if let Some(bus) = &self.bus {
                bus.publish(
                    Event::file(
                        FILE_CHANGED,
                        json!({ "event_type": kind, "path": path.display().to_string() }),
                    )
                    .with_source("file_monitor"),
                );
            }
        }
    }

    fn poll_once(&self) -> usize {
        let batches: Vec<(PathBuf, String, Vec<String>)> = {
            let mut tailed = self.tailed.lock();
            tailed
                .values_mut()
                .filter_map(|tail| match tail.read_new_lines() {
                    Ok(lines) if lines.is_empty() => None,
                    Ok(lines) => Some((
                        tail.path().to_path_buf(),
                        tail.workflow_id().to_string(),
                        lines,
                    )),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!("Tailed file {} is missing", tail.path().display());
                        None
                    }
                    Err(e) => {
                        error!("Failed to read tailed file {}: {}", tail.path().display(), e);
                        None
                    }
                })
                .collect()
        };

        let mut delivered = 0;
        for (path, workflow_id, lines) in batches {
            debug!("{} new lines in {}", lines.len(), path.display());
            for line in lines {
                self.deliver(&path, &workflow_id, &line);
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver(&self, path: &Path, workflow_id: &str, line: &str) {
        let record = parse_log_line(line);

        let processor = self.processor.lock().clone();
        match processor {
            Some(processor) => processor.process_line(path, &record),
            None => self.state.add_log_entry(workflow_id, &record, Some(path)),
        }

        if let Some(bus) = &self.bus {
            bus.publish(
                Event::log(
                    LOG_LINE_ADDED,
                    json!({
                        "file_path": path.display().to_string(),
                        "line": line,
                        "timestamp": Utc::now().to_rfc3339(),
                        "workflow_id": workflow_id,
                        "level": record.level,
                    }),
                )
                .with_source("file_monitor"),
            );
        }
    }
}

struct Poller {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Filesystem watcher and log tailer.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rocotoviewer::config::Config;
/// use rocotoviewer::monitoring::FileMonitor;
/// use rocotoviewer::state::StateManager;
///
/// let config = Config::default();
/// let state = Arc::new(StateManager::new(&config));
/// let monitor = FileMonitor::new(&config, state, None);
///
/// monitor.add_path("/scratch/expt");
/// monitor.add_log_file_for_tailing("/scratch/expt/log/gfs.log");
/// monitor.start()?;
/// // ...
/// monitor.stop();
/// # Ok::<(), rocotoviewer::error::MonitorError>(())
/// ```
pub struct FileMonitor {
    shared: Arc<Shared>,
    poll_interval: Duration,
    /// Watched directory -> path it was added as
    watched: Mutex<BTreeMap<PathBuf, PathBuf>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    poller: Mutex<Option<Poller>>,
    running: AtomicBool,
}

impl FileMonitor {
    /// Creates a stopped monitor. Workflow entries in `config` with
    /// `monitor = true` seed the watched directories.
    pub fn new(config: &Config, state: Arc<StateManager>, bus: Option<Arc<EventBus>>) -> Self {
        let monitor = Self {
            shared: Arc::new(Shared {
                state,
                bus,
                processor: Mutex::new(None),
                tailed: Mutex::new(BTreeMap::new()),
            }),
            poll_interval: config.poll_interval(),
            watched: Mutex::new(BTreeMap::new()),
            watcher: Mutex::new(None),
            poller: Mutex::new(None),
            running: AtomicBool::new(false),
        };

        for workflow in config.workflows.iter().filter(|w| w.monitor) {
            monitor.add_path(&workflow.path);
        }
        monitor
    }

    /// Routes parsed lines to `processor` instead of the state manager.
    pub fn with_processor(self, processor: Arc<dyn LogProcessor>) -> Self {
        *self.shared.processor.lock() = Some(processor);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Watches a directory, or a file's parent directory, recursively.
    ///
    /// Returns false if the path does not exist or is already watched.
    /// On a running monitor, log files directly inside the new directory
    /// are registered for tailing.
    pub fn add_path(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Cannot watch {}: path does not exist", path.display());
            return false;
        }

        let target = watch_target(path);
        {
            let mut watched = self.watched.lock();
            if watched.contains_key(&target) {
                debug!("Already watching {}", target.display());
                return false;
            }
            watched.insert(target.clone(), path.to_path_buf());
        }

        if let Some(watcher) = self.watcher.lock().as_mut() {
            if let Err(e) = watcher.watch(&target, RecursiveMode::Recursive) {
                error!("Failed to watch {}: {}", target.display(), e);
                self.watched.lock().remove(&target);
                return false;
            }
        }

        info!("Watching {}", target.display());
        if self.is_running() {
            self.register_log_files(&target);
        }
        true
    }

    /// Stops watching a path added with [`add_path`](Self::add_path), even
    /// if that path has since been deleted.
    pub fn remove_path(&self, path: impl AsRef<Path>) -> bool {
        let target = {
            let mut watched = self.watched.lock();
            let Some(target) = resolve_watched(&watched, path.as_ref()) else {
                return false;
            };
            watched.remove(&target);
            target
        };

        if let Some(watcher) = self.watcher.lock().as_mut() {
            if let Err(e) = watcher.unwatch(&target) {
                debug!("Unwatch of {} failed: {}", target.display(), e);
            }
        }
        info!("Stopped watching {}", target.display());
        true
    }

    pub fn is_monitoring(&self, path: impl AsRef<Path>) -> bool {
        resolve_watched(&self.watched.lock(), path.as_ref()).is_some()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().keys().cloned().collect()
    }

    /// Tails a log file, recording its lines against the workflow named by
    /// the file stem. Only lines appended from now on are delivered.
    pub fn add_log_file_for_tailing(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let workflow_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add_log_file_for_workflow(path, workflow_id)
    }

    /// Tails a log file, recording its lines against `workflow_id`.
    ///
    /// Returns false if the file does not exist or is already tailed.
    pub fn add_log_file_for_workflow(&self, path: impl AsRef<Path>, workflow_id: impl Into<String>) -> bool {
        let path = path.as_ref();
        if !path.is_file() {
            warn!("Cannot tail {}: not a file", path.display());
            return false;
        }

        let mut tailed = self.shared.tailed.lock();
        if tailed.contains_key(path) {
            debug!("Already tailing {}", path.display());
            return false;
        }

        match TailedFile::open(path, workflow_id) {
            Ok(tail) => {
                info!(
                    "Tailing {} from offset {} for workflow '{}'",
                    path.display(),
                    tail.offset(),
                    tail.workflow_id()
                );
                tailed.insert(path.to_path_buf(), tail);
                true
            }
            Err(e) => {
                error!("Failed to tail {}: {}", path.display(), e);
                false
            }
        }
    }

    pub fn remove_log_file_from_tailing(&self, path: impl AsRef<Path>) -> bool {
        let removed = self.shared.tailed.lock().remove(path.as_ref()).is_some();
        if removed {
            info!("Stopped tailing {}", path.as_ref().display());
        }
        removed
    }

    pub fn is_tailing(&self, path: impl AsRef<Path>) -> bool {
        self.shared.tailed.lock().contains_key(path.as_ref())
    }

    pub fn tailed_files(&self) -> Vec<PathBuf> {
        self.shared.tailed.lock().keys().cloned().collect()
    }

    /// Runs one tailing pass over every tailed file. Returns the number of
    /// lines delivered.
    pub fn poll_once(&self) -> usize {
        self.shared.poll_once()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the filesystem watcher and the polling thread. Log files
    /// directly inside watched directories are registered for tailing.
    ///
    /// Calling `start` on a running monitor does nothing.
    pub fn start(&self) -> Result<(), MonitorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("File monitor already running");
            return Ok(());
        }

        match self.start_threads() {
            Ok(()) => {
                info!(
                    "File monitor started: {} watched paths, {} tailed files, poll every {:?}",
                    self.watched.lock().len(),
                    self.shared.tailed.lock().len(),
                    self.poll_interval
                );
                Ok(())
            }
            Err(e) => {
                self.watcher.lock().take();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn start_threads(&self) -> Result<(), MonitorError> {
        let shared = Arc::clone(&self.shared);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => shared.handle_fs_event(event),
            Err(e) => error!("Filesystem watch error: {}", e),
        })?;

        let watched = self.watched_paths();
        for dir in &watched {
            if let Err(e) = watcher.watch(dir, RecursiveMode::Recursive) {
                error!("Failed to watch {}: {}", dir.display(), e);
            }
        }
        *self.watcher.lock() = Some(watcher);

        for dir in watched.iter().filter(|d| d.is_dir()) {
            self.register_log_files(dir);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        let handle = thread::Builder::new()
            .name("rocotoviewer-tail".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        shared.poll_once();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(MonitorError::Spawn)?;

        *self.poller.lock() = Some(Poller { stop_tx, handle });
        Ok(())
    }

    fn register_log_files(&self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", dir.display(), e);
                return;
            }
        };

        for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
            if path.is_file() && is_log_file(&path) && !self.is_tailing(&path) {
                self.add_log_file_for_tailing(&path);
            }
        }
    }

    /// Releases the watcher and stops the polling thread, waiting at most a
    /// few seconds for it to exit. Safe to call repeatedly or before
    /// [`start`](Self::start).
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.watcher.lock().take();

        if let Some(Poller { stop_tx, handle }) = self.poller.lock().take() {
            let _ = stop_tx.send(());
            let deadline = Instant::now() + STOP_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }

            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Log polling thread panicked");
                }
            } else {
                warn!(
                    "Log polling thread did not stop within {:?}; detaching it",
                    STOP_TIMEOUT
                );
            }
        }

        info!("File monitor stopped");
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
