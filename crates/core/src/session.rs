use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collab::{ExtensionKindLookup, KindLookup, PresentationSink};
use crate::compare::PathComparator;
use crate::config::{CompareConfig, RestartPolicy};
use crate::error::{InvalidResolution, ResolveError, ScanError, SessionError};
use crate::model::{
    ChangeCounts, ComparisonReport, Entry, EntryId, EntryNode, ScanEvent, ScanMessage,
};
use crate::report::build_report;
use crate::resolve::{self, CopyPlan, Direction, ResolutionPrompt};
use crate::tree::ResultTree;
use crate::walk::{TreeWalker, WalkNode, WalkSink};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
    Finished { has_changes: bool },
    Invalid,
    Cancelled,
}

impl ScanState {
    fn idle_status(self) -> &'static str {
        match self {
            ScanState::Idle => "",
            ScanState::Scanning => "Scanning",
            ScanState::Finished { has_changes: true } => "Changes found",
            ScanState::Finished { has_changes: false } => "No changes",
            ScanState::Invalid => "Invalid comparison",
            ScanState::Cancelled => "Scan cancelled",
        }
    }
}

struct SessionInner {
    state: ScanState,
    generation: u64,
    cancel_flag: Arc<AtomicBool>,
    scan_id: Option<String>,
    config: CompareConfig,
    tree: ResultTree,
    status_line: String,
    resolving: HashSet<EntryId>,
    subscribers: Vec<Sender<ScanMessage>>,
    seq: u64,
    worker: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
    elapsed_ms: u64,
    warnings: Vec<String>,
    last_error: Option<String>,
}

struct SessionShared {
    inner: Mutex<SessionInner>,
    kinds: Arc<dyn KindLookup>,
    sink: Option<Arc<dyn PresentationSink>>,
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `event` to every subscriber and the presentation sink. Callers
    /// hold the session lock, which keeps delivery in `seq` order.
    fn publish(&self, inner: &mut SessionInner, event: ScanEvent) {
        inner.seq += 1;
        let message = ScanMessage {
            seq: inner.seq,
            scan_id: inner.scan_id.clone().unwrap_or_default(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };

        if let Some(sink) = &self.sink {
            match &message.event {
                ScanEvent::EntryDiscovered { id, node, .. } => sink.on_entry_discovered(*id, node),
                ScanEvent::DirectoryDiscovered { id, parent, node } => {
                    sink.on_directory_discovered(*id, node, *parent)
                }
                ScanEvent::Progress { path } => sink.on_scan_progress(path),
                ScanEvent::Finished { has_changes, .. } => sink.on_scan_finished(*has_changes),
                ScanEvent::Invalid { .. } => sink.on_scan_invalid(),
                ScanEvent::Cancelled => sink.on_scan_cancelled(),
                _ => {}
            }
        }

        inner
            .subscribers
            .retain(|subscriber| subscriber.send(message.clone()).is_ok());
    }
}

/// Owns one left/right comparison: the running walk, its result tree and
/// the resolutions applied to it. Clones share the same session.
#[derive(Clone)]
pub struct ScanSession {
    shared: Arc<SessionShared>,
}

impl ScanSession {
    pub fn new(config: CompareConfig) -> Self {
        Self::with_collaborators(config, Arc::new(ExtensionKindLookup), None)
    }

    pub fn with_collaborators(
        config: CompareConfig,
        kinds: Arc<dyn KindLookup>,
        sink: Option<Arc<dyn PresentationSink>>,
    ) -> Self {
        let inner = SessionInner {
            state: ScanState::Idle,
            generation: 0,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            scan_id: None,
            config,
            tree: ResultTree::new(),
            status_line: String::new(),
            resolving: HashSet::new(),
            subscribers: Vec::new(),
            seq: 0,
            worker: None,
            started_at: None,
            elapsed_ms: 0,
            warnings: Vec::new(),
            last_error: None,
        };
        Self {
            shared: Arc::new(SessionShared {
                inner: Mutex::new(inner),
                kinds,
                sink,
            }),
        }
    }

    /// Returns a receiver for every message published from now on.
    pub fn subscribe(&self) -> Receiver<ScanMessage> {
        let (sender, receiver) = unbounded();
        self.shared.lock().subscribers.push(sender);
        receiver
    }

    /// Starts a scan of the configured roots.
    pub fn start(&self) -> Result<String, SessionError> {
        self.start_with_id(Uuid::new_v4().to_string())
    }

    /// Starts a scan of the configured roots under a caller-chosen scan id,
    /// which every published message carries.
    pub fn start_with_id(&self, scan_id: impl Into<String>) -> Result<String, SessionError> {
        let (left, right, include_unchanged) = {
            let inner = self.shared.lock();
            let (left, right) = inner.config.roots().ok_or(SessionError::MissingRoots)?;
            (
                left.to_path_buf(),
                right.to_path_buf(),
                inner.config.include_unchanged,
            )
        };
        self.launch(scan_id.into(), left, right, include_unchanged)
    }

    /// Starts a scan of the given roots on a worker thread and returns its
    /// scan id. The previous result is discarded.
    pub fn start_with(
        &self,
        left: impl Into<PathBuf>,
        right: impl Into<PathBuf>,
        include_unchanged: bool,
    ) -> Result<String, SessionError> {
        self.launch(
            Uuid::new_v4().to_string(),
            left.into(),
            right.into(),
            include_unchanged,
        )
    }

    fn launch(
        &self,
        scan_id: String,
        left: PathBuf,
        right: PathBuf,
        include_unchanged: bool,
    ) -> Result<String, SessionError> {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if !inner.resolving.is_empty() {
            warn!("resolution in progress, rejecting start");
            return Err(SessionError::Busy);
        }
        if inner.state == ScanState::Scanning {
            match inner.config.restart_policy {
                RestartPolicy::Reject => {
                    warn!("scan already running, rejecting start");
                    return Err(SessionError::Busy);
                }
                RestartPolicy::Restart => {
                    info!("scan already running, restarting");
                    inner.cancel_flag.store(true, Ordering::Relaxed);
                }
            }
        }

        inner.generation += 1;
        let generation = inner.generation;
        let cancel_flag = Arc::new(AtomicBool::new(false));
        inner.cancel_flag = Arc::clone(&cancel_flag);

        inner.scan_id = Some(scan_id.clone());
        inner.config.left_root = Some(left.clone());
        inner.config.right_root = Some(right.clone());
        inner.config.include_unchanged = include_unchanged;
        inner.tree.clear();
        inner.state = ScanState::Scanning;
        inner.status_line = format!("Scanning {}", left.display());
        inner.started_at = Some(Instant::now());
        inner.elapsed_ms = 0;
        inner.warnings.clear();
        inner.last_error = None;

        let comparator = PathComparator::from_config(&inner.config, &mut inner.warnings);
        info!(
            "scan {} started: {} <-> {}",
            scan_id,
            left.display(),
            right.display()
        );
        self.shared.publish(
            inner,
            ScanEvent::Started {
                left: left.clone(),
                right: right.clone(),
            },
        );

        let shared = Arc::clone(&self.shared);
        inner.worker = Some(thread::spawn(move || {
            run_scan(
                &shared,
                generation,
                cancel_flag,
                &comparator,
                &left,
                &right,
                include_unchanged,
            )
        }));

        Ok(scan_id)
    }

    /// Switches to new roots. A running walk is cancelled; with
    /// `auto_rescan` a new scan starts right away and its id is returned.
    /// Rejected while a resolution is copying.
    pub fn set_roots(
        &self,
        left: impl Into<PathBuf>,
        right: impl Into<PathBuf>,
    ) -> Result<Option<String>, SessionError> {
        if !self.shared.lock().resolving.is_empty() {
            warn!("resolution in progress, keeping current roots");
            return Err(SessionError::Busy);
        }
        self.cancel();
        let auto_rescan = {
            let mut inner = self.shared.lock();
            inner.config.left_root = Some(left.into());
            inner.config.right_root = Some(right.into());
            inner.config.auto_rescan
        };
        if auto_rescan {
            self.start().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Stops the running walk. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if inner.state != ScanState::Scanning {
            return false;
        }

        inner.cancel_flag.store(true, Ordering::Relaxed);
        inner.generation += 1;
        inner.tree.clear();
        inner.state = ScanState::Cancelled;
        inner.status_line = ScanState::Cancelled.idle_status().to_string();
        info!("scan {} cancelled", inner.scan_id.as_deref().unwrap_or("-"));
        self.shared.publish(inner, ScanEvent::Cancelled);
        true
    }

    /// Blocks until the current worker, and any worker started by a
    /// restart in the meantime, has exited.
    pub fn wait(&self) -> ScanState {
        loop {
            let worker = self.shared.lock().worker.take();
            match worker {
                Some(handle) => {
                    if handle.join().is_err() {
                        warn!("scan worker panicked");
                    }
                }
                None => break,
            }
        }
        self.state()
    }

    pub fn state(&self) -> ScanState {
        self.shared.lock().state
    }

    pub fn status_line(&self) -> String {
        self.shared.lock().status_line.clone()
    }

    pub fn scan_id(&self) -> Option<String> {
        self.shared.lock().scan_id.clone()
    }

    pub fn config(&self) -> CompareConfig {
        self.shared.lock().config.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.shared.lock().warnings.clone()
    }

    pub fn tree_snapshot(&self) -> Vec<EntryNode> {
        self.shared.lock().tree.snapshot()
    }

    pub fn entry(&self, id: EntryId) -> Option<Entry> {
        self.shared.lock().tree.get(id).cloned()
    }

    pub fn find_by_relative_path(&self, relative: &Path) -> Option<EntryId> {
        self.shared.lock().tree.find_by_relative_path(relative)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<EntryId> {
        self.shared.lock().tree.find_by_path(path)
    }

    pub fn counts(&self) -> ChangeCounts {
        self.shared.lock().tree.counts()
    }

    pub fn with_tree<R>(&self, f: impl FnOnce(&ResultTree) -> R) -> R {
        f(&self.shared.lock().tree)
    }

    pub fn prompt(&self, id: EntryId) -> Option<ResolutionPrompt> {
        self.shared.lock().tree.get(id).map(resolve::prompt)
    }

    /// Report of the finished scan, `None` until a scan has finished.
    pub fn report(&self) -> Option<ComparisonReport> {
        let inner = self.shared.lock();
        let ScanState::Finished { has_changes } = inner.state else {
            return None;
        };
        Some(build_report(
            inner.scan_id.as_deref().unwrap_or_default(),
            &inner.config,
            has_changes,
            inner.elapsed_ms,
            inner.tree.snapshot(),
            inner.warnings.clone(),
        ))
    }

    /// Copies one side of an entry over the other and drops the entry from
    /// the result on success.
    pub fn resolve(&self, id: EntryId, direction: Direction) -> Result<(), SessionError> {
        let plan = self.begin_resolution(id, direction)?;
        let result = resolve::execute(&plan);
        self.finish_resolution(id, result)
    }

    /// Same as `resolve`, but the copy runs on its own thread. Rejections
    /// are reported immediately.
    pub fn resolve_in_background(
        &self,
        id: EntryId,
        direction: Direction,
    ) -> Result<JoinHandle<Result<(), SessionError>>, SessionError> {
        let plan = self.begin_resolution(id, direction)?;
        let session = self.clone();
        Ok(thread::spawn(move || {
            let result = resolve::execute(&plan);
            session.finish_resolution(id, result)
        }))
    }

    fn begin_resolution(
        &self,
        id: EntryId,
        direction: Direction,
    ) -> Result<CopyPlan, SessionError> {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if inner.state == ScanState::Scanning {
            warn!("rejecting resolution of {} while scanning", id);
            return Err(InvalidResolution::ScanInProgress.into());
        }
        if inner.resolving.contains(&id) {
            warn!("entry {} is already being resolved", id);
            return Err(InvalidResolution::AlreadyResolving(id).into());
        }
        let entry = inner
            .tree
            .get(id)
            .ok_or(InvalidResolution::UnknownEntry(id))?;
        let plan = resolve::plan(entry, direction)?;

        inner.resolving.insert(id);
        inner.status_line = format!("Resolving {}", plan.source.display());
        self.shared.publish(
            inner,
            ScanEvent::Resolving {
                id,
                path: plan.source.clone(),
            },
        );
        Ok(plan)
    }

    fn finish_resolution(
        &self,
        id: EntryId,
        result: Result<(), ResolveError>,
    ) -> Result<(), SessionError> {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        inner.resolving.remove(&id);
        if inner.resolving.is_empty() {
            inner.status_line = inner.state.idle_status().to_string();
        }

        match result {
            Ok(()) => {
                if let Some(entry) = inner.tree.remove(id) {
                    info!("resolved {}", entry.relative_path.display());
                }
                self.shared.publish(inner, ScanEvent::Resolved { id });
                Ok(())
            }
            Err(err) => {
                warn!("failed to resolve entry {}: {}", id, err);
                self.shared.publish(
                    inner,
                    ScanEvent::ResolveFailed {
                        id,
                        error: err.to_string(),
                    },
                );
                Err(err.into())
            }
        }
    }
}

struct SessionWalkSink<'a> {
    shared: &'a SessionShared,
    generation: u64,
}

impl SessionWalkSink<'_> {
    fn deliver(&mut self, node: WalkNode) {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if inner.generation != self.generation {
            return;
        }
        let is_dir = node.is_dir();
        let id = inner.tree.insert(node, None);
        let Some(view) = inner.tree.node(id) else {
            return;
        };
        let event = if is_dir {
            ScanEvent::DirectoryDiscovered {
                id,
                parent: None,
                node: view,
            }
        } else {
            ScanEvent::EntryDiscovered {
                id,
                parent: None,
                node: view,
            }
        };
        self.shared.publish(inner, event);
    }
}

impl WalkSink for SessionWalkSink<'_> {
    fn entry_discovered(&mut self, node: WalkNode) {
        self.deliver(node);
    }

    fn directory_discovered(&mut self, node: WalkNode) {
        self.deliver(node);
    }

    fn progress(&mut self, path: &Path) {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        if inner.generation != self.generation {
            return;
        }
        inner.status_line = format!("Scanning {}", path.display());
        self.shared.publish(
            inner,
            ScanEvent::Progress {
                path: path.to_path_buf(),
            },
        );
    }
}

fn run_scan(
    shared: &SessionShared,
    generation: u64,
    cancel_flag: Arc<AtomicBool>,
    comparator: &PathComparator,
    left: &Path,
    right: &Path,
    include_unchanged: bool,
) {
    let mut sink = SessionWalkSink { shared, generation };
    let result = TreeWalker::new(comparator, shared.kinds.as_ref())
        .include_unchanged(include_unchanged)
        .cancel_flag(cancel_flag)
        .walk(left, right, &mut sink);

    let mut guard = shared.lock();
    let inner = &mut *guard;
    if inner.generation != generation {
        debug!("discarding result of superseded scan generation {}", generation);
        return;
    }
    inner.elapsed_ms = inner
        .started_at
        .map(|started| started.elapsed().as_millis() as u64)
        .unwrap_or_default();

    match result {
        Ok(outcome) => {
            let state = ScanState::Finished {
                has_changes: outcome.has_changes,
            };
            inner.state = state;
            inner.status_line = state.idle_status().to_string();
            inner.warnings.extend(outcome.warnings);
            info!(
                "scan {} finished in {} ms (changes={})",
                inner.scan_id.as_deref().unwrap_or("-"),
                inner.elapsed_ms,
                outcome.has_changes
            );
            shared.publish(
                inner,
                ScanEvent::Finished {
                    has_changes: outcome.has_changes,
                    counts: outcome.counts,
                },
            );
        }
        Err(ScanError::Cancelled) => {
            inner.tree.clear();
            inner.state = ScanState::Cancelled;
            inner.status_line = ScanState::Cancelled.idle_status().to_string();
            shared.publish(inner, ScanEvent::Cancelled);
        }
        Err(err) => {
            warn!("scan invalid: {}", err);
            inner.tree.clear();
            inner.state = ScanState::Invalid;
            inner.status_line = ScanState::Invalid.idle_status().to_string();
            inner.last_error = Some(err.to_string());
            shared.publish(
                inner,
                ScanEvent::Invalid {
                    reason: err.to_string(),
                },
            );
        }
    }
}
