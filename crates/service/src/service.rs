use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use once_cell::sync::Lazy;
use pathfinder_core::{
    write_report, CompareConfig, CompareMethod, Direction, EntryId, EntryNode, ResolutionPrompt,
    RestartPolicy, ScanMessage, ScanSession, ScanState,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub scan_id: Option<String>,
    pub left: PathBuf,
    pub right: PathBuf,
    #[serde(default)]
    pub include_unchanged: bool,
    #[serde(default)]
    pub compare_method: CompareMethod,
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub mtime_tolerance_secs: u64,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl ScanRequest {
    pub fn new(left: impl Into<PathBuf>, right: impl Into<PathBuf>) -> Self {
        Self {
            scan_id: None,
            left: left.into(),
            right: right.into(),
            include_unchanged: false,
            compare_method: CompareMethod::default(),
            ignore: None,
            mtime_tolerance_secs: 0,
            restart_policy: RestartPolicy::default(),
            output: None,
        }
    }

    fn config(&self) -> CompareConfig {
        let mut config = CompareConfig::with_roots(&self.left, &self.right);
        config.include_unchanged = self.include_unchanged;
        config.compare_method = self.compare_method;
        config.mtime_tolerance_secs = self.mtime_tolerance_secs;
        config.restart_policy = self.restart_policy;
        if let Some(ignore) = &self.ignore {
            config.ignore = ignore.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanSessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSessionSnapshot {
    pub scan_id: String,
    pub status: ScanSessionStatus,
    pub status_line: String,
    pub has_changes: Option<bool>,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
    pub total_events: u64,
    pub entry_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelScanResponse {
    pub scan_id: String,
    pub status: ScanSessionStatus,
}

struct RegisteredSession {
    session: ScanSession,
    messages: Receiver<ScanMessage>,
    events: Vec<ScanMessage>,
    report_path: Option<PathBuf>,
    error: Option<String>,
}

impl RegisteredSession {
    fn drain(&mut self) {
        self.events.extend(self.messages.try_iter());
    }

    fn status(&self) -> ScanSessionStatus {
        if self.error.is_some() {
            return ScanSessionStatus::Failed;
        }
        match self.session.state() {
            ScanState::Idle | ScanState::Scanning => ScanSessionStatus::Running,
            ScanState::Finished { .. } => ScanSessionStatus::Completed,
            ScanState::Cancelled => ScanSessionStatus::Cancelled,
            ScanState::Invalid => ScanSessionStatus::Failed,
        }
    }
}

static SESSIONS: Lazy<Mutex<HashMap<String, RegisteredSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn start_scan(request: ScanRequest) -> Result<String> {
    let scan_id = request
        .scan_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let session = ScanSession::new(request.config());
    let messages = session.subscribe();
    session
        .start_with_id(scan_id.as_str())
        .with_context(|| format!("failed to start scan {scan_id}"))?;

    {
        let mut sessions = lock_sessions()?;
        sessions.insert(
            scan_id.clone(),
            RegisteredSession {
                session: session.clone(),
                messages,
                events: Vec::new(),
                report_path: request.output.clone(),
                error: None,
            },
        );
    }

    spawn_report_writer(scan_id.clone(), session, request.output);
    Ok(scan_id)
}

/// Runs a new scan of the same roots inside an existing session, keeping its
/// scan id.
pub fn rescan(scan_id: &str) -> Result<()> {
    let (session, output) = {
        let mut sessions = lock_sessions()?;
        let registered = sessions
            .get_mut(scan_id)
            .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;
        registered.error = None;
        (registered.session.clone(), registered.report_path.clone())
    };

    session
        .start_with_id(scan_id)
        .with_context(|| format!("failed to restart scan {scan_id}"))?;
    spawn_report_writer(scan_id.to_string(), session, output);
    Ok(())
}

fn spawn_report_writer(scan_id: String, session: ScanSession, output: Option<PathBuf>) {
    thread::spawn(move || {
        let state = session.wait();
        let (Some(path), ScanState::Finished { .. }) = (output, state) else {
            return;
        };
        let Some(report) = session.report() else {
            return;
        };

        if let Err(err) = write_report(&report, &path) {
            warn!("scan {}: {:#}", scan_id, err);
            if let Ok(mut sessions) = lock_sessions() {
                if let Some(registered) = sessions.get_mut(&scan_id) {
                    registered.error = Some(err.to_string());
                }
            }
        } else {
            info!("scan {}: report written to {}", scan_id, path.display());
        }
    });
}

pub fn poll_scan_events(scan_id: &str, from_seq: u64) -> Result<Vec<ScanMessage>> {
    let mut sessions = lock_sessions()?;
    let registered = sessions
        .get_mut(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;
    registered.drain();

    Ok(registered
        .events
        .iter()
        .filter(|message| message.seq > from_seq)
        .cloned()
        .collect())
}

pub fn get_scan_session(scan_id: &str) -> Result<ScanSessionSnapshot> {
    let mut sessions = lock_sessions()?;
    let registered = sessions
        .get_mut(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;
    registered.drain();

    let state = registered.session.state();
    let has_changes = match state {
        ScanState::Finished { has_changes } => Some(has_changes),
        _ => None,
    };
    Ok(ScanSessionSnapshot {
        scan_id: scan_id.to_string(),
        status: registered.status(),
        status_line: registered.session.status_line(),
        has_changes,
        report_path: registered.report_path.clone(),
        error: registered
            .error
            .clone()
            .or_else(|| registered.session.last_error()),
        total_events: registered.events.len() as u64,
        entry_count: registered.session.with_tree(|tree| tree.len()),
    })
}

pub fn cancel_scan(scan_id: &str) -> Result<CancelScanResponse> {
    let sessions = lock_sessions()?;
    let registered = sessions
        .get(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;

    registered.session.cancel();
    Ok(CancelScanResponse {
        scan_id: scan_id.to_string(),
        status: registered.status(),
    })
}

pub fn result_tree(scan_id: &str) -> Result<Vec<EntryNode>> {
    Ok(session(scan_id)?.tree_snapshot())
}

pub fn resolution_prompt(scan_id: &str, entry_id: EntryId) -> Result<ResolutionPrompt> {
    session(scan_id)?
        .prompt(entry_id)
        .ok_or_else(|| anyhow!("entry {entry_id} not found in scan {scan_id}"))
}

pub fn resolve_entry(scan_id: &str, entry_id: EntryId, direction: Direction) -> Result<()> {
    session(scan_id)?
        .resolve(entry_id, direction)
        .with_context(|| format!("failed to resolve entry {entry_id} in scan {scan_id}"))
}

/// Cancels a session's scan and drops it from the registry.
pub fn close_session(scan_id: &str) -> Result<()> {
    let registered = lock_sessions()?
        .remove(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;
    registered.session.cancel();
    Ok(())
}

fn session(scan_id: &str) -> Result<ScanSession> {
    let sessions = lock_sessions()?;
    sessions
        .get(scan_id)
        .map(|registered| registered.session.clone())
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, RegisteredSession>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("scan session registry lock poisoned"))
}
