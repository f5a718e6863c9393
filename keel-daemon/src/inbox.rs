//! Inbox watcher: turns `*.json` files dropped into `~/.keel/inbox/` into
//! config apply requests on the bus.
//!
//! A file is picked up once it has been quiet for [`DEBOUNCE_WINDOW`].
//! Parsed files are published and removed; files that do not parse are
//! renamed to `<name>.rejected` and left for inspection.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use keel_core::ConfigApplyRequest;

use crate::bus::{BusHandle, Message};
use crate::error::{io_err, DaemonError};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const REJECTED_SUFFIX: &str = "rejected";

/// What happened to one inbox file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxOutcome {
    Published { correlation_id: String },
    Rejected { moved_to: PathBuf },
    Vanished,
}

/// Trailing-edge debounce: a path is due once no event has touched it for
/// the window.
#[derive(Debug, Default)]
pub(crate) struct Debouncer {
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub(crate) fn note(&mut self, path: &Path, now: Instant) {
        self.pending.insert(path.to_path_buf(), now);
    }

    pub(crate) fn due(&mut self, now: Instant, window: Duration) -> Vec<PathBuf> {
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();
        for path in &due {
            self.pending.remove(path);
        }
        due
    }
}

/// Watch `inbox` until `shutdown` fires. Files already present at start are
/// processed first.
pub async fn watch(
    inbox: PathBuf,
    bus: BusHandle,
    shutdown: CancellationToken,
) -> Result<(), DaemonError> {
    fs::create_dir_all(&inbox).map_err(|e| io_err(&inbox, e))?;
    // FSEvents reports real paths (e.g. /private/var/... on macOS).
    let inbox = fs::canonicalize(&inbox).unwrap_or(inbox);

    for path in existing_requests(&inbox)? {
        process_file(&path, &bus);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&inbox, RecursiveMode::NonRecursive)?;
    tracing::info!(inbox = %inbox.display(), "watching inbox");

    let mut debounce = Debouncer::default();
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "inbox watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                for path in event.paths.iter().filter(|p| is_request_file(p, &inbox)) {
                    debounce.note(path, Instant::now());
                }
            }
            _ = tick.tick() => {
                for path in debounce.due(Instant::now(), DEBOUNCE_WINDOW) {
                    process_file(&path, &bus);
                }
            }
        }
    }

    drop(watcher);
    Ok(())
}

/// Publish one request file and clear it out of the inbox.
pub fn process_file(path: &Path, bus: &BusHandle) -> InboxOutcome {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return InboxOutcome::Vanished,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "inbox read failed");
            return reject(path);
        }
    };

    let request: ConfigApplyRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "invalid config apply request");
            return reject(path);
        }
    };

    let correlation_id = request.correlation_id.clone();
    let delivered = bus.publish(Message::ConfigApplyRequest(request));
    tracing::info!(
        path = %path.display(),
        correlation_id = %correlation_id,
        delivered,
        "config apply request published",
    );
    if let Err(err) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %err, "could not remove processed request");
    }
    InboxOutcome::Published { correlation_id }
}

fn reject(path: &Path) -> InboxOutcome {
    let moved_to = rejected_path(path);
    if let Err(err) = fs::rename(path, &moved_to) {
        tracing::warn!(path = %path.display(), error = %err, "could not move rejected request");
    }
    InboxOutcome::Rejected { moved_to }
}

fn rejected_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(REJECTED_SUFFIX);
    PathBuf::from(name)
}

fn existing_requests(inbox: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(inbox).map_err(|e| io_err(inbox, e))? {
        let path = entry.map_err(|e| io_err(inbox, e))?.path();
        if path.is_file() && is_request_file(&path, inbox) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_request_file(path: &Path, inbox: &Path) -> bool {
    path.parent() == Some(inbox)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
}
