//! # Log Watcher
//!
//! Polls per-node log directories for newly appeared message files and
//! feeds them to the message store. Scans are gated by exponential
//! backoff so idle logs cost almost no I/O while active ones are picked
//! up within the floor interval.

use crate::config::WatchTuning;
use crate::model::{MessageFile, MessageHash, NodeIdx};
use crate::store::MessageStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Adaptive wait state: reset to the floor after a scan that found
/// changes, doubled up to the ceiling after an idle one.
#[derive(Debug)]
pub struct Backoff {
    wait: Duration,
    min: Duration,
    max: Duration,
    last_check: Option<Instant>,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            wait: min,
            min,
            max,
            last_check: None,
        }
    }

    /// Whether the wait interval has elapsed since the last recorded
    /// scan. Always true before the first scan.
    pub fn ready(&self) -> bool {
        self.last_check.map_or(true, |t| t.elapsed() >= self.wait)
    }

    /// Record a scan outcome and re-arm the timer.
    pub fn record(&mut self, changed: bool) {
        self.wait = if changed {
            self.min
        } else {
            (self.wait * 2).min(self.max)
        };
        self.last_check = Some(Instant::now());
    }

    pub fn current_wait(&self) -> Duration {
        self.wait
    }
}

/// Watches `<root>/<idx:06>` directories, one per node.
#[derive(Debug)]
pub struct LogWatcher {
    root: PathBuf,
    backoff: Backoff,
}

impl LogWatcher {
    pub fn new(root: impl Into<PathBuf>, tuning: &WatchTuning) -> Self {
        Self {
            root: root.into(),
            backoff: Backoff::new(tuning.poll_min, tuning.poll_max),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Log directory for one node index.
    pub fn node_dir(&self, idx: NodeIdx) -> PathBuf {
        self.root.join(format!("{:06}", idx.0))
    }

    /// Whether the backoff interval has elapsed, i.e. the next poll
    /// would actually scan.
    pub fn is_due(&self) -> bool {
        self.backoff.ready()
    }

    /// Scan if the backoff interval has elapsed. Returns whether new
    /// files were detected; a gated-off call returns false immediately.
    pub fn poll(&mut self, store: &mut MessageStore) -> bool {
        if !self.is_due() {
            return false;
        }
        self.force_scan(store)
    }

    /// Scan unconditionally, bypassing the backoff gate. Used for the
    /// eager scan at startup.
    pub fn force_scan(&mut self, store: &mut MessageStore) -> bool {
        let changed = self.scan(store);
        self.backoff.record(changed);
        debug!(
            changed,
            wait_ms = self.backoff.current_wait().as_millis() as u64,
            "log scan complete"
        );
        changed
    }

    fn scan(&self, store: &mut MessageStore) -> bool {
        let mut changed = false;
        for idx in (0..store.num_nodes()).map(NodeIdx) {
            let dir = self.node_dir(idx);
            match scan_node(store, idx, &dir) {
                Ok(node_changed) => changed |= node_changed,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "skipping node directory")
                }
            }
        }
        changed
    }
}

/// Scan one node directory. "Changed" means the entry count exceeds the
/// node's seen-set size; individual file failures are reported and
/// skipped without aborting the rest of the directory.
fn scan_node(store: &mut MessageStore, idx: NodeIdx, dir: &Path) -> Result<bool> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    if entries.len() <= store.seen_count(idx) {
        return Ok(false);
    }

    for path in &entries {
        // Filename stem is the candidate hash; already-seen hashes need
        // no file read at all.
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if store.node_has_seen(idx, &MessageHash::from(stem)) {
            continue;
        }
        if let Err(err) = ingest_file(store, path) {
            warn!(file = %path.display(), error = %err, "skipping message file");
        }
    }
    Ok(true)
}

fn ingest_file(store: &mut MessageStore, path: &Path) -> Result<()> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file = MessageFile::from_json(&raw)?;
    store.add_message(&file)?;
    Ok(())
}
