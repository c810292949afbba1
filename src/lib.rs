//! # Txdag
//!
//! Incremental ingestion and DAG indexing of txflow consensus message
//! logs, serving filtered causality-graph views for visualization.
//!
//! The engine watches per-node log directories for new message files,
//! deduplicates them by content hash, tracks per-shard epoch
//! high-water-marks, and answers windowed graph queries (by shard, by
//! node, by epoch, or a rolling tail of recent epochs) over an
//! append-only in-memory message store. HTTP routing, rendering, and
//! display coloring are left to the consuming presentation layer.

pub mod config;
pub mod model;
pub mod query;
pub mod store;
pub mod treap;
pub mod watcher;

// Re-export main types for convenience
pub use config::{NetworkConfig, NodeMap, WatchTuning};
pub use model::{Epoch, Message, MessageFile, MessageHash, NodeIdx, NodeUid, ShardId};
pub use query::{DagEdge, DagFilter, DagGraph, DagNode, DagStats};
pub use store::{IngestOutcome, MessageStore, NodeSummary};
pub use treap::TreapIndex;
pub use watcher::{Backoff, LogWatcher};

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use tracing::{info, warn};

/// Shared handle over one txflow log root: single writer (the watcher
/// tick), any number of concurrent readers.
///
/// Queries hold the store's read lock and see a consistent, possibly
/// slightly stale snapshot while a scan is in flight.
pub struct TxflowDag {
    tuning: WatchTuning,
    state: Option<DagState>,
}

struct DagState {
    config: NetworkConfig,
    store: RwLock<MessageStore>,
    watcher: Mutex<LogWatcher>,
}

impl TxflowDag {
    /// Open a log root directory.
    ///
    /// A missing root or missing `config.json` yields a non-operational
    /// handle (`ok() == false`) whose queries all return empty results.
    /// A present but invalid config is an error. When operational, one
    /// eager scan runs before returning so the first query is not empty
    /// on an already-populated log.
    pub fn open(root: &Path, tuning: WatchTuning) -> Result<Self> {
        if !root.join(config::CONFIG_FILE).is_file() {
            warn!(root = %root.display(), "log root or config.json missing, serving empty views");
            return Ok(Self {
                tuning,
                state: None,
            });
        }

        let network = NetworkConfig::load(root)?;
        info!(
            num_nodes = network.num_nodes,
            num_shards = network.num_shards,
            root = %root.display(),
            "loaded txflow network config"
        );

        let store = MessageStore::new(network.node_map(), network.num_shards);
        let watcher = LogWatcher::new(root, &tuning);
        let state = DagState {
            config: network,
            store: RwLock::new(store),
            watcher: Mutex::new(watcher),
        };
        {
            let mut watcher = state.watcher.lock();
            let mut store = state.store.write();
            watcher.force_scan(&mut store);
        }

        Ok(Self {
            tuning,
            state: Some(state),
        })
    }

    /// Whether the handle is operational.
    pub fn ok(&self) -> bool {
        self.state.is_some()
    }

    pub fn config(&self) -> Option<&NetworkConfig> {
        self.state.as_ref().map(|s| &s.config)
    }

    pub fn tuning(&self) -> &WatchTuning {
        &self.tuning
    }

    /// One watcher tick. Cheap while the backoff gate is closed; takes
    /// the store's write lock only for an actual scan. Returns whether
    /// new files were detected.
    pub fn poll(&self) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        let mut watcher = state.watcher.lock();
        if !watcher.is_due() {
            return false;
        }
        let mut store = state.store.write();
        watcher.force_scan(&mut store)
    }

    /// Filtered causality graph for rendering.
    pub fn graph(&self, filter: &DagFilter) -> DagGraph {
        match &self.state {
            Some(state) => query::build_graph(&state.store.read(), filter, &self.tuning),
            None => DagGraph::default(),
        }
    }

    /// Canonical record for a hash.
    pub fn message(&self, hash: &MessageHash) -> Option<Message> {
        self.state.as_ref()?.store.read().get(hash).cloned()
    }

    /// The `k` most recent canonical messages, most recent first.
    pub fn last_messages(&self, k: usize) -> Vec<Message> {
        match &self.state {
            Some(state) => {
                let store = state.store.read();
                query::last_messages(&store, k)
                    .into_iter()
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        }
    }

    /// Per-node summary, `None` for unknown uids or a non-operational
    /// handle.
    pub fn node_summary(&self, uid: NodeUid) -> Option<NodeSummary> {
        self.state.as_ref()?.store.read().node_summary(uid)
    }

    pub fn num_messages(&self) -> usize {
        self.state
            .as_ref()
            .map_or(0, |state| state.store.read().num_messages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_serves_empty_views() {
        let dir = tempfile::tempdir().unwrap();
        let dag = TxflowDag::open(&dir.path().join("absent"), WatchTuning::default()).unwrap();
        assert!(!dag.ok());
        assert!(!dag.poll());
        assert_eq!(dag.graph(&DagFilter::default()), DagGraph::default());
        assert!(dag.last_messages(10).is_empty());
        assert!(dag.node_summary(NodeUid(0)).is_none());
        assert_eq!(dag.num_messages(), 0);
    }

    #[test]
    fn test_missing_config_serves_empty_views() {
        let dir = tempfile::tempdir().unwrap();
        let dag = TxflowDag::open(dir.path(), WatchTuning::default()).unwrap();
        assert!(!dag.ok());
        assert!(dag.config().is_none());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(config::CONFIG_FILE), "{not json").unwrap();
        assert!(TxflowDag::open(dir.path(), WatchTuning::default()).is_err());
    }
}
