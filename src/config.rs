//! # Configuration
//!
//! The static network description written by the log producer
//! (`config.json` at the log root) and tuning knobs for polling and
//! graph projection.

use crate::model::{NodeIdx, NodeUid};
use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the network description file inside the log root.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub uid: u64,
}

/// Static network description for one run. Loaded once at startup and
/// immutable thereafter.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub num_shards: usize,
    pub num_nodes: usize,
    pub users: Vec<UserEntry>,
}

impl NetworkConfig {
    /// Load and validate the config from a log root directory.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// The `uid -> idx` mapping must stay fixed for the process lifetime,
    /// so the user list has to be complete and duplicate-free up front.
    pub fn validate(&self) -> Result<()> {
        if self.num_shards == 0 {
            bail!("config declares zero shards");
        }
        if self.users.len() != self.num_nodes {
            bail!(
                "config declares {} nodes but lists {} users",
                self.num_nodes,
                self.users.len()
            );
        }
        let mut seen = hashbrown::HashSet::with_capacity(self.users.len());
        for user in &self.users {
            if !seen.insert(user.uid) {
                bail!("duplicate uid {} in config", user.uid);
            }
        }
        Ok(())
    }

    /// Build the dense node mapping from the user list order.
    pub fn node_map(&self) -> NodeMap {
        NodeMap::from_uids(self.users.iter().map(|u| NodeUid(u.uid)))
    }
}

/// Fixed mapping from stable node uids to dense indexes.
#[derive(Debug, Clone)]
pub struct NodeMap {
    uid_to_idx: HashMap<NodeUid, NodeIdx>,
    uids: Vec<NodeUid>,
}

impl NodeMap {
    pub fn from_uids(uids: impl IntoIterator<Item = NodeUid>) -> Self {
        let uids: Vec<NodeUid> = uids.into_iter().collect();
        let uid_to_idx = uids
            .iter()
            .enumerate()
            .map(|(idx, &uid)| (uid, NodeIdx(idx)))
            .collect();
        Self { uid_to_idx, uids }
    }

    pub fn index_of(&self, uid: NodeUid) -> Option<NodeIdx> {
        self.uid_to_idx.get(&uid).copied()
    }

    pub fn uid_of(&self, idx: NodeIdx) -> Option<NodeUid> {
        self.uids.get(idx.0).copied()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// Tuning knobs for the log watcher and the graph projection.
#[derive(Debug, Clone)]
pub struct WatchTuning {
    /// Wait interval after a scan that found changes.
    pub poll_min: Duration,
    /// Ceiling for the doubled wait interval while idle.
    pub poll_max: Duration,
    /// Tail-window size K: an unfiltered query keeps messages with
    /// `epoch >= top_epoch - K`.
    pub display_epochs: u64,
    /// Horizontal distance between consecutive epochs of one owner.
    pub epoch_gap: i64,
    /// Horizontal step between same-epoch messages in tail views.
    pub message_gap: i64,
    /// Wider step used when a single epoch is displayed.
    pub message_gap_epoch_view: i64,
    /// Vertical distance between owner rows.
    pub verifier_gap: i64,
}

impl Default for WatchTuning {
    fn default() -> Self {
        Self {
            poll_min: Duration::from_millis(100),
            poll_max: Duration::from_secs(5),
            display_epochs: 10,
            epoch_gap: 100,
            message_gap: 5,
            message_gap_epoch_view: 40,
            verifier_gap: 10,
        }
    }
}
