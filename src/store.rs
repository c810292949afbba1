//! # Message Store
//!
//! In-memory storage for canonical messages, per-node seen-sets, and
//! per-shard epoch high-water-marks. This is the single mutation path of
//! the system: the watcher feeds files in, queries read the result.

use crate::config::NodeMap;
use crate::model::{Epoch, Message, MessageFile, MessageHash, NodeIdx, NodeUid, ShardId};
use anyhow::{bail, Result};
use hashbrown::{HashMap, HashSet};
use serde::Serialize;

/// What a single ingestion did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The owner's own copy of a previously unseen hash: stored canonically.
    Canonical,
    /// A relayed or duplicate copy: seen-set and epoch bookkeeping only.
    SeenOnly,
}

/// Per-node summary exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub num_messages: usize,
}

/// Append-only message store. Canonical records are never overwritten or
/// removed; shard epochs only move upward.
#[derive(Debug, Clone)]
pub struct MessageStore {
    nodes: NodeMap,
    messages: HashMap<MessageHash, Message>,
    /// Hashes each node has been observed to hold, indexed by `NodeIdx`.
    seen: Vec<HashSet<MessageHash>>,
    /// High-water-mark epoch per shard.
    shard_epochs: Vec<Epoch>,
}

impl MessageStore {
    pub fn new(nodes: NodeMap, num_shards: usize) -> Self {
        let num_nodes = nodes.len();
        Self {
            nodes,
            messages: HashMap::new(),
            seen: vec![HashSet::new(); num_nodes],
            shard_epochs: vec![Epoch(0); num_shards],
        }
    }

    /// Ingest one message file.
    ///
    /// Always records the hash in the reporting node's seen-set and raises
    /// the shard's epoch high-water-mark. The full record is stored
    /// canonically only for the owner's own copy of a new hash; relays and
    /// duplicates are no-ops against canonical storage. Re-ingesting the
    /// same file is idempotent.
    ///
    /// A uid missing from the node mapping or an out-of-range shard id
    /// rejects the file without touching any state.
    pub fn add_message(&mut self, file: &MessageFile) -> Result<IngestOutcome> {
        let body = &file.signed_message.body;
        let uid = NodeUid(file.uid);
        let Some(idx) = self.nodes.index_of(uid) else {
            bail!("unknown node uid {uid}");
        };
        let shard = ShardId(file.shard_id);
        if shard.0 >= self.shard_epochs.len() {
            bail!(
                "shard id {shard} out of range (num_shards = {})",
                self.shard_epochs.len()
            );
        }

        let hash = MessageHash(body.hash.clone());
        let is_owner_copy = body.owner == file.uid;
        let canonical = is_owner_copy && !self.messages.contains_key(&hash);
        if canonical {
            // Parse before mutating so a rejected file leaves no trace.
            let message = Message::from_wire(file)?;
            self.messages.insert(hash.clone(), message);
        }

        self.seen[idx.0].insert(hash);
        let epoch = Epoch(body.epoch);
        if epoch > self.shard_epochs[shard.0] {
            self.shard_epochs[shard.0] = epoch;
        }

        Ok(if canonical {
            IngestOutcome::Canonical
        } else {
            IngestOutcome::SeenOnly
        })
    }

    /// Canonical record for a hash, if the owner's copy has been ingested.
    pub fn get(&self, hash: &MessageHash) -> Option<&Message> {
        self.messages.get(hash)
    }

    /// All canonical messages, in no particular order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn num_messages(&self) -> usize {
        self.messages.len()
    }

    pub fn node_index(&self, uid: NodeUid) -> Option<NodeIdx> {
        self.nodes.index_of(uid)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// How many distinct hashes a node has been observed to hold.
    pub fn seen_count(&self, idx: NodeIdx) -> usize {
        self.seen.get(idx.0).map(HashSet::len).unwrap_or(0)
    }

    /// Whether a node has been observed to hold a hash.
    pub fn node_has_seen(&self, idx: NodeIdx, hash: &MessageHash) -> bool {
        self.seen.get(idx.0).is_some_and(|set| set.contains(hash))
    }

    /// Per-node summary, `None` for a uid outside the mapping.
    pub fn node_summary(&self, uid: NodeUid) -> Option<NodeSummary> {
        let idx = self.nodes.index_of(uid)?;
        Some(NodeSummary {
            num_messages: self.seen_count(idx),
        })
    }

    pub fn shard_epoch(&self, shard: ShardId) -> Option<Epoch> {
        self.shard_epochs.get(shard.0).copied()
    }

    pub fn num_shards(&self) -> usize {
        self.shard_epochs.len()
    }

    /// Highest epoch high-water-mark, across all shards or one.
    pub fn top_epoch(&self, shard: Option<ShardId>) -> Option<Epoch> {
        match shard {
            Some(shard) => self.shard_epoch(shard),
            None => self.shard_epochs.iter().max().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeMap;
    use crate::model::MessageFile;

    fn store(num_nodes: usize, num_shards: usize) -> MessageStore {
        let map = NodeMap::from_uids((0..num_nodes as u64).map(NodeUid));
        MessageStore::new(map, num_shards)
    }

    fn file(uid: u64, shard: usize, hash: &str, owner: u64, epoch: u64) -> MessageFile {
        let raw = format!(
            r#"{{
                "uid": {uid},
                "shard_id": {shard},
                "timestamp": "2019-04-30 12:00:05.000000",
                "signed_message": {{
                    "body": {{"hash": "{hash}", "owner": {owner}, "epoch": {epoch}}}
                }}
            }}"#
        );
        MessageFile::from_json(&raw).unwrap()
    }

    #[test]
    fn test_owner_copy_is_canonical() {
        let mut store = store(2, 1);
        let outcome = store.add_message(&file(0, 0, "aa", 0, 1)).unwrap();
        assert_eq!(outcome, IngestOutcome::Canonical);
        assert!(store.get(&MessageHash::from("aa")).is_some());
        assert_eq!(store.num_messages(), 1);
    }

    #[test]
    fn test_relayed_copy_updates_seen_set_only() {
        let mut store = store(2, 1);
        // Node 1 relays a message owned by node 0 before the owner reports.
        let outcome = store.add_message(&file(1, 0, "aa", 0, 1)).unwrap();
        assert_eq!(outcome, IngestOutcome::SeenOnly);
        assert!(store.get(&MessageHash::from("aa")).is_none());
        assert_eq!(store.node_summary(NodeUid(1)).unwrap().num_messages, 1);
        assert_eq!(store.node_summary(NodeUid(0)).unwrap().num_messages, 0);

        // The owner's copy then becomes the canonical record.
        let outcome = store.add_message(&file(0, 0, "aa", 0, 1)).unwrap();
        assert_eq!(outcome, IngestOutcome::Canonical);
        assert_eq!(store.num_messages(), 1);
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let mut store = store(1, 1);
        let f = file(0, 0, "aa", 0, 3);
        store.add_message(&f).unwrap();
        let before_epoch = store.shard_epoch(ShardId(0)).unwrap();

        let outcome = store.add_message(&f).unwrap();
        assert_eq!(outcome, IngestOutcome::SeenOnly);
        assert_eq!(store.num_messages(), 1);
        assert_eq!(store.node_summary(NodeUid(0)).unwrap().num_messages, 1);
        assert_eq!(store.shard_epoch(ShardId(0)).unwrap(), before_epoch);
    }

    #[test]
    fn test_shard_epoch_is_monotonic() {
        let mut store = store(1, 2);
        store.add_message(&file(0, 1, "aa", 0, 7)).unwrap();
        assert_eq!(store.shard_epoch(ShardId(1)), Some(Epoch(7)));

        // An older message never lowers the mark.
        store.add_message(&file(0, 1, "bb", 0, 3)).unwrap();
        assert_eq!(store.shard_epoch(ShardId(1)), Some(Epoch(7)));

        store.add_message(&file(0, 1, "cc", 0, 9)).unwrap();
        assert_eq!(store.shard_epoch(ShardId(1)), Some(Epoch(9)));
        assert_eq!(store.shard_epoch(ShardId(0)), Some(Epoch(0)));
    }

    #[test]
    fn test_unknown_uid_rejected_without_side_effects() {
        let mut store = store(1, 1);
        assert!(store.add_message(&file(9, 0, "aa", 9, 1)).is_err());
        assert_eq!(store.num_messages(), 0);
        assert_eq!(store.shard_epoch(ShardId(0)), Some(Epoch(0)));
    }

    #[test]
    fn test_out_of_range_shard_rejected() {
        let mut store = store(1, 1);
        assert!(store.add_message(&file(0, 5, "aa", 0, 1)).is_err());
        assert_eq!(store.num_messages(), 0);
        assert_eq!(store.node_summary(NodeUid(0)).unwrap().num_messages, 0);
    }

    #[test]
    fn test_top_epoch() {
        let mut store = store(1, 3);
        store.add_message(&file(0, 0, "aa", 0, 5)).unwrap();
        store.add_message(&file(0, 1, "bb", 0, 8)).unwrap();
        store.add_message(&file(0, 2, "cc", 0, 3)).unwrap();
        assert_eq!(store.top_epoch(None), Some(Epoch(8)));
        assert_eq!(store.top_epoch(Some(ShardId(2))), Some(Epoch(3)));
        assert_eq!(store.top_epoch(Some(ShardId(7))), None);
    }

    #[test]
    fn test_node_summary_unknown_uid() {
        let store = store(1, 1);
        assert!(store.node_summary(NodeUid(42)).is_none());
    }
}
