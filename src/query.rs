//! # DAG Queries
//!
//! Read-side of the engine: select a windowed subset of the message
//! store, project it into a renderable node/edge graph with display
//! positions, and aggregate throughput statistics. Also answers the
//! most-recent-K retrieval backing the message dashboard.

use crate::config::WatchTuning;
use crate::model::{Epoch, Message, MessageHash, NodeIdx, NodeUid, ShardId, TIMESTAMP_OUT_FORMAT};
use crate::store::MessageStore;
use crate::treap::TreapIndex;
use chrono::{NaiveDateTime, Utc};
use hashbrown::{HashMap, HashSet};
use serde::Serialize;

/// Edges are drawn in a single neutral color; per-shard node coloring is
/// the presentation layer's concern.
pub const EDGE_COLOR: &str = "#ccc";

/// Conjunctive filter parameters for a graph query. All unset selects the
/// rolling tail of recent epochs across every shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DagFilter {
    /// Keep only messages on this shard.
    pub shard: Option<ShardId>,
    /// Keep only messages this node has been observed to hold.
    pub node: Option<NodeUid>,
    /// Keep only messages with exactly this epoch (disables the tail
    /// window).
    pub epoch: Option<Epoch>,
}

/// One rendered message with display position and pass-through metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagNode {
    pub id: MessageHash,
    pub x: i64,
    pub y: i64,
    pub size: u32,
    pub label: String,
    pub owner: NodeUid,
    #[serde(rename = "shardid")]
    pub shard_id: ShardId,
    pub epoch: Epoch,
    pub timestamp: String,
    pub num_parents: usize,
    pub num_transactions: usize,
    pub is_commit: bool,
}

/// One causal edge from a message to a parent inside the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DagEdge {
    pub id: String,
    pub source: MessageHash,
    pub target: MessageHash,
    pub color: String,
}

/// Aggregate throughput statistics over the selected window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DagStats {
    pub num_messages: usize,
    pub num_tx: usize,
    pub message_rate: f64,
    pub tx_rate: f64,
}

/// Result of a graph query, ready for serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DagGraph {
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    pub stats: DagStats,
}

/// Build the filtered causality graph, using the current wall clock for
/// recency ordering.
pub fn build_graph(store: &MessageStore, filter: &DagFilter, tuning: &WatchTuning) -> DagGraph {
    build_graph_at(store, filter, tuning, Utc::now().naive_utc())
}

/// Build the filtered causality graph against an explicit `now`.
///
/// Selection: an exact epoch filter keeps only that epoch; otherwise the
/// window keeps `epoch >= top_epoch - K` where `top_epoch` is the highest
/// shard high-water-mark (restricted to the filtered shard when set).
/// Shard and node filters apply conjunctively. Survivors are ordered most
/// recent first, which drives both display positioning and stats.
///
/// An unknown node uid or out-of-range shard filter yields an empty graph
/// rather than an error.
pub fn build_graph_at(
    store: &MessageStore,
    filter: &DagFilter,
    tuning: &WatchTuning,
    now: NaiveDateTime,
) -> DagGraph {
    let node_idx = match filter.node {
        Some(uid) => match store.node_index(uid) {
            Some(idx) => Some(idx),
            None => return DagGraph::default(),
        },
        None => None,
    };
    let Some(top_epoch) = store.top_epoch(filter.shard) else {
        return DagGraph::default();
    };

    let mut selected: Vec<&Message> = store
        .messages()
        .filter(|m| {
            let in_window = match filter.epoch {
                Some(epoch) => m.epoch == epoch,
                // Written additively to avoid u64 underflow near epoch 0;
                // saturating so huge epochs cannot overflow either.
                None => m.epoch.0.saturating_add(tuning.display_epochs) >= top_epoch.0,
            };
            in_window
                && filter.shard.map_or(true, |shard| m.shard_id == shard)
                && node_idx.map_or(true, |idx| store.node_has_seen(idx, &m.hash))
        })
        .collect();
    selected.sort_by_key(|m| now.signed_duration_since(m.timestamp));

    project(store, &selected, filter, tuning)
}

/// Fixed x column for the first message of an epoch. Saturates instead
/// of wrapping when the epoch does not fit the display coordinate space.
fn epoch_column(epoch: Epoch, gap: i64) -> i64 {
    i64::try_from(epoch.0)
        .unwrap_or(i64::MAX)
        .saturating_mul(gap)
}

/// Project an ordered selection into nodes, edges, and stats.
fn project(
    store: &MessageStore,
    selected: &[&Message],
    filter: &DagFilter,
    tuning: &WatchTuning,
) -> DagGraph {
    let valid: HashSet<&MessageHash> = selected.iter().map(|m| &m.hash).collect();
    let message_gap = if filter.epoch.is_some() {
        tuning.message_gap_epoch_view
    } else {
        tuning.message_gap
    };

    let mut graph = DagGraph::default();
    let mut xinfo: HashMap<NodeIdx, (Epoch, i64)> = HashMap::new();
    let mut span: Option<(NaiveDateTime, NaiveDateTime)> = None;

    for message in selected {
        // Canonical records always come from a mapped owner.
        let Some(owner_idx) = store.node_index(message.owner) else {
            continue;
        };

        graph.stats.num_messages += 1;
        graph.stats.num_tx += message.transactions.len();
        span = Some(match span {
            None => (message.timestamp, message.timestamp),
            Some((lo, hi)) => (lo.min(message.timestamp), hi.max(message.timestamp)),
        });

        // Same epoch as the owner's previous message: step sideways.
        // New epoch: jump to its fixed column and restart the run.
        let position = match xinfo.get(&owner_idx) {
            Some(&(last_epoch, position)) if last_epoch == message.epoch => {
                position.saturating_add(message_gap)
            }
            _ => epoch_column(message.epoch, tuning.epoch_gap),
        };
        xinfo.insert(owner_idx, (message.epoch, position));

        graph.nodes.push(DagNode {
            id: message.hash.clone(),
            x: position,
            y: owner_idx.0 as i64 * tuning.verifier_gap,
            size: if message.is_commit { 3 } else { 1 },
            label: message.hash.label().to_string(),
            owner: message.owner,
            shard_id: message.shard_id,
            epoch: message.epoch,
            timestamp: message.timestamp.format(TIMESTAMP_OUT_FORMAT).to_string(),
            num_parents: message.parents.len(),
            num_transactions: message.transactions.len(),
            is_commit: message.is_commit,
        });

        for parent in &message.parents {
            // Parents outside the selection (including never-ingested
            // forward references) get no edge.
            if valid.contains(parent) {
                graph.edges.push(DagEdge {
                    id: format!("{}|{}", message.hash, parent),
                    source: message.hash.clone(),
                    target: parent.clone(),
                    color: EDGE_COLOR.to_string(),
                });
            }
        }
    }

    if graph.stats.num_messages >= 2 {
        if let Some((lo, hi)) = span {
            let micros = hi
                .signed_duration_since(lo)
                .num_microseconds()
                .unwrap_or(i64::MAX);
            if micros > 0 {
                let secs = micros as f64 / 1_000_000.0;
                graph.stats.message_rate = graph.stats.num_messages as f64 / secs;
                graph.stats.tx_rate = graph.stats.num_tx as f64 / secs;
            }
        }
    }

    graph
}

/// The `k` most recent canonical messages, most recent first.
pub fn last_messages<'a>(store: &'a MessageStore, k: usize) -> Vec<&'a Message> {
    last_messages_at(store, k, Utc::now().naive_utc())
}

/// The `k` canonical messages with the smallest `now - timestamp`, in
/// ascending order of that delta (most recent first), via recency-keyed
/// rank selection instead of a full sort.
pub fn last_messages_at(store: &MessageStore, k: usize, now: NaiveDateTime) -> Vec<&Message> {
    let mut index = TreapIndex::new();
    for message in store.messages() {
        index.insert(now.signed_duration_since(message.timestamp), message);
    }
    let (recent, _) = index.split(k);
    recent.iter().map(|(_, &message)| message).collect()
}
