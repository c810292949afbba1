//! # Data Model
//!
//! Core data structures for the message DAG: compact identifiers, the
//! canonical message record, and the on-disk wire format produced by the
//! txflow log writer.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Textual timestamp format used by the log writer, e.g.
/// `2019-04-30 12:00:05.123456`. `%.f` also tolerates a missing fraction.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Format used when rendering timestamps back out (always six fractional
/// digits, so output round-trips through [`parse_timestamp`]).
pub const TIMESTAMP_OUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Parse a wall-clock timestamp from the log writer's textual format.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid timestamp {raw:?}"))
}

/// Stable unique identifier of a participant node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeUid(pub u64);

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Dense index assigned to a node at config load, used for array indexing.
/// Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIdx(pub usize);

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Dense shard identifier in `[0, num_shards)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(pub usize);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Logical round number. Per shard, the high-water-mark epoch only ever
/// moves upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Content-derived message identifier (hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHash(pub String);

impl MessageHash {
    /// Short prefix used as a display label. Hashes are hex in practice
    /// but arbitrary file stems reach here, so cut on a char boundary.
    pub fn label(&self) -> &str {
        match self.0.char_indices().nth(4) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical message record, stored once per hash from the owner's own
/// copy of the message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub hash: MessageHash,
    pub shard_id: ShardId,
    pub owner: NodeUid,
    pub epoch: Epoch,
    /// Ingestion-observed wall-clock time; recency ordering only, not a
    /// causal clock.
    pub timestamp: NaiveDateTime,
    /// Causal predecessors. May reference hashes not yet ingested.
    pub parents: Vec<MessageHash>,
    /// Payload transactions, passed through untouched.
    pub transactions: Vec<serde_json::Value>,
    pub is_commit: bool,
}

impl Message {
    /// Build a canonical record from a wire file. Fails if the timestamp
    /// does not parse; nothing else is validated here.
    pub fn from_wire(file: &MessageFile) -> Result<Self> {
        let body = &file.signed_message.body;
        Ok(Self {
            hash: MessageHash(body.hash.clone()),
            shard_id: ShardId(file.shard_id),
            owner: NodeUid(body.owner),
            epoch: Epoch(body.epoch),
            timestamp: parse_timestamp(&file.timestamp)?,
            parents: body.parents.iter().map(|h| MessageHash(h.clone())).collect(),
            transactions: body.transactions.clone(),
            is_commit: body.is_commit,
        })
    }
}

/// One on-disk message file, as written by a node into its log directory.
/// `uid` is the reporting node; `signed_message.body.owner` is the
/// originator. They differ for relayed copies.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageFile {
    pub uid: u64,
    pub shard_id: usize,
    pub timestamp: String,
    pub signed_message: SignedMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedMessage {
    pub body: MessageBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    pub hash: String,
    pub owner: u64,
    pub epoch: u64,
    #[serde(rename = "isCommit", default)]
    pub is_commit: bool,
    #[serde(rename = "parent", default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

impl MessageFile {
    /// Parse one message file from its JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("malformed message file")
    }
}
