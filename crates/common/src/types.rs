use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Caller-assigned identifier of an octree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random id for callers that have no natural naming scheme.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How many replicas must acknowledge an operation before it counts as complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// One replica (fastest, least durable).
    One,
    /// A majority of replicas.
    #[default]
    Quorum,
    /// Every replica (slowest, most durable).
    All,
}

impl ConsistencyLevel {
    pub const ALL_LEVELS: [ConsistencyLevel; 3] = [Self::One, Self::Quorum, Self::All];

    /// Number of acknowledgements this level demands from `replication_factor` replicas.
    pub fn required_acks(self, replication_factor: u32) -> u32 {
        if replication_factor == 0 {
            return 0;
        }
        match self {
            Self::One => 1,
            Self::Quorum => replication_factor / 2 + 1,
            Self::All => replication_factor,
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::One => "one",
            Self::Quorum => "quorum",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation signal shared between a caller and a storage backend.
///
/// Clones share the same flag. Backends that perform real I/O check it between
/// steps; the in-memory engine finishes before a check would matter.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
