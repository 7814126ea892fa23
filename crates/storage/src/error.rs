use octastore_common::{BoundsError, NodeError, NodeId};

use crate::factory::StorageKind;

/// Errors raised at the storage call boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid node: {0}")]
    InvalidNode(#[from] NodeError),
    #[error("invalid bounds: {0}")]
    InvalidBounds(#[from] BoundsError),
    #[error("{0} storage backend is not implemented")]
    NotImplemented(StorageKind),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Why a write was refused. Carried inside a failed `WriteResult`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("version conflict on node {id}: stored v{stored}, supplied v{supplied}")]
    VersionConflict {
        id: NodeId,
        stored: u64,
        supplied: u64,
    },
}
