//! Placement error types.

use thiserror::Error;

/// Errors that can occur while aggregating scores or selecting a node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("empty node score list")]
    EmptyScoreList,

    #[error("score row for plugin {plugin} has {got} entries, expected {expected}")]
    RowLengthMismatch {
        plugin: String,
        got: usize,
        expected: usize,
    },

    #[error("weighted score of plugin {plugin} overflows on node {node}")]
    ScoreOverflow { plugin: String, node: String },
}

pub type PlacementResult<T> = Result<T, PlacementError>;
