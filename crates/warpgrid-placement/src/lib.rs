//! WarpGrid placement — score plumbing and node selection.
//!
//! This crate turns per-plugin node scores into a single placement
//! decision. It knows nothing about plugins or workloads; the
//! scheduling framework (`warpgrid-scheduler`) fills in the scores and
//! asks for a node.
//!
//! # Components
//!
//! - **`scorer`**: Score matrix, weighted aggregation, normalization
//! - **`selector`**: Highest-score selection with uniform tie-breaking

pub mod error;
pub mod scorer;
pub mod selector;

pub use error::{PlacementError, PlacementResult};
pub use scorer::{
    DEFAULT_SCORE_WEIGHT, MAX_NODE_SCORE, MAX_SCORE_WEIGHT, NodeScore, NodeScoreList, ScoreMatrix,
    ScoreRow, default_normalize_score,
};
pub use selector::select_host;
