//! Scheduler error types.

use thiserror::Error;

use crate::status::Status;
use crate::types::WorkloadId;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("list nodes: {0}")]
    NodeList(String),

    #[error("{stage} stage failed: {status}")]
    Stage { stage: &'static str, status: Status },

    #[error("node selection: {0}")]
    Selection(#[from] warpgrid_placement::PlacementError),

    #[error("bind {workload} to {node}: {message}")]
    Bind {
        workload: WorkloadId,
        node: String,
        message: String,
    },

    #[error("scheduling of {0} cancelled by shutdown")]
    Cancelled(WorkloadId),

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("initialize plugin {name}: {message}")]
    PluginInit { name: String, message: String },

    #[error("plugin {plugin} does not implement the {extension} extension point")]
    MissingExtension {
        plugin: String,
        extension: &'static str,
    },

    #[error("config error: {0}")]
    Config(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
