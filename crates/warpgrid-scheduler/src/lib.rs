//! warpgrid-scheduler — workload placement.
//!
//! Places pending workloads onto cluster nodes through a pluggable
//! pipeline. The scheduler:
//!
//! - Queues pending workloads in FIFO order, coalescing re-adds
//! - Filters infeasible nodes, then scores the rest with weighted plugins
//! - Breaks score ties uniformly at random
//! - Lets permit plugins hold a workload until they allow or reject it
//! - Binds the workload through an external binder
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── SchedulingQueue (pending workloads)
//!   ├── Framework
//!   │     ├── Filter / PreScore / Score / Permit plugins (from Registry)
//!   │     └── WaitingPods (held workloads, per-plugin timers)
//!   ├── NodeLister + Binder (cluster collaborators)
//!   └── binding tasks (wait on permit, then bind)
//! ```

pub mod cluster;
pub mod config;
pub mod cycle_state;
pub mod error;
pub mod framework;
pub mod plugin;
pub mod plugins;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod types;
pub mod waiting;

pub use cluster::{Binder, BoxFuture, InMemoryCluster, NodeLister};
pub use config::{ProfileConfig, SchedulerConfig, ScorePluginConfig};
pub use cycle_state::CycleState;
pub use error::{SchedulerError, SchedulerResult};
pub use framework::{FilterResult, Framework, MAX_PERMIT_WAIT, PermitResult};
pub use plugin::{FilterPlugin, Handle, PermitPlugin, Plugin, PreScorePlugin, ScoreExtensions, ScorePlugin};
pub use queue::SchedulingQueue;
pub use registry::{PluginFactory, Registry};
pub use scheduler::{ScheduleOutcome, Scheduler};
pub use status::{Code, Status};
pub use types::{Binding, Node, Workload, WorkloadId};
pub use waiting::{Resolution, WaitingPod, WaitingPods};
pub use warpgrid_placement::{NodeScore, NodeScoreList};
