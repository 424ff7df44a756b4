//! Scheduler — the control loop that places pending workloads.
//!
//! Each iteration takes one workload off the queue and drives it through
//! Filter → PreScore → Score → select → Permit sequentially. A workload a
//! permit plugin asks to hold is handed to a binding task that waits for
//! the decision and then binds, so the loop moves on right away. Bind
//! failures are reported and never retried.
//!
//! ```text
//! SchedulingQueue ──▶ Scheduler::run
//!                        ├── NodeLister (fresh node list per attempt)
//!                        ├── Framework (plugin stages)
//!                        ├── select_host (seeded StdRng)
//!                        └── Binder ◀── binding tasks (Permit Wait)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use warpgrid_placement::select_host;

use crate::cluster::{Binder, NodeLister};
use crate::config::SchedulerConfig;
use crate::cycle_state::CycleState;
use crate::error::{SchedulerError, SchedulerResult};
use crate::framework::Framework;
use crate::plugin::Handle;
use crate::queue::SchedulingQueue;
use crate::registry::Registry;
use crate::status::{Code, Status};
use crate::types::{Binding, Workload};
use crate::waiting::{WaitingPod, WaitingPods};

/// How often the loop collects finished binding tasks while idle.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one scheduling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    /// Permit approved immediately and the binding was recorded.
    Bound { node: String },
    /// A permit plugin asked to wait; a binding task owns the rest.
    WaitingOnPermit { node: String },
    /// No node fits, or a plugin rejected the workload.
    Unschedulable { status: Status },
}

pub struct Scheduler {
    queue: Arc<SchedulingQueue>,
    framework: Arc<Framework>,
    handle: Handle,
    lister: Arc<dyn NodeLister>,
    binder: Arc<dyn Binder>,
    /// Tie-break source for node selection.
    rng: Mutex<StdRng>,
    /// Wait-then-bind tasks for workloads held in Permit.
    binding_tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// Build a scheduler for `config.profile` using plugins from `registry`.
    pub fn new(
        config: &SchedulerConfig,
        registry: &Registry,
        lister: Arc<dyn NodeLister>,
        binder: Arc<dyn Binder>,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        let handle = Handle::new(Arc::new(WaitingPods::new()));
        let framework = Framework::new(registry, config, handle.clone())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            queue: Arc::new(SchedulingQueue::new()),
            framework: Arc::new(framework),
            handle,
            lister,
            binder,
            rng: Mutex::new(rng),
            binding_tasks: Mutex::new(JoinSet::new()),
        })
    }

    pub fn queue(&self) -> &Arc<SchedulingQueue> {
        &self.queue
    }

    /// Add a workload to the pending queue.
    pub fn enqueue(&self, workload: Workload) -> bool {
        self.queue.add(workload)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn waiting_pods(&self) -> &Arc<WaitingPods> {
        self.handle.waiting_pods()
    }

    /// Binding tasks not yet reaped.
    pub fn pending_binding_tasks(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Run the scheduling loop until the shutdown signal flips.
    ///
    /// On shutdown every waiting workload is rejected and the binding
    /// tasks are drained before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler started");

        let mut reap = tokio::time::interval(REAP_INTERVAL);
        reap.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                workload = self.queue.next_workload() => {
                    let key = workload.key();
                    match self.schedule_one(workload, &shutdown).await {
                        Ok(outcome) => debug!(workload = %key, ?outcome, "scheduling attempt finished"),
                        Err(e @ SchedulerError::Cancelled(_)) => {
                            info!(workload = %key, error = %e, "binding skipped")
                        }
                        Err(e) => error!(workload = %key, error = %e, "scheduling attempt failed"),
                    }
                    self.reap_binding_tasks();
                }
                _ = reap.tick() => {
                    self.reap_binding_tasks();
                }
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }

        let rejected = self.waiting_pods().reject_all("scheduler shutting down");
        self.drain_binding_tasks().await;
        info!(rejected, "scheduler stopped");
    }

    /// Run one scheduling attempt for `workload`.
    pub async fn schedule_one(
        &self,
        workload: Workload,
        shutdown: &watch::Receiver<bool>,
    ) -> SchedulerResult<ScheduleOutcome> {
        let workload = Arc::new(workload);
        let key = workload.key();
        debug!(workload = %key, "attempting to schedule workload");

        let nodes = self
            .lister
            .list()
            .await
            .map_err(|e| SchedulerError::NodeList(format!("{e:#}")))?;

        let mut state = CycleState::new();

        let filtered = self.framework.run_filter_plugins(&state, &workload, &nodes);
        if filtered.feasible.is_empty() {
            let message = filtered.fit_error(nodes.len());
            warn!(workload = %key, %message, "workload is unschedulable");
            return Ok(ScheduleOutcome::Unschedulable {
                status: Status::unschedulable(message),
            });
        }
        debug!(
            workload = %key,
            feasible = filtered.feasible.len(),
            total = nodes.len(),
            "filter finished"
        );

        let status = self
            .framework
            .run_pre_score_plugins(&mut state, &workload, &filtered.feasible);
        if !status.is_success() {
            return stage_failed(&key, "PreScore", status);
        }

        let scores = match self
            .framework
            .run_score_plugins(&state, &workload, &filtered.feasible)
        {
            Ok(scores) => scores,
            Err(status) => return stage_failed(&key, "Score", status),
        };

        let node = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            select_host(&scores, &mut *rng)?
        };
        debug!(workload = %key, %node, "node selected");

        let permit = self.framework.run_permit_plugins(&state, &workload, &node);
        match (permit.status.code(), permit.waiting) {
            (Code::Success, _) => {
                bind(self.binder.as_ref(), &workload, &node, shutdown).await?;
                Ok(ScheduleOutcome::Bound { node })
            }
            (Code::Wait, Some(pod)) => {
                self.spawn_binding_task(pod, node.clone(), shutdown.clone());
                Ok(ScheduleOutcome::WaitingOnPermit { node })
            }
            (Code::Wait, None) => Err(SchedulerError::Stage {
                stage: "Permit",
                status: Status::error("Wait without a registered waiting pod"),
            }),
            (Code::Unschedulable | Code::Error, _) => stage_failed(&key, "Permit", permit.status),
        }
    }

    /// Wait for every binding task to finish.
    pub async fn drain_binding_tasks(&self) {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        while let Some(res) = tasks.join_next().await {
            log_task_result(res);
        }
    }

    /// Wait on this attempt's own pod, then bind.
    fn spawn_binding_task(&self, pod: Arc<WaitingPod>, node: String, shutdown: watch::Receiver<bool>) {
        let framework = self.framework.clone();
        let binder = self.binder.clone();

        self.lock_tasks().spawn(async move {
            let status = framework.wait_on_permit(&pod).await;
            if !status.is_success() {
                return;
            }
            let workload = pod.workload();
            match bind(binder.as_ref(), workload, &node, &shutdown).await {
                Ok(()) => {}
                Err(e @ SchedulerError::Cancelled(_)) => {
                    warn!(
                        workload = %workload.key(),
                        %node,
                        error = %e,
                        "permit approved during shutdown, binding skipped"
                    );
                }
                Err(e) => error!(workload = %workload.key(), error = %e, "binding failed"),
            }
        });
    }

    fn reap_binding_tasks(&self) {
        let mut tasks = self.lock_tasks();
        while let Some(res) = tasks.try_join_next() {
            log_task_result(res);
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.binding_tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Record the binding unless shutdown has been signalled.
async fn bind(
    binder: &dyn Binder,
    workload: &Workload,
    node: &str,
    shutdown: &watch::Receiver<bool>,
) -> SchedulerResult<()> {
    if *shutdown.borrow() {
        return Err(SchedulerError::Cancelled(workload.uid.clone()));
    }
    binder
        .bind(Binding::new(workload, node))
        .await
        .map_err(|e| SchedulerError::Bind {
            workload: workload.uid.clone(),
            node: node.to_string(),
            message: format!("{e:#}"),
        })?;
    info!(workload = %workload.key(), %node, "workload bound");
    Ok(())
}

/// Unschedulable ends the attempt quietly; anything else is an error.
fn stage_failed(key: &str, stage: &'static str, status: Status) -> SchedulerResult<ScheduleOutcome> {
    if status.is_unschedulable() {
        warn!(workload = %key, stage, %status, "workload rejected");
        Ok(ScheduleOutcome::Unschedulable { status })
    } else {
        Err(SchedulerError::Stage { stage, status })
    }
}

fn log_task_result(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!(error = %e, "binding task panicked");
        } else {
            debug!(error = %e, "binding task cancelled");
        }
    }
}
