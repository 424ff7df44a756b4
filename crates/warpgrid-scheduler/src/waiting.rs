//! Permit coordination — workloads waiting on permit plugins.
//!
//! When one or more permit plugins answer `Wait`, the framework registers
//! a [`WaitingPod`] in [`WaitingPods`]. Each waiting plugin gets its own
//! deadline timer. The entry resolves exactly once:
//!
//! ```text
//!   Waiting ──allow(last pending plugin)──▶ Approved
//!      │
//!      ├──reject(any plugin)───────────────▶ Rejected
//!      └──deadline timer fires─────────────▶ Rejected (timeout)
//! ```
//!
//! The first resolving transition wins; later `allow`/`reject` calls and
//! late timers are no-ops. The resolution is published on a `watch`
//! channel so any number of waiters observe the same value. The entry
//! leaves the registry once it resolves and a waiter has seen it, or once
//! the last waiter gives up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::status::Status;
use crate::types::{Workload, WorkloadId};

/// Terminal outcome of a waiting pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Approved,
    Rejected {
        /// Plugin that rejected, if the rejection came from a plugin.
        plugin: Option<String>,
        reason: String,
    },
}

impl Resolution {
    pub fn is_approved(&self) -> bool {
        matches!(self, Resolution::Approved)
    }

    /// Convert to a stage status: `Success` or `Unschedulable`.
    pub fn into_status(self) -> Status {
        match self {
            Resolution::Approved => Status::success(),
            Resolution::Rejected { plugin, reason } => {
                let status = Status::unschedulable(reason);
                match plugin {
                    Some(p) => status.with_failed_plugin(&p),
                    None => status,
                }
            }
        }
    }
}

struct WaitState {
    /// Plugins still to answer → their deadline timer.
    pending: HashMap<String, JoinHandle<()>>,
    resolution: Option<Resolution>,
    /// Waiters currently registered through [`WaitingPods::wait_for`].
    waiters: usize,
}

/// A workload suspended in the Permit stage.
pub struct WaitingPod {
    workload: Arc<Workload>,
    state: Mutex<WaitState>,
    signal: watch::Sender<Option<Resolution>>,
}

impl WaitingPod {
    /// Create a waiting pod and start one deadline timer per plugin.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(workload: Arc<Workload>, plugin_wait_times: HashMap<String, Duration>) -> Arc<Self> {
        let (signal, _) = watch::channel(None);
        let pod = Arc::new(Self {
            workload,
            state: Mutex::new(WaitState {
                pending: HashMap::new(),
                resolution: None,
                waiters: 0,
            }),
            signal,
        });

        if plugin_wait_times.is_empty() {
            {
                let mut state = pod.lock();
                pod.resolve(&mut state, Resolution::Approved);
            }
            return pod;
        }

        {
            // Timers are registered under the lock so an early timer can't
            // resolve against a half-built pending set.
            let mut state = pod.lock();
            for (plugin, wait) in plugin_wait_times {
                let weak = Arc::downgrade(&pod);
                let name = plugin.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    if let Some(pod) = weak.upgrade() {
                        let reason = format!(
                            "rejected due to timeout after waiting {wait:?} at plugin {name}"
                        );
                        pod.reject(&name, &reason);
                    }
                });
                state.pending.insert(plugin, timer);
            }
        }

        pod
    }

    pub fn workload(&self) -> &Arc<Workload> {
        &self.workload
    }

    /// Plugins that haven't allowed yet, sorted by name.
    pub fn pending_plugins(&self) -> Vec<String> {
        let mut plugins: Vec<String> = self.lock().pending.keys().cloned().collect();
        plugins.sort();
        plugins
    }

    /// The resolution, once reached.
    pub fn resolution(&self) -> Option<Resolution> {
        self.lock().resolution.clone()
    }

    /// Record that `plugin` allows the workload.
    ///
    /// Returns `true` if `plugin` was pending. The pod is approved once
    /// no plugin is left pending.
    pub fn allow(&self, plugin: &str) -> bool {
        let mut state = self.lock();
        if state.resolution.is_some() {
            return false;
        }
        let Some(timer) = state.pending.remove(plugin) else {
            return false;
        };
        timer.abort();

        debug!(
            workload = %self.workload.uid,
            %plugin,
            remaining = state.pending.len(),
            "permit plugin allowed"
        );

        if state.pending.is_empty() {
            self.resolve(&mut state, Resolution::Approved);
        }
        true
    }

    /// Reject the workload on behalf of `plugin`, regardless of any other
    /// pending plugin. Returns `false` if already resolved.
    pub fn reject(&self, plugin: &str, reason: &str) -> bool {
        self.reject_with(Some(plugin), reason)
    }

    fn reject_with(&self, plugin: Option<&str>, reason: &str) -> bool {
        let mut state = self.lock();
        if state.resolution.is_some() {
            return false;
        }
        for (_, timer) in state.pending.drain() {
            timer.abort();
        }
        info!(
            workload = %self.workload.uid,
            plugin = plugin.unwrap_or("-"),
            %reason,
            "waiting workload rejected"
        );
        self.resolve(
            &mut state,
            Resolution::Rejected {
                plugin: plugin.map(str::to_string),
                reason: reason.to_string(),
            },
        );
        true
    }

    /// Wait for the terminal resolution.
    ///
    /// Every caller, concurrent or late, gets the same value.
    pub async fn wait(&self) -> Resolution {
        let mut rx = self.signal.subscribe();
        // The sender lives as long as `self`, so the channel can't close here.
        let resolution = match rx.wait_for(|r| r.is_some()).await {
            Ok(current) => (*current).clone(),
            Err(_) => None,
        };
        resolution.unwrap_or_else(|| Resolution::Rejected {
            plugin: None,
            reason: "waiting pod dropped without a decision".to_string(),
        })
    }

    fn resolve(&self, state: &mut WaitState, resolution: Resolution) {
        state.resolution = Some(resolution.clone());
        self.signal.send_replace(Some(resolution));
    }

    fn join(&self) {
        self.lock().waiters += 1;
    }

    /// Drop one waiter. Returns `true` if the pod is resolved or nobody
    /// is left waiting on it.
    fn leave(&self) -> bool {
        let mut state = self.lock();
        state.waiters = state.waiters.saturating_sub(1);
        state.resolution.is_some() || state.waiters == 0
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for WaitingPod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingPod")
            .field("workload", &self.workload.uid)
            .field("pending", &self.pending_plugins())
            .field("resolution", &self.resolution())
            .finish()
    }
}

/// Registry of waiting pods keyed by workload uid.
#[derive(Default)]
pub struct WaitingPods {
    pods: Mutex<HashMap<WorkloadId, Arc<WaitingPod>>>,
}

impl WaitingPods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiting pod, replacing any stale entry for the same uid.
    pub fn add(&self, pod: Arc<WaitingPod>) {
        let uid = pod.workload().uid.clone();
        let stale = self.lock().insert(uid, pod);
        if let Some(stale) = stale {
            stale.reject_with(None, "superseded by a newer scheduling attempt");
        }
    }

    pub fn get(&self, uid: &WorkloadId) -> Option<Arc<WaitingPod>> {
        self.lock().get(uid).cloned()
    }

    /// Allow `uid` on behalf of `plugin`. Returns `false` if there is no
    /// such waiting pod or the plugin wasn't pending.
    pub fn allow(&self, uid: &WorkloadId, plugin: &str) -> bool {
        match self.get(uid) {
            Some(pod) => pod.allow(plugin),
            None => {
                debug!(workload = %uid, %plugin, "allow for unknown waiting workload ignored");
                false
            }
        }
    }

    /// Reject `uid` on behalf of `plugin`. Returns `false` if there is no
    /// such waiting pod or it already resolved.
    pub fn reject(&self, uid: &WorkloadId, plugin: &str, reason: &str) -> bool {
        match self.get(uid) {
            Some(pod) => pod.reject(plugin, reason),
            None => {
                debug!(workload = %uid, %plugin, "reject for unknown waiting workload ignored");
                false
            }
        }
    }

    /// Reject every unresolved waiting pod. Returns how many were rejected.
    pub fn reject_all(&self, reason: &str) -> usize {
        let pods: Vec<Arc<WaitingPod>> = self.lock().values().cloned().collect();
        pods.iter().filter(|p| p.reject_with(None, reason)).count()
    }

    /// Wait for `uid` to resolve and drop it from the registry.
    ///
    /// A workload that never waited is approved immediately. Concurrent
    /// callers all block and receive the same resolution. If every caller
    /// drops its future early the entry is still removed and its timers
    /// cancelled.
    pub async fn get_resolution(&self, uid: &WorkloadId) -> Resolution {
        match self.get(uid) {
            Some(pod) => self.wait_for(&pod).await,
            None => Resolution::Approved,
        }
    }

    /// Wait for this particular `pod` to resolve.
    ///
    /// Unlike [`get_resolution`](Self::get_resolution) this never picks up
    /// a newer entry registered under the same uid. A superseded pod
    /// resolves as rejected and leaves the newer entry in place.
    pub async fn wait_for(&self, pod: &Arc<WaitingPod>) -> Resolution {
        pod.join();
        let _cleanup = RemoveOnDrop {
            registry: self,
            pod,
        };
        pod.wait().await
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `pod` if it is still the registered entry for its uid.
    fn remove(&self, pod: &Arc<WaitingPod>) {
        let uid = &pod.workload().uid;
        let removed = {
            let mut pods = self.lock();
            match pods.get(uid) {
                Some(current) if Arc::ptr_eq(current, pod) => pods.remove(uid),
                _ => None,
            }
        };
        if let Some(pod) = removed {
            pod.reject_with(None, "waiting pod removed before a decision was reached");
            debug!(workload = %uid, "waiting pod removed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkloadId, Arc<WaitingPod>>> {
        self.pods.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RemoveOnDrop<'a> {
    registry: &'a WaitingPods,
    pod: &'a Arc<WaitingPod>,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        if self.pod.leave() {
            self.registry.remove(self.pod);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(uid: &str) -> Arc<Workload> {
        Arc::new(Workload::new(uid, "default", "w-1"))
    }

    fn waits(list: &[(&str, u64)]) -> HashMap<String, Duration> {
        list.iter()
            .map(|(p, ms)| (p.to_string(), Duration::from_millis(*ms)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn approved_only_after_every_plugin_allows() {
        let pod = WaitingPod::new(workload("u1"), waits(&[("A", 1000), ("B", 1000)]));

        assert!(pod.allow("A"));
        assert_eq!(pod.resolution(), None);
        assert_eq!(pod.pending_plugins(), vec!["B"]);

        assert!(pod.allow("B"));
        assert_eq!(pod.resolution(), Some(Resolution::Approved));
        assert_eq!(pod.wait().await, Resolution::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_wins_over_pending_allows() {
        let pod = WaitingPod::new(workload("u1"), waits(&[("A", 1000), ("B", 1000)]));

        assert!(pod.allow("A"));
        assert!(pod.reject("B", "quota exceeded"));
        assert!(pod.pending_plugins().is_empty());

        // Terminal: further calls are no-ops.
        assert!(!pod.allow("B"));
        assert!(!pod.reject("A", "again"));

        assert_eq!(
            pod.wait().await,
            Resolution::Rejected {
                plugin: Some("B".to_string()),
                reason: "quota exceeded".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn allow_for_unknown_plugin_is_noop() {
        let pod = WaitingPod::new(workload("u1"), waits(&[("A", 1000)]));
        assert!(!pod.allow("Other"));
        assert_eq!(pod.resolution(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_deadline_rejects_with_timeout() {
        let pod = WaitingPod::new(workload("u1"), waits(&[("Slow", 500), ("Fast", 100)]));

        let started = tokio::time::Instant::now();
        let resolution = pod.wait().await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(500));
        match resolution {
            Resolution::Rejected { plugin, reason } => {
                assert_eq!(plugin.as_deref(), Some("Fast"));
                assert!(reason.contains("timeout"), "{reason}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_wait_set_is_approved() {
        let pod = WaitingPod::new(workload("u1"), HashMap::new());
        assert_eq!(pod.wait().await, Resolution::Approved);
    }

    #[tokio::test]
    async fn unknown_workload_resolves_approved_immediately() {
        let registry = WaitingPods::new();
        let resolution = registry.get_resolution(&WorkloadId::new("never-waited")).await;
        assert_eq!(resolution, Resolution::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_removes_entry() {
        let registry = Arc::new(WaitingPods::new());
        registry.add(WaitingPod::new(workload("u1"), waits(&[("A", 1000)])));
        assert_eq!(registry.len(), 1);

        let uid = WorkloadId::new("u1");
        let waiter = {
            let registry = registry.clone();
            let uid = uid.clone();
            tokio::spawn(async move { registry.get_resolution(&uid).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.allow(&uid, "A"));

        assert_eq!(waiter.await.unwrap(), Resolution::Approved);
        assert!(registry.is_empty());
        assert!(!registry.allow(&uid, "A"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_entry_is_drained() {
        let registry = WaitingPods::new();
        registry.add(WaitingPod::new(workload("u1"), waits(&[("A", 200)])));

        let resolution = registry.get_resolution(&WorkloadId::new("u1")).await;
        assert!(!resolution.is_approved());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_waiter_still_cleans_up() {
        let registry = WaitingPods::new();
        let pod = WaitingPod::new(workload("u1"), waits(&[("A", 10_000)]));
        registry.add(pod.clone());

        let uid = WorkloadId::new("u1");
        let res = tokio::time::timeout(Duration::from_millis(50), registry.get_resolution(&uid)).await;
        assert!(res.is_err());

        assert!(registry.is_empty());
        assert!(matches!(pod.resolution(), Some(Resolution::Rejected { .. })));
        assert!(pod.pending_plugins().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reject_all_fails_every_waiter() {
        let registry = WaitingPods::new();
        registry.add(WaitingPod::new(workload("u1"), waits(&[("A", 1000)])));
        registry.add(WaitingPod::new(workload("u2"), waits(&[("A", 1000)])));

        assert_eq!(registry.reject_all("scheduler shutting down"), 2);
        assert_eq!(registry.reject_all("again"), 0);

        let r = registry.get_resolution(&WorkloadId::new("u1")).await;
        assert_eq!(
            r,
            Resolution::Rejected {
                plugin: None,
                reason: "scheduler shutting down".to_string(),
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_allow_and_reject_resolve_once() {
        let registry = Arc::new(WaitingPods::new());
        registry.add(WaitingPod::new(workload("u1"), waits(&[("A", 1000), ("B", 1000)])));
        let uid = WorkloadId::new("u1");

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            let uid = uid.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    registry.allow(&uid, if i % 4 == 0 { "A" } else { "B" })
                } else {
                    registry.reject(&uid, "B", "no")
                }
            }));
        }

        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        // Whatever the interleaving, the pod resolved exactly once.
        assert!((1..=2).contains(&wins));
        let pod = registry.get(&uid).unwrap();
        assert!(pod.resolution().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_share_the_resolution() {
        let registry = Arc::new(WaitingPods::new());
        registry.add(WaitingPod::new(workload("u1"), waits(&[("A", 60_000)])));
        let uid = WorkloadId::new("u1");

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                let uid = uid.clone();
                tokio::spawn(async move { registry.get_resolution(&uid).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        // Both callers are parked; neither evicted the entry.
        assert_eq!(registry.len(), 1);
        assert!(registry.allow(&uid, "A"));

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Resolution::Approved);
        }
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waiter_leaves_other_waiters_alone() {
        let registry = Arc::new(WaitingPods::new());
        registry.add(WaitingPod::new(workload("u1"), waits(&[("A", 60_000)])));
        let uid = WorkloadId::new("u1");

        let patient = {
            let registry = registry.clone();
            let uid = uid.clone();
            tokio::spawn(async move { registry.get_resolution(&uid).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let gave_up = tokio::time::timeout(Duration::from_millis(50), registry.get_resolution(&uid)).await;
        assert!(gave_up.is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&uid).unwrap().resolution(), None);

        assert!(registry.allow(&uid, "A"));
        assert_eq!(patient.await.unwrap(), Resolution::Approved);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sticks_to_its_own_pod() {
        let registry = WaitingPods::new();
        let first = WaitingPod::new(workload("u1"), waits(&[("A", 60_000)]));
        registry.add(first.clone());
        let second = WaitingPod::new(workload("u1"), waits(&[("A", 60_000)]));
        registry.add(second.clone());

        let resolution = registry.wait_for(&first).await;
        assert_eq!(
            resolution,
            Resolution::Rejected {
                plugin: None,
                reason: "superseded by a newer scheduling attempt".to_string(),
            }
        );
        // The newer attempt is still registered and still pending.
        assert!(Arc::ptr_eq(&registry.get(&WorkloadId::new("u1")).unwrap(), &second));
        assert_eq!(second.resolution(), None);

        assert!(registry.allow(&WorkloadId::new("u1"), "A"));
        assert_eq!(registry.wait_for(&second).await, Resolution::Approved);
        assert!(registry.is_empty());
    }

    #[test]
    fn rejection_maps_to_unschedulable_status() {
        let status = Resolution::Rejected {
            plugin: Some("NodeNumber".to_string()),
            reason: "timeout".to_string(),
        }
        .into_status();

        assert!(status.is_unschedulable());
        assert_eq!(status.failed_plugin(), Some("NodeNumber"));
        assert!(Resolution::Approved.into_status().is_success());
    }
}
