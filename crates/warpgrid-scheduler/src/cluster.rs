//! Cluster collaborators — node listing and binding.
//!
//! The scheduler only needs two things from the cluster: a fresh node
//! list per attempt and a way to durably record a placement. Both are
//! traits so the control plane can plug in its own client;
//! [`InMemoryCluster`] backs tests and the standalone daemon.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use anyhow::bail;
use tracing::debug;

use crate::types::{Binding, Node, WorkloadId};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of the current node set.
pub trait NodeLister: Send + Sync {
    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<Node>>>;
}

/// Durably records a placement decision.
pub trait Binder: Send + Sync {
    fn bind(&self, binding: Binding) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// An in-process cluster: a mutable node set plus a binding log.
#[derive(Default)]
pub struct InMemoryCluster {
    nodes: RwLock<Vec<Node>>,
    bindings: Mutex<Vec<Binding>>,
    unavailable: AtomicBool,
}

impl InMemoryCluster {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            bindings: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn add_node(&self, node: Node) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }

    pub fn remove_node(&self, name: &str) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let before = nodes.len();
        nodes.retain(|n| n.name != name);
        nodes.len() != before
    }

    /// Simulate an API outage: list and bind fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every binding recorded so far, in bind order.
    pub fn bindings(&self) -> Vec<Binding> {
        self.lock_bindings().clone()
    }

    pub fn bind_count(&self) -> usize {
        self.lock_bindings().len()
    }

    /// Node a workload was bound to, if any.
    pub fn bound_node(&self, uid: &WorkloadId) -> Option<String> {
        self.lock_bindings()
            .iter()
            .find(|b| &b.workload_id == uid)
            .map(|b| b.node_name.clone())
    }

    fn lock_bindings(&self) -> MutexGuard<'_, Vec<Binding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> anyhow::Result<Vec<Node>> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("cluster API unavailable");
        }
        Ok(self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn record(&self, binding: Binding) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("cluster API unavailable");
        }
        let known = self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|n| n.name == binding.node_name);
        if !known {
            bail!("node {} not found", binding.node_name);
        }

        let mut bindings = self.lock_bindings();
        if let Some(existing) = bindings.iter().find(|b| b.workload_id == binding.workload_id) {
            bail!(
                "workload {} is already bound to {}",
                binding.workload_id,
                existing.node_name
            );
        }
        debug!(workload = %binding.workload_id, node = %binding.node_name, "binding recorded");
        bindings.push(binding);
        Ok(())
    }
}

impl NodeLister for InMemoryCluster {
    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<Node>>> {
        Box::pin(async move { self.snapshot() })
    }
}

impl Binder for InMemoryCluster {
    fn bind(&self, binding: Binding) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move { self.record(binding) })
    }
}
