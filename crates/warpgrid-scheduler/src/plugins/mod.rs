//! Built-in plugins.

use std::sync::Arc;

use crate::plugin::Plugin;
use crate::registry::Registry;

pub mod label_affinity;
pub mod node_name;
pub mod node_number;
pub mod node_selector;

pub use label_affinity::LabelAffinity;
pub use node_name::NodeName;
pub use node_number::{NodeNumber, NodeNumberArgs};
pub use node_selector::NodeSelector;

/// Register every built-in plugin on `registry`. Names already taken are
/// logged and skipped.
pub(crate) fn register_builtins(registry: &mut Registry) {
    let builtins: [(&str, crate::registry::PluginFactory); 4] = [
        (
            NodeName::NAME,
            Box::new(|_, _| Ok(Arc::new(NodeName) as Arc<dyn Plugin>)),
        ),
        (
            NodeSelector::NAME,
            Box::new(|_, _| Ok(Arc::new(NodeSelector) as Arc<dyn Plugin>)),
        ),
        (
            NodeNumber::NAME,
            Box::new(|args, handle| {
                let args = NodeNumberArgs::from_value(args)?;
                Ok(Arc::new(NodeNumber::new(args, handle.clone())) as Arc<dyn Plugin>)
            }),
        ),
        (
            LabelAffinity::NAME,
            Box::new(|_, _| Ok(Arc::new(LabelAffinity) as Arc<dyn Plugin>)),
        ),
    ];

    for (name, factory) in builtins {
        if let Err(e) = registry.register(name, factory) {
            tracing::error!(plugin = name, error = %e, "failed to register built-in plugin");
        }
    }
}
