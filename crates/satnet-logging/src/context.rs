//! Node context injection for multi-node logging
//!
//! A simulation drives every node from one thread, so the node whose event
//! is being processed is kept in thread-local storage for the duration of
//! that event.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use satnet_core::{NodeId, NodeRole};
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq)]
pub struct NodeContextData {
    pub node_id: NodeId,
    pub node_role: NodeRole,
    /// Unique id of this run of the node
    pub instance_id: Uuid,
    /// Wall-clock time the context was entered
    pub entered_at: DateTime<Utc>,
}

impl NodeContextData {
    /// Span carrying the node fields, for layers that only see span data
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "node",
            node_id = %self.node_id,
            node_role = %self.node_role,
            instance_id = %self.instance_id,
        )
    }
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Sets the node context for the current thread and restores the previous
/// one when dropped.
///
/// # Example
///
/// ```ignore
/// use satnet_logging::NodeContextGuard;
/// use satnet_core::{NodeId, NodeRole};
///
/// let _guard = NodeContextGuard::new(NodeId(7), NodeRole::Satellite);
/// tracing::info!("Forwarding packet");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    pub fn new(node_id: NodeId, node_role: NodeRole) -> Self {
        Self::with_instance_id(node_id, node_role, Uuid::new_v4())
    }

    /// Keep a stable instance id, e.g. across repeated runs of a scenario
    pub fn with_instance_id(node_id: NodeId, node_role: NodeRole, instance_id: Uuid) -> Self {
        let data = NodeContextData {
            node_id,
            node_role,
            instance_id,
            entered_at: Utc::now(),
        };
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Span for the context this guard installed
    pub fn span(&self) -> tracing::Span {
        Self::current()
            .map(|ctx| ctx.span())
            .unwrap_or_else(tracing::Span::none)
    }

    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node_id() -> Option<NodeId> {
        Self::current().map(|ctx| ctx.node_id)
    }

    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with the node context set
///
/// ```ignore
/// with_node_context!(NodeId(3), NodeRole::GroundStation, {
///     tracing::info!("Injecting packet");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node:expr, $role:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node, $role);
        $body
    }};
}
