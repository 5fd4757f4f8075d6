//! Node registry and the first-fit admission algorithm.

use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

use super::decision::{Admission, RejectReason};
use super::node::{Node, NodeDescriptor, NodeId, NodeUsage};
use crate::error::{NodegateError, Result};

/// Owns every node and serializes all admission decisions.
///
/// Nodes are kept in insertion order and are never removed. A single lock
/// covers the node list and every counter, so each check-then-commit is
/// atomic with respect to every other registry call.
pub struct Registry {
    nodes: Mutex<Vec<Node>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Build a registry from a node list.
    ///
    /// The whole list is validated before any node is added, so a failed
    /// load never leaves a partially populated registry.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = NodeDescriptor>,
    {
        let descriptors: Vec<NodeDescriptor> = descriptors.into_iter().collect();
        validate_descriptors(&descriptors)?;

        let registry = Self::new();
        for descriptor in descriptors {
            registry.add_node(descriptor);
        }
        Ok(registry)
    }

    /// Append a node. Duplicate ids are accepted; targeted admission then
    /// resolves to the earliest node with that id.
    pub fn add_node(&self, descriptor: NodeDescriptor) {
        let mut nodes = self.nodes.lock();

        if nodes.iter().any(|n| n.id() == descriptor.id) {
            warn!(node_id = %descriptor.id, "Adding node with duplicate id");
        }

        debug!(
            node_id = %descriptor.id,
            request_limit = descriptor.request_limit,
            byte_limit = descriptor.byte_limit,
            position = nodes.len(),
            "Adding node"
        );
        nodes.push(Node::new(descriptor));
    }

    /// Admit a request of `size` bytes on the first node with room for it.
    pub fn admit(&self, size: u64) -> Admission {
        let mut nodes = self.nodes.lock();

        for node in nodes.iter_mut() {
            trace!(
                node_id = %node.id(),
                size = size,
                current_requests = node.current_requests(),
                current_bytes = node.current_bytes(),
                "Checking node capacity"
            );

            if node.check(size).is_ok() {
                node.commit(size);
                debug!(node_id = %node.id(), size = size, "Request admitted");
                return Admission::Admitted { node_id: node.id() };
            }
        }

        debug!(size = size, nodes = nodes.len(), "Request rejected, no capacity");
        Admission::Rejected {
            reason: RejectReason::NoCapacity,
        }
    }

    /// Admit a request of `size` bytes on one specific node.
    pub fn admit_to(&self, node_id: NodeId, size: u64) -> Admission {
        let mut nodes = self.nodes.lock();

        let Some(node) = nodes.iter_mut().find(|n| n.id() == node_id) else {
            debug!(node_id = %node_id, "Targeted request for unknown node");
            return Admission::Rejected {
                reason: RejectReason::UnknownNode,
            };
        };

        match node.check(size) {
            Ok(()) => {
                node.commit(size);
                debug!(node_id = %node_id, size = size, "Targeted request admitted");
                Admission::Admitted { node_id }
            }
            Err(reason) => {
                debug!(node_id = %node_id, size = size, reason = %reason, "Targeted request rejected");
                Admission::Rejected { reason }
            }
        }
    }

    /// Consistent copy of every node's limits and counters, in insertion order.
    pub fn snapshot(&self) -> Vec<NodeUsage> {
        let nodes = self.nodes.lock();
        nodes.iter().map(Node::usage).collect()
    }

    /// Number of configured nodes.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a node list: positive limits and unique ids.
pub fn validate_descriptors(descriptors: &[NodeDescriptor]) -> Result<()> {
    let mut seen = HashSet::with_capacity(descriptors.len());

    for descriptor in descriptors {
        descriptor.validate()?;
        if !seen.insert(descriptor.id) {
            return Err(NodegateError::Config(format!(
                "duplicate node id {}",
                descriptor.id
            )));
        }
    }

    Ok(())
}
