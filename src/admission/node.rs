//! Node descriptors and per-node usage counters.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::decision::RejectReason;
use crate::error::{NodegateError, Result};

/// Identifier of a backend node, assigned by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Immutable capacity descriptor of a node.
///
/// The node list format of older deployments used `rpm_limit` and
/// `bpm_limit`; both names are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node identifier
    pub id: NodeId,
    /// Maximum requests admitted per accounting window
    #[serde(alias = "rpm_limit")]
    pub request_limit: u64,
    /// Maximum request-body bytes admitted per accounting window
    #[serde(alias = "bpm_limit")]
    pub byte_limit: u64,
}

impl NodeDescriptor {
    /// Create a new descriptor.
    pub fn new(id: u64, request_limit: u64, byte_limit: u64) -> Self {
        Self {
            id: NodeId(id),
            request_limit,
            byte_limit,
        }
    }

    /// Check that both limits are positive.
    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(NodegateError::Config(format!(
                "node {}: request_limit must be positive",
                self.id
            )));
        }
        if self.byte_limit == 0 {
            return Err(NodegateError::Config(format!(
                "node {}: byte_limit must be positive",
                self.id
            )));
        }
        Ok(())
    }
}

/// Derived admission state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// The node can admit more work
    UnderLimit,
    /// Not even an empty request fits
    AtLimit,
}

/// A backend node: its descriptor plus the usage accumulated so far.
///
/// Counters only change through the registry, which holds every node behind
/// its lock.
#[derive(Debug)]
pub struct Node {
    descriptor: NodeDescriptor,
    current_requests: u64,
    current_bytes: u64,
}

impl Node {
    pub(crate) fn new(descriptor: NodeDescriptor) -> Self {
        Self {
            descriptor,
            current_requests: 0,
            current_bytes: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.descriptor.id
    }

    pub fn current_requests(&self) -> u64 {
        self.current_requests
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    /// `AtLimit` exactly when [`Node::check`] refuses an empty request.
    pub fn state(&self) -> NodeState {
        if self.check(0).is_err() {
            NodeState::AtLimit
        } else {
            NodeState::UnderLimit
        }
    }

    /// Check whether one more request of `size` bytes fits.
    ///
    /// Arithmetic overflow counts as not fitting.
    pub(crate) fn check(&self, size: u64) -> std::result::Result<(), RejectReason> {
        let requests_fit = self
            .current_requests
            .checked_add(1)
            .is_some_and(|r| r <= self.descriptor.request_limit);
        if !requests_fit {
            return Err(RejectReason::RequestLimit);
        }

        let bytes_fit = self
            .current_bytes
            .checked_add(size)
            .is_some_and(|b| b <= self.descriptor.byte_limit);
        if !bytes_fit {
            return Err(RejectReason::ByteLimit);
        }

        Ok(())
    }

    /// Record one admitted request. Callers must have passed [`Node::check`].
    pub(crate) fn commit(&mut self, size: u64) {
        self.current_requests += 1;
        self.current_bytes += size;
    }

    pub(crate) fn usage(&self) -> NodeUsage {
        NodeUsage {
            id: self.descriptor.id,
            request_limit: self.descriptor.request_limit,
            byte_limit: self.descriptor.byte_limit,
            current_requests: self.current_requests,
            current_bytes: self.current_bytes,
            state: self.state(),
        }
    }
}

/// Point-in-time copy of a node's limits and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUsage {
    pub id: NodeId,
    pub request_limit: u64,
    pub byte_limit: u64,
    pub current_requests: u64,
    pub current_bytes: u64,
    pub state: NodeState,
}

impl NodeUsage {
    /// Requests the node can still admit.
    pub fn remaining_requests(&self) -> u64 {
        self.request_limit.saturating_sub(self.current_requests)
    }

    /// Bytes the node can still admit.
    pub fn remaining_bytes(&self) -> u64 {
        self.byte_limit.saturating_sub(self.current_bytes)
    }
}
