//! Admission outcomes.

use serde::Serialize;
use std::fmt;

use super::node::NodeId;

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No configured node had room for the request
    NoCapacity,
    /// A targeted node does not exist
    UnknownNode,
    /// The targeted node has used up its request limit
    RequestLimit,
    /// The request would push the targeted node past its byte limit
    ByteLimit,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::NoCapacity => "no node has spare capacity",
            RejectReason::UnknownNode => "unknown node",
            RejectReason::RequestLimit => "request limit reached",
            RejectReason::ByteLimit => "byte limit reached",
        };
        f.write_str(reason)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// The request was accounted against `node_id`
    Admitted { node_id: NodeId },
    /// No counters changed
    Rejected { reason: RejectReason },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    /// The admitting node, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Admission::Admitted { node_id } => Some(*node_id),
            Admission::Rejected { .. } => None,
        }
    }
}
