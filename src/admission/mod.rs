//! Admission decisions and node state management.

mod decision;
mod node;
mod registry;

pub use decision::{Admission, RejectReason};
pub use node::{NodeDescriptor, NodeId, NodeState, NodeUsage};
pub use registry::{validate_descriptors, Registry};
