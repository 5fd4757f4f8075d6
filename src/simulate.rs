//! Simulated traffic against a registry.
//!
//! Replays a fixed number of requests, logging each admission decision.
//! Useful for checking a node list before putting it in front of real
//! traffic.

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::admission::{Admission, NodeId, Registry};

/// How simulated requests pick a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Targeting {
    /// Let the registry choose the first node with capacity
    #[default]
    FirstFit,
    /// Cycle through the configured node ids, one request each
    Alternate,
}

/// Parameters of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of requests to send
    pub requests: u32,
    /// Nominal body size of each request
    pub body_size: u64,
    /// Sizes are drawn uniformly from `body_size ± size_jitter`
    pub size_jitter: u64,
    /// Pause between requests
    pub delay: Duration,
    pub targeting: Targeting,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            requests: 200,
            body_size: 100,
            size_jitter: 0,
            delay: Duration::from_millis(100),
            targeting: Targeting::FirstFit,
        }
    }
}

impl SimulationConfig {
    fn next_size<R: Rng>(&self, rng: &mut R) -> u64 {
        if self.size_jitter == 0 {
            return self.body_size;
        }
        let low = self.body_size.saturating_sub(self.size_jitter);
        let high = self.body_size.saturating_add(self.size_jitter);
        rng.gen_range(low..=high)
    }
}

/// Outcome counts of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub admitted: u64,
    pub rejected: u64,
    /// Admitted requests per node
    pub per_node: BTreeMap<NodeId, u64>,
}

impl SimulationReport {
    fn record(&mut self, admission: &Admission) {
        match admission {
            Admission::Admitted { node_id } => {
                self.admitted += 1;
                *self.per_node.entry(*node_id).or_default() += 1;
            }
            Admission::Rejected { .. } => self.rejected += 1,
        }
    }
}

/// Run a simulation against `registry`.
pub async fn run(registry: &Registry, config: &SimulationConfig) -> SimulationReport {
    let targets: Vec<NodeId> = registry.snapshot().iter().map(|u| u.id).collect();
    let mut report = SimulationReport::default();

    info!(
        requests = config.requests,
        body_size = config.body_size,
        size_jitter = config.size_jitter,
        targeting = ?config.targeting,
        nodes = targets.len(),
        "Starting traffic simulation"
    );

    for i in 0..config.requests {
        // ThreadRng is not Send, keep it out of the await below
        let size = config.next_size(&mut rand::thread_rng());

        let admission = match (config.targeting, targets.is_empty()) {
            (Targeting::Alternate, false) => {
                let node_id = targets[i as usize % targets.len()];
                registry.admit_to(node_id, size)
            }
            _ => registry.admit(size),
        };

        match admission {
            Admission::Admitted { node_id } => {
                info!(request = i + 1, node_id = %node_id, size = size, "Request processed");
            }
            Admission::Rejected { reason } => {
                info!(request = i + 1, size = size, reason = %reason, "Request rejected");
            }
        }
        report.record(&admission);

        if !config.delay.is_zero() {
            tokio::time::sleep(config.delay).await;
        }
    }

    info!(
        admitted = report.admitted,
        rejected = report.rejected,
        "Traffic simulation finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::NodeDescriptor;

    fn registry_with(nodes: &[(u64, u64, u64)]) -> Registry {
        Registry::from_descriptors(
            nodes
                .iter()
                .map(|&(id, requests, bytes)| NodeDescriptor::new(id, requests, bytes)),
        )
        .unwrap()
    }

    fn quick(requests: u32, targeting: Targeting) -> SimulationConfig {
        SimulationConfig {
            requests,
            delay: Duration::ZERO,
            targeting,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_fit_simulation() {
        let registry = registry_with(&[(1, 3, 10_000), (2, 3, 10_000)]);

        let report = run(&registry, &quick(10, Targeting::FirstFit)).await;

        assert_eq!(report.admitted, 6);
        assert_eq!(report.rejected, 4);
        assert_eq!(report.per_node[&NodeId(1)], 3);
        assert_eq!(report.per_node[&NodeId(2)], 3);
    }

    #[tokio::test]
    async fn test_alternate_simulation_spreads_requests() {
        let registry = registry_with(&[(1, 100, 10_000), (2, 100, 10_000)]);

        let report = run(&registry, &quick(6, Targeting::Alternate)).await;

        assert_eq!(report.admitted, 6);
        assert_eq!(report.per_node[&NodeId(1)], 3);
        assert_eq!(report.per_node[&NodeId(2)], 3);
    }

    #[tokio::test]
    async fn test_alternate_simulation_respects_byte_limit() {
        // 100-byte requests, room for two on node 1
        let registry = registry_with(&[(1, 100, 250), (2, 100, 10_000)]);

        let report = run(&registry, &quick(8, Targeting::Alternate)).await;

        assert_eq!(report.per_node[&NodeId(1)], 2);
        assert_eq!(report.per_node[&NodeId(2)], 4);
        assert_eq!(report.rejected, 2);
    }

    #[tokio::test]
    async fn test_simulation_on_empty_registry() {
        let registry = Registry::new();

        let report = run(&registry, &quick(5, Targeting::Alternate)).await;

        assert_eq!(report.admitted, 0);
        assert_eq!(report.rejected, 5);
        assert!(report.per_node.is_empty());
    }

    #[test]
    fn test_jittered_sizes_stay_in_range() {
        let config = SimulationConfig {
            body_size: 100,
            size_jitter: 20,
            ..Default::default()
        };
        let mut rng = rand::thread_rng();

        for _ in 0..1000 {
            let size = config.next_size(&mut rng);
            assert!((80..=120).contains(&size));
        }
    }

    #[test]
    fn test_jitter_saturates_at_zero() {
        let config = SimulationConfig {
            body_size: 5,
            size_jitter: 50,
            ..Default::default()
        };
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            assert!(config.next_size(&mut rng) <= 55);
        }
    }
}
