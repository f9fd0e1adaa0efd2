//! # Prometheus Metrics
//!
//! Counters and gauges for a simulation run, registered in a dedicated
//! [`prometheus::Registry`] under the `shroud` namespace and printed in the
//! text exposition format when the run ends.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub transactions_submitted_total: IntCounter,
    pub batches_approved_total: IntCounter,
    pub batches_rejected_total: IntCounter,
    pub batches_settled_total: IntCounter,
    pub double_spends_total: IntCounter,
    pub slashes_total: IntCounter,
    pub court_decrypt_attempts_total: IntCounter,
    pub active_members: IntGauge,
    pub treasury_balance: IntGauge,
    /// Wall time from opening a ballot to its tally.
    pub vote_round_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let g = IntGauge::new(name, help)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("shroud".into()), None)?;

        let vote_round_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "vote_round_seconds",
                "Time from opening a ballot to its tally, in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(vote_round_seconds.clone()))?;

        Ok(Self {
            transactions_submitted_total: counter(
                &registry,
                "transactions_submitted_total",
                "Transactions accepted into the pool",
            )?,
            batches_approved_total: counter(
                &registry,
                "batches_approved_total",
                "Batches that reached quorum",
            )?,
            batches_rejected_total: counter(
                &registry,
                "batches_rejected_total",
                "Batches that missed quorum",
            )?,
            batches_settled_total: counter(
                &registry,
                "batches_settled_total",
                "Batches whose nullifiers were admitted",
            )?,
            double_spends_total: counter(
                &registry,
                "double_spends_total",
                "Settlements refused on a nullifier collision",
            )?,
            slashes_total: counter(&registry, "slashes_total", "Penalties applied to members")?,
            court_decrypt_attempts_total: counter(
                &registry,
                "court_decrypt_attempts_total",
                "Court-ordered decryption attempts, successful or not",
            )?,
            active_members: gauge(&registry, "active_members", "Members currently voting")?,
            treasury_balance: gauge(&registry, "treasury_balance", "Undistributed slashed stake")?,
            vote_round_seconds,
            registry,
        })
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_carries_namespace() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.batches_settled_total.inc();
        metrics.active_members.set(12);
        let text = metrics.encode().unwrap();
        assert!(text.contains("shroud_batches_settled_total 1"));
        assert!(text.contains("shroud_active_members 12"));
    }
}
