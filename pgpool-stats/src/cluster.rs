use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for cluster events (§3 `conn_counter`, §4.H).
///
/// All fields are independent atomics rather than one lock-guarded struct:
/// they are purely informational (spec.md calls `conn_counter`
/// "informational") and never read back to drive a decision, so there is
/// no cross-field consistency requirement to protect.
#[derive(Debug, Default)]
pub struct ClusterCounters {
    pub conn_counter: AtomicU64,
    pub failovers: AtomicU64,
    pub failbacks: AtomicU64,
    pub promotions: AtomicU64,
    pub health_check_failures: AtomicU64,
}

impl ClusterCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect(&self) {
        self.conn_counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failover(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failback(&self) {
        self.failbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClusterCountersSnapshot {
        ClusterCountersSnapshot {
            conn_counter: self.conn_counter.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            failbacks: self.failbacks.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time, serializable copy of `ClusterCounters` (for the
/// status HTTP endpoint, §2 component K).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ClusterCountersSnapshot {
    pub conn_counter: u64,
    pub failovers: u64,
    pub failbacks: u64,
    pub promotions: u64,
    pub health_check_failures: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counters() {
        let counters = ClusterCounters::new();
        counters.record_connect();
        counters.record_connect();
        counters.record_failover();

        let snap = counters.snapshot();
        assert_eq!(snap.conn_counter, 2);
        assert_eq!(snap.failovers, 1);
        assert_eq!(snap.failbacks, 0);
    }
}
