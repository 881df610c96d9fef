//! Shared cluster state (spec §3 "Cluster state", §4.A).

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pgpool_config::ReplicationMode;
use pgpool_stats::ClusterCounters;

use super::backend::{Backend, BackendStatus};
use super::queue::RequestQueue;

/// Streaming-replication recovery tri-state (§3 `in_recovery`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecoveryState {
    Init = 0,
    Ongoing = 1,
    Finished = 2,
}

impl RecoveryState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RecoveryState::Init,
            1 => RecoveryState::Ongoing,
            _ => RecoveryState::Finished,
        }
    }
}

/// The process-wide, mutable view of the cluster (§3, §4.A).
///
/// `master_node_id`/`primary_node_id` are plain atomics so readers never
/// block on the backends lock and "torn reads are tolerated" (§4.A) is
/// trivially true for a single `i32` word. Every write to them is
/// followed by a wake of the signal/notify machinery so workers (and, in
/// this rewrite, the status endpoint) can re-consult — see
/// `ClusterState::commit_master_primary`.
pub struct ClusterState {
    pub mode: ReplicationMode,
    backends: RwLock<Vec<Backend>>,
    master_node_id: AtomicI32,
    primary_node_id: AtomicI32,
    switching: AtomicBool,
    in_recovery: AtomicU8,
    pub queue: RequestQueue,
    pub counters: Arc<ClusterCounters>,
}

impl ClusterState {
    pub fn new(mode: ReplicationMode, backends: Vec<Backend>, queue_capacity: usize) -> Self {
        Self {
            mode,
            backends: RwLock::new(backends),
            master_node_id: AtomicI32::new(-1),
            primary_node_id: AtomicI32::new(-1),
            switching: AtomicBool::new(false),
            in_recovery: AtomicU8::new(RecoveryState::Init as u8),
            queue: RequestQueue::new(queue_capacity),
            counters: Arc::new(ClusterCounters::new()),
        }
    }

    pub fn master_node_id(&self) -> i32 {
        self.master_node_id.load(Ordering::Acquire)
    }

    pub fn primary_node_id(&self) -> i32 {
        self.primary_node_id.load(Ordering::Acquire)
    }

    pub fn is_switching(&self) -> bool {
        self.switching.load(Ordering::Acquire)
    }

    pub fn set_switching(&self, value: bool) {
        self.switching.store(value, Ordering::Release);
    }

    pub fn in_recovery(&self) -> RecoveryState {
        RecoveryState::from_u8(self.in_recovery.load(Ordering::Acquire))
    }

    pub fn set_in_recovery(&self, state: RecoveryState) {
        self.in_recovery.store(state as u8, Ordering::Release);
    }

    /// Commits a new master/primary pair (§4.H step 9). Returns whether
    /// either value actually changed, so callers can decide whether a
    /// fleet-wide wake is warranted.
    pub fn commit_master_primary(&self, master: i32, primary: i32) -> bool {
        let old_master = self.master_node_id.swap(master, Ordering::AcqRel);
        let old_primary = self.primary_node_id.swap(primary, Ordering::AcqRel);
        old_master != master || old_primary != primary
    }

    pub fn num_backends(&self) -> usize {
        self.backends.read().len()
    }

    pub fn with_backends<R>(&self, f: impl FnOnce(&[Backend]) -> R) -> R {
        f(&self.backends.read())
    }

    pub fn with_backends_mut<R>(&self, f: impl FnOnce(&mut Vec<Backend>) -> R) -> R {
        f(&mut self.backends.write())
    }

    pub fn status_of(&self, index: usize) -> Option<BackendStatus> {
        self.backends.read().get(index).map(|b| b.status)
    }

    pub fn set_status(&self, index: usize, status: BackendStatus) {
        if let Some(backend) = self.backends.write().get_mut(index) {
            backend.status = status;
        }
    }

    /// §4.H step 4: smallest index whose status is valid under the
    /// mode-appropriate predicate.
    pub fn select_new_master(&self) -> i32 {
        let backends = self.backends.read();
        let raw = self.mode.is_raw();
        backends
            .iter()
            .find(|b| {
                if raw {
                    b.status.is_valid_raw()
                } else {
                    b.status.is_valid()
                }
            })
            .map(|b| b.index as i32)
            .unwrap_or(-1)
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        let backends = self.backends.read();
        ClusterSnapshot {
            master_node_id: self.master_node_id(),
            primary_node_id: self.primary_node_id(),
            switching: self.is_switching(),
            backends: backends
                .iter()
                .map(|b| BackendSnapshot {
                    index: b.index,
                    hostname: b.hostname.clone(),
                    status: b.status,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendSnapshot {
    pub index: usize,
    pub hostname: String,
    pub status: BackendStatus,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClusterSnapshot {
    pub master_node_id: i32,
    pub primary_node_id: i32,
    pub switching: bool,
    pub backends: Vec<BackendSnapshot>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn backend(index: usize, status: BackendStatus) -> Backend {
        Backend {
            index,
            hostname: format!("db{index}"),
            port: 5432,
            data_directory: String::new(),
            weight: 1.0,
            status,
            disallow_to_failover: false,
        }
    }

    #[test]
    fn test_select_new_master_smallest_valid_index() {
        let backends = vec![
            backend(0, BackendStatus::Down),
            backend(1, BackendStatus::Up),
            backend(2, BackendStatus::Up),
        ];
        let state = ClusterState::new(ReplicationMode::StreamingReplication, backends, 10);
        assert_eq!(state.select_new_master(), 1);
    }

    #[test]
    fn test_select_new_master_none_valid() {
        let backends = vec![backend(0, BackendStatus::Down)];
        let state = ClusterState::new(ReplicationMode::Raw, backends, 10);
        assert_eq!(state.select_new_master(), -1);
    }

    #[test]
    fn test_commit_master_primary_reports_change() {
        let state = ClusterState::new(ReplicationMode::Raw, vec![backend(0, BackendStatus::Up)], 10);
        assert!(state.commit_master_primary(0, -1));
        assert!(!state.commit_master_primary(0, -1));
        assert!(state.commit_master_primary(1, -1));
    }
}
