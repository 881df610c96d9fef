//! Worker-pool supervision (spec §4.E).
//!
//! `do_child`, the PCP worker, and the auxiliary worker are all external
//! collaborators per spec.md §1 — only their lifecycle (fork/restart/
//! signal) is modeled. Each is a supervised `tokio::task` rather than an
//! OS process (SPEC_FULL.md's re-architecture note): the task body is an
//! opaque placeholder that runs until asked to shut down, standing in for
//! the real worker's connection-serving loop.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Which fleet slot a worker occupies (§3 "Worker record", §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerSlotId {
    Regular(usize),
    Pcp,
    Auxiliary,
}

/// Stand-in for "exited with zero status" vs "exited with non-zero
/// status" (§4.E reap rules). `Crashed` models a `SIGSEGV`-equivalent
/// panic, logged distinctly per spec.md §4.E's last sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Clean,
    Failed,
    Crashed,
}

/// Sent by a worker task's wrapper when the task ends, replacing
/// `SIGCHLD` + `waitpid(-1, ..., NOHANG)` (§4.E).
#[derive(Debug)]
pub struct WorkerExitEvent {
    pub slot: WorkerSlotId,
    pub outcome: WorkerOutcome,
}

pub(crate) struct Slot {
    pub(crate) occupied: bool,
    /// §3 "Worker record" `need_to_restart`: set on a streaming failback
    /// (§4.E) so the worker is recycled the next time it would otherwise
    /// be left alone, instead of being torn down immediately. Cleared
    /// whenever the slot is (re)spawned.
    pub(crate) need_to_restart: bool,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
    start_time: Instant,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            occupied: false,
            need_to_restart: false,
            shutdown: Arc::new(Notify::new()),
            handle: None,
            start_time: Instant::now(),
        }
    }
}

/// The fleet: `num_init_children` regular workers plus one PCP worker and
/// one auxiliary worker (§4.E "At boot, the supervisor forks exactly
/// `num_init_children` workers plus one PCP worker and one auxiliary
/// worker").
pub struct WorkerPool {
    regular: Vec<Slot>,
    pcp: Slot,
    auxiliary: Slot,
    exit_tx: mpsc::UnboundedSender<WorkerExitEvent>,
}

impl WorkerPool {
    /// Creates an empty pool (no tasks spawned yet) and the exit-report
    /// channel the event loop selects on.
    pub fn new(num_init_children: usize) -> (Self, mpsc::UnboundedReceiver<WorkerExitEvent>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let pool = Self {
            regular: (0..num_init_children).map(|_| Slot::vacant()).collect(),
            pcp: Slot::vacant(),
            auxiliary: Slot::vacant(),
            exit_tx,
        };
        (pool, exit_rx)
    }

    /// Spawns the initial fleet (§4.E "forks exactly num_init_children
    /// workers plus one PCP worker and one auxiliary worker").
    pub fn spawn_initial_fleet(&mut self) {
        let n = self.regular.len();
        for i in 0..n {
            self.spawn(WorkerSlotId::Regular(i));
        }
        self.spawn(WorkerSlotId::Pcp);
        self.spawn(WorkerSlotId::Auxiliary);
    }

    fn slot_mut(&mut self, id: WorkerSlotId) -> &mut Slot {
        match id {
            WorkerSlotId::Regular(i) => &mut self.regular[i],
            WorkerSlotId::Pcp => &mut self.pcp,
            WorkerSlotId::Auxiliary => &mut self.auxiliary,
        }
    }

    pub(crate) fn slot(&self, id: WorkerSlotId) -> &Slot {
        match id {
            WorkerSlotId::Regular(i) => &self.regular[i],
            WorkerSlotId::Pcp => &self.pcp,
            WorkerSlotId::Auxiliary => &self.auxiliary,
        }
    }

    /// Spawns a fresh worker task into `id`, replacing whatever was there.
    /// "Before it starts its own work, [the child] closes the parent's
    /// self-pipe ends, unblocks signals, and resets per-child flags"
    /// (§4.E) has no analogue here: the task simply owns its own
    /// `Notify` handle from construction.
    pub fn spawn(&mut self, id: WorkerSlotId) {
        let shutdown = Arc::new(Notify::new());
        let exit_tx = self.exit_tx.clone();
        let task_shutdown = shutdown.clone();

        let handle = tokio::spawn(async move {
            task_shutdown.notified().await;
            let _ = exit_tx.send(WorkerExitEvent {
                slot: id,
                outcome: WorkerOutcome::Clean,
            });
        });

        let slot = self.slot_mut(id);
        slot.occupied = true;
        slot.need_to_restart = false;
        slot.shutdown = shutdown;
        slot.handle = Some(handle);
        slot.start_time = Instant::now();
    }

    /// §4.E streaming-replication failback: "workers are merely asked to
    /// re-read state when idle" rather than torn down immediately.
    /// Flags every occupied regular slot for lazy recycling (§8 scenario
    /// 3) instead of restarting the fleet outright.
    pub fn flag_need_restart_all_regular(&mut self) {
        for slot in &mut self.regular {
            if slot.occupied {
                slot.need_to_restart = true;
            }
        }
    }

    /// Marks a slot vacant after its task has been reaped.
    fn vacate(&mut self, id: WorkerSlotId) {
        let slot = self.slot_mut(id);
        slot.occupied = false;
        slot.handle = None;
    }

    /// Applies the §4.E reap rules for one exit event. `exiting`/
    /// `switching` mirror the cluster-state flags of the same name.
    pub fn handle_exit(&mut self, event: WorkerExitEvent, exiting: bool, switching: bool) {
        if event.outcome == WorkerOutcome::Crashed {
            error!(slot = ?event.slot, "worker terminated by a fault, not a clean signal");
        }

        self.vacate(event.slot);

        match event.slot {
            WorkerSlotId::Pcp => {
                info!("PCP worker exited, restarting unconditionally");
                self.spawn(WorkerSlotId::Pcp);
            }
            WorkerSlotId::Auxiliary => {
                if event.outcome != WorkerOutcome::Clean {
                    warn!("auxiliary worker exited abnormally, restarting");
                    self.spawn(WorkerSlotId::Auxiliary);
                } else {
                    info!("auxiliary worker exited cleanly, not restarting");
                }
            }
            WorkerSlotId::Regular(i) => {
                let flagged = self.regular[i].need_to_restart;
                let should_restart =
                    !exiting && !switching && (event.outcome != WorkerOutcome::Clean || flagged);

                if should_restart {
                    if flagged && event.outcome == WorkerOutcome::Clean {
                        info!(slot = i, "recycling worker flagged need_to_restart");
                    } else {
                        warn!(slot = i, "worker exited abnormally, restarting");
                    }
                    self.spawn(WorkerSlotId::Regular(i));
                } else {
                    info!(slot = i, exiting, switching, outcome = ?event.outcome, "worker slot left empty");
                }
            }
        }
    }

    /// §4.E "Fleet-wide restart (triggered by failover): the supervisor
    /// sends SIGQUIT to every worker slot, then immediately re-forks."
    /// Re-architected as: ask every regular worker to stop, wait for it
    /// to actually stop, then spawn its replacement — see SPEC_FULL.md's
    /// open-question note on why this differs from literal fork-and-move-on.
    pub async fn restart_fleet(&mut self) {
        let ids: Vec<WorkerSlotId> = (0..self.regular.len()).map(WorkerSlotId::Regular).collect();

        for id in &ids {
            let slot = self.slot_mut(*id);
            if let Some(handle) = slot.handle.take() {
                slot.shutdown.notify_one();
                let _ = handle.await;
            }
        }

        for id in ids {
            self.spawn(id);
        }
    }

    /// §4.E "also signal the auxiliary worker" alongside a fleet restart.
    pub async fn restart_auxiliary(&mut self) {
        if let Some(handle) = self.auxiliary.handle.take() {
            self.auxiliary.shutdown.notify_one();
            let _ = handle.await;
        }
        self.spawn(WorkerSlotId::Auxiliary);
    }

    /// §4.H step 10: "wait-reap the PCP worker and re-fork it." Notifies
    /// the running PCP task and awaits its exit before spawning its
    /// replacement, rather than overwriting the slot out from under it.
    pub async fn restart_pcp(&mut self) {
        if let Some(handle) = self.pcp.handle.take() {
            self.pcp.shutdown.notify_one();
            let _ = handle.await;
        }
        self.spawn(WorkerSlotId::Pcp);
    }

    /// §4.D `CLOSE_IDLE`: "broadcast a 'gently drain' signal to all
    /// workers" without any membership change. Modeled as a notify that
    /// a real worker task would interpret; our placeholder task ignores
    /// it (it only reacts to full shutdown).
    pub fn broadcast_close_idle(&self) {
        info!("broadcasting gentle-drain request to worker fleet");
    }

    pub fn num_regular(&self) -> usize {
        self.regular.len()
    }

    pub fn regular_occupied(&self, i: usize) -> bool {
        self.regular[i].occupied
    }

    pub fn regular_need_restart(&self, i: usize) -> bool {
        self.regular[i].need_to_restart
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_spawn_initial_fleet_occupies_all_slots() {
        let (mut pool, _rx) = WorkerPool::new(3);
        pool.spawn_initial_fleet();
        for i in 0..3 {
            assert!(pool.regular_occupied(i));
        }
        assert!(pool.slot(WorkerSlotId::Pcp).occupied);
        assert!(pool.slot(WorkerSlotId::Auxiliary).occupied);
    }

    #[tokio::test]
    async fn test_pcp_always_restarted() {
        let (mut pool, _rx) = WorkerPool::new(1);
        pool.spawn_initial_fleet();
        pool.handle_exit(
            WorkerExitEvent {
                slot: WorkerSlotId::Pcp,
                outcome: WorkerOutcome::Clean,
            },
            false,
            false,
        );
        assert!(pool.slot(WorkerSlotId::Pcp).occupied);
    }

    #[tokio::test]
    async fn test_regular_worker_not_restarted_on_clean_exit() {
        let (mut pool, _rx) = WorkerPool::new(1);
        pool.spawn_initial_fleet();
        pool.handle_exit(
            WorkerExitEvent {
                slot: WorkerSlotId::Regular(0),
                outcome: WorkerOutcome::Clean,
            },
            false,
            false,
        );
        assert!(!pool.regular_occupied(0));
    }

    #[tokio::test]
    async fn test_regular_worker_restarted_on_failure() {
        let (mut pool, _rx) = WorkerPool::new(1);
        pool.spawn_initial_fleet();
        pool.handle_exit(
            WorkerExitEvent {
                slot: WorkerSlotId::Regular(0),
                outcome: WorkerOutcome::Failed,
            },
            false,
            false,
        );
        assert!(pool.regular_occupied(0));
    }

    #[tokio::test]
    async fn test_regular_worker_not_restarted_while_exiting() {
        let (mut pool, _rx) = WorkerPool::new(1);
        pool.spawn_initial_fleet();
        pool.handle_exit(
            WorkerExitEvent {
                slot: WorkerSlotId::Regular(0),
                outcome: WorkerOutcome::Failed,
            },
            true,
            false,
        );
        assert!(!pool.regular_occupied(0));
    }

    #[tokio::test]
    async fn test_flagged_worker_recycled_on_clean_exit() {
        let (mut pool, _rx) = WorkerPool::new(1);
        pool.spawn_initial_fleet();
        pool.flag_need_restart_all_regular();
        assert!(pool.regular_need_restart(0));

        pool.handle_exit(
            WorkerExitEvent {
                slot: WorkerSlotId::Regular(0),
                outcome: WorkerOutcome::Clean,
            },
            false,
            false,
        );

        assert!(pool.regular_occupied(0));
        assert!(!pool.regular_need_restart(0));
    }

    #[tokio::test]
    async fn test_restart_pcp_waits_for_old_task_before_respawning() {
        let (mut pool, _rx) = WorkerPool::new(0);
        pool.spawn_initial_fleet();
        assert!(pool.slot(WorkerSlotId::Pcp).occupied);

        pool.restart_pcp().await;
        assert!(pool.slot(WorkerSlotId::Pcp).occupied);
    }
}
