//! Failover engine (spec §4.H): consumes the request queue and drives
//! cluster-membership transitions.

use std::sync::Arc;

use pgpool_config::GeneralConfig;
use tracing::{info, warn};

use super::backend::BackendStatus;
use super::cluster::ClusterState;
use super::primary_discovery::PrimaryDiscovery;
use super::queue::{Request, RequestKind};
use super::template::{render, TemplateContext};
use super::watchdog::{WatchdogClient, WatchdogLock};
use super::worker_pool::WorkerPool;

pub struct FailoverEngine {
    cluster: Arc<ClusterState>,
    config: GeneralConfig,
    watchdog: Arc<dyn WatchdogClient>,
    discovery: PrimaryDiscovery,
}

/// Outcome of processing one request, telling the event loop what fleet
/// action (if any) to take (§4.H step 8, step 10).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RequestOutcome {
    pub restart_fleet: bool,
    pub restart_pcp: bool,
}

impl FailoverEngine {
    pub fn new(
        cluster: Arc<ClusterState>,
        config: GeneralConfig,
        watchdog: Arc<dyn WatchdogClient>,
    ) -> Self {
        let discovery = PrimaryDiscovery::new(cluster.clone(), config.clone());
        Self {
            cluster,
            config,
            watchdog,
            discovery,
        }
    }

    /// Drains the request queue to empty, processing one request per
    /// iteration (§4.H). No-op (and does not touch `switching`) if the
    /// engine is already running elsewhere — callers are expected to
    /// check `cluster.is_switching()` before calling this, per spec: "a
    /// failover is in flight: switching is true iff the engine is
    /// between dequeue-first and drain-empty."
    pub async fn drain(&self, worker_pool: &mut WorkerPool) {
        if self.cluster.is_switching() {
            return;
        }

        self.cluster.set_switching(true);

        while let Some(request) = self.cluster.queue.dequeue() {
            let outcome = self.process_request(request, worker_pool).await;

            if outcome.restart_fleet {
                worker_pool.restart_fleet().await;
                worker_pool.restart_auxiliary().await;
            }
            if outcome.restart_pcp {
                worker_pool.restart_pcp().await;
            }
        }

        self.cluster.set_switching(false);
    }

    async fn process_request(&self, request: Request, worker_pool: &mut WorkerPool) -> RequestOutcome {
        if request.kind == RequestKind::CloseIdle {
            info!("CLOSE_IDLE request: broadcasting gentle drain, no membership change");
            worker_pool.broadcast_close_idle();
            return RequestOutcome::default();
        }

        let valid_targets = self.validate(&request);
        if valid_targets.is_empty() {
            warn!(kind = ?request.kind, "all targets invalid, dropping request");
            return RequestOutcome::default();
        }

        let lock = match request.kind {
            RequestKind::NodeUp => WatchdogLock::Failback,
            _ => WatchdogLock::Failover,
        };
        self.watchdog.start_interlock(false, valid_targets[0] as i32).await;
        self.watchdog.wait_for_lock(lock).await;

        let old_master = self.cluster.master_node_id();
        let old_primary = self.cluster.primary_node_id();

        self.mutate_statuses(request.kind, &valid_targets);

        let mut new_master = self.cluster.select_new_master();
        let mut new_primary = self
            .select_new_primary(request.kind, &valid_targets, old_primary)
            .await;

        let is_holder = self.watchdog.am_i_lock_holder(lock).await;
        if is_holder {
            self.run_hook(request.kind, &valid_targets, old_master, new_master, old_primary, new_primary)
                .await;
        }

        if self.should_degenerate_for_follow_master(request.kind, &valid_targets, old_primary, new_primary) {
            self.degenerate_non_primary_backends(new_primary);
            new_master = self.cluster.select_new_master();

            if is_holder {
                self.spawn_follow_master_hook(old_primary, new_primary);
            }
        }

        let restart_fleet = !(self.config.replication_mode.is_streaming_replication()
            && request.kind == RequestKind::NodeUp);

        if !restart_fleet {
            // §4.E: "workers are merely asked to re-read state when
            // idle" instead of being torn down — flag them for lazy
            // recycling rather than restarting the fleet (§8 scenario 3).
            worker_pool.flag_need_restart_all_regular();
        }

        self.cluster.commit_master_primary(new_master, new_primary);
        self.watchdog.unlock(lock).await;
        self.watchdog.end_interlock().await;

        if request.kind == RequestKind::NodeDown {
            self.cluster.counters.record_failover();
        } else if request.kind == RequestKind::NodeUp {
            self.cluster.counters.record_failback();
        } else if request.kind == RequestKind::PromoteNode {
            self.cluster.counters.record_promotion();
        }

        RequestOutcome {
            restart_fleet,
            restart_pcp: restart_fleet,
        }
    }

    /// §4.H step 1.
    fn validate(&self, request: &Request) -> Vec<usize> {
        self.cluster.with_backends(|backends| {
            request
                .node_ids
                .iter()
                .copied()
                .filter(|&index| match backends.get(index) {
                    None => false,
                    Some(backend) => match request.kind {
                        RequestKind::NodeUp => {
                            backend.status == BackendStatus::Down && !backend.disallow_to_failover
                        }
                        RequestKind::NodeDown => {
                            if self.config.replication_mode.is_raw() {
                                backend.status.is_valid_raw()
                            } else {
                                backend.status.is_valid()
                            }
                        }
                        RequestKind::PromoteNode => backend.status.is_valid(),
                        RequestKind::CloseIdle => true,
                    },
                })
                .collect()
        })
    }

    /// §4.H step 3.
    fn mutate_statuses(&self, kind: RequestKind, targets: &[usize]) {
        for &index in targets {
            match kind {
                RequestKind::NodeDown => self.cluster.set_status(index, BackendStatus::Down),
                RequestKind::NodeUp => self.cluster.set_status(index, BackendStatus::ConnectWait),
                RequestKind::PromoteNode | RequestKind::CloseIdle => {}
            }
        }
    }

    /// §4.H step 5.
    async fn select_new_primary(&self, kind: RequestKind, targets: &[usize], old_primary: i32) -> i32 {
        if !self.config.replication_mode.is_streaming_replication() {
            return -1;
        }

        match kind {
            RequestKind::PromoteNode => targets.first().map(|&i| i as i32).unwrap_or(old_primary),
            RequestKind::NodeDown if !targets.contains(&(old_primary.max(0) as usize)) || old_primary < 0 => {
                old_primary
            }
            RequestKind::NodeUp => old_primary,
            _ => self.discovery.find_primary_repeatedly().await,
        }
    }

    /// §4.H step 7: "when the failover targeted the old primary or when
    /// promotion happened".
    fn should_degenerate_for_follow_master(
        &self,
        kind: RequestKind,
        targets: &[usize],
        old_primary: i32,
        new_primary: i32,
    ) -> bool {
        if !self.config.replication_mode.is_streaming_replication()
            || self.config.follow_master_command.is_empty()
        {
            return false;
        }

        let targeted_old_primary = old_primary >= 0 && targets.contains(&(old_primary as usize));
        let promoted = kind == RequestKind::PromoteNode && new_primary != old_primary;

        targeted_old_primary || promoted
    }

    fn degenerate_non_primary_backends(&self, new_primary: i32) {
        self.cluster.with_backends_mut(|backends| {
            for backend in backends.iter_mut() {
                if backend.index as i32 != new_primary && backend.status != BackendStatus::Unused {
                    backend.status = BackendStatus::Down;
                }
            }
        });
    }

    async fn run_hook(
        &self,
        kind: RequestKind,
        targets: &[usize],
        old_master: i32,
        new_master: i32,
        old_primary: i32,
        new_primary: i32,
    ) {
        let command = match kind {
            RequestKind::NodeUp => &self.config.failback_command,
            _ => &self.config.failover_command,
        };
        if command.is_empty() {
            return;
        }

        let ctx = self.build_template_context(targets, old_master, new_master, old_primary, new_primary);
        let rendered = render(command, &ctx);
        self.execute_hook(&rendered).await;
    }

    fn spawn_follow_master_hook(&self, old_primary: i32, new_primary: i32) {
        let command = self.config.follow_master_command.clone();
        if command.is_empty() {
            return;
        }

        // %H/%r/%R are the only host/port/datadir slots this context has;
        // for a follow-master hook they must point at the new primary so
        // the command can re-home standbys onto it.
        let (hostname, port, data_directory) = self.backend_identity(new_primary);

        let ctx = TemplateContext {
            old_primary_index: Some(old_primary),
            new_master_index: Some(new_primary),
            new_master_hostname: hostname,
            new_master_port: port,
            new_master_data_directory: data_directory,
            ..Default::default()
        };
        let rendered = render(&command, &ctx);

        // §4.H step 6: "executed in a forked helper because it may probe
        // every standby" -> spawned, not awaited.
        tokio::spawn(async move {
            execute_command(&rendered).await;
        });
    }

    /// Hostname/port/data-directory for a backend index, or `(None, None,
    /// None)` for a negative (no such node) index.
    fn backend_identity(&self, index: i32) -> (Option<String>, Option<u16>, Option<String>) {
        if index < 0 {
            return (None, None, None);
        }
        self.cluster.with_backends(|backends| {
            backends
                .get(index as usize)
                .map(|b| (Some(b.hostname.clone()), Some(b.port), Some(b.data_directory.clone())))
                .unwrap_or((None, None, None))
        })
    }

    fn build_template_context(
        &self,
        targets: &[usize],
        old_master: i32,
        new_master: i32,
        old_primary: i32,
        new_primary: i32,
    ) -> TemplateContext {
        let failed_index = targets.first().copied();
        let (failed_hostname, failed_port, failed_data_directory) = match failed_index {
            Some(i) => self.backend_identity(i as i32),
            None => (None, None, None),
        };

        let (new_master_hostname, new_master_port, new_master_data_directory) =
            self.backend_identity(new_master);

        TemplateContext {
            failed_port,
            failed_data_directory,
            failed_index: failed_index.map(|i| i as i32),
            failed_hostname,
            new_master_hostname,
            new_master_index: if new_master >= 0 { Some(new_master) } else { None },
            new_master_port,
            new_master_data_directory,
            old_master_index: Some(old_master),
            old_primary_index: Some(old_primary),
        }
    }

    async fn execute_hook(&self, command: &str) {
        execute_command(command).await;
    }
}

async fn execute_command(command: &str) {
    if command.is_empty() {
        return;
    }

    match tokio::process::Command::new("sh").arg("-c").arg(command).status().await {
        Ok(status) => info!(command, code = status.code(), "failover hook exited"),
        Err(err) => warn!(command, error = %err, "failed to spawn failover hook"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::supervisor::backend::Backend;
    use crate::supervisor::watchdog::NullWatchdog;

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

    fn engine(backends: Vec<Backend>, mode: pgpool_config::ReplicationMode) -> (FailoverEngine, Arc<ClusterState>) {
        let cluster = Arc::new(ClusterState::new(mode, backends, 10));
        let mut config = GeneralConfig::default();
        config.replication_mode = mode;
        let engine = FailoverEngine::new(cluster.clone(), config, Arc::new(NullWatchdog));
        (engine, cluster)
    }

    #[tokio::test]
    async fn test_node_down_standby_keeps_primary_fast_path() {
        let (engine, cluster) = engine(
            vec![backend(0, BackendStatus::Up), backend(1, BackendStatus::Up)],
            pgpool_config::ReplicationMode::StreamingReplication,
        );
        cluster.commit_master_primary(0, 0);

        let (mut pool, _rx) = WorkerPool::new(0);
        cluster.queue.enqueue(RequestKind::NodeDown, vec![1]);
        engine.drain(&mut pool).await;

        assert_eq!(cluster.status_of(1), Some(BackendStatus::Down));
        assert_eq!(cluster.primary_node_id(), 0);
        assert_eq!(cluster.master_node_id(), 0);
    }

    #[tokio::test]
    async fn test_disallowed_node_up_is_dropped() {
        let mut disallowed = backend(0, BackendStatus::Down);
        disallowed.disallow_to_failover = true;
        let (engine, cluster) = engine(vec![disallowed], pgpool_config::ReplicationMode::Raw);

        let (mut pool, _rx) = WorkerPool::new(0);
        cluster.queue.enqueue(RequestKind::NodeUp, vec![0]);
        engine.drain(&mut pool).await;

        // Validation drops the only target; status is unchanged.
        assert_eq!(cluster.status_of(0), Some(BackendStatus::Down));
    }

    #[tokio::test]
    async fn test_node_up_streaming_replication_skips_fleet_restart() {
        let (engine, cluster) = engine(
            vec![backend(0, BackendStatus::Down), backend(1, BackendStatus::Up)],
            pgpool_config::ReplicationMode::StreamingReplication,
        );
        cluster.commit_master_primary(1, 1);
        cluster.queue.enqueue(RequestKind::NodeUp, vec![0]);

        let (mut pool, _rx) = WorkerPool::new(2);
        pool.spawn_initial_fleet();
        engine.drain(&mut pool).await;

        assert_eq!(cluster.status_of(0), Some(BackendStatus::ConnectWait));
        assert_eq!(cluster.primary_node_id(), 1);
        // §8 scenario 3: workers are flagged for lazy recycling instead
        // of the fleet being torn down and re-forked.
        assert!(pool.regular_need_restart(0));
        assert!(pool.regular_need_restart(1));
    }

    #[tokio::test]
    async fn test_idempotent_node_down_twice() {
        let (engine, cluster) = engine(
            vec![backend(0, BackendStatus::Up)],
            pgpool_config::ReplicationMode::Raw,
        );
        let (mut pool, _rx) = WorkerPool::new(0);

        cluster.queue.enqueue(RequestKind::NodeDown, vec![0]);
        engine.drain(&mut pool).await;
        assert_eq!(cluster.status_of(0), Some(BackendStatus::Down));

        // Second NODE_DOWN(0): validation drops it (already DOWN), no-op.
        cluster.queue.enqueue(RequestKind::NodeDown, vec![0]);
        engine.drain(&mut pool).await;
        assert_eq!(cluster.status_of(0), Some(BackendStatus::Down));
    }
}
