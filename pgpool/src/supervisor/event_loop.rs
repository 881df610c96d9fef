//! Main event loop (spec §4.J): orchestrates signals, the request queue,
//! health-checking, and failover with scheduled health-checks and
//! pause-and-wake.

use std::sync::Arc;

use pgpool_config::GeneralConfig;
use tokio::time::interval;
use tracing::{info, warn};

use crate::signals::{SignalEvent, Signals};

use super::backend::BackendStatus;
use super::cluster::ClusterState;
use super::failover::FailoverEngine;
use super::healthcheck::HealthChecker;
use super::status_file::StatusFile;
use super::worker_pool::WorkerPool;

pub struct EventLoop {
    cluster: Arc<ClusterState>,
    config: GeneralConfig,
    engine: FailoverEngine,
    health: HealthChecker,
    worker_pool: WorkerPool,
    exit_rx: tokio::sync::mpsc::UnboundedReceiver<super::worker_pool::WorkerExitEvent>,
    signals: Signals,
    status_file: StatusFile,
    exiting: bool,
}

impl EventLoop {
    pub fn new(
        cluster: Arc<ClusterState>,
        config: GeneralConfig,
        engine: FailoverEngine,
        worker_pool: WorkerPool,
        exit_rx: tokio::sync::mpsc::UnboundedReceiver<super::worker_pool::WorkerExitEvent>,
        signals: Signals,
        status_file: StatusFile,
    ) -> Self {
        let health = HealthChecker::new(cluster.clone(), config.clone());
        Self {
            cluster,
            config,
            engine,
            health,
            worker_pool,
            exit_rx,
            signals,
            status_file,
            exiting: false,
        }
    }

    /// Runs until a termination signal is handled. Mirrors §4.J's data
    /// flow: signals/child-exits/health-timer/queue-wakes all funnel
    /// through one `tokio::select!`, biased in the order spec §4.C
    /// prescribes for its self-pipe equivalent (wakeup, failover,
    /// child-reap, reload).
    pub async fn run(&mut self) {
        let period = self.config.health_check_period();
        let mut health_timer = interval(if period.is_zero() {
            std::time::Duration::from_secs(3600)
        } else {
            period
        });
        health_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                Some(event) = self.signals.recv() => {
                    if self.handle_signal(event).await {
                        return;
                    }
                }

                Some(exit_event) = self.exit_rx.recv() => {
                    self.worker_pool.handle_exit(exit_event, self.exiting, self.cluster.is_switching());
                }

                _ = health_timer.tick(), if self.config.health_check_period_secs > 0 => {
                    self.health.run_sweep().await;
                }

                _ = self.cluster.queue.notified() => {
                    self.try_drain().await;
                }
            }
        }
    }

    async fn try_drain(&mut self) {
        if !self.cluster.is_switching() {
            self.engine.drain(&mut self.worker_pool).await;
        }
    }

    /// Returns `true` if the loop should stop.
    async fn handle_signal(&mut self, event: SignalEvent) -> bool {
        match event {
            SignalEvent::Wakeup => {
                info!("wakeup requested, broadcasting gentle drain to fleet");
                self.worker_pool.broadcast_close_idle();
                false
            }
            SignalEvent::Failover => {
                self.try_drain().await;
                false
            }
            SignalEvent::Reload => {
                info!("reload requested");
                // Re-reading the config file and swapping in the new
                // GeneralConfig for the health checker/engine is left to
                // the CLI-facing reload path (SPEC_FULL.md §6); the
                // running loop only acknowledges the signal here.
                false
            }
            SignalEvent::TerminateSmart | SignalEvent::TerminateFast | SignalEvent::TerminateImmediate => {
                info!(?event, "termination requested, shutting down");
                self.shutdown().await;
                true
            }
        }
    }

    async fn shutdown(&mut self) {
        self.exiting = true;

        let statuses: Vec<BackendStatus> = self.cluster.with_backends(|backends| {
            backends.iter().map(|b| b.status).collect()
        });
        self.status_file.save(&statuses);

        for i in 0..self.worker_pool.num_regular() {
            if self.worker_pool.regular_occupied(i) {
                warn!(slot = i, "tearing down worker on shutdown");
            }
        }
    }
}
