use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pgpool::cli::{Cli, Command};
use pgpool::daemonize::daemonize;
use pgpool::pidfile::PidFile;
use pgpool::signals::Signals;
use pgpool::status_endpoint;
use pgpool::supervisor::backend::Backend;
use pgpool::supervisor::cluster::ClusterState;
use pgpool::supervisor::failover::FailoverEngine;
use pgpool::supervisor::status_file::StatusFile;
use pgpool::supervisor::watchdog::NullWatchdog;
use pgpool::supervisor::worker_pool::WorkerPool;
use pgpool_config::ConfigAndUsers;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Reload) => run_reload(&cli),
        Some(Command::Stop) => run_stop(&cli),
        None => run_start(cli),
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_reload(cli: &Cli) -> ExitCode {
    init_tracing(cli.debug);
    let Ok(loaded) = ConfigAndUsers::load(&cli.config_file) else {
        error!("cannot determine PID file location: configuration failed to load");
        return ExitCode::FAILURE;
    };
    let pid_file = PidFile::new(&loaded.config.general.pid_file_name);
    match pid_file.stop(libc_sighup()) {
        Ok(()) => {
            info!("reload signal sent");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "reload failed");
            ExitCode::FAILURE
        }
    }
}

fn run_stop(cli: &Cli) -> ExitCode {
    init_tracing(cli.debug);
    let Ok(loaded) = ConfigAndUsers::load(&cli.config_file) else {
        error!("cannot determine PID file location: configuration failed to load");
        return ExitCode::FAILURE;
    };
    let pid_file = PidFile::new(&loaded.config.general.pid_file_name);
    match pid_file.stop(cli.mode.signal()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "stop failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
fn libc_sighup() -> i32 {
    libc::SIGHUP
}

#[cfg(not(unix))]
fn libc_sighup() -> i32 {
    0
}

fn run_start(cli: Cli) -> ExitCode {
    init_tracing(cli.debug);

    let loaded = match ConfigAndUsers::load(&cli.config_file) {
        Ok(loaded) => loaded,
        Err(err) => {
            error!(%err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let general = loaded.config.general.clone();

    let pid_file = PidFile::new(&general.pid_file_name);
    if let Err(err) = pid_file.check_not_running() {
        error!(%err, "refusing to start");
        return ExitCode::FAILURE;
    }

    if !cli.dont_detach {
        if let Err(err) = daemonize() {
            error!(%err, "daemonization failed");
            return ExitCode::FAILURE;
        }
    }

    if let Err(err) = pid_file.write(std::process::id() as i32) {
        error!(%err, "failed to write PID file");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to start async runtime");
            pid_file.remove();
            return ExitCode::FAILURE;
        }
    };

    let exit_code = runtime.block_on(async_main(loaded.config, cli, pid_file.path().to_path_buf()));
    pid_file.remove();
    exit_code
}

async fn async_main(
    config: pgpool_config::Config,
    cli: Cli,
    _pid_file_path: std::path::PathBuf,
) -> ExitCode {
    let general = config.general.clone();

    let status_file = StatusFile::new(format!("{}/pgpool_status", general.logdir));
    let statuses = status_file.load(cli.discard_status, config.backends.len());

    let backends: Vec<Backend> = config
        .backends
        .iter()
        .enumerate()
        .map(|(i, b)| Backend::from_config(i, b, statuses[i]))
        .collect();

    let cluster = Arc::new(ClusterState::new(
        general.replication_mode,
        backends,
        general.request_queue_size,
    ));

    let (mut worker_pool, exit_rx) = WorkerPool::new(general.num_init_children);
    worker_pool.spawn_initial_fleet();

    let signals = match Signals::install() {
        Ok(signals) => signals,
        Err(err) => {
            error!(%err, "failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let engine = FailoverEngine::new(cluster.clone(), general.clone(), Arc::new(NullWatchdog));
    let mut event_loop = pgpool::supervisor::event_loop::EventLoop::new(
        cluster.clone(),
        general.clone(),
        engine,
        worker_pool,
        exit_rx,
        signals,
        status_file,
    );

    if let Some(port) = general.status_http_port {
        let cluster = cluster.clone();
        tokio::spawn(async move {
            if let Err(err) = status_endpoint::serve(port, cluster).await {
                error!(%err, "status endpoint stopped");
            }
        });
    }

    info!(version = %pgpool::util::version(), "supervisor starting");
    event_loop.run().await;
    info!("supervisor stopped");

    ExitCode::SUCCESS
}
