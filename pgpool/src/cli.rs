//! Command-line surface (spec §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Supervisor core for a PostgreSQL connection-pool / load-balancer
/// front-end.
#[derive(Parser, Debug)]
#[command(name = "pgpoold", version = crate::util::version())]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'f', long = "config-file", default_value = "pgpool.conf")]
    pub config_file: PathBuf,

    /// Path to the PCP password file. Parsing is out of scope for this
    /// core; the path is accepted and otherwise ignored.
    #[arg(short = 'F', long = "pcp-file")]
    pub pcp_file: Option<PathBuf>,

    /// Path to the host-based-auth file. Parsing is out of scope for
    /// this core; the path is accepted and otherwise ignored.
    #[arg(short = 'a', long = "hba-file")]
    pub hba_file: Option<PathBuf>,

    /// Clear the query cache. Out of scope for this core.
    #[arg(short = 'c', long = "clear")]
    pub clear: bool,

    /// Clear OID maps. Out of scope for this core.
    #[arg(short = 'C', long = "clear-oidmaps")]
    pub clear_oidmaps: bool,

    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'n', long = "dont-detach")]
    pub dont_detach: bool,

    /// Discard the persistent status file on startup (§4.B `load`).
    #[arg(short = 'D', long = "discard-status")]
    pub discard_status: bool,

    /// Enable debug logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Shutdown mode used by `stop` (§6).
    #[arg(short = 'm', long = "mode", default_value = "smart")]
    pub mode: ShutdownMode,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Three modes distinguished by positional argument (§6): no positional
/// is `start`.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Send hang-up to the running supervisor and exit.
    Reload,
    /// Send the termination signal selected by `--mode` and wait for the
    /// process to disappear.
    Stop,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[value(rename_all = "lower")]
pub enum ShutdownMode {
    #[default]
    Smart,
    Fast,
    /// Alias for `fast` in practice (§9 open question 2): the original
    /// equates `SIGQUIT` with "immediate" while describing it as "fast"
    /// in long-running comments. Preserved, not silently reconciled.
    Immediate,
}

impl ShutdownMode {
    /// The signal `stop` sends for this mode (§6).
    #[cfg(unix)]
    pub fn signal(self) -> i32 {
        match self {
            ShutdownMode::Smart => libc::SIGTERM,
            ShutdownMode::Fast => libc::SIGINT,
            ShutdownMode::Immediate => libc::SIGQUIT,
        }
    }
}
