//! Signal demultiplexer (spec §4.C).
//!
//! Grounded on the teacher's `sighup.rs` (a single `Signal` wrapped in a
//! struct with `new()`/`listen()`), extended to the full set spec §4.C
//! calls for. Each OS signal forwards into one `SignalEvent` enum rather
//! than setting a distinct `volatile sig_atomic_t` flag per signal —
//! the channel itself is the "self-pipe" the main loop selects on.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

/// One demultiplexed asynchronous event (§4.C). The main loop "checks
/// the flags in fixed order: wakeup, failover, child-reap, reload" —
/// here that ordering is enforced by `tokio::select!`'s biased mode in
/// `event_loop.rs`, not by field order in this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// `SIGTERM`: smart shutdown — let sessions finish (§6).
    TerminateSmart,
    /// `SIGINT`: fast shutdown (§6).
    TerminateFast,
    /// `SIGQUIT`: immediate shutdown, aliased to fast in practice (§6,
    /// §9 open question 2).
    TerminateImmediate,
    /// `SIGUSR1`: failover requested by a producer outside the
    /// supervisor (§4.D).
    Failover,
    /// `SIGUSR2`: wake workers (§4.E `wakeup_handler`).
    Wakeup,
    /// `SIGHUP`: reload configuration (§4.E `reload_config_handler`).
    Reload,
}

pub struct Signals {
    rx: mpsc::UnboundedReceiver<SignalEvent>,
}

impl Signals {
    /// Installs one forwarder task per signal kind. Each task owns its
    /// `Signal` stream for the life of the process; there is nothing
    /// further for callers to keep alive.
    pub fn install() -> std::io::Result<Self> {
        let term = signal(SignalKind::terminate())?;
        let int = signal(SignalKind::interrupt())?;
        let quit = signal(SignalKind::quit())?;
        let usr1 = signal(SignalKind::user_defined1())?;
        let usr2 = signal(SignalKind::user_defined2())?;
        let hup = signal(SignalKind::hangup())?;

        let (tx, rx) = mpsc::unbounded_channel();

        spawn_forwarder(term, SignalEvent::TerminateSmart, tx.clone());
        spawn_forwarder(int, SignalEvent::TerminateFast, tx.clone());
        spawn_forwarder(quit, SignalEvent::TerminateImmediate, tx.clone());
        spawn_forwarder(usr1, SignalEvent::Failover, tx.clone());
        spawn_forwarder(usr2, SignalEvent::Wakeup, tx.clone());
        spawn_forwarder(hup, SignalEvent::Reload, tx);

        Ok(Self { rx })
    }

    pub async fn recv(&mut self) -> Option<SignalEvent> {
        self.rx.recv().await
    }
}

fn spawn_forwarder(mut sig: Signal, event: SignalEvent, tx: mpsc::UnboundedSender<SignalEvent>) {
    tokio::spawn(async move {
        loop {
            if sig.recv().await.is_none() {
                return;
            }
            if tx.send(event).is_err() {
                return;
            }
        }
    });
}
