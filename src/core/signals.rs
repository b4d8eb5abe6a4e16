//! # Relaying terminating signals to the main process.
//!
//! [`TerminationSignals::register`] installs handlers for:
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (Ctrl-\ in terminal)
//! - `SIGHUP` (terminal closed)
//!
//! Once installed, these signals no longer kill the supervisor: the
//! [`SignalForwarder`] task receives them, relays each one to main and
//! reports it to the coordinator, which decides how the session ends.
//!
//! ## Rules
//! - Handlers are registered before main is launched.
//! - Only main (or main's process group) is signaled; adopted orphans are
//!   left to the coordinator.
//! - Nothing is relayed once main was reaped (its pid may be recycled).
//! - A target that exited first is not an error.

use std::io;

use nix::sys::signal::Signal;
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::sys::{self, Target};
use crate::events::{Bus, Event, EventKind};
use crate::logging::RUN;

/// Handler streams for the terminating signals.
pub struct TerminationSignals {
    int: SignalStream,
    term: SignalStream,
    quit: SignalStream,
    hup: SignalStream,
}

impl TerminationSignals {
    /// Installs the handlers.
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hup: signal(SignalKind::hangup())?,
        })
    }

    /// Next received signal; `None` once every stream is closed.
    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            Some(()) = self.int.recv() => Some(Signal::SIGINT),
            Some(()) = self.term.recv() => Some(Signal::SIGTERM),
            Some(()) = self.quit.recv() => Some(Signal::SIGQUIT),
            Some(()) = self.hup.recv() => Some(Signal::SIGHUP),
            else => None,
        }
    }
}

/// Forwards terminating signals to main for the whole session.
pub struct SignalForwarder {
    signals: TerminationSignals,
    target: Target,
    main_gone: CancellationToken,
    coordinator: mpsc::UnboundedSender<Signal>,
    bus: Bus,
}

impl SignalForwarder {
    /// Creates a forwarder relaying to `target` until `main_gone` is cancelled.
    ///
    /// Every received signal is also sent on the returned channel.
    pub fn new(
        signals: TerminationSignals,
        target: Target,
        main_gone: CancellationToken,
        bus: Bus,
    ) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (coordinator, rx) = mpsc::unbounded_channel();
        let forwarder = Self {
            signals,
            target,
            main_gone,
            coordinator,
            bus,
        };
        (forwarder, rx)
    }

    /// Runs until `token` is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            let sig = tokio::select! {
                _ = token.cancelled() => break,
                sig = self.signals.recv() => match sig {
                    Some(sig) => sig,
                    None => break,
                },
            };

            self.bus
                .publish(Event::new(EventKind::SignalReceived).with_signal(sig));
            self.relay(sig);
            let _ = self.coordinator.send(sig);
        }
    }

    fn relay(&self, sig: Signal) {
        if self.main_gone.is_cancelled() {
            return;
        }
        match sys::send(self.target, sig) {
            Ok(()) => self.bus.publish(
                Event::new(EventKind::SignalForwarded)
                    .with_pid(self.target.pid().as_raw())
                    .with_signal(sig),
            ),
            Err(e) if e.is_race_lost() => {}
            Err(e) => {
                warn!(
                    target: RUN,
                    pid = self.target.pid().as_raw(),
                    signal = sig.as_str(),
                    error = e.as_label(),
                    "failed to forward signal"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::launcher::{self, CommandSpec};
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;
    use serial_test::serial;
    use std::time::Duration;

    #[tokio::test]
    #[serial]
    async fn test_forwards_to_main_and_reports() {
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let signals = TerminationSignals::register().unwrap();

        let spec = CommandSpec::new("sleep").with_args(["30"]);
        let (handle, _notify) = launcher::spawn(&spec, true).unwrap();
        let main_gone = CancellationToken::new();
        let (forwarder, mut to_coordinator) =
            SignalForwarder::new(signals, Target::Group(handle.pid), main_gone, bus.clone());

        let token = CancellationToken::new();
        let task = tokio::spawn(forwarder.run(token.clone()));

        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(5), to_coordinator.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(Signal::SIGTERM));

        let status = waitpid(handle.pid, None).unwrap();
        assert_eq!(
            crate::core::ProcessExit::from_wait(status),
            Some((handle.pid, crate::core::ProcessExit::Signaled(Signal::SIGTERM)))
        );

        token.cancel();
        task.await.unwrap();

        let received = events.recv().await.unwrap();
        assert_eq!(received.kind, EventKind::SignalReceived);
        assert_eq!(received.signal(), Some(Signal::SIGTERM));
        let forwarded = events.recv().await.unwrap();
        assert_eq!(forwarded.kind, EventKind::SignalForwarded);
        assert_eq!(forwarded.pid, Some(handle.pid.as_raw()));
    }

    #[tokio::test]
    #[serial]
    async fn test_nothing_relayed_after_main_is_gone() {
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let signals = TerminationSignals::register().unwrap();

        let main_gone = CancellationToken::new();
        main_gone.cancel();
        let target = Target::Process(Pid::from_raw(i32::MAX - 1));
        let (forwarder, mut to_coordinator) =
            SignalForwarder::new(signals, target, main_gone, bus.clone());

        let token = CancellationToken::new();
        let task = tokio::spawn(forwarder.run(token.clone()));

        nix::sys::signal::raise(Signal::SIGHUP).unwrap();
        assert_eq!(to_coordinator.recv().await, Some(Signal::SIGHUP));
        token.cancel();
        task.await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind, EventKind::SignalReceived);
        assert!(events.try_recv().is_err());
    }
}
