//! # Shutdown coordinator: decides how and when a session ends.
//!
//! ```text
//!   Running ──(main reaped)──► MainExited ──(census)──► Draining ──(settled)──► Done
//!      │                                       │             │
//!      │ signal: record, grace deadline        │ settled     │ SIGTERM each adopted pid + main group
//!      │ 2nd signal: SIGKILL main group        └──────► Done │ after drain_grace: SIGKILL
//!      │ timeout: SIGTERM, grace deadline                    │ SIGKILL outstanding and reap_retries
//!      │ grace expired: SIGKILL main group                   │ more rounds: Done (degraded)
//!
//!   settled: the census reports ECHILD and main's process group is empty
//! ```
//!
//! ## Rules
//! - Main's exit is handled before any draining signal is sent.
//! - Every level (SIGTERM, SIGKILL) is sent at most once per descendant;
//!   descendants found by later censuses get the current level.
//! - Signaling a pid that already exited is not an error.
//! - Main's process group is drained even when no child is left: without
//!   subreaper mode, background jobs are never our children but still sit in
//!   main's group.
//! - The coordinator never waits on processes itself: all it knows about
//!   descendants comes from [`Census`] replies.

use std::collections::HashMap;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::core::reaper::{Census, CensusSource, ReaperClient};
use crate::core::sys::{self, Target};
use crate::core::{Config, ExitReasons, ProcessExit};
use crate::events::{Bus, Event, EventKind};
use crate::logging::RUN;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Main is running.
    Running,
    /// Main was reaped; descendants not looked at yet.
    MainExited,
    /// Leftover descendants are being terminated.
    Draining,
    /// Nothing left to do.
    Done,
}

/// What the coordinator hands back once [`Phase::Done`] is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Main exit status; `None` if it never arrived.
    pub status: Option<ProcessExit>,
    /// Circumstances of the session end.
    pub reasons: ExitReasons,
    /// Descendants still alive when draining gave up.
    pub stuck: Vec<Pid>,
}

/// Drives one session from launch to teardown.
pub struct Coordinator<C = ReaperClient> {
    cfg: Config,
    main: Pid,
    target: Target,
    reaper: C,
    signals: mpsc::UnboundedReceiver<Signal>,
    bus: Bus,
    phase: Phase,
    reasons: ExitReasons,
    received: u32,
}

impl<C: CensusSource> Coordinator<C> {
    /// Creates a coordinator for main `main`.
    ///
    /// `signals` carries every terminating signal the supervisor received.
    pub fn new(
        cfg: Config,
        main: Pid,
        reaper: C,
        signals: mpsc::UnboundedReceiver<Signal>,
        bus: Bus,
    ) -> Self {
        let target = main_target(&cfg, main);
        Self {
            cfg,
            main,
            target,
            reaper,
            signals,
            bus,
            phase: Phase::Running,
            reasons: ExitReasons::default(),
            received: 0,
        }
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the session to [`Phase::Done`].
    pub async fn run(mut self, exited: oneshot::Receiver<ProcessExit>) -> Outcome {
        let status = self.await_main(exited).await;
        self.enter(Phase::MainExited);

        let stuck = self.drain().await;
        self.enter(Phase::Done);

        Outcome {
            status,
            reasons: self.reasons,
            stuck,
        }
    }

    fn enter(&mut self, phase: Phase) {
        trace!(target: RUN, from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    /// Waits for main's exit status while handling signals, timeout and grace.
    async fn await_main(
        &mut self,
        mut exited: oneshot::Receiver<ProcessExit>,
    ) -> Option<ProcessExit> {
        let mut timeout_at = self.cfg.main_timeout().map(|d| Instant::now() + d);
        let mut kill_at: Option<Instant> = None;
        let mut give_up_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                status = &mut exited => return status.ok(),
                Some(sig) = self.signals.recv() => {
                    self.received += 1;
                    self.reasons.self_signaled.get_or_insert(sig);
                    if self.received > 1 && self.cfg.escalate_repeated {
                        self.kill_main();
                        kill_at = None;
                        give_up_at.get_or_insert(Instant::now() + self.cfg.grace);
                    } else if give_up_at.is_none() {
                        kill_at.get_or_insert(Instant::now() + self.cfg.grace);
                    }
                }
                _ = sleep_until(timeout_at) => {
                    timeout_at = None;
                    self.reasons.timed_out = true;
                    self.bus
                        .publish(Event::new(EventKind::TimeoutHit).with_pid(self.main.as_raw()));
                    self.signal_main(Signal::SIGTERM);
                    if give_up_at.is_none() {
                        kill_at.get_or_insert(Instant::now() + self.cfg.grace);
                    }
                }
                _ = sleep_until(kill_at) => {
                    kill_at = None;
                    self.kill_main();
                    give_up_at = Some(Instant::now() + self.cfg.grace);
                }
                _ = sleep_until(give_up_at) => {
                    warn!(target: RUN, pid = self.main.as_raw(), "main exit status never arrived");
                    return None;
                }
            }
        }
    }

    fn kill_main(&mut self) {
        if self.reasons.killed {
            return;
        }
        self.reasons.killed = true;
        self.signal_main(Signal::SIGKILL);
        self.bus.publish(
            Event::new(EventKind::KillEscalated)
                .with_pid(self.main.as_raw())
                .with_signal(Signal::SIGKILL),
        );
    }

    fn signal_main(&self, sig: Signal) {
        if let Err(e) = sys::send(self.target, sig) {
            if !e.is_race_lost() {
                warn!(
                    target: RUN,
                    pid = self.main.as_raw(),
                    signal = sig.as_str(),
                    error = e.as_label(),
                    "failed to signal main"
                );
            }
        }
    }

    /// Terminates and waits for leftover descendants. Returns the stuck ones;
    /// giving up marks the session degraded even when only main's group is left.
    async fn drain(&mut self) -> Vec<Pid> {
        let Some(mut census) = self.reaper.census().await else {
            return Vec::new();
        };
        if self.settled(&census) {
            self.bus.publish(Event::new(EventKind::AllReaped));
            return Vec::new();
        }

        self.enter(Phase::Draining);
        self.bus
            .publish(Event::new(EventKind::DrainStarted).with_count(census.running.len()));

        let poll = self.cfg.drain_poll_clamped();
        let mut level = Signal::SIGTERM;
        let mut level_since = Instant::now();
        let mut rounds_after_kill = 0u32;
        let mut sent: HashMap<Pid, Signal> = HashMap::new();
        let mut group_level: Option<Signal> = None;

        loop {
            for pid in &census.running {
                if sent.get(pid) != Some(&level) {
                    sent.insert(*pid, level);
                    self.signal_descendant(*pid, level);
                }
            }
            if group_level != Some(level) {
                group_level = Some(level);
                self.signal_main_group(level);
            }

            tokio::time::sleep(poll).await;
            census = match self.reaper.census().await {
                Some(census) => census,
                None => return Vec::new(),
            };
            if self.settled(&census) {
                self.bus.publish(Event::new(EventKind::AllReaped));
                return Vec::new();
            }

            if level_since.elapsed() < self.cfg.drain_grace {
                continue;
            }
            match level {
                Signal::SIGTERM => {
                    level = Signal::SIGKILL;
                    level_since = Instant::now();
                }
                _ => {
                    rounds_after_kill += 1;
                    if rounds_after_kill > self.cfg.reap_retries {
                        return self.give_up(census);
                    }
                }
            }
        }
    }

    fn settled(&self, census: &Census) -> bool {
        census.exhausted && !self.main_group_alive()
    }

    fn main_group_alive(&self) -> bool {
        self.cfg.forward_to_group && sys::is_alive(Target::Group(self.main))
    }

    fn signal_descendant(&self, pid: Pid, sig: Signal) {
        match sys::send(Target::Process(pid), sig) {
            Ok(()) => self.bus.publish(
                Event::new(EventKind::DescendantSignaled)
                    .with_pid(pid.as_raw())
                    .with_signal(sig),
            ),
            Err(e) if e.is_race_lost() => {}
            Err(e) => {
                warn!(
                    target: RUN,
                    pid = pid.as_raw(),
                    signal = sig.as_str(),
                    error = e.as_label(),
                    "failed to signal descendant"
                );
            }
        }
    }

    /// Background jobs of main usually stay in its group even after main is gone.
    fn signal_main_group(&self, sig: Signal) {
        if !self.cfg.forward_to_group {
            return;
        }
        match sys::send(Target::Group(self.main), sig) {
            Ok(()) => self.bus.publish(
                Event::new(EventKind::DescendantSignaled)
                    .with_pid(-self.main.as_raw())
                    .with_signal(sig),
            ),
            Err(e) if e.is_race_lost() => {}
            Err(e) => {
                warn!(
                    target: RUN,
                    pgid = self.main.as_raw(),
                    signal = sig.as_str(),
                    error = e.as_label(),
                    "failed to signal main group"
                );
            }
        }
    }

    fn give_up(&mut self, census: Census) -> Vec<Pid> {
        self.reasons.degraded = true;
        let stuck = census.running;
        let mut names: Vec<String> = stuck.iter().map(|p| p.to_string()).collect();
        if self.main_group_alive() {
            names.push(format!("pgid:{}", self.main));
        }
        let list = if names.is_empty() {
            "unknown".to_string()
        } else {
            names.join(",")
        };
        self.bus.publish(
            Event::new(EventKind::DrainIncomplete)
                .with_count(stuck.len())
                .with_reason(list),
        );
        stuck
    }
}

/// Signal target for main under `cfg`.
pub fn main_target(cfg: &Config, main: Pid) -> Target {
    if cfg.forward_to_group {
        Target::Group(main)
    } else {
        Target::Process(main)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::launcher::{self, CommandSpec, ExitNotifier};
    use crate::core::reaper::{Reaper, ReaperParams};
    use crate::core::subreaper;
    use crate::policies::BackoffPolicy;
    use serial_test::serial;
    use std::time::Duration;
    use tokio::signal::unix::{SignalKind, signal};
    use tokio_util::sync::CancellationToken;

    struct Session {
        outcome: Outcome,
        events: Vec<Event>,
        adopted: Vec<Pid>,
    }

    async fn session(cfg: Config, script: &str, signals: &[(Duration, Signal)]) -> Session {
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let sigchld = signal(SignalKind::child()).unwrap();

        let spec = CommandSpec::new("sh").with_args(["-c", script]);
        let (handle, notifier) = launcher::spawn(&spec, cfg.forward_to_group).unwrap();
        let (reaper, client) = Reaper::new(
            handle.pid,
            notifier,
            CancellationToken::new(),
            sigchld,
            ReaperParams {
                retries: cfg.reap_retries,
                backoff: BackoffPolicy::default(),
            },
            bus.clone(),
        );
        let reaper_token = CancellationToken::new();
        let reaper_task = tokio::spawn(reaper.run(reaper_token.clone()));

        let (tx, signal_rx) = mpsc::unbounded_channel();
        let target = main_target(&cfg, handle.pid);
        for (after, sig) in signals.iter().copied() {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let _ = sys::send(target, sig);
                let _ = tx.send(sig);
            });
        }

        let coordinator = Coordinator::new(cfg, handle.pid, client, signal_rx, bus.clone());
        assert_eq!(coordinator.phase(), Phase::Running);
        let outcome = coordinator.run(handle.exited).await;

        reaper_token.cancel();
        let report = reaper_task.await.unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        Session {
            outcome,
            events,
            adopted: report.adopted,
        }
    }

    fn fast() -> Config {
        Config {
            grace: Duration::from_secs(2),
            drain_grace: Duration::from_millis(200),
            drain_poll: Duration::from_millis(10),
            ..Config::default()
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_plain_exit_needs_no_drain() {
        let s = session(fast(), "exit 3", &[]).await;
        assert_eq!(s.outcome.status, Some(ProcessExit::Exited(3)));
        assert_eq!(s.outcome.reasons, ExitReasons::default());
        assert!(s.outcome.stuck.is_empty());
        assert!(s.events.iter().any(|e| e.kind == EventKind::AllReaped));
        assert!(s.events.iter().all(|e| e.kind != EventKind::DrainStarted));
    }

    #[tokio::test]
    #[serial]
    async fn test_timeout_terminates_main() {
        let mut cfg = fast();
        cfg.timeout = Duration::from_millis(100);
        let s = session(cfg, "exec sleep 30", &[]).await;

        assert!(s.outcome.reasons.timed_out);
        assert!(!s.outcome.reasons.killed);
        assert_eq!(s.outcome.status, Some(ProcessExit::Signaled(Signal::SIGTERM)));
        assert!(s.events.iter().any(|e| e.kind == EventKind::TimeoutHit));
    }

    #[tokio::test]
    #[serial]
    async fn test_signal_is_recorded_and_grace_kills() {
        let mut cfg = fast();
        cfg.grace = Duration::from_millis(200);
        let s = session(
            cfg,
            "trap '' INT; while :; do sleep 0.05; done",
            &[(Duration::from_millis(100), Signal::SIGINT)],
        )
        .await;

        assert_eq!(s.outcome.reasons.self_signaled, Some(Signal::SIGINT));
        assert!(s.outcome.reasons.killed);
        assert_eq!(s.outcome.status, Some(ProcessExit::Signaled(Signal::SIGKILL)));
        assert!(s.events.iter().any(|e| e.kind == EventKind::KillEscalated));
    }

    #[tokio::test]
    #[serial]
    async fn test_second_signal_escalates() {
        let s = session(
            fast(),
            "trap '' TERM; while :; do sleep 0.05; done",
            &[
                (Duration::from_millis(50), Signal::SIGTERM),
                (Duration::from_millis(150), Signal::SIGTERM),
            ],
        )
        .await;

        assert_eq!(s.outcome.reasons.self_signaled, Some(Signal::SIGTERM));
        assert!(s.outcome.reasons.killed);
        assert_eq!(s.outcome.status, Some(ProcessExit::Signaled(Signal::SIGKILL)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[serial]
    async fn test_drain_terminates_orphans() {
        subreaper::enable().unwrap();
        let s = session(fast(), "sleep 30 & sleep 30 & exit 0", &[]).await;

        assert_eq!(s.outcome.status, Some(ProcessExit::Exited(0)));
        assert!(s.outcome.stuck.is_empty());
        assert_eq!(s.adopted.len(), 2);
        for pid in &s.adopted {
            assert!(!sys::is_alive(Target::Process(*pid)));
        }

        let main_exit = s.events.iter().position(|e| e.kind == EventKind::MainExited).unwrap();
        let first_signal = s
            .events
            .iter()
            .position(|e| e.kind == EventKind::DescendantSignaled)
            .unwrap();
        assert!(main_exit < first_signal);
        assert!(s.events.iter().any(|e| e.kind == EventKind::DrainStarted));
        assert!(s.events.iter().any(|e| e.kind == EventKind::AllReaped));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[serial]
    async fn test_drain_kills_term_ignoring_orphan() {
        subreaper::enable().unwrap();
        let s = session(fast(), "(trap '' TERM; sleep 30) & exit 0", &[]).await;

        assert!(s.outcome.stuck.is_empty());
        let kills = s
            .events
            .iter()
            .filter(|e| e.kind == EventKind::DescendantSignaled)
            .filter(|e| e.signal() == Some(Signal::SIGKILL))
            .count();
        assert!(kills >= 1);
        for pid in &s.adopted {
            assert!(!sys::is_alive(Target::Process(*pid)));
        }
    }

    /// Census source that answers the same census forever.
    struct FixedCensus(Census);

    #[async_trait::async_trait]
    impl CensusSource for FixedCensus {
        async fn census(&self) -> Option<Census> {
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_unkillable_descendant_degrades_session() {
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let ghost = Pid::from_raw(i32::MAX - 1);
        let census = FixedCensus(Census {
            running: vec![ghost],
            exhausted: false,
        });
        let cfg = Config {
            drain_grace: Duration::from_millis(30),
            drain_poll: Duration::from_millis(5),
            reap_retries: 2,
            forward_to_group: false,
            ..Config::default()
        };
        let (notifier, exited) = ExitNotifier::channel();
        notifier.notify(ProcessExit::Exited(0));
        let (_tx, signal_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator::new(cfg, ghost, census, signal_rx, bus.clone());
        let outcome = coordinator.run(exited).await;

        assert_eq!(outcome.status, Some(ProcessExit::Exited(0)));
        assert_eq!(outcome.stuck, vec![ghost]);
        assert!(outcome.reasons.degraded);

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        let incomplete = events
            .iter()
            .find(|e| e.kind == EventKind::DrainIncomplete)
            .unwrap();
        assert_eq!(incomplete.count, Some(1));
        assert_eq!(incomplete.reason.as_deref(), Some(ghost.to_string().as_str()));
        assert!(events.iter().any(|e| e.kind == EventKind::DrainStarted));
        assert!(events.iter().all(|e| e.kind != EventKind::AllReaped));
        // Signals to a pid that no longer exists are not reported.
        assert!(events.iter().all(|e| e.kind != EventKind::DescendantSignaled));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[serial]
    async fn test_group_is_drained_when_no_child_is_left() {
        // The census claims ECHILD as it does without subreaper mode, so the
        // background job is only reachable through main's process group.
        // Subreaper mode stays on so the reaper collects it once killed.
        subreaper::enable().unwrap();
        let bus = Bus::new(256);
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("bg.pid");
        let script = format!("sleep 30 & echo $! > {}; exit 0", pidfile.display());

        let cfg = fast();
        let sigchld = signal(SignalKind::child()).unwrap();
        let spec = CommandSpec::new("sh").with_args(["-c", script.as_str()]);
        let (handle, notifier) = launcher::spawn(&spec, cfg.forward_to_group).unwrap();
        let (reaper, _client) = Reaper::new(
            handle.pid,
            notifier,
            CancellationToken::new(),
            sigchld,
            ReaperParams {
                retries: cfg.reap_retries,
                backoff: BackoffPolicy::default(),
            },
            bus.clone(),
        );
        let reaper_token = CancellationToken::new();
        let reaper_task = tokio::spawn(reaper.run(reaper_token.clone()));

        let census = FixedCensus(Census {
            running: Vec::new(),
            exhausted: true,
        });
        let (_tx, signal_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(cfg, handle.pid, census, signal_rx, bus.clone());
        let outcome = coordinator.run(handle.exited).await;
        reaper_token.cancel();
        reaper_task.await.unwrap();

        assert_eq!(outcome.status, Some(ProcessExit::Exited(0)));
        assert!(!outcome.reasons.degraded);
        let bg: i32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!sys::is_alive(Target::Process(Pid::from_raw(bg))));
        assert!(!sys::is_alive(Target::Group(handle.pid)));
    }

    #[test]
    fn test_main_target_follows_config() {
        let mut cfg = Config::default();
        let pid = Pid::from_raw(42);
        assert_eq!(main_target(&cfg, pid), Target::Group(pid));
        cfg.forward_to_group = false;
        assert_eq!(main_target(&cfg, pid), Target::Process(pid));
    }
}
