//! # Descendant bookkeeping owned by the reaper.
//!
//! Tracks every process the session is responsible for:
//! - the **main** process started by the launcher;
//! - **adopted** processes, either reaped by the supervisor or discovered as
//!   live children of the supervisor during draining.
//!
//! ## Rules
//! - Only the reaper task holds a [`Descendants`]; everyone else sees copies
//!   of its contents through census replies (single writer).
//! - Exactly one descendant has role [`Role::Main`]; once main is reaped its
//!   pid is never classified as main again (pids get recycled).
//! - A reaped pid is reported once and then forgotten, so a recycled pid is a
//!   new descendant.

use std::collections::HashMap;

use nix::unistd::Pid;

/// Relationship of a descendant to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Started directly by the launcher.
    Main,
    /// Reparented to the supervisor after its parent exited.
    Adopted,
}

/// Liveness of a descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Exited,
}

/// One process the session is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descendant {
    pub pid: Pid,
    pub role: Role,
    pub state: State,
    /// Best-effort previous parent; the kernel does not keep it after reparenting.
    pub parent_at_adoption: Option<Pid>,
}

/// Classification of a reaped pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaped {
    /// The main process.
    Main,
    /// Any other process: an orphan that was reparented to the supervisor.
    Adopted { parent_at_adoption: Option<Pid> },
}

/// The live-descendant set of one session.
#[derive(Debug)]
pub struct Descendants {
    main: Pid,
    main_reaped: bool,
    live: HashMap<Pid, Descendant>,
    adopted: Vec<Pid>,
    reaped: usize,
}

impl Descendants {
    /// Creates the set with `main` running.
    pub fn new(main: Pid) -> Self {
        let mut live = HashMap::new();
        live.insert(
            main,
            Descendant {
                pid: main,
                role: Role::Main,
                state: State::Running,
                parent_at_adoption: None,
            },
        );
        Self {
            main,
            main_reaped: false,
            live,
            adopted: Vec::new(),
            reaped: 0,
        }
    }

    /// Records a live child found outside of `waitpid` (e.g. through `/proc`).
    ///
    /// Returns `true` if the pid was not tracked yet.
    pub fn observe_running(&mut self, pid: Pid) -> bool {
        if self.is_main(pid) || self.live.contains_key(&pid) {
            return false;
        }
        self.live.insert(
            pid,
            Descendant {
                pid,
                role: Role::Adopted,
                state: State::Running,
                parent_at_adoption: None,
            },
        );
        true
    }

    /// Marks `pid` as exited and classifies it.
    ///
    /// The entry stays in the set until [`Descendants::forget`] so callers can
    /// publish the event first.
    pub fn mark_exited(&mut self, pid: Pid) -> Reaped {
        self.reaped += 1;

        if self.is_main(pid) {
            self.main_reaped = true;
            if let Some(d) = self.live.get_mut(&pid) {
                d.state = State::Exited;
            }
            return Reaped::Main;
        }

        let entry = self.live.entry(pid).or_insert(Descendant {
            pid,
            role: Role::Adopted,
            state: State::Running,
            parent_at_adoption: None,
        });
        entry.state = State::Exited;
        self.adopted.push(pid);
        Reaped::Adopted {
            parent_at_adoption: entry.parent_at_adoption,
        }
    }

    /// Drops an exited pid from the set.
    pub fn forget(&mut self, pid: Pid) {
        if let Some(d) = self.live.get(&pid) {
            if d.state == State::Exited {
                self.live.remove(&pid);
            }
        }
    }

    /// Drops entries for pids that are no longer our children (reaped elsewhere
    /// or never really ours). `children` is the current child list.
    pub fn retain_children(&mut self, children: &[Pid]) {
        let main = self.main;
        let main_reaped = self.main_reaped;
        self.live.retain(|pid, d| {
            let keep_main = *pid == main && !main_reaped;
            keep_main || d.state == State::Running && children.contains(pid)
        });
    }

    /// True while `pid` refers to the (not yet reaped) main process.
    pub fn is_main(&self, pid: Pid) -> bool {
        pid == self.main && !self.main_reaped
    }

    /// True once main was reaped.
    #[cfg(test)]
    pub fn main_reaped(&self) -> bool {
        self.main_reaped
    }

    /// Adopted descendants still running, sorted by pid.
    pub fn running_adopted(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self
            .live
            .values()
            .filter(|d| d.role == Role::Adopted && d.state == State::Running)
            .map(|d| d.pid)
            .collect();
        pids.sort_unstable_by_key(|p| p.as_raw());
        pids
    }

    /// Number of descendants still running (main included).
    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.values().filter(|d| d.state == State::Running).count()
    }

    /// Every pid ever classified as adopted, in reap order.
    pub fn adopted(&self) -> &[Pid] {
        &self.adopted
    }

    /// Total number of reaped processes (main included).
    pub fn reaped(&self) -> usize {
        self.reaped
    }

    /// Snapshot of one tracked descendant.
    #[cfg(test)]
    pub fn get(&self, pid: Pid) -> Option<&Descendant> {
        self.live.get(&pid)
    }
}
