//! Thin wrappers over the process syscalls the runtime needs.
//!
//! - [`send`] delivers a signal to a pid or a process group and maps errno
//!   through [`SignalError`];
//! - [`live_children`] lists the current children of this process from `/proc`;
//! - [`is_alive`] checks whether a pid or group still exists.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};

use crate::error::SignalError;

/// Where a signal goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A single process.
    Process(Pid),
    /// Every member of the process group led by this pid.
    Group(Pid),
}

impl Target {
    /// Pid (or group id) the target refers to.
    pub fn pid(&self) -> Pid {
        match self {
            Target::Process(pid) | Target::Group(pid) => *pid,
        }
    }
}

/// Sends `sig` to `target`.
pub fn send(target: Target, sig: Signal) -> Result<(), SignalError> {
    let res = match target {
        Target::Process(pid) => signal::kill(pid, sig),
        Target::Group(pgid) => signal::killpg(pgid, sig),
    };
    res.map_err(SignalError::from_errno)
}

/// Signal-0 check: true while `target` has at least one process (zombies
/// included). `EPERM` counts as alive.
pub fn is_alive(target: Target) -> bool {
    let res = match target {
        Target::Process(pid) => signal::kill(pid, None),
        Target::Group(pgid) => signal::killpg(pgid, None),
    };
    !matches!(res, Err(Errno::ESRCH))
}

/// Pid of the current process.
pub fn self_pid() -> Pid {
    unistd::getpid()
}

/// Current children of this process.
///
/// Reads `/proc/self/task/*/children`; kernels built without that file fall
/// back to scanning `/proc/<pid>/stat` for our pid as parent. Returns an empty
/// list where `/proc` is unavailable.
#[cfg(target_os = "linux")]
pub fn live_children() -> Vec<Pid> {
    let mut pids = children_from_tasks().unwrap_or_else(children_from_stat);
    pids.sort_unstable_by_key(|p| p.as_raw());
    pids.dedup();
    pids
}

#[cfg(not(target_os = "linux"))]
pub fn live_children() -> Vec<Pid> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn children_from_tasks() -> Option<Vec<Pid>> {
    let mut pids = Vec::new();
    let mut found = false;
    for entry in std::fs::read_dir("/proc/self/task").ok()?.flatten() {
        let Ok(contents) = std::fs::read_to_string(entry.path().join("children")) else {
            continue;
        };
        found = true;
        pids.extend(parse_pids(&contents));
    }
    found.then_some(pids)
}

#[cfg(target_os = "linux")]
fn children_from_stat() -> Vec<Pid> {
    let me = self_pid().as_raw();
    let Ok(dir) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    dir.flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter(|pid| {
            std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .ok()
                .and_then(|stat| parent_from_stat(&stat))
                == Some(me)
        })
        .map(Pid::from_raw)
        .collect()
}

fn parse_pids(contents: &str) -> impl Iterator<Item = Pid> + '_ {
    contents
        .split_whitespace()
        .filter_map(|s| s.parse::<i32>().ok())
        .map(Pid::from_raw)
}

/// Extracts the ppid from a `/proc/<pid>/stat` line.
///
/// The command name sits in parentheses and may contain spaces or `)`, so
/// fields are counted from the last `)`.
fn parent_from_stat(stat: &str) -> Option<i32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_from_stat() {
        let stat = "4242 (sleep) S 17 4242 17 0 -1 4194560 98 0 0 0";
        assert_eq!(parent_from_stat(stat), Some(17));

        let tricky = "4242 (we) ird) name) R 99 1 1 0";
        assert_eq!(parent_from_stat(tricky), Some(99));

        assert_eq!(parent_from_stat("garbage"), None);
    }

    #[test]
    fn test_parse_pids() {
        let pids: Vec<i32> = parse_pids("12 13\n14 x").map(|p| p.as_raw()).collect();
        assert_eq!(pids, vec![12, 13, 14]);
    }

    #[test]
    fn test_signal_to_missing_pid_is_gone() {
        // pid_max is at most 2^22 on Linux.
        let missing = Pid::from_raw(i32::MAX - 1);
        assert_eq!(send(Target::Process(missing), Signal::SIGTERM), Err(SignalError::Gone));
        assert!(!is_alive(Target::Process(missing)));
        assert!(!is_alive(Target::Group(missing)));
    }

    #[test]
    fn test_self_is_alive() {
        assert!(is_alive(Target::Process(self_pid())));
        assert_eq!(Target::Group(Pid::from_raw(5)).pid(), Pid::from_raw(5));
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial_test::serial]
    fn test_live_children_lists_spawned_child() {
        use std::process::Command;

        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        let listed = live_children().contains(&pid);
        child.kill().unwrap();
        child.wait().unwrap();
        assert!(listed);
    }
}
