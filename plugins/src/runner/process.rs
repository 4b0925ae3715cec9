use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::System;
use tracing::debug;
use weaver_core::runner::{ProcessHandle, ProcessTarget, Signal};

/// Agent process started as the leader of its own process group.
///
/// `Root` addresses the whole group, so terminating the agent also stops
/// whatever it spawned. `Pid` addresses one sub-action and its descendants.
pub struct GroupProcessHandle {
    pid: u32,
    system: Mutex<System>,
}

impl GroupProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    /// `(pid, parent)` for every process currently visible.
    fn process_table(&self) -> Vec<(u32, Option<u32>)> {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_processes();
        sys.processes()
            .iter()
            .map(|(pid, p)| (pid.as_u32(), p.parent().map(|pp| pp.as_u32())))
            .collect()
    }

    fn descendants(&self, root: u32) -> Vec<u32> {
        let table = self.process_table();
        let mut found = Vec::new();
        let mut frontier: HashSet<u32> = HashSet::from([root]);
        while !frontier.is_empty() {
            let next: HashSet<u32> = table
                .iter()
                .filter(|(_, parent)| parent.is_some_and(|pp| frontier.contains(&pp)))
                .map(|(pid, _)| *pid)
                .filter(|pid| !found.contains(pid))
                .collect();
            found.extend(next.iter().copied());
            frontier = next;
        }
        found
    }
}

#[async_trait]
impl ProcessHandle for GroupProcessHandle {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn children(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .process_table()
            .into_iter()
            .filter(|(_, parent)| *parent == Some(self.pid))
            .map(|(pid, _)| pid)
            .collect();
        pids.sort_unstable();
        pids
    }

    fn signal(&self, target: ProcessTarget, signal: Signal) -> anyhow::Result<()> {
        match target {
            ProcessTarget::Root => {
                debug!(pid = self.pid, ?signal, "signalling agent group");
                os::signal_group(self.pid, signal)
            }
            ProcessTarget::Pid(pid) => {
                // deepest first so a dying parent cannot respawn work
                for child in self.descendants(pid).into_iter().rev() {
                    os::signal_pid(child, signal)?;
                }
                debug!(pid, ?signal, "signalling sub-action");
                os::signal_pid(pid, signal)
            }
        }
    }

    /// For `Root` this asks about the whole group: the leader may be gone
    /// while a descendant that ignored `Term` still runs.
    fn is_alive(&self, target: ProcessTarget) -> bool {
        match target {
            ProcessTarget::Root => os::group_alive(self.pid),
            ProcessTarget::Pid(pid) => os::is_alive(pid),
        }
    }
}

#[cfg(unix)]
mod os {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal as NixSignal};
    use nix::unistd::Pid;

    use super::Signal;

    fn to_nix(signal: Signal) -> NixSignal {
        match signal {
            Signal::Term => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        }
    }

    fn gone_is_ok(res: nix::Result<()>) -> anyhow::Result<()> {
        match res {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) fn signal_group(pid: u32, signal: Signal) -> anyhow::Result<()> {
        gone_is_ok(signal::killpg(Pid::from_raw(pid as i32), to_nix(signal)))
    }

    pub(super) fn signal_pid(pid: u32, signal: Signal) -> anyhow::Result<()> {
        gone_is_ok(signal::kill(Pid::from_raw(pid as i32), to_nix(signal)))
    }

    fn exists(res: nix::Result<()>) -> bool {
        matches!(res, Ok(()) | Err(Errno::EPERM))
    }

    pub(super) fn is_alive(pid: u32) -> bool {
        exists(signal::kill(Pid::from_raw(pid as i32), None))
    }

    pub(super) fn group_alive(pgid: u32) -> bool {
        exists(signal::killpg(Pid::from_raw(pgid as i32), None))
    }
}

#[cfg(not(unix))]
mod os {
    use sysinfo::{Pid, System};

    use super::Signal;

    fn with_process<T>(pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut sys = System::new();
        sys.refresh_processes();
        sys.process(Pid::from_u32(pid)).map(f)
    }

    // no process groups here; the tree is walked by the caller for sub-actions
    pub(super) fn signal_group(pid: u32, signal: Signal) -> anyhow::Result<()> {
        signal_pid(pid, signal)
    }

    pub(super) fn signal_pid(pid: u32, _signal: Signal) -> anyhow::Result<()> {
        with_process(pid, |p| p.kill());
        Ok(())
    }

    pub(super) fn is_alive(pid: u32) -> bool {
        with_process(pid, |_| ()).is_some()
    }

    pub(super) fn group_alive(pid: u32) -> bool {
        is_alive(pid)
    }
}
