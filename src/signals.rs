//! Signal disposition for the interactive shell and SIGCHLD-driven job
//! reaping, per spec §4.6.
//!
//! Handlers only touch atomics — no allocation, no `printf` — and the real
//! work (walking `waitpid`, updating the job table, composing "Done"
//! notifications) happens back in normal execution context once the REPL
//! observes the flag, per the deferred-notification design note.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::debug;
use crate::jobs::JobTable;

/// pgid currently holding the controlling terminal, or -1.
pub static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(-1);
/// Set by the SIGCHLD handler; drained by [`reap_children`].
pub static SIGCHLD_PENDING: AtomicBool = AtomicBool::new(false);

pub fn set_foreground_pgid(pgid: i32) {
    FOREGROUND_PGID.store(pgid, Ordering::SeqCst);
}

pub fn clear_foreground_pgid() {
    FOREGROUND_PGID.store(-1, Ordering::SeqCst);
}

pub fn foreground_pgid() -> Option<i32> {
    match FOREGROUND_PGID.load(Ordering::SeqCst) {
        p if p > 0 => Some(p),
        _ => None,
    }
}

extern "C" fn on_chld(_sig: libc::c_int) {
    SIGCHLD_PENDING.store(true, Ordering::SeqCst);
}

/// SIGINT/SIGQUIT/SIGTSTP arriving at the shell itself are relayed to the
/// current foreground process group, matching terminal driver behavior for
/// the case where the shell is still the target of the signal.
fn relay_to_foreground(sig: libc::c_int) {
    let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
    if pgid > 0 {
        unsafe {
            libc::killpg(pgid, sig);
        }
    }
}

/// Installs the interactive shell's signal disposition. No-op on non-unix.
///
/// `SIGCHLD` needs `SA_NOCLDSTOP` cleared so stops are reported (spec §4.6)
/// and is installed directly via `sigaction`; the relayed signals use
/// `signal_hook`'s async-signal-safe low-level registration, the same
/// mechanism the teacher uses for its own `SIGTSTP` handling.
#[cfg(unix)]
pub fn install_shell_handlers() {
    unsafe {
        let chld_action = SigAction::new(SigHandler::Handler(on_chld), SaFlags::empty(), SigSet::empty());
        let _ = signal::sigaction(Signal::SIGCHLD, &chld_action);

        let _ = signal_hook::low_level::register(signal_hook::consts::SIGINT, || relay_to_foreground(libc::SIGINT));
        let _ = signal_hook::low_level::register(signal_hook::consts::SIGQUIT, || relay_to_foreground(libc::SIGQUIT));
        let _ = signal_hook::low_level::register(signal_hook::consts::SIGTSTP, || relay_to_foreground(libc::SIGTSTP));

        let ignore_action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        let _ = signal::sigaction(Signal::SIGTTIN, &ignore_action);
        let _ = signal::sigaction(Signal::SIGTTOU, &ignore_action);
    }
}

#[cfg(not(unix))]
pub fn install_shell_handlers() {}

/// Restores default dispositions in a forked child before `exec`, per spec
/// §4.6 ("children always re-enable default handlers").
#[cfg(unix)]
pub fn reset_child_handlers() {
    unsafe {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for sig in [
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTSTP,
            Signal::SIGTTIN,
            Signal::SIGTTOU,
            Signal::SIGCHLD,
        ] {
            let _ = signal::sigaction(sig, &default);
        }
    }
}

#[cfg(not(unix))]
pub fn reset_child_handlers() {}

/// Drains pending `SIGCHLD` notifications: non-blocking `waitpid(-1, ...)`
/// in a loop, updating the matching job's `running`/`stopped`/`status`.
/// Returns formatted `"[id] Done\tcmd"`/`"[id] Stopped\tcmd"` lines for jobs
/// whose state changed, for the REPL to print.
pub fn reap_children(jobs: &mut JobTable) -> Vec<String> {
    if !SIGCHLD_PENDING.swap(false, Ordering::SeqCst) {
        return Vec::new();
    }
    let mut notifications = Vec::new();
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(WaitStatus::Exited(pid, code)) => {
                if let Some(job) = jobs.find_by_member_pid_mut(pid.as_raw()) {
                    if job.is_last_stage(pid.as_raw()) {
                        job.status = code;
                    }
                    // A pipeline's earlier stages commonly exit before its
                    // last one; the job stays Running until every member
                    // has, matching spec.md §3 invariant 5.
                    if job.mark_exited(pid.as_raw()) {
                        job.running = false;
                        job.stopped = false;
                        notifications.push(format!("[{}] Done\t{}", job.job_id, job.cmd));
                    }
                }
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                if let Some(job) = jobs.find_by_member_pid_mut(pid.as_raw()) {
                    if job.is_last_stage(pid.as_raw()) {
                        job.status = 128 + sig as i32;
                    }
                    if job.mark_exited(pid.as_raw()) {
                        job.running = false;
                        job.stopped = false;
                        notifications.push(format!("[{}] Done\t{}", job.job_id, job.cmd));
                    }
                }
            }
            Ok(WaitStatus::Stopped(pid, _sig)) => {
                if let Some(job) = jobs.find_by_member_pid_mut(pid.as_raw()) {
                    job.running = false;
                    job.stopped = true;
                    notifications.push(format!("[{}] Stopped\t{}", job.job_id, job.cmd));
                }
            }
            Ok(WaitStatus::Continued(pid)) => {
                if let Some(job) = jobs.find_by_member_pid_mut(pid.as_raw()) {
                    job.running = true;
                    job.stopped = false;
                }
            }
            Ok(_) => {}
        }
    }
    jobs.drain_done();
    if !notifications.is_empty() {
        debug::trace(debug::JOB, "job", format!("{} transition(s) reaped", notifications.len()));
    }
    notifications
}

#[cfg(unix)]
pub fn kill_pgid(pgid: i32, sig: Signal) -> Result<(), nix::Error> {
    signal::killpg(Pid::from_raw(pgid), sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_pgid_roundtrips() {
        set_foreground_pgid(1234);
        assert_eq!(foreground_pgid(), Some(1234));
        clear_foreground_pgid();
        assert_eq!(foreground_pgid(), None);
    }

    #[test]
    fn reap_is_noop_without_pending_flag() {
        let mut jobs = JobTable::new();
        jobs.add(1, vec![1], "sleep 1".into());
        assert!(reap_children(&mut jobs).is_empty());
    }
}
