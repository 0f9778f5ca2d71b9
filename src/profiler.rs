//! Syscall profiler: ptrace-attaches to a live process and times every
//! syscall entry/exit pair, per spec §4.8.
//!
//! A process cannot `PTRACE_ATTACH` itself, so `profile on`'s literal
//! `Profiler.start(getpid())` (spec §4.5) cannot mean "trace the shell's own
//! main thread" — there would be nothing left running to drive the trace.
//! This implementation arms the profiler instead: `profile on` moves it to
//! `Armed`, and the executor attaches it to the pid of the *next* foreground
//! external command it forks (spec §4.8's "attaches to a live process"; spec
//! §5's "invoked inline around `waitpid` ... on foreground children"). See
//! DESIGN.md for the full resolution.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::debug;
use crate::state::ShellConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfilerError {
    #[error("profiling already active")]
    AlreadyProfiling,
    #[error("profiling not active")]
    NotProfiling,
    #[error("ptrace call failed: {0}")]
    SyscallFailed(String),
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// `profile on` was issued; waiting for the next foreground external
    /// command to actually ptrace-attach to.
    Armed,
    Attached,
}

/// Outcome of one [`Profiler::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One syscall entry/exit pair was recorded; keep stepping.
    Continued,
    /// The traced process exited or was killed; stop stepping.
    Exited(i32),
}

#[derive(Debug, Clone, Default)]
pub struct SyscallStats {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl SyscallStats {
    fn record(&mut self, elapsed: Duration) {
        if self.count == 0 {
            self.min = elapsed;
            self.max = elapsed;
        } else {
            if elapsed < self.min {
                self.min = elapsed;
            }
            if elapsed > self.max {
                self.max = elapsed;
            }
        }
        self.count += 1;
        self.total += elapsed;
    }

    fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

pub struct Profiler {
    state: State,
    target: Option<i32>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    /// Table of per-syscall stats; bounded to `PROFILER_TABLE_SIZE` distinct
    /// syscall numbers, matching spec §4.8's fixed-size intent.
    table: HashMap<i64, SyscallStats>,
}

impl Default for Profiler {
    fn default() -> Self {
        Profiler::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Profiler { state: State::Idle, target: None, started_at: None, stopped_at: None, table: HashMap::new() }
    }

    /// True once `profile on` has been issued, whether or not a target has
    /// been attached to yet — matches the `profile status` "active" wording.
    pub fn is_active(&self) -> bool {
        self.state != State::Idle
    }

    pub fn is_armed(&self) -> bool {
        self.state == State::Armed
    }

    /// `profile on`. Linux-only; other platforms always fail per spec §4.8's
    /// "Non-Linux platforms" clause.
    #[cfg(target_os = "linux")]
    pub fn arm(&mut self) -> Result<(), ProfilerError> {
        if self.state != State::Idle {
            return Err(ProfilerError::AlreadyProfiling);
        }
        self.state = State::Armed;
        self.target = None;
        self.started_at = Some(Instant::now());
        self.stopped_at = None;
        self.table.clear();
        debug::trace(debug::PROFILE, "profile", "armed, waiting for next foreground command");
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn arm(&mut self) -> Result<(), ProfilerError> {
        Err(ProfilerError::SyscallFailed("profiling not supported".into()))
    }

    /// Called by the executor right after forking a foreground external
    /// command, while armed. Attaches, waits for the attach-stop, and
    /// arranges the first syscall-entry stop. Returns `true` if tracing is
    /// now live for `pid`.
    #[cfg(target_os = "linux")]
    pub fn attach_to(&mut self, pid: i32) -> bool {
        use nix::sys::ptrace;
        use nix::sys::wait::{waitpid, WaitStatus};
        use nix::unistd::Pid;

        if self.state != State::Armed {
            return false;
        }
        let target = Pid::from_raw(pid);
        if ptrace::attach(target).is_err() {
            return false;
        }
        match waitpid(target, None) {
            Ok(WaitStatus::Stopped(_, _)) => {}
            _ => {
                let _ = ptrace::detach(target, None);
                return false;
            }
        }
        if ptrace::setoptions(target, ptrace::Options::PTRACE_O_TRACESYSGOOD).is_err()
            || ptrace::syscall(target, None).is_err()
        {
            let _ = ptrace::detach(target, None);
            return false;
        }
        self.state = State::Attached;
        self.target = Some(pid);
        debug::trace(debug::PROFILE, "profile", format!("attached to pid {pid}"));
        true
    }

    #[cfg(not(target_os = "linux"))]
    pub fn attach_to(&mut self, _pid: i32) -> bool {
        false
    }

    /// Advances through one syscall-entry/syscall-exit pair, or reports that
    /// the tracee exited. Linux-only; called in a loop by the executor's
    /// foreground wait while `Attached`.
    #[cfg(target_os = "linux")]
    pub fn step(&mut self, pid: i32) -> Result<StepOutcome, ProfilerError> {
        use nix::sys::ptrace;
        use nix::sys::wait::{waitpid, WaitStatus};
        use nix::unistd::Pid;

        if self.state != State::Attached {
            return Err(ProfilerError::NotProfiling);
        }
        let target = Pid::from_raw(pid);
        let entry_time = Instant::now();
        ptrace::syscall(target, None).map_err(|e| ProfilerError::SyscallFailed(e.to_string()))?;
        match waitpid(target, None) {
            Ok(WaitStatus::PtraceSyscall(_)) => {
                let syscall_no = ptrace::getregs(target).map(|r| r.orig_rax as i64).unwrap_or(-1);

                ptrace::syscall(target, None).map_err(|e| ProfilerError::SyscallFailed(e.to_string()))?;
                match waitpid(target, None) {
                    Ok(WaitStatus::PtraceSyscall(_)) => {
                        let elapsed = entry_time.elapsed();
                        if self.table.len() < ShellConfig::PROFILER_TABLE_SIZE || self.table.contains_key(&syscall_no) {
                            self.table.entry(syscall_no).or_default().record(elapsed);
                        }
                        Ok(StepOutcome::Continued)
                    }
                    Ok(WaitStatus::Exited(_, code)) => Ok(StepOutcome::Exited(code)),
                    Ok(WaitStatus::Signaled(_, sig, _)) => Ok(StepOutcome::Exited(128 + sig as i32)),
                    _ => Ok(StepOutcome::Continued),
                }
            }
            Ok(WaitStatus::Exited(_, code)) => Ok(StepOutcome::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => Ok(StepOutcome::Exited(128 + sig as i32)),
            _ => Ok(StepOutcome::Continued),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn step(&mut self, _pid: i32) -> Result<StepOutcome, ProfilerError> {
        Err(ProfilerError::NotProfiling)
    }

    /// `profile off`. Detaches if a target is actually attached; every error
    /// path after a successful attach must still detach, per spec §9.
    pub fn disarm(&mut self) -> Result<(), ProfilerError> {
        if self.state == State::Idle {
            return Err(ProfilerError::NotProfiling);
        }
        #[cfg(target_os = "linux")]
        if self.state == State::Attached {
            if let Some(pid) = self.target {
                let _ = nix::sys::ptrace::detach(nix::unistd::Pid::from_raw(pid), None);
            }
        }
        self.state = State::Idle;
        self.target = None;
        self.stopped_at = Some(Instant::now());
        debug::trace(debug::PROFILE, "profile", "disarmed");
        Ok(())
    }

    /// Status/wall-clock/total-syscall/average/top-10 report per spec §4.8.
    /// Sort is stable by count descending, ties broken by syscall number
    /// ascending.
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("profiling: {}\n", if self.is_active() { "active" } else { "inactive" }));

        let elapsed = match (self.started_at, self.stopped_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        out.push_str(&format!("wall clock: {:.3}s\n", elapsed.as_secs_f64()));

        let total_calls: u64 = self.table.values().map(|s| s.count).sum();
        out.push_str(&format!("total syscalls: {total_calls}\n"));
        if total_calls == 0 {
            return out;
        }

        let total_time: Duration = self.table.values().map(|s| s.total).sum();
        let avg = total_time / total_calls as u32;
        let min = self.table.values().map(|s| s.min).min().unwrap_or(Duration::ZERO);
        let max = self.table.values().map(|s| s.max).max().unwrap_or(Duration::ZERO);
        out.push_str(&format!(
            "avg: {:.3}ms  min: {:.3}ms  max: {:.3}ms\n",
            avg.as_secs_f64() * 1000.0,
            min.as_secs_f64() * 1000.0,
            max.as_secs_f64() * 1000.0
        ));

        let mut rows: Vec<(i64, &SyscallStats)> = self.table.iter().map(|(n, s)| (*n, s)).collect();
        rows.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));
        out.push_str("top syscalls:\n");
        for (no, stats) in rows.into_iter().take(10) {
            out.push_str(&format!(
                "  {:<16} {:>8}  {:.3}ms avg\n",
                syscall_name(no),
                stats.count,
                stats.avg().as_secs_f64() * 1000.0
            ));
        }
        out
    }
}

/// x86_64 Linux syscall number → name. Unknown numbers print as `syscall_<n>`.
fn syscall_name(no: i64) -> String {
    let name = match no {
        0 => "read",
        1 => "write",
        2 => "open",
        3 => "close",
        4 => "stat",
        5 => "fstat",
        6 => "lstat",
        7 => "poll",
        8 => "lseek",
        9 => "mmap",
        10 => "mprotect",
        11 => "munmap",
        12 => "brk",
        13 => "rt_sigaction",
        14 => "rt_sigprocmask",
        21 => "access",
        22 => "pipe",
        32 => "dup",
        33 => "dup2",
        39 => "getpid",
        41 => "socket",
        42 => "connect",
        56 => "clone",
        57 => "fork",
        59 => "execve",
        60 => "exit",
        61 => "wait4",
        62 => "kill",
        79 => "getcwd",
        80 => "chdir",
        82 => "rename",
        83 => "mkdir",
        84 => "rmdir",
        85 => "creat",
        86 => "link",
        87 => "unlink",
        89 => "readlink",
        97 => "getrlimit",
        102 => "getuid",
        104 => "getgid",
        110 => "getppid",
        231 => "exit_group",
        257 => "openat",
        _ => return format!("syscall_{no}"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_on_fresh_profiler_is_inactive_with_zero_calls() {
        let p = Profiler::new();
        let report = p.report();
        assert!(report.contains("inactive"));
        assert!(report.contains("total syscalls: 0"));
    }

    #[test]
    fn syscall_stats_track_min_max_count() {
        let mut stats = SyscallStats::default();
        stats.record(Duration::from_millis(5));
        stats.record(Duration::from_millis(1));
        stats.record(Duration::from_millis(9));
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Duration::from_millis(1));
        assert_eq!(stats.max, Duration::from_millis(9));
    }

    #[test]
    fn unknown_syscall_number_formats_as_fallback() {
        assert_eq!(syscall_name(999_999), "syscall_999999");
        assert_eq!(syscall_name(0), "read");
    }

    #[test]
    fn disarm_without_arm_errors() {
        let mut p = Profiler::new();
        assert_eq!(p.disarm(), Err(ProfilerError::NotProfiling));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn arm_then_arm_again_is_already_profiling() {
        let mut p = Profiler::new();
        p.arm().unwrap();
        assert_eq!(p.arm(), Err(ProfilerError::AlreadyProfiling));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn armed_profiler_reports_active_before_any_attach() {
        let mut p = Profiler::new();
        p.arm().unwrap();
        assert!(p.report().starts_with("profiling: active"));
        assert!(p.is_armed());
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn arm_on_non_linux_reports_unsupported() {
        let mut p = Profiler::new();
        assert!(p.arm().is_err());
    }
}
