//! Executor: walks a command chain, dispatching internal commands in-process
//! and forking external commands/pipelines into process groups with real
//! job control.

use std::ffi::CString;
use std::io::{BufRead, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::ast::{Chain, ChainOp, Command as CmdNode, RedirKind, Redirection};
use crate::builtins;
use crate::debug;
use crate::shell::Shell;
use crate::signals;

impl CmdNode {
    /// Textual form for job-table / pipeline summary display (`a | b | c`).
    pub fn cmd_text(&self) -> String {
        self.argv.join(" ")
    }
}

/// Runs a full command chain, honoring `&&`/`||` short-circuiting. Returns
/// the status of the last node actually run.
pub fn execute_chain(shell: &mut Shell, chain: &Chain) -> i32 {
    debug::trace(debug::EXEC, "exec", format!("chain of {} node(s)", chain.len()));
    let mut status = 0;
    let mut i = 0;
    while i < chain.len() {
        if chain[i].op == ChainOp::Pipe {
            let start = i;
            while i < chain.len() && chain[i].op == ChainOp::Pipe {
                i += 1;
            }
            // `i` now indexes the terminating stage of the pipeline.
            let stages = &chain[start..=i];
            let background = stages.last().map(|s| s.op == ChainOp::Background).unwrap_or(false);
            status = run_pipeline(shell, stages, background);
        } else {
            let background = chain[i].op == ChainOp::Background;
            status = run_node(shell, &chain[i], background);
        }
        publish_status(shell, status);

        let just_ran_op = chain[i].op;
        i += 1;
        match just_ran_op {
            ChainOp::And if status != 0 => break,
            ChainOp::Or if status == 0 => break,
            _ => {}
        }
    }
    status
}

fn publish_status(shell: &mut Shell, status: i32) {
    shell.state.last_status = status;
    shell.vars.set("?", &status.to_string(), false);
}

/// A single command node: internal commands run in-process; external
/// commands are forked (foreground, waited on, or backgrounded as a job).
fn run_node(shell: &mut Shell, node: &CmdNode, background: bool) -> i32 {
    if node.is_empty() {
        return shell.state.last_status;
    }
    if builtins::is_builtin(node.cmd()) {
        run_internal(shell, node)
    } else {
        run_external(shell, node, background)
    }
}

fn run_internal(shell: &mut Shell, node: &CmdNode) -> i32 {
    let saved = match SavedStdio::capture() {
        Ok(s) => s,
        Err(_) => return 1,
    };
    if let Err(e) = apply_redirections(&node.redirections) {
        eprintln!("qsh: {e}");
        saved.restore();
        return 1;
    }
    let status = builtins::run(shell, &node.argv);
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    saved.restore();
    status
}

fn run_external(shell: &mut Shell, node: &CmdNode, background: bool) -> i32 {
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            let pid = unistd::getpid();
            let _ = unistd::setpgid(pid, pid);
            signals::reset_child_handlers();
            if let Err(e) = apply_redirections(&node.redirections) {
                eprintln!("qsh: {e}");
                std::process::exit(1);
            }
            exec_or_die(node.cmd(), &node.argv);
        }
        Ok(ForkResult::Parent { child }) => {
            let _ = unistd::setpgid(child, child);
            debug::trace(debug::EXEC, "exec", format!("forked pid {} for `{}`", child.as_raw(), node.cmd_text()));
            if background {
                let job_id = shell.jobs.add(child.as_raw(), vec![child.as_raw()], node.cmd_text());
                shell.vars.set("!", &child.as_raw().to_string(), false);
                println!("[{job_id}] {}", child.as_raw());
                0
            } else {
                foreground_wait(shell, child, node.cmd_text())
            }
        }
        Err(_) => 1,
    }
}

/// Forks `stages.len()` children wired pipe-to-pipe, all sharing one
/// process group, per spec §4.3 step 2.
fn run_pipeline(shell: &mut Shell, stages: &[CmdNode], background: bool) -> i32 {
    let k = stages.len();
    let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(k.saturating_sub(1));
    for _ in 0..k.saturating_sub(1) {
        match unistd::pipe() {
            Ok(p) => pipes.push(p),
            Err(_) => return 1,
        }
    }

    let mut children: Vec<Pid> = Vec::with_capacity(k);
    let mut pgid: Option<Pid> = None;

    for (idx, stage) in stages.iter().enumerate() {
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let target = pgid.unwrap_or_else(unistd::getpid);
                let _ = unistd::setpgid(unistd::getpid(), target);
                signals::reset_child_handlers();

                let is_first = idx == 0;
                let is_last = idx == k - 1;
                if !is_first {
                    let _ = unistd::dup2(pipes[idx - 1].0, 0);
                }
                if !is_last {
                    let _ = unistd::dup2(pipes[idx].1, 1);
                }
                for (r, w) in &pipes {
                    let _ = unistd::close(*r);
                    let _ = unistd::close(*w);
                }

                // First stage applies only input redirections; last applies
                // everything (its own output/error redirs therefore
                // override the pipe write end just wired above); middle
                // stages apply none.
                let redirs: Vec<Redirection> = if is_last {
                    stage.redirections.clone()
                } else if is_first {
                    stage
                        .redirections
                        .iter()
                        .filter(|r| matches!(r.kind, RedirKind::InFile | RedirKind::HereDoc))
                        .cloned()
                        .collect()
                } else {
                    Vec::new()
                };
                if let Err(e) = apply_redirections(&redirs) {
                    eprintln!("qsh: {e}");
                    std::process::exit(1);
                }

                if builtins::is_builtin(stage.cmd()) {
                    let status = builtins::run(shell, &stage.argv);
                    let _ = std::io::stdout().flush();
                    std::process::exit(status);
                }
                exec_or_die(stage.cmd(), &stage.argv);
            }
            Ok(ForkResult::Parent { child }) => {
                if pgid.is_none() {
                    pgid = Some(child);
                }
                let _ = unistd::setpgid(child, pgid.unwrap());
                children.push(child);
            }
            Err(_) => return 1,
        }
    }

    for (r, w) in &pipes {
        let _ = unistd::close(*r);
        let _ = unistd::close(*w);
    }

    let pgid = match pgid {
        Some(p) => p,
        None => return 1,
    };
    let summary = stages.iter().map(|s| s.cmd_text()).collect::<Vec<_>>().join(" | ");

    let member_pids: Vec<i32> = children.iter().map(|c| c.as_raw()).collect();

    if background {
        let job_id = shell.jobs.add(pgid.as_raw(), member_pids, summary);
        println!("[{job_id}] {}", pgid.as_raw());
        return 0;
    }

    place_in_foreground(shell, pgid);
    let mut last_status = 0;
    let mut stopped = false;
    for child in &children {
        match waitpid(*child, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(_, code)) => last_status = code,
            Ok(WaitStatus::Signaled(_, sig, _)) => last_status = 128 + sig as i32,
            Ok(WaitStatus::Stopped(_, _)) => stopped = true,
            _ => {}
        }
    }
    reclaim_foreground(shell);
    if stopped {
        let job_id = shell.jobs.add(pgid.as_raw(), member_pids, summary);
        if let Some(job) = shell.jobs.get_mut(job_id) {
            job.running = false;
            job.stopped = true;
        }
    }
    last_status
}

/// Steps the profiler until the attached child exits, accumulating
/// per-syscall stats (spec §4.8). Falls back to status 1 on a ptrace
/// failure mid-trace rather than hanging on a tracee we lost track of.
fn drive_profiled(shell: &mut Shell, child: Pid) -> i32 {
    use crate::profiler::StepOutcome;
    loop {
        match shell.profiler.step(child.as_raw()) {
            Ok(StepOutcome::Continued) => continue,
            Ok(StepOutcome::Exited(code)) => return code,
            Err(_) => return 1,
        }
    }
}

fn foreground_wait(shell: &mut Shell, child: Pid, cmd_text: String) -> i32 {
    place_in_foreground(shell, child);

    if shell.profiler.is_armed() && shell.profiler.attach_to(child.as_raw()) {
        let status = drive_profiled(shell, child);
        reclaim_foreground(shell);
        return status;
    }

    let status = match waitpid(child, Some(WaitPidFlag::WUNTRACED)) {
        Ok(WaitStatus::Exited(_, code)) => code,
        Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
        Ok(WaitStatus::Stopped(_, _)) => {
            let job_id = shell.jobs.add(child.as_raw(), vec![child.as_raw()], cmd_text);
            if let Some(job) = shell.jobs.get_mut(job_id) {
                job.running = false;
                job.stopped = true;
            }
            reclaim_foreground(shell);
            return 148;
        }
        _ => 1,
    };
    reclaim_foreground(shell);
    status
}

/// `tcsetpgrp(terminal, pgid)`; skipped entirely in non-interactive mode.
pub fn place_in_foreground(shell: &mut Shell, pgid: Pid) {
    if !shell.state.is_interactive {
        return;
    }
    shell.state.foreground_pgid = Some(pgid.as_raw());
    signals::set_foreground_pgid(pgid.as_raw());
    let _ = nix::unistd::tcsetpgrp(shell.state.shell_terminal_fd, pgid);
}

/// Reclaims the terminal for the shell's own process group.
pub fn reclaim_foreground(shell: &mut Shell) {
    if !shell.state.is_interactive {
        return;
    }
    let shell_pgid = Pid::from_raw(shell.state.shell_pgid);
    let _ = nix::unistd::tcsetpgrp(shell.state.shell_terminal_fd, shell_pgid);
    shell.state.foreground_pgid = None;
    signals::clear_foreground_pgid();
}

fn exec_or_die(name: &str, argv: &[String]) -> ! {
    let cname = match CString::new(name) {
        Ok(c) => c,
        Err(_) => std::process::exit(127),
    };
    let cargs: Vec<CString> = argv.iter().filter_map(|a| CString::new(a.as_str()).ok()).collect();
    match unistd::execvp(&cname, &cargs) {
        Err(nix::Error::ENOENT) => {
            eprintln!("{name}: command not found");
            std::process::exit(127);
        }
        Err(e) => {
            eprintln!("{name}: {e}");
            std::process::exit(1);
        }
        Ok(_) => unreachable!(),
    }
}

/// A redirection target that failed to open/dup, paired with the underlying
/// I/O error — carries enough to print "qsh: <filename>: <error>" per spec
/// §4.3/§7's "error message (the offending filename)" requirement.
#[derive(Debug)]
pub struct RedirError {
    pub target: String,
    pub source: std::io::Error,
}

impl std::fmt::Display for RedirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.source)
    }
}

/// Applies redirections in node order onto the current process's fds 0/1/2,
/// per the table in spec §4.3.
pub fn apply_redirections(redirs: &[Redirection]) -> Result<(), RedirError> {
    for redir in redirs {
        apply_one(redir).map_err(|source| RedirError { target: redir.target.clone(), source })?;
    }
    Ok(())
}

fn apply_one(redir: &Redirection) -> std::io::Result<()> {
    match redir.kind {
        RedirKind::InFile => {
            let fd = open(redir.target.as_str(), OFlag::O_RDONLY, Mode::empty()).map_err(to_io_err)?;
            dup_onto(fd, 0)?;
        }
        RedirKind::OutFile => {
            ensure_parent_dir(&redir.target);
            let fd = open(
                redir.target.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                Mode::from_bits_truncate(0o644),
            )
            .map_err(to_io_err)?;
            dup_onto(fd, 1)?;
        }
        RedirKind::AppendFile => {
            ensure_parent_dir(&redir.target);
            let fd = open(
                redir.target.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                Mode::from_bits_truncate(0o644),
            )
            .map_err(to_io_err)?;
            dup_onto(fd, 1)?;
        }
        RedirKind::ErrFile => {
            ensure_parent_dir(&redir.target);
            let fd = open(
                redir.target.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                Mode::from_bits_truncate(0o644),
            )
            .map_err(to_io_err)?;
            dup_onto(fd, 2)?;
        }
        RedirKind::ErrAppendFile => {
            ensure_parent_dir(&redir.target);
            let fd = open(
                redir.target.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                Mode::from_bits_truncate(0o644),
            )
            .map_err(to_io_err)?;
            dup_onto(fd, 2)?;
        }
        RedirKind::ErrToOut => {
            unistd::dup2(1, 2).map_err(to_io_err)?;
        }
        RedirKind::BothOut => {
            ensure_parent_dir(&redir.target);
            let fd = open(
                redir.target.as_str(),
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                Mode::from_bits_truncate(0o644),
            )
            .map_err(to_io_err)?;
            dup_onto(fd, 1)?;
            unistd::dup2(1, 2).map_err(to_io_err)?;
        }
        RedirKind::HereDoc => {
            let fd = materialize_heredoc(&redir.target)?;
            dup_onto(fd, 0)?;
        }
    }
    Ok(())
}

fn dup_onto(fd: RawFd, target: RawFd) -> std::io::Result<()> {
    unistd::dup2(fd, target).map_err(to_io_err)?;
    if fd != target {
        let _ = unistd::close(fd);
    }
    Ok(())
}

fn ensure_parent_dir(target: &str) {
    if let Some(parent) = std::path::Path::new(target).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            let _ = std::fs::create_dir_all(parent);
            let _ = std::fs::set_permissions(parent, std::os::unix::fs::PermissionsExt::from_mode(0o755));
        }
    }
}

fn to_io_err(e: nix::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

/// Reads lines from the shell's own stdin until one equals `delimiter`
/// verbatim, spooling them into an unlinked temp file whose fd is returned.
fn materialize_heredoc(delimiter: &str) -> std::io::Result<RawFd> {
    let mut path = std::env::temp_dir();
    path.push(format!("qsh-heredoc-{}-XXXXXX", std::process::id()));
    let template = CString::new(path.to_string_lossy().into_owned())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let raw = template.into_raw();
    let fd = unsafe { libc::mkstemp(raw) };
    let template = unsafe { CString::from_raw(raw) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let _ = std::fs::remove_file(template.to_string_lossy().into_owned());

    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let stdin = std::io::stdin();
    let mut locked = stdin.lock();
    loop {
        let mut buf = String::new();
        match locked.read_line(&mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = buf.strip_suffix('\n').unwrap_or(&buf);
                let line = line.strip_suffix('\r').unwrap_or(line);
                if line == delimiter {
                    break;
                }
                writeln!(file, "{line}")?;
            }
            Err(e) => return Err(e),
        }
    }
    let written_fd = file.as_raw_fd();
    nix::unistd::lseek(written_fd, 0, nix::unistd::Whence::SeekSet).map_err(to_io_err)?;
    Ok(file.into_raw_fd())
}

/// Saves/restores the process's real stdio fds around an internal command,
/// per the fd-hygiene design note.
struct SavedStdio {
    stdin: RawFd,
    stdout: RawFd,
    stderr: RawFd,
}

impl SavedStdio {
    fn capture() -> std::io::Result<Self> {
        Ok(SavedStdio {
            stdin: unistd::dup(0).map_err(to_io_err)?,
            stdout: unistd::dup(1).map_err(to_io_err)?,
            stderr: unistd::dup(2).map_err(to_io_err)?,
        })
    }

    fn restore(self) {
        let _ = unistd::dup2(self.stdin, 0);
        let _ = unistd::dup2(self.stdout, 1);
        let _ = unistd::dup2(self.stderr, 2);
        let _ = unistd::close(self.stdin);
        let _ = unistd::close(self.stdout);
        let _ = unistd::close(self.stderr);
    }
}

/// Forks a subshell to run `inner_line` as a full chain, capturing its
/// stdout with stderr sent to `/dev/null`. Used for `$(...)`/backtick
/// command substitution (spec §4.4).
pub fn capture_subshell(shell: &mut Shell, inner_line: &str) -> (String, i32) {
    let (read_fd, write_fd) = match unistd::pipe() {
        Ok(p) => p,
        Err(_) => return (String::new(), 1),
    };
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            let _ = unistd::close(read_fd);
            let _ = unistd::dup2(write_fd, 1);
            let _ = unistd::close(write_fd);
            if let Ok(devnull) = open("/dev/null", OFlag::O_WRONLY, Mode::empty()) {
                let _ = unistd::dup2(devnull, 2);
                let _ = unistd::close(devnull);
            }
            let status = shell.run_line_in_subshell(inner_line);
            std::process::exit(status);
        }
        Ok(ForkResult::Parent { child }) => {
            let _ = unistd::close(write_fd);
            let mut buf = Vec::new();
            let mut f = unsafe { std::fs::File::from_raw_fd(read_fd) };
            let _ = f.read_to_end(&mut buf);
            let status = match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, code)) => code,
                Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
                _ => 1,
            };
            (String::from_utf8_lossy(&buf).into_owned(), status)
        }
        Err(_) => {
            let _ = unistd::close(read_fd);
            let _ = unistd::close(write_fd);
            (String::new(), 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn read_file(path: &std::path::Path) -> String {
        let mut s = String::new();
        std::fs::File::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    /// `apply_redirections` mutates the calling process's real fds 0/1/2, so
    /// each case runs in its own forked child to avoid clobbering the test
    /// harness's own stdio.
    fn in_forked_child<F: FnOnce()>(body: F) {
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                body();
                std::process::exit(0);
            }
            Ok(ForkResult::Parent { child }) => {
                let status = waitpid(child, None);
                assert!(matches!(status, Ok(WaitStatus::Exited(_, 0))));
            }
            Err(e) => panic!("fork failed: {e}"),
        }
    }

    #[test]
    fn out_file_redirection_truncates_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "stale content").unwrap();
        let target = path.to_string_lossy().into_owned();
        in_forked_child(|| {
            let redirs = vec![Redirection { kind: RedirKind::OutFile, target: target.clone() }];
            apply_redirections(&redirs).unwrap();
            println!("fresh");
        });
        assert_eq!(read_file(&path), "fresh\n");
    }

    #[test]
    fn append_file_redirection_preserves_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "first\n").unwrap();
        let target = path.to_string_lossy().into_owned();
        in_forked_child(|| {
            let redirs = vec![Redirection { kind: RedirKind::AppendFile, target: target.clone() }];
            apply_redirections(&redirs).unwrap();
            println!("second");
        });
        assert_eq!(read_file(&path), "first\nsecond\n");
    }

    #[test]
    fn out_file_redirection_creates_missing_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("out.txt");
        let target = path.to_string_lossy().into_owned();
        in_forked_child(|| {
            let redirs = vec![Redirection { kind: RedirKind::OutFile, target: target.clone() }];
            apply_redirections(&redirs).unwrap();
            println!("made it");
        });
        assert_eq!(read_file(&path), "made it\n");
    }

    #[test]
    fn err_to_out_merges_stderr_into_stdout_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.txt");
        let target = path.to_string_lossy().into_owned();
        in_forked_child(|| {
            let redirs = vec![
                Redirection { kind: RedirKind::OutFile, target: target.clone() },
                Redirection { kind: RedirKind::ErrToOut, target: String::new() },
            ];
            apply_redirections(&redirs).unwrap();
            println!("out line");
            eprintln!("err line");
        });
        let contents = read_file(&path);
        assert!(contents.contains("out line"));
        assert!(contents.contains("err line"));
    }

    #[test]
    fn cmd_text_joins_argv_with_spaces() {
        let mut cmd = CmdNode::new();
        cmd.argv = vec!["echo".into(), "hi".into(), "there".into()];
        assert_eq!(cmd.cmd_text(), "echo hi there");
    }
}
