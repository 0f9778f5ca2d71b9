//! Internal command dispatch table, per spec §4.5 plus the three
//! supplemental builtins (`type`, `set`, `dirs`) documented in SPEC_FULL.md.

use crate::executor;
use crate::shell::Shell;
use crate::signals;

const BUILTIN_NAMES: &[&str] = &[
    "cd", "exit", "pwd", "echo", "true", "false", "help", "history", "jobs", "fg", "bg", "wait",
    "kill", "export", "unset", "alias", "unalias", "profile", "type", "set", "dirs",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub fn run(shell: &mut Shell, argv: &[String]) -> i32 {
    let name = argv.first().map(|s| s.as_str()).unwrap_or("");
    let args = &argv[argv.len().min(1)..];
    match name {
        "cd" => builtin_cd(shell, args),
        "exit" => builtin_exit(shell, args),
        "pwd" => builtin_pwd(shell),
        "echo" => builtin_echo(args),
        "true" => 0,
        "false" => 1,
        "help" => builtin_help(),
        "history" => builtin_history(shell, args),
        "jobs" => builtin_jobs(shell),
        "fg" => builtin_fg(shell, args),
        "bg" => builtin_bg(shell, args),
        "wait" => builtin_wait(shell, args),
        "kill" => builtin_kill(shell, args),
        "export" => builtin_export(shell, args),
        "unset" => builtin_unset(shell, args),
        "alias" => builtin_alias(shell, args),
        "unalias" => builtin_unalias(shell, args),
        "profile" => builtin_profile(shell, args),
        "type" => builtin_type(shell, args),
        "set" => builtin_set(shell, args),
        "dirs" => builtin_dirs(shell),
        _ => {
            eprintln!("{name}: not a builtin");
            1
        }
    }
}

fn builtin_cd(shell: &mut Shell, args: &[String]) -> i32 {
    let target = match args.first().map(|s| s.as_str()) {
        Some("-") => shell.state.prev_cwd.clone(),
        Some(path) => {
            let expanded = crate::parser::expand_tilde(path, &shell.state.home.to_string_lossy());
            std::path::PathBuf::from(expanded)
        }
        None => shell.state.home.clone(),
    };
    match shell.state.chdir(target) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("cd: {e}");
            1
        }
    }
}

fn builtin_exit(shell: &mut Shell, args: &[String]) -> i32 {
    shell.state.should_exit = true;
    let code = args.first().and_then(|a| a.parse::<i32>().ok()).unwrap_or(0);
    shell.state.exit_code = code;
    code
}

fn builtin_pwd(shell: &Shell) -> i32 {
    println!("{}", shell.state.cwd.display());
    0
}

fn builtin_echo(args: &[String]) -> i32 {
    let mut no_newline = false;
    let mut interpret_escapes = false;
    let mut rest = args;
    while let Some(first) = rest.first() {
        match first.as_str() {
            "-n" => no_newline = true,
            "-e" => interpret_escapes = true,
            "-ne" | "-en" => {
                no_newline = true;
                interpret_escapes = true;
            }
            _ => break,
        }
        rest = &rest[1..];
    }
    let joined = rest.join(" ");
    let out = if interpret_escapes { interpret_backslashes(&joined) } else { joined };
    if no_newline {
        print!("{out}");
    } else {
        println!("{out}");
    }
    0
}

fn interpret_backslashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn builtin_help() -> i32 {
    let lines = [
        "cd [DIR|-]        change directory",
        "exit [N]          exit the shell",
        "pwd               print working directory",
        "echo [-n|-e] ...   print arguments",
        "true / false      return 0 / 1",
        "help              this message",
        "history           print command history",
        "jobs              list background/stopped jobs",
        "fg %N             bring job N to the foreground",
        "bg %N             resume job N in the background",
        "wait [%N]         wait for jobs to finish",
        "kill [-SIG] T     signal a job (%N) or pid",
        "export NAME...    mark variables exported",
        "unset NAME...     remove variables",
        "alias/unalias     manage command aliases",
        "profile on|off|status  syscall profiler",
        "type NAME         classify a command name",
        "set               list all variables",
        "dirs              show current/previous directory",
    ];
    for line in lines {
        println!("{line}");
    }
    0
}

fn builtin_history(shell: &mut Shell, args: &[String]) -> i32 {
    if args.first().map(|a| a == "-c").unwrap_or(false) {
        shell.history.clear();
        return 0;
    }
    let mut out = std::io::stdout();
    match crate::history::write_all(&mut out, &shell.history) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn builtin_jobs(shell: &Shell) -> i32 {
    for job in shell.jobs.all() {
        println!("{}", job.format_line());
    }
    0
}

fn parse_job_spec(arg: Option<&String>) -> Option<u32> {
    let arg = arg?;
    arg.strip_prefix('%').and_then(|n| n.parse::<u32>().ok())
}

fn builtin_fg(shell: &mut Shell, args: &[String]) -> i32 {
    let job_id = match parse_job_spec(args.first()) {
        Some(id) => id,
        None => shell.jobs.all().map(|j| j.job_id).max().unwrap_or(0),
    };
    let (pgid, cmd) = match shell.jobs.get(job_id) {
        Some(job) => (job.pgid, job.cmd.clone()),
        None => {
            eprintln!("fg: job not found");
            return 1;
        }
    };
    let _ = signals::kill_pgid(pgid, nix::sys::signal::Signal::SIGCONT);
    if let Some(job) = shell.jobs.get_mut(job_id) {
        job.running = true;
        job.stopped = false;
    }
    println!("{cmd}");
    executor::place_in_foreground(shell, nix::unistd::Pid::from_raw(pgid));
    let status = match nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(-pgid), Some(nix::sys::wait::WaitPidFlag::WUNTRACED)) {
        Ok(nix::sys::wait::WaitStatus::Exited(_, code)) => {
            shell.jobs.remove(job_id);
            code
        }
        Ok(nix::sys::wait::WaitStatus::Signaled(_, sig, _)) => {
            shell.jobs.remove(job_id);
            128 + sig as i32
        }
        Ok(nix::sys::wait::WaitStatus::Stopped(_, _)) => {
            if let Some(job) = shell.jobs.get_mut(job_id) {
                job.running = false;
                job.stopped = true;
            }
            148
        }
        _ => 1,
    };
    executor::reclaim_foreground(shell);
    status
}

fn builtin_bg(shell: &mut Shell, args: &[String]) -> i32 {
    let job_id = match parse_job_spec(args.first()) {
        Some(id) => id,
        None => shell.jobs.all().filter(|j| j.stopped).map(|j| j.job_id).max().unwrap_or(0),
    };
    let pgid = match shell.jobs.get(job_id) {
        Some(job) => job.pgid,
        None => {
            eprintln!("bg: job not found");
            return 1;
        }
    };
    let _ = signals::kill_pgid(pgid, nix::sys::signal::Signal::SIGCONT);
    if let Some(job) = shell.jobs.get_mut(job_id) {
        job.running = true;
        job.stopped = false;
    }
    0
}

fn builtin_wait(shell: &mut Shell, args: &[String]) -> i32 {
    let target_ids: Vec<u32> = match parse_job_spec(args.first()) {
        Some(id) => vec![id],
        None => shell.jobs.all().map(|j| j.job_id).collect(),
    };
    let mut last_status = 0;
    for job_id in target_ids {
        let pid = match shell.jobs.get(job_id) {
            Some(job) if job.running => job.pid,
            _ => continue,
        };
        last_status = match nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(pid), None) {
            Ok(nix::sys::wait::WaitStatus::Exited(_, code)) => code,
            Ok(nix::sys::wait::WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
            _ => 0,
        };
        shell.jobs.remove(job_id);
    }
    last_status
}

fn parse_signal(spec: &str) -> Option<nix::sys::signal::Signal> {
    use nix::sys::signal::Signal;
    let spec = spec.strip_prefix('-').unwrap_or(spec);
    match spec.to_ascii_uppercase().as_str() {
        "9" | "KILL" | "SIGKILL" => Some(Signal::SIGKILL),
        "15" | "TERM" | "SIGTERM" => Some(Signal::SIGTERM),
        "2" | "INT" | "SIGINT" => Some(Signal::SIGINT),
        "1" | "HUP" | "SIGHUP" => Some(Signal::SIGHUP),
        "19" | "STOP" | "SIGSTOP" => Some(Signal::SIGSTOP),
        "18" | "CONT" | "SIGCONT" => Some(Signal::SIGCONT),
        other => other.parse::<i32>().ok().and_then(|n| Signal::try_from(n).ok()),
    }
}

fn builtin_kill(shell: &mut Shell, args: &[String]) -> i32 {
    let mut sig = nix::sys::signal::Signal::SIGTERM;
    let mut rest = args;
    if let Some(first) = rest.first() {
        if first.starts_with('-') && first.len() > 1 {
            match parse_signal(first) {
                Some(s) => sig = s,
                None => {
                    eprintln!("kill: invalid signal {first}");
                    return 1;
                }
            }
            rest = &rest[1..];
        }
    }
    let target = match rest.first() {
        Some(t) => t,
        None => {
            eprintln!("kill: missing target");
            return 1;
        }
    };
    if let Some(job_id) = parse_job_spec(Some(target)) {
        match shell.jobs.get(job_id) {
            Some(job) => {
                let _ = signals::kill_pgid(job.pgid, sig);
                0
            }
            None => {
                eprintln!("kill: job not found");
                1
            }
        }
    } else {
        match target.parse::<i32>() {
            Ok(pid) => match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), sig) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("kill: {e}");
                    1
                }
            },
            Err(_) => {
                eprintln!("kill: invalid target {target}");
                1
            }
        }
    }
}

fn builtin_export(shell: &Shell, args: &[String]) -> i32 {
    for arg in args {
        if let Some(eq) = arg.find('=') {
            let (name, value) = arg.split_at(eq);
            shell.vars.set(name, &value[1..], true);
        } else {
            shell.vars.export(arg);
        }
    }
    0
}

fn builtin_unset(shell: &Shell, args: &[String]) -> i32 {
    for arg in args {
        shell.vars.unset(arg);
    }
    0
}

fn strip_matched_quotes(s: &str) -> &str {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' || first == b'"') && first == last {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn builtin_alias(shell: &Shell, args: &[String]) -> i32 {
    if args.is_empty() {
        for (name, value) in shell.aliases.all() {
            println!("alias {name}='{value}'");
        }
        return 0;
    }
    for arg in args {
        match arg.find('=') {
            Some(eq) => {
                let (name, value) = arg.split_at(eq);
                shell.aliases.set(name, strip_matched_quotes(&value[1..]));
            }
            None => match shell.aliases.get(arg) {
                Some(value) => println!("alias {arg}='{value}'"),
                None => {
                    eprintln!("alias: {arg} not found");
                    return 1;
                }
            },
        }
    }
    0
}

fn builtin_unalias(shell: &Shell, args: &[String]) -> i32 {
    let mut status = 0;
    for arg in args {
        if !shell.aliases.unset(arg) {
            eprintln!("unalias: {arg} not found");
            status = 1;
        }
    }
    status
}

fn builtin_profile(shell: &mut Shell, args: &[String]) -> i32 {
    match args.first().map(|s| s.as_str()) {
        Some("on") => match shell.profiler.arm() {
            Ok(()) => {
                println!("profiling armed — attaches to the next foreground command");
                0
            }
            Err(e) => {
                eprintln!("profile: {e}");
                1
            }
        },
        Some("off") => match shell.profiler.disarm() {
            Ok(()) => {
                println!("profiling stopped");
                0
            }
            Err(e) => {
                eprintln!("profile: {e}");
                1
            }
        },
        Some("status") => {
            print!("{}", shell.profiler.report());
            0
        }
        _ => {
            eprintln!("profile: usage: profile on|off|status");
            1
        }
    }
}

fn builtin_type(shell: &Shell, args: &[String]) -> i32 {
    let name = match args.first() {
        Some(n) => n,
        None => return 1,
    };
    if is_builtin(name) {
        println!("{name} is a shell builtin");
        return 0;
    }
    if let Some(value) = shell.aliases.get(name) {
        println!("{name} is aliased to `{value}`");
        return 0;
    }
    if let Some(path) = resolve_in_path(name, &shell.vars) {
        println!("{name} is {path}");
        return 0;
    }
    println!("{name}: not found");
    1
}

fn resolve_in_path(name: &str, vars: &crate::variables::VariableStore) -> Option<String> {
    if name.contains('/') {
        return if std::path::Path::new(name).is_file() { Some(name.to_string()) } else { None };
    }
    let path_var = vars.get("PATH").unwrap_or_default();
    for dir in path_var.split(':') {
        let candidate = std::path::Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

fn builtin_set(shell: &Shell, args: &[String]) -> i32 {
    if !args.is_empty() {
        eprintln!("set: no arguments supported");
        return 1;
    }
    for (name, value) in shell.vars.all() {
        println!("{name}={value}");
    }
    0
}

fn builtin_dirs(shell: &Shell) -> i32 {
    println!("{}  {}", shell.state.cwd.display(), shell.state.prev_cwd.display());
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_recognizes_supplemental_commands() {
        assert!(is_builtin("type"));
        assert!(is_builtin("set"));
        assert!(is_builtin("dirs"));
        assert!(!is_builtin("ls"));
    }

    #[test]
    fn interpret_backslashes_handles_known_escapes() {
        assert_eq!(interpret_backslashes("a\\tb\\nc"), "a\tb\nc");
        assert_eq!(interpret_backslashes("a\\qb"), "a\\qb");
    }

    #[test]
    fn strip_matched_quotes_only_strips_matching_pairs() {
        assert_eq!(strip_matched_quotes("'ls -l'"), "ls -l");
        assert_eq!(strip_matched_quotes("\"ls -l\""), "ls -l");
        assert_eq!(strip_matched_quotes("ls -l"), "ls -l");
    }

    #[test]
    fn parse_signal_accepts_name_and_number() {
        assert_eq!(parse_signal("-9"), Some(nix::sys::signal::Signal::SIGKILL));
        assert_eq!(parse_signal("KILL"), Some(nix::sys::signal::Signal::SIGKILL));
        assert_eq!(parse_signal("TERM"), Some(nix::sys::signal::Signal::SIGTERM));
    }

    #[test]
    fn history_dash_c_actually_clears_entries() {
        let mut shell = Shell::new(false);
        shell.history.add("echo hi", 0);
        shell.history.add("false", 1);
        let status = builtin_history(&mut shell, &["-c".to_string()]);
        assert_eq!(status, 0);
        assert!(shell.history.is_empty());
    }
}
