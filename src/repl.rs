//! Interactive read-eval-print loop: a plain stdin read loop per spec §6,
//! no line-editing library — `isatty(0)` gates terminal ownership and the
//! history banner, everything else runs the same for scripts and `-c`.

use std::io::{self, BufRead, Write};

use crate::shell::Shell;
use crate::signals;
use crate::state::ExitReason;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_banner() {
    println!("qsh {VERSION} — type 'exit' or Ctrl-D to quit, 'help' for the builtin list");
}

/// Runs the startup sequence and read loop described in spec §6: init
/// stores, install signal handlers, claim the terminal, load history,
/// banner, then loop read → execute → record → flush.
pub fn run_repl() -> i32 {
    let is_interactive = unsafe { libc::isatty(libc::STDIN_FILENO) } != 0;
    let mut shell = Shell::new(is_interactive);

    if is_interactive {
        signals::install_shell_handlers();
        let _ = nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0));
        let shell_pgid = nix::unistd::getpgrp();
        let _ = nix::unistd::tcsetpgrp(shell.state.shell_terminal_fd, shell_pgid);
    }

    shell.load_history();

    if is_interactive {
        print_banner();
    }

    let stdin = io::stdin();
    let reason = loop {
        if is_interactive {
            print!("{}", shell.state.prompt());
            let _ = io::stdout().flush();
        }

        let mut line = String::new();
        let bytes_read = match stdin.lock().read_line(&mut line) {
            Ok(n) => n,
            Err(_) => break ExitReason::Eof,
        };
        if bytes_read == 0 {
            break ExitReason::Eof;
        }

        shell.report_job_changes();

        let trimmed = line.trim_end_matches(['\n', '\r']);
        match shell.process_line(trimmed) {
            Ok(_status) => {}
            Err(e) => eprintln!("qsh: {e}"),
        }
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        if shell.state.should_exit {
            break ExitReason::Builtin(shell.state.exit_code);
        }
    };

    shell.save_history();
    reason.code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_mentions_version() {
        assert!(VERSION.chars().next().unwrap().is_ascii_digit() || !VERSION.is_empty());
    }
}
