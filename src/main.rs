//! qsh - an interactive POSIX-ish shell with job control and a ptrace
//! syscall profiler.
//!
//! Usage:
//!   qsh              start the interactive REPL
//!   qsh -c "cmd"     execute a single command
//!   qsh script.sh    execute a script file

mod cli;

use std::env;
use std::fs;
use std::process::ExitCode;

use qsh::shell::Shell;

use cli::Mode;

fn execute_command(cmd: &str) -> ExitCode {
    let mut shell = Shell::new(false);
    match shell.process_line(cmd) {
        Ok(status) => ExitCode::from(status as u8),
        Err(e) => {
            eprintln!("qsh: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute_script(path: &str) -> ExitCode {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("qsh: {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut shell = Shell::new(false);
    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match shell.process_line(line) {
            Ok(status) => {
                if status != 0 {
                    eprintln!("qsh: line {}: command failed with exit code {status}", line_num + 1);
                    return ExitCode::from(status as u8);
                }
            }
            Err(e) => {
                eprintln!("qsh: line {}: {e}", line_num + 1);
                return ExitCode::FAILURE;
            }
        }
        if shell.state.should_exit {
            return ExitCode::from(shell.state.exit_code as u8);
        }
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    match cli::parse_args(&args) {
        Mode::Repl => ExitCode::from(qsh::repl::run_repl() as u8),
        Mode::Command(cmd) => execute_command(&cmd),
        Mode::Script(path) => execute_script(&path),
        Mode::Help => {
            cli::print_help();
            ExitCode::SUCCESS
        }
        Mode::Version => {
            cli::print_version();
            ExitCode::SUCCESS
        }
    }
}
