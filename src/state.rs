//! Process-wide shell state and tunable limits.

use std::path::PathBuf;

/// Hard limits the parser and executor enforce. Named constants instead of
/// inline magic numbers scattered across the parser/executor.
pub struct ShellConfig;

impl ShellConfig {
    pub const MAX_ARGS: usize = 64;
    pub const MAX_REDIRECTIONS: usize = 4;
    pub const HISTORY_CAPACITY: usize = 1000;
    pub const MAX_ALIAS_DEPTH: usize = 10;
    pub const PROFILER_TABLE_SIZE: usize = 512;
}

/// Why the REPL's top-level loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The `exit` builtin was invoked, carrying its exit code.
    Builtin(i32),
    /// Standard input reached EOF.
    Eof,
}

impl ExitReason {
    /// The process exit code this reason implies: the `exit` builtin's own
    /// code, or 0 for a clean EOF.
    pub fn code(self) -> i32 {
        match self {
            ExitReason::Builtin(code) => code,
            ExitReason::Eof => 0,
        }
    }
}

/// Singleton process state threaded through tokenizer, parser and executor.
#[derive(Debug)]
pub struct ShellState {
    pub cwd: PathBuf,
    pub prev_cwd: PathBuf,
    pub home: PathBuf,
    pub last_status: i32,
    pub is_interactive: bool,
    pub should_exit: bool,
    pub exit_code: i32,
    /// pgid currently holding the controlling terminal, if any.
    pub foreground_pgid: Option<i32>,
    pub shell_pgid: i32,
    pub shell_terminal_fd: i32,
}

impl ShellState {
    pub fn new(is_interactive: bool) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| cwd.clone());
        ShellState {
            prev_cwd: cwd.clone(),
            cwd,
            home,
            last_status: 0,
            is_interactive,
            should_exit: false,
            exit_code: 0,
            foreground_pgid: None,
            shell_pgid: std::process::id() as i32,
            shell_terminal_fd: libc::STDIN_FILENO,
        }
    }

    /// Applies a `cd` to `target`, swapping `cwd`/`prev_cwd`.
    pub fn chdir(&mut self, target: PathBuf) -> std::io::Result<()> {
        std::env::set_current_dir(&target)?;
        self.prev_cwd = std::mem::replace(&mut self.cwd, target);
        Ok(())
    }

    pub fn prompt(&self) -> String {
        match self.cwd.to_str() {
            Some(cwd) => format!("qsh:{}$ ", cwd),
            None => "qsh$ ".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_cwd() {
        let state = ShellState::new(false);
        assert!(state.prompt().starts_with("qsh:"));
        assert!(state.prompt().ends_with("$ "));
    }

    #[test]
    fn exit_reason_code_reflects_builtin_arg_or_zero_on_eof() {
        assert_eq!(ExitReason::Builtin(7).code(), 7);
        assert_eq!(ExitReason::Eof.code(), 0);
    }

    #[test]
    fn chdir_swaps_prev_cwd() {
        let mut state = ShellState::new(false);
        let original = state.cwd.clone();
        let tmp = std::env::temp_dir();
        state.chdir(tmp.clone()).unwrap();
        assert_eq!(state.prev_cwd, original);
        assert_eq!(state.cwd, tmp);
    }
}
