//! Unified Shell — the central coordinator.
//!
//! Owns every store plus the job table and profiler, and drives one line
//! through the full pipeline: alias expansion, tokenizing, parsing
//! (resolving `$(...)` back through [`execute_subshell`] via
//! [`CommandRunner`]), execution, and history recording.

use std::io;

use thiserror::Error;

use crate::aliases::AliasStore;
use crate::executor;
use crate::history::HistoryStore;
use crate::jobs::JobTable;
use crate::lexer::{self, LexError};
use crate::parser::{CommandRunner, ParseError, Parser};
use crate::profiler::Profiler;
use crate::state::ShellState;
use crate::variables::VariableStore;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub struct Shell {
    pub state: ShellState,
    pub vars: VariableStore,
    pub aliases: AliasStore,
    pub history: HistoryStore,
    pub jobs: JobTable,
    pub profiler: Profiler,
}

impl Shell {
    pub fn new(is_interactive: bool) -> Self {
        let state = ShellState::new(is_interactive);
        let vars = VariableStore::new();
        vars.set("$", &state.shell_pgid.to_string(), false);
        Shell {
            state,
            vars,
            aliases: AliasStore::new(),
            history: HistoryStore::new(),
            jobs: JobTable::new(),
            profiler: Profiler::new(),
        }
    }

    pub fn history_path(&self) -> std::path::PathBuf {
        self.state.home.join(".qsh_history")
    }

    pub fn load_history(&mut self) {
        let path = self.history_path();
        let _ = self.history.load(&path);
    }

    pub fn save_history(&self) {
        let path = self.history_path();
        let _ = self.history.save(&path);
    }

    /// Runs one input line end to end: alias-expand, tokenize, parse,
    /// execute, record history. Returns the resulting exit status. A
    /// pure-assignment, empty, or comment-only line leaves `last_status`
    /// unchanged, reports 0, and is never appended to history — none of
    /// them produce a chain to run.
    pub fn process_line(&mut self, line: &str) -> Result<i32, ShellError> {
        let expanded = self.aliases.expand(line);
        let tokens = lexer::tokenize(&expanded, &self.vars, &self.history)?;
        let home = self.state.home.to_string_lossy().into_owned();
        let parser = Parser::new(tokens, &self.vars, &home);
        let chain = parser.parse(self)?;
        let status = match chain {
            Some(chain) => {
                let status = executor::execute_chain(self, &chain);
                self.history.add(line, status);
                status
            }
            None => self.state.last_status,
        };
        Ok(status)
    }

    /// Re-enters the full pipeline inside a forked command-substitution
    /// child (spec §4.4); the caller has already redirected its stdout to
    /// the capture pipe.
    pub fn run_line_in_subshell(&mut self, line: &str) -> i32 {
        match self.process_line(line) {
            Ok(status) => status,
            Err(_) => 1,
        }
    }

    /// Drains any `SIGCHLD`-reported job transitions and prints the
    /// resulting `[id] Done|Stopped\tcmd` notifications, per spec §6.
    pub fn report_job_changes(&mut self) {
        for line in crate::signals::reap_children(&mut self.jobs) {
            println!("{line}");
        }
    }
}

impl CommandRunner for Shell {
    fn capture(&mut self, line: &str) -> (String, i32) {
        executor::capture_subshell(self, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_builtin_line_updates_last_status() {
        let mut shell = Shell::new(false);
        let status = shell.process_line("true").unwrap();
        assert_eq!(status, 0);
        assert_eq!(shell.state.last_status, 0);
    }

    #[test]
    fn dollar_dollar_variable_resolves_to_shell_pid() {
        let shell = Shell::new(false);
        assert_eq!(shell.vars.get("$"), Some(std::process::id().to_string()));
    }

    #[test]
    fn assignment_only_line_leaves_status_unchanged() {
        let mut shell = Shell::new(false);
        shell.state.last_status = 7;
        let status = shell.process_line("X=1").unwrap();
        assert_eq!(status, 7);
        assert_eq!(shell.vars.get("X"), Some("1".to_string()));
    }

    #[test]
    fn history_records_every_processed_line() {
        let mut shell = Shell::new(false);
        shell.process_line("true").unwrap();
        shell.process_line("false").unwrap();
        assert_eq!(shell.history.len(), 2);
    }

    #[test]
    fn comment_only_line_is_not_recorded_in_history() {
        let mut shell = Shell::new(false);
        shell.process_line("true").unwrap();
        shell.process_line("# just a comment").unwrap();
        assert_eq!(shell.history.len(), 1);
    }

    #[test]
    fn assignment_only_line_is_not_recorded_in_history() {
        let mut shell = Shell::new(false);
        shell.process_line("X=1").unwrap();
        assert_eq!(shell.history.len(), 0);
    }
}
