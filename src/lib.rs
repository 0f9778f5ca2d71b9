//! qsh — an interactive POSIX-ish shell with job control and a ptrace
//! syscall profiler.
//!
//! # Overview
//!
//! A line goes tokenizer → parser → executor. The tokenizer (`lexer`)
//! recognizes quoting, redirections, command and arithmetic substitution,
//! and `!!`/`!N` history designators. The parser resolves leading variable
//! assignments, tilde and glob expansion, and command substitution (via a
//! [`parser::CommandRunner`] implemented by [`shell::Shell`]) into a
//! [`ast::Chain`]. The executor forks external commands into process
//! groups with real job control, or dispatches [`builtins`] in-process.
//!
//! ```
//! use qsh::shell::Shell;
//!
//! let mut shell = Shell::new(false);
//! let status = shell.process_line("true").unwrap();
//! assert_eq!(status, 0);
//! ```

pub mod aliases;
pub mod arith;
pub mod ast;
pub mod builtins;
pub mod debug;
pub mod executor;
pub mod history;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod profiler;
pub mod repl;
pub mod shell;
pub mod signals;
pub mod state;
pub mod variables;

pub use shell::{Shell, ShellError};
pub use state::{ExitReason, ShellConfig, ShellState};
