//! Parser: tokens → command chain AST, with assignment, tilde and glob
//! expansion, and command-substitution evaluation.

use thiserror::Error;

use crate::ast::{Chain, Command, RedirKind};
use crate::debug;
use crate::lexer::Token;
use crate::state::ShellConfig;
use crate::variables::{is_valid_name, VariableStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing redirection target")]
    MissingRedirTarget,
    #[error("argument vector overflow (max {0})")]
    ArgvOverflow(usize),
    #[error("redirection overflow (max {0})")]
    RedirOverflow(usize),
    #[error("operator has no right-hand side")]
    TrailingOperator,
    #[error("trailing pipe")]
    TrailingPipe,
}

/// Runs a command chain as a subshell and captures its stdout, for `$(...)`
/// and backtick substitution. Implemented by the shell (which owns the
/// executor); the parser only needs this narrow capability.
pub trait CommandRunner {
    fn capture(&mut self, line: &str) -> (String, i32);
}

/// Expands a leading `~` per spec §4.2. `~`/`~/...` uses `$HOME`;
/// `~USER[/...]` looks up `USER`'s home via the password database, left
/// unexpanded on a miss.
pub fn expand_tilde(word: &str, home: &str) -> String {
    if word == "~" {
        return home.to_string();
    }
    if let Some(rest) = word.strip_prefix("~/") {
        return format!("{home}/{rest}");
    }
    if let Some(rest) = word.strip_prefix('~') {
        let (user, path_rest) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if let Some(user_home) = lookup_user_home(user) {
            return format!("{user_home}{path_rest}");
        }
        return word.to_string();
    }
    word.to_string()
}

fn lookup_user_home(user: &str) -> Option<String> {
    use std::ffi::{CStr, CString};
    let cname = CString::new(user).ok()?;
    unsafe {
        let pw = libc::getpwnam(cname.as_ptr());
        if pw.is_null() {
            return None;
        }
        let dir = (*pw).pw_dir;
        if dir.is_null() {
            return None;
        }
        Some(CStr::from_ptr(dir).to_string_lossy().into_owned())
    }
}

fn expand_glob(pattern: &str) -> Vec<String> {
    match glob::glob(pattern) {
        Ok(paths) => {
            let matches: Vec<String> = paths
                .filter_map(Result::ok)
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            if matches.is_empty() {
                vec![pattern.to_string()]
            } else {
                matches
            }
        }
        Err(_) => vec![pattern.to_string()],
    }
}

fn has_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a VariableStore,
    home: String,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, vars: &'a VariableStore, home: &str) -> Self {
        Parser { tokens, pos: 0, vars, home: home.to_string() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Consumes a leading run of `NAME=VALUE` literal tokens, assigning each
    /// to the variable store. Returns `true` if the *entire* token stream
    /// was consumed this way (a pure-assignment line).
    fn consume_assignment_prefix(&mut self) -> bool {
        loop {
            match self.peek() {
                Some(Token::Literal(word)) => {
                    if let Some(eq) = word.find('=') {
                        let (name, value) = word.split_at(eq);
                        let value = &value[1..];
                        if is_valid_name(name) {
                            self.vars.set(name, value, false);
                            self.pos += 1;
                            continue;
                        }
                    }
                    break;
                }
                _ => break,
            }
        }
        self.pos >= self.tokens.len()
    }

    /// Parses the full token stream into a chain, running command
    /// substitutions through `runner`. Returns `None` for an assignment-only
    /// or empty line.
    pub fn parse(mut self, runner: &mut dyn CommandRunner) -> Result<Option<Chain>, ParseError> {
        if self.tokens.is_empty() {
            return Ok(None);
        }
        if self.consume_assignment_prefix() {
            return Ok(None);
        }

        let mut chain = Vec::new();
        let mut current = Command::new();

        while let Some(token) = self.bump() {
            match token {
                Token::Literal(word) => {
                    let expanded = expand_tilde(&word, &self.home);
                    if has_glob_chars(&expanded) {
                        for m in expand_glob(&expanded) {
                            push_arg(&mut current, m)?;
                        }
                    } else {
                        push_arg(&mut current, expanded)?;
                    }
                }
                Token::Quoted(s) | Token::Variable(s) => {
                    push_arg(&mut current, s)?;
                }
                Token::CmdSub(inner) => {
                    let (mut output, _status) = runner.capture(&inner);
                    while output.ends_with('\n') {
                        output.pop();
                    }
                    push_arg(&mut current, output)?;
                }
                Token::Redirection(kind) => {
                    if current.redirections.len() >= ShellConfig::MAX_REDIRECTIONS {
                        return Err(ParseError::RedirOverflow(ShellConfig::MAX_REDIRECTIONS));
                    }
                    let target = if kind == RedirKind::ErrToOut {
                        String::new()
                    } else {
                        match self.bump() {
                            Some(Token::Literal(t)) => expand_tilde(&t, &self.home),
                            Some(Token::Quoted(t)) | Some(Token::Variable(t)) => t,
                            Some(Token::CmdSub(inner)) => {
                                let (mut out, _s) = runner.capture(&inner);
                                while out.ends_with('\n') {
                                    out.pop();
                                }
                                out
                            }
                            _ => return Err(ParseError::MissingRedirTarget),
                        }
                    };
                    current.redirections.push(crate::ast::Redirection { kind, target });
                }
                Token::Operator(op) => {
                    current.op = match op.as_str() {
                        "|" => crate::ast::ChainOp::Pipe,
                        "&&" => crate::ast::ChainOp::And,
                        "||" => crate::ast::ChainOp::Or,
                        "&" => crate::ast::ChainOp::Background,
                        ";" => crate::ast::ChainOp::None,
                        _ => crate::ast::ChainOp::None,
                    };
                    if matches!(current.op, crate::ast::ChainOp::Pipe) && self.peek().is_none() {
                        return Err(ParseError::TrailingPipe);
                    }
                    if matches!(current.op, crate::ast::ChainOp::And | crate::ast::ChainOp::Or)
                        && self.peek().is_none()
                    {
                        return Err(ParseError::TrailingOperator);
                    }
                    chain.push(std::mem::take(&mut current));
                }
            }
        }

        if !current.is_empty() || !current.redirections.is_empty() {
            chain.push(current);
        } else if matches!(chain.last().map(|c| c.op), Some(crate::ast::ChainOp::Pipe)) {
            return Err(ParseError::TrailingPipe);
        }

        if chain.is_empty() {
            return Ok(None);
        }
        debug::trace(debug::PARSE, "parse", format!("{} node(s) parsed", chain.len()));
        Ok(Some(chain))
    }
}

fn push_arg(cmd: &mut Command, arg: String) -> Result<(), ParseError> {
    if cmd.argv.len() >= ShellConfig::MAX_ARGS {
        return Err(ParseError::ArgvOverflow(ShellConfig::MAX_ARGS));
    }
    cmd.argv.push(arg);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryStore;

    struct NullRunner;
    impl CommandRunner for NullRunner {
        fn capture(&mut self, _line: &str) -> (String, i32) {
            (String::new(), 0)
        }
    }

    fn parse_line(line: &str) -> Result<Option<Chain>, ParseError> {
        let vars = VariableStore::new();
        let history = HistoryStore::new();
        let tokens = crate::lexer::tokenize(line, &vars, &history).unwrap();
        Parser::new(tokens, &vars, "/home/test").parse(&mut NullRunner)
    }

    #[test]
    fn simple_command() {
        let chain = parse_line("echo hello").unwrap().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].argv, vec!["echo", "hello"]);
    }

    #[test]
    fn assignment_only_line_has_no_chain() {
        let chain = parse_line("X=42").unwrap();
        assert!(chain.is_none());
    }

    #[test]
    fn assignment_prefix_then_command() {
        let vars = VariableStore::new();
        let history = HistoryStore::new();
        let tokens = crate::lexer::tokenize("X=1 echo hi", &vars, &history).unwrap();
        let chain = Parser::new(tokens, &vars, "/home/test").parse(&mut NullRunner).unwrap().unwrap();
        assert_eq!(chain[0].argv, vec!["echo", "hi"]);
        assert_eq!(vars.get("X"), Some("1".to_string()));
    }

    #[test]
    fn pipe_chain() {
        let chain = parse_line("echo hi | grep hi").unwrap().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].op, crate::ast::ChainOp::Pipe);
    }

    #[test]
    fn trailing_pipe_is_error() {
        assert_eq!(parse_line("echo hi |"), Err(ParseError::TrailingPipe));
    }

    #[test]
    fn trailing_and_is_error() {
        assert_eq!(parse_line("echo hi &&"), Err(ParseError::TrailingOperator));
    }

    #[test]
    fn redirection_without_target_is_error() {
        assert_eq!(parse_line("echo hi >"), Err(ParseError::MissingRedirTarget));
    }

    #[test]
    fn redirection_overflow() {
        let line = "echo hi > a > b > c > d > e";
        assert_eq!(parse_line(line), Err(ParseError::RedirOverflow(ShellConfig::MAX_REDIRECTIONS)));
    }

    #[test]
    fn argv_overflow() {
        let mut line = String::from("echo");
        for i in 0..ShellConfig::MAX_ARGS {
            line.push_str(&format!(" a{i}"));
        }
        assert_eq!(parse_line(&line), Err(ParseError::ArgvOverflow(ShellConfig::MAX_ARGS)));
    }

    #[test]
    fn tilde_expansion_of_home() {
        assert_eq!(expand_tilde("~", "/home/test"), "/home/test");
        assert_eq!(expand_tilde("~/x", "/home/test"), "/home/test/x");
    }

    #[test]
    fn background_operator() {
        let chain = parse_line("sleep 1 &").unwrap().unwrap();
        assert_eq!(chain[0].op, crate::ast::ChainOp::Background);
    }

    #[test]
    fn empty_line_has_no_chain() {
        assert!(parse_line("").unwrap().is_none());
    }

    #[test]
    fn comment_only_line_has_no_chain() {
        assert!(parse_line("# just a comment").unwrap().is_none());
    }
}
