//! Tokenizer: turns a raw input line into a typed token stream.
//!
//! Hand-rolled rather than combinator-based — the grammar is a flat,
//! priority-ordered set of byte-level rules, easiest to express as a single
//! forward scan over the input.

use thiserror::Error;

use crate::ast::RedirKind;
use crate::debug;
use crate::history::HistoryStore;
use crate::variables::VariableStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Quoted(String),
    Operator(String),
    Redirection(RedirKind),
    Variable(String),
    CmdSub(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unclosed quote at offset {offset}")]
    UnclosedQuote { offset: usize },
    #[error("unclosed command substitution at offset {offset}")]
    UnclosedCmdSub { offset: usize },
    #[error("unclosed arithmetic expansion at offset {offset}")]
    UnclosedArith { offset: usize },
}

fn is_special(c: char) -> bool {
    matches!(c, ' ' | '\t' | '|' | '&' | ';' | '<' | '>' | '#' | '"' | '\'' | '$')
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    vars: &'a VariableStore,
    history: &'a HistoryStore,
}

impl<'a> Lexer<'a> {
    fn new(line: &str, vars: &'a VariableStore, history: &'a HistoryStore) -> Self {
        Lexer { chars: line.chars().collect(), pos: 0, vars, history }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn advance_by(&mut self, n: usize) {
        self.pos += n;
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            // Rule 1: skip whitespace.
            while matches!(self.peek(), Some(' ') | Some('\t')) {
                self.bump();
            }
            let Some(c) = self.peek() else { break };

            // Rule 2: comment to end of line.
            if c == '#' {
                break;
            }

            // Rule 3: operators and redirections.
            if let Some(tok) = self.try_operator_or_redir() {
                tokens.push(tok);
                continue;
            }

            // Rule 4: command substitution.
            if self.starts_with("$(") && !self.starts_with("$((") {
                tokens.push(self.read_cmdsub_dollar()?);
                continue;
            }
            if c == '`' {
                tokens.push(self.read_cmdsub_backtick()?);
                continue;
            }

            // Rule 5: arithmetic expansion.
            if self.starts_with("$((") {
                tokens.push(self.read_arith()?);
                continue;
            }

            // Rule 6: history designators.
            if c == '!' {
                if let Some(tok) = self.try_history_designator() {
                    tokens.push(tok);
                    continue;
                }
            }

            // Rule 7: single-quoted string.
            if c == '\'' {
                tokens.push(self.read_single_quoted()?);
                continue;
            }

            // Rule 8: double-quoted string.
            if c == '"' {
                tokens.push(self.read_double_quoted()?);
                continue;
            }

            // Rule 9: variable reference.
            if c == '$' {
                tokens.push(self.read_variable());
                continue;
            }

            // Rule 10: literal word.
            tokens.push(self.read_literal());
        }
        Ok(tokens)
    }

    fn try_operator_or_redir(&mut self) -> Option<Token> {
        const TWO_CHAR_OPS: &[(&str, &str)] = &[("&&", "&&"), ("||", "||")];
        for (lit, _) in TWO_CHAR_OPS {
            if self.starts_with(lit) {
                self.advance_by(2);
                return Some(Token::Operator(lit.to_string()));
            }
        }
        if self.starts_with("2>>&1") {
            self.advance_by(5);
            return Some(Token::Redirection(RedirKind::ErrToOut));
        }
        if self.starts_with("2>&1") {
            self.advance_by(4);
            return Some(Token::Redirection(RedirKind::ErrToOut));
        }
        if self.starts_with("2>>") {
            self.advance_by(3);
            return Some(Token::Redirection(RedirKind::ErrAppendFile));
        }
        if self.starts_with("2>") {
            self.advance_by(2);
            return Some(Token::Redirection(RedirKind::ErrFile));
        }
        if self.starts_with("&>") {
            self.advance_by(2);
            return Some(Token::Redirection(RedirKind::BothOut));
        }
        if self.starts_with(">>") {
            self.advance_by(2);
            return Some(Token::Redirection(RedirKind::AppendFile));
        }
        if self.starts_with("<<") {
            self.advance_by(2);
            return Some(Token::Redirection(RedirKind::HereDoc));
        }
        match self.peek() {
            Some('|') => {
                self.bump();
                Some(Token::Operator("|".to_string()))
            }
            Some('&') => {
                self.bump();
                Some(Token::Operator("&".to_string()))
            }
            Some(';') => {
                self.bump();
                Some(Token::Operator(";".to_string()))
            }
            Some('<') => {
                self.bump();
                Some(Token::Redirection(RedirKind::InFile))
            }
            Some('>') => {
                self.bump();
                Some(Token::Redirection(RedirKind::OutFile))
            }
            _ => None,
        }
    }

    fn read_cmdsub_dollar(&mut self) -> Result<Token, LexError> {
        let start_offset = self.pos;
        self.advance_by(2); // skip "$("
        let mut depth = 1usize;
        let mut inner = String::new();
        loop {
            match self.bump() {
                Some('\\') => {
                    inner.push('\\');
                    if let Some(c) = self.bump() {
                        inner.push(c);
                    }
                }
                Some('(') => {
                    depth += 1;
                    inner.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Token::CmdSub(inner));
                    }
                    inner.push(')');
                }
                Some(c) => inner.push(c),
                None => return Err(LexError::UnclosedCmdSub { offset: start_offset }),
            }
        }
    }

    fn read_cmdsub_backtick(&mut self) -> Result<Token, LexError> {
        let start_offset = self.pos;
        self.bump(); // skip opening backtick
        let mut inner = String::new();
        loop {
            match self.bump() {
                Some('\\') => {
                    if let Some(c) = self.bump() {
                        inner.push(c);
                    }
                }
                Some('`') => return Ok(Token::CmdSub(inner)),
                Some(c) => inner.push(c),
                None => return Err(LexError::UnclosedCmdSub { offset: start_offset }),
            }
        }
    }

    fn read_arith(&mut self) -> Result<Token, LexError> {
        let start_offset = self.pos;
        self.advance_by(3); // skip "$(("
        let mut inner = String::new();
        loop {
            if self.starts_with("))") {
                self.advance_by(2);
                let result = crate::arith::eval(&inner, self.vars);
                return Ok(Token::Literal(result.to_string()));
            }
            match self.bump() {
                Some(c) => inner.push(c),
                None => return Err(LexError::UnclosedArith { offset: start_offset }),
            }
        }
    }

    fn try_history_designator(&mut self) -> Option<Token> {
        if self.peek_at(1) == Some('!') {
            self.advance_by(2);
            let cmd = self.history.last_command().unwrap_or("").to_string();
            return Some(Token::Literal(cmd));
        }
        if let Some(d) = self.peek_at(1) {
            if d.is_ascii_digit() {
                let mut n_str = String::new();
                let mut offset = 1;
                while let Some(c) = self.peek_at(offset) {
                    if c.is_ascii_digit() {
                        n_str.push(c);
                        offset += 1;
                    } else {
                        break;
                    }
                }
                if let Ok(n) = n_str.parse::<usize>() {
                    self.advance_by(offset);
                    let cmd = self.history.command_at(n).unwrap_or("").to_string();
                    return Some(Token::Literal(cmd));
                }
            }
        }
        None
    }

    fn read_single_quoted(&mut self) -> Result<Token, LexError> {
        let start_offset = self.pos;
        self.bump(); // opening '
        let mut content = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(Token::Quoted(content)),
                Some(c) => content.push(c),
                None => return Err(LexError::UnclosedQuote { offset: start_offset }),
            }
        }
    }

    fn read_double_quoted(&mut self) -> Result<Token, LexError> {
        let start_offset = self.pos;
        self.bump(); // opening "
        let mut content = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Token::Quoted(content)),
                Some('\\') => match self.bump() {
                    Some('n') => content.push('\n'),
                    Some('t') => content.push('\t'),
                    Some('r') => content.push('\r'),
                    Some('\\') => content.push('\\'),
                    Some('"') => content.push('"'),
                    Some('\'') => content.push('\''),
                    Some(other) => {
                        content.push('\\');
                        content.push(other);
                    }
                    None => return Err(LexError::UnclosedQuote { offset: start_offset }),
                },
                Some(c) => content.push(c),
                None => return Err(LexError::UnclosedQuote { offset: start_offset }),
            }
        }
    }

    fn read_variable(&mut self) -> Token {
        self.bump(); // '$'
        match self.peek() {
            Some('?') => {
                self.bump();
                Token::Variable(self.vars.get("?").unwrap_or_default())
            }
            Some('$') => {
                self.bump();
                Token::Variable(self.vars.get("$").unwrap_or_default())
            }
            Some('!') => {
                self.bump();
                Token::Variable(self.vars.get("!").unwrap_or_default())
            }
            Some('{') => {
                self.bump();
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c == '}' || c == ':' {
                        break;
                    }
                    name.push(c);
                    self.bump();
                }
                let mut default = None;
                if self.peek() == Some(':') && self.peek_at(1) == Some('-') {
                    self.advance_by(2);
                    let mut d = String::new();
                    while let Some(c) = self.peek() {
                        if c == '}' {
                            break;
                        }
                        d.push(c);
                        self.bump();
                    }
                    default = Some(d);
                }
                if self.peek() == Some('}') {
                    self.bump();
                }
                let value = self.vars.get(&name);
                match (value, default) {
                    (Some(v), _) if !v.is_empty() => Token::Variable(v),
                    (_, Some(d)) => Token::Variable(d),
                    (Some(v), None) => Token::Variable(v),
                    (None, None) => Token::Variable(String::new()),
                }
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Token::Variable(self.vars.get(&name).unwrap_or_default())
            }
            _ => Token::Literal("$".to_string()),
        }
    }

    fn read_literal(&mut self) -> Token {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                if let Some(escaped) = self.bump() {
                    word.push(escaped);
                }
                continue;
            }
            if is_special(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        Token::Literal(word)
    }
}

pub fn tokenize(line: &str, vars: &VariableStore, history: &HistoryStore) -> Result<Vec<Token>, LexError> {
    debug::trace(debug::LEX, "lex", format!("{line:?}"));
    Lexer::new(line, vars, history).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(line: &str) -> Vec<Token> {
        let vars = VariableStore::new();
        let history = HistoryStore::new();
        tokenize(line, &vars, &history).unwrap()
    }

    #[test]
    fn comment_ends_line() {
        assert_eq!(toks("echo hi # comment"), vec![
            Token::Literal("echo".into()),
            Token::Literal("hi".into()),
        ]);
    }

    #[test]
    fn operators_and_redirections() {
        let t = toks("a && b || c | d");
        assert!(t.contains(&Token::Operator("&&".into())));
        assert!(t.contains(&Token::Operator("||".into())));
        assert!(t.contains(&Token::Operator("|".into())));
    }

    #[test]
    fn two_greater_is_append() {
        let t = toks("echo x >> out.txt");
        assert!(t.contains(&Token::Redirection(RedirKind::AppendFile)));
    }

    #[test]
    fn err_to_out() {
        let t = toks("cmd 2>&1");
        assert!(t.contains(&Token::Redirection(RedirKind::ErrToOut)));
    }

    #[test]
    fn single_quote_is_literal() {
        let t = toks("echo 'a $b #c'");
        assert_eq!(t[1], Token::Quoted("a $b #c".to_string()));
    }

    #[test]
    fn double_quote_honors_escapes_not_vars() {
        let t = toks("echo \"a\\tb\"");
        assert_eq!(t[1], Token::Quoted("a\tb".to_string()));
    }

    #[test]
    fn variable_expands_immediately() {
        let vars = VariableStore::new();
        vars.set("FOO", "bar", false);
        let history = HistoryStore::new();
        let t = tokenize("echo $FOO", &vars, &history).unwrap();
        assert_eq!(t[1], Token::Variable("bar".to_string()));
    }

    #[test]
    fn unset_variable_is_empty() {
        let t = toks("echo $QSH_UNSET_VAR_XYZ");
        assert_eq!(t[1], Token::Variable(String::new()));
    }

    #[test]
    fn default_expansion() {
        let t = toks("echo ${QSH_UNSET_VAR_XYZ:-fallback}");
        assert_eq!(t[1], Token::Variable("fallback".to_string()));
    }

    #[test]
    fn bare_dollar_is_literal() {
        let t = toks("echo $ ");
        assert_eq!(t[1], Token::Literal("$".to_string()));
    }

    #[test]
    fn arithmetic_expands_to_literal() {
        let t = toks("echo $((2+3))");
        assert_eq!(t[1], Token::Literal("5".to_string()));
    }

    #[test]
    fn command_substitution_is_deferred() {
        let t = toks("echo $(ls -l)");
        assert_eq!(t[1], Token::CmdSub("ls -l".to_string()));
    }

    #[test]
    fn backtick_command_substitution() {
        let t = toks("echo `ls`");
        assert_eq!(t[1], Token::CmdSub("ls".to_string()));
    }

    #[test]
    fn bang_bang_substitutes_last_history() {
        let vars = VariableStore::new();
        let mut history = HistoryStore::new();
        history.add("echo hi", 0);
        let t = tokenize("!!", &vars, &history).unwrap();
        assert_eq!(t[0], Token::Literal("echo hi".to_string()));
    }

    #[test]
    fn unclosed_single_quote_errors() {
        let vars = VariableStore::new();
        let history = HistoryStore::new();
        assert!(tokenize("echo 'unterminated", &vars, &history).is_err());
    }

    #[test]
    fn backslash_escapes_special_byte_in_literal() {
        let t = toks("echo hi\\ there");
        assert_eq!(t[1], Token::Literal("hi there".to_string()));
    }
}
