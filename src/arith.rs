//! Left-to-right arithmetic evaluator for `$((expr))`.
//!
//! Deliberately not precedence-climbing: operators associate strictly
//! left-to-right, matching the simplification the tokenizer documents.
//! Division and modulus by zero yield 0 rather than erroring.

use crate::variables::VariableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor { bytes: s.as_bytes(), pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }
}

/// Evaluates `expr` (the text between `$((` and `))`) against `vars`.
/// Never fails: unknown variables resolve to 0, divide/mod by zero yields 0.
pub fn eval(expr: &str, vars: &VariableStore) -> i64 {
    let mut cur = Cursor::new(expr);
    eval_expr(&mut cur, vars)
}

fn eval_expr(cur: &mut Cursor, vars: &VariableStore) -> i64 {
    cur.skip_ws();
    let mut acc = eval_term(cur, vars);
    loop {
        cur.skip_ws();
        let op = match cur.peek() {
            Some(b'+') => Op::Add,
            Some(b'-') => Op::Sub,
            Some(b'*') => Op::Mul,
            Some(b'/') => Op::Div,
            Some(b'%') => Op::Rem,
            _ => break,
        };
        cur.bump();
        cur.skip_ws();
        let rhs = eval_term(cur, vars);
        acc = match op {
            Op::Add => acc.wrapping_add(rhs),
            Op::Sub => acc.wrapping_sub(rhs),
            Op::Mul => acc.wrapping_mul(rhs),
            Op::Div => if rhs == 0 { 0 } else { acc / rhs },
            Op::Rem => if rhs == 0 { 0 } else { acc % rhs },
        };
    }
    acc
}

fn eval_term(cur: &mut Cursor, vars: &VariableStore) -> i64 {
    cur.skip_ws();
    match cur.peek() {
        Some(b'(') => {
            cur.bump();
            let v = eval_expr(cur, vars);
            cur.skip_ws();
            if cur.peek() == Some(b')') {
                cur.bump();
            }
            v
        }
        Some(b'-') => {
            cur.bump();
            -eval_term(cur, vars)
        }
        Some(b'$') => {
            cur.bump();
            let start = cur.pos;
            while cur.peek().map(|b| b.is_ascii_alphanumeric() || b == b'_').unwrap_or(false) {
                cur.bump();
            }
            let name = std::str::from_utf8(&cur.bytes[start..cur.pos]).unwrap_or("");
            vars.get(name).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
        }
        Some(b) if b.is_ascii_digit() => {
            let start = cur.pos;
            while cur.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                cur.bump();
            }
            std::str::from_utf8(&cur.bytes[start..cur.pos]).unwrap_or("0").parse().unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_to_right_no_precedence() {
        let vars = VariableStore::new();
        // 2+3*4 evaluated left-to-right is (2+3)*4 = 20, not 14.
        assert_eq!(eval("2+3*4", &vars), 20);
    }

    #[test]
    fn parens_override() {
        let vars = VariableStore::new();
        assert_eq!(eval("(2+3)*4", &vars), 20);
    }

    #[test]
    fn div_and_mod_by_zero_yield_zero() {
        let vars = VariableStore::new();
        assert_eq!(eval("5/0", &vars), 0);
        assert_eq!(eval("5%0", &vars), 0);
    }

    #[test]
    fn variable_reference() {
        let vars = VariableStore::new();
        vars.set("X", "10", false);
        assert_eq!(eval("$X+5", &vars), 15);
    }

    #[test]
    fn negative_numbers() {
        let vars = VariableStore::new();
        assert_eq!(eval("-5+3", &vars), -2);
    }
}
