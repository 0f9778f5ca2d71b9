//! Alias store: identical structure to the variable store, without export
//! semantics. A single, non-recursive expansion pass per spec §4.7.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::state::ShellConfig;

#[derive(Debug, Default)]
pub struct AliasStore {
    entries: RefCell<HashMap<String, String>>,
}

impl AliasStore {
    pub fn new() -> Self {
        AliasStore::default()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.entries.borrow_mut().insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.entries.borrow().get(name).cloned()
    }

    pub fn unset(&self, name: &str) -> bool {
        self.entries.borrow_mut().remove(name).is_some()
    }

    pub fn all(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort();
        out
    }

    /// Splits `line`'s first whitespace-delimited word off and substitutes
    /// it if it names an alias; the remainder is concatenated unchanged.
    /// `MAX_ALIAS_DEPTH` is reserved for a future recursive expander — this
    /// pass never recurses, matching spec §4.7.
    pub fn expand(&self, line: &str) -> String {
        let _ = ShellConfig::MAX_ALIAS_DEPTH;
        let trimmed = line.trim_start();
        let first_word_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (first_word, rest) = trimmed.split_at(first_word_end);
        match self.get(first_word) {
            Some(value) => format!("{value}{rest}"),
            None => line.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_substitutes_first_word() {
        let aliases = AliasStore::new();
        aliases.set("ll", "ls -l");
        assert_eq!(aliases.expand("ll -a"), "ls -l -a");
    }

    #[test]
    fn expand_is_noop_for_unknown_word() {
        let aliases = AliasStore::new();
        assert_eq!(aliases.expand("echo hi"), "echo hi");
    }

    #[test]
    fn unset_reports_whether_present() {
        let aliases = AliasStore::new();
        aliases.set("x", "y");
        assert!(aliases.unset("x"));
        assert!(!aliases.unset("x"));
    }
}
