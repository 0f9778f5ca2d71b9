//! Variable store: a hash table seeded from `environ`, with `export` bridging
//! entries into the process environment via `setenv`/`unsetenv`.

use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct VarEntry {
    pub value: String,
    pub exported: bool,
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Default)]
pub struct VariableStore {
    entries: RefCell<HashMap<String, VarEntry>>,
}

impl VariableStore {
    /// Builds a store seeded with every entry of the current process
    /// environment, marked `exported = true`.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        for (name, value) in std::env::vars() {
            entries.insert(name, VarEntry { value, exported: true });
        }
        VariableStore { entries: RefCell::new(entries) }
    }

    pub fn set(&self, name: &str, value: &str, exported: bool) {
        let mut entries = self.entries.borrow_mut();
        let exported = exported
            || entries.get(name).map(|e| e.exported).unwrap_or(false);
        if exported {
            std::env::set_var(name, value);
        }
        entries.insert(name.to_string(), VarEntry { value: value.to_string(), exported });
    }

    /// Marks an existing entry exported, creating it from the environment
    /// first if it isn't already tracked.
    pub fn export(&self, name: &str) {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(name) {
            entry.exported = true;
            std::env::set_var(name, &entry.value);
        } else if let Ok(value) = std::env::var(name) {
            entries.insert(name.to_string(), VarEntry { value, exported: true });
        } else {
            entries.insert(name.to_string(), VarEntry { value: String::new(), exported: true });
        }
    }

    /// Falls back to `getenv` on miss, per spec §4.7.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(entry) = self.entries.borrow().get(name) {
            return Some(entry.value.clone());
        }
        std::env::var(name).ok()
    }

    pub fn unset(&self, name: &str) {
        self.entries.borrow_mut().remove(name);
        std::env::remove_var(name);
    }

    pub fn all(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let vars = VariableStore::new();
        vars.set("QSH_TEST_VAR", "hello", false);
        assert_eq!(vars.get("QSH_TEST_VAR"), Some("hello".to_string()));
    }

    #[test]
    fn unset_removes_entry() {
        let vars = VariableStore::new();
        vars.set("QSH_TEST_UNSET", "x", false);
        vars.unset("QSH_TEST_UNSET");
        assert_eq!(vars.get("QSH_TEST_UNSET"), None);
    }

    #[test]
    fn export_sets_process_env() {
        let vars = VariableStore::new();
        vars.set("QSH_TEST_EXPORT", "v", false);
        vars.export("QSH_TEST_EXPORT");
        assert_eq!(std::env::var("QSH_TEST_EXPORT").unwrap(), "v");
        std::env::remove_var("QSH_TEST_EXPORT");
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("FOO_1"));
        assert!(is_valid_name("_x"));
        assert!(!is_valid_name("1FOO"));
        assert!(!is_valid_name("FOO-BAR"));
        assert!(!is_valid_name(""));
    }
}
