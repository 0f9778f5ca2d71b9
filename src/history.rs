//! History store: a fixed-size ring persisted to `$HOME/.qsh_history`.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::state::ShellConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub command: String,
    pub timestamp: u64,
    pub exit_status: i32,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryStore {
    pub fn new() -> Self {
        HistoryStore { entries: VecDeque::with_capacity(ShellConfig::HISTORY_CAPACITY) }
    }

    /// Appends a non-empty command line, evicting the oldest entry if the
    /// ring is already at capacity.
    pub fn add(&mut self, command: &str, exit_status: i32) {
        if command.trim().is_empty() {
            return;
        }
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if self.entries.len() >= ShellConfig::HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { command: command.to_string(), timestamp, exit_status });
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Drops every recorded entry — backs the `history -c` flag.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `!!` — the most recent entry's command, if any.
    pub fn last_command(&self) -> Option<&str> {
        self.entries.back().map(|e| e.command.as_str())
    }

    /// `!N` — the command at index `n` (0-based, insertion order).
    pub fn command_at(&self, n: usize) -> Option<&str> {
        self.entries.get(n).map(|e| e.command.as_str())
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("{} {} {}\n", entry.timestamp, entry.exit_status, entry.command));
        }
        fs::write(path, out)
    }

    pub fn load(&mut self, path: &Path) -> io::Result<()> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for line in content.lines() {
            let mut parts = line.splitn(3, ' ');
            let ts = parts.next().and_then(|s| s.parse::<u64>().ok());
            let status = parts.next().and_then(|s| s.parse::<i32>().ok());
            let command = parts.next();
            if let (Some(timestamp), Some(exit_status), Some(command)) = (ts, status, command) {
                if self.entries.len() >= ShellConfig::HISTORY_CAPACITY {
                    self.entries.pop_front();
                }
                self.entries.push_back(HistoryEntry {
                    command: command.to_string(),
                    timestamp,
                    exit_status,
                });
            }
        }
        Ok(())
    }
}

/// Writes a line to `w` (the internal loop body of the `history` builtin).
pub fn format_entry(index: usize, entry: &HistoryEntry) -> String {
    use chrono::{Local, TimeZone};
    let local = Local
        .timestamp_opt(entry.timestamp as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("{:5}  {}  [{}]  {}", index, local, entry.exit_status, entry.command)
}

pub fn write_all<W: Write>(mut w: W, store: &HistoryStore) -> io::Result<()> {
    for (i, entry) in store.entries().enumerate() {
        writeln!(w, "{}", format_entry(i, entry))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn add_ignores_blank_lines() {
        let mut h = HistoryStore::new();
        h.add("   ", 0);
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn clear_drops_every_entry() {
        let mut h = HistoryStore::new();
        h.add("echo hi", 0);
        h.add("false", 1);
        h.clear();
        assert!(h.is_empty());
    }

    #[test]
    fn ring_evicts_oldest_on_overflow() {
        let mut h = HistoryStore::new();
        for i in 0..(ShellConfig::HISTORY_CAPACITY + 5) {
            h.add(&format!("cmd{i}"), 0);
        }
        assert_eq!(h.len(), ShellConfig::HISTORY_CAPACITY);
        assert_eq!(h.entries().next().unwrap().command, "cmd5");
    }

    #[test]
    fn save_then_load_roundtrips() {
        let mut h = HistoryStore::new();
        h.add("echo hi", 0);
        h.add("false", 1);
        let file = NamedTempFile::new().unwrap();
        h.save(file.path()).unwrap();

        let mut h2 = HistoryStore::new();
        h2.load(file.path()).unwrap();
        assert_eq!(h2.len(), 2);
        assert_eq!(h2.command_at(0), Some("echo hi"));
        assert_eq!(h2.entries().nth(1).unwrap().exit_status, 1);
    }

    #[test]
    fn load_of_missing_file_is_noop() {
        let mut h = HistoryStore::new();
        h.load(Path::new("/nonexistent/path/to/.qsh_history")).unwrap();
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn bang_bang_returns_last_command() {
        let mut h = HistoryStore::new();
        h.add("one", 0);
        h.add("two", 0);
        assert_eq!(h.last_command(), Some("two"));
    }
}
