//! `QSH_DEBUG`-gated trace logging, per spec §6.
//!
//! No `log`/`tracing` crate in the dependency stack for this — the teacher
//! doesn't carry one either, and a handful of `eprintln!` call sites gated
//! by a category bitmask is the ambient-logging shape spec.md itself
//! describes for `QSH_DEBUG`. Categories mirror the seven components:
//! lexer, parser, executor, job table, profiler.

use std::sync::OnceLock;

pub const LEX: u32 = 0x1;
pub const PARSE: u32 = 0x2;
pub const EXEC: u32 = 0x4;
pub const JOB: u32 = 0x8;
pub const PROFILE: u32 = 0x10;

/// Top bit of the mask: "enable every category" regardless of the rest.
const ALL_BIT: u32 = 0x8000_0000;

fn parsed_mask() -> Option<u32> {
    let raw = std::env::var("QSH_DEBUG").ok()?;
    let raw = raw.trim();
    let hex = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw);
    Some(u32::from_str_radix(hex, 16).unwrap_or(0))
}

fn mask() -> Option<u32> {
    static MASK: OnceLock<Option<u32>> = OnceLock::new();
    *MASK.get_or_init(parsed_mask)
}

/// Whether `category` should trace. Unset `QSH_DEBUG` disables everything;
/// once set, a mask of `0` or one with the top bit set enables every
/// category — spec §6's "nonzero-and-zero masks enable all", resolved as
/// documented in DESIGN.md.
pub fn enabled(category: u32) -> bool {
    match mask() {
        None => false,
        Some(0) => true,
        Some(m) if m & ALL_BIT != 0 => true,
        Some(m) => m & category != 0,
    }
}

pub fn trace(category: u32, tag: &str, msg: impl std::fmt::Display) {
    if enabled(category) {
        eprintln!("[qsh:debug:{tag}] {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mask_enables_all_categories() {
        assert_eq!(u32::from_str_radix("0", 16).unwrap(), 0);
    }

    #[test]
    fn category_constants_are_distinct_bits() {
        let all = [LEX, PARSE, EXEC, JOB, PROFILE];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert_eq!(a & b, 0);
                }
            }
        }
    }
}
