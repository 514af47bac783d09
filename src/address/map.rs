//! Lookup-table mapping: one-to-one canonical maps and one-to-many alias
//! expansion.
//!
//! Expansion is a worklist algorithm with an explicit visited set for cycle
//! detection and two independent caps: maximum depth per seed and maximum
//! total fan-out. An address appearing in its own expansion chain is a fixed
//! point and is emitted once, not expanded further.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use tracing::{debug, warn};

use crate::address::parse::{normalize_key, split_address, split_extension};
use crate::error::{Result, ScrubError};

/// A key→value lookup table.
///
/// `Ok(None)` is a normal negative result. `Err` is an I/O-level table
/// failure, which aborts the whole expansion; the caller latches a
/// WRITE-class status flag so the message is retried rather than
/// misdelivered.
pub trait LookupTable {
    /// Table name for diagnostics.
    fn name(&self) -> &str;

    /// Look up a key. Multi-valued results are comma-separated.
    fn lookup(&self, key: &str) -> Result<Option<String>>;
}

/// Result of a one-to-many expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Expanded addresses, in breadth-first discovery order.
    pub addresses: Vec<String>,
    /// One of the caps was hit and the result was truncated.
    pub truncated: bool,
}

/// Look up one address with extension propagation.
///
/// `user+ext@domain` falls back to `user@domain` when the full form has no
/// entry; on a bare-form match the unmatched extension is reattached to the
/// result's local part.
pub fn map_one_to_one(table: &dyn LookupTable, address: &str) -> Result<Option<String>> {
    if let Some(value) = table.lookup(&normalize_key(address))? {
        return Ok(Some(value));
    }
    let (local, domain) = split_address(address);
    let (base, Some(extension)) = split_extension(local) else {
        return Ok(None);
    };
    let bare = match domain {
        Some(domain) => format!("{base}@{domain}"),
        None => base.to_string(),
    };
    match table.lookup(&normalize_key(&bare))? {
        Some(value) => Ok(Some(reattach_extension(&value, extension))),
        None => Ok(None),
    }
}

/// Expand one seed address through a one-to-many table.
///
/// The seed itself is returned when the table has no entry for it. Caps are
/// degradation, not failure: the truncated flag tells the caller to latch a
/// resource-exhaustion status, and whatever was expanded so far is used.
pub fn map_one_to_many(
    table: &dyn LookupTable,
    seed: &str,
    recursion_limit: usize,
    fanout_limit: usize,
) -> Result<Expansion> {
    let mut addresses: Vec<String> = Vec::new();
    let mut emitted: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut work: VecDeque<(String, usize)> = VecDeque::new();
    let mut truncated = false;

    visited.insert(normalize_key(seed));
    work.push_back((seed.to_string(), 0));

    while let Some((address, depth)) = work.pop_front() {
        if addresses.len() >= fanout_limit {
            warn!(
                table = table.name(),
                seed, limit = fanout_limit,
                "Alias expansion fan-out limit reached, truncating"
            );
            truncated = true;
            break;
        }
        if depth >= recursion_limit {
            warn!(
                table = table.name(),
                seed, limit = recursion_limit,
                "Alias expansion recursion limit reached, keeping address unexpanded"
            );
            truncated = true;
            if emitted.insert(normalize_key(&address)) {
                addresses.push(address);
            }
            continue;
        }
        match map_one_to_one(table, &address)? {
            None => {
                if emitted.insert(normalize_key(&address)) {
                    addresses.push(address);
                }
            }
            Some(values) => {
                for value in split_values(&values) {
                    if visited.insert(normalize_key(value)) {
                        work.push_back((value.to_string(), depth + 1));
                    } else if emitted.insert(normalize_key(value)) {
                        // Member of its own expansion chain: fixed point.
                        debug!(table = table.name(), address = value, "Expansion cycle");
                        addresses.push(value.to_string());
                    }
                }
            }
        }
    }

    Ok(Expansion {
        addresses,
        truncated,
    })
}

/// Split a comma-separated table value into members.
fn split_values(values: &str) -> impl Iterator<Item = &str> {
    values
        .split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
}

/// Reattach an unmatched `+ext` to a mapped result's local part.
fn reattach_extension(address: &str, extension: &str) -> String {
    let (local, domain) = split_address(address);
    match domain {
        Some(domain) => format!("{local}+{extension}@{domain}"),
        None => format!("{local}+{extension}"),
    }
}

/// In-memory lookup table, loaded from `key value` lines.
///
/// Also the table implementation the tests use. Lines starting with `#` and
/// blank lines are skipped; keys are case-folded.
pub struct HashMapTable {
    name: String,
    entries: HashMap<String, String>,
}

impl HashMapTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Load a table file: one `key value...` pair per line.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ScrubError::io(path, e))?;
        let mut table = Self::new(path.display().to_string());
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                return Err(ScrubError::Table {
                    table: table.name.clone(),
                    reason: format!("line {}: missing value", lineno + 1),
                });
            };
            table.insert(key, value.trim());
        }
        Ok(table)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(normalize_key(key), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LookupTable for HashMapTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(&normalize_key(key)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> HashMapTable {
        let mut table = HashMapTable::new("test");
        for (key, value) in pairs {
            table.insert(key, *value);
        }
        table
    }

    /// A table that fails at the I/O level on every lookup.
    struct BrokenTable;

    impl LookupTable for BrokenTable {
        fn name(&self) -> &str {
            "broken"
        }

        fn lookup(&self, _key: &str) -> Result<Option<String>> {
            Err(ScrubError::Table {
                table: "broken".into(),
                reason: "backend unavailable".into(),
            })
        }
    }

    #[test]
    fn test_one_to_one_direct_hit() {
        let table = table(&[("old@example.com", "new@example.com")]);
        assert_eq!(
            map_one_to_one(&table, "old@example.com").unwrap(),
            Some("new@example.com".to_string())
        );
    }

    #[test]
    fn test_one_to_one_extension_propagation() {
        let table = table(&[("user@example.com", "other@example.net")]);
        assert_eq!(
            map_one_to_one(&table, "user+tag@example.com").unwrap(),
            Some("other+tag@example.net".to_string())
        );
    }

    #[test]
    fn test_one_to_one_full_form_beats_bare_form() {
        let table = table(&[
            ("user@example.com", "bare@example.net"),
            ("user+tag@example.com", "exact@example.net"),
        ]);
        assert_eq!(
            map_one_to_one(&table, "user+tag@example.com").unwrap(),
            Some("exact@example.net".to_string())
        );
    }

    #[test]
    fn test_expansion_fan_out() {
        let table = table(&[("sales@example.com", "alice@example.com, bob@example.com")]);
        let expansion = map_one_to_many(&table, "sales@example.com", 10, 100).unwrap();
        assert_eq!(
            expansion.addresses,
            vec!["alice@example.com", "bob@example.com"]
        );
        assert!(!expansion.truncated);
    }

    #[test]
    fn test_expansion_no_entry_returns_seed() {
        let table = table(&[]);
        let expansion = map_one_to_many(&table, "solo@example.com", 10, 100).unwrap();
        assert_eq!(expansion.addresses, vec!["solo@example.com"]);
    }

    #[test]
    fn test_expansion_nested() {
        let table = table(&[
            ("all@example.com", "sales@example.com, carol@example.com"),
            ("sales@example.com", "alice@example.com, bob@example.com"),
        ]);
        let expansion = map_one_to_many(&table, "all@example.com", 10, 100).unwrap();
        assert_eq!(
            expansion.addresses,
            vec![
                "carol@example.com",
                "alice@example.com",
                "bob@example.com"
            ]
        );
    }

    #[test]
    fn test_expansion_two_cycle_terminates() {
        let table = table(&[
            ("a@example.com", "b@example.com"),
            ("b@example.com", "a@example.com"),
        ]);
        let expansion = map_one_to_many(&table, "a@example.com", 10, 100).unwrap();
        // a → b → a stops at the fixed point; a appears exactly once.
        assert_eq!(expansion.addresses, vec!["a@example.com"]);
        assert!(!expansion.truncated);
    }

    #[test]
    fn test_expansion_self_cycle_terminates() {
        let table = table(&[("list@example.com", "list@example.com, member@example.com")]);
        let expansion = map_one_to_many(&table, "list@example.com", 10, 100).unwrap();
        assert_eq!(
            expansion.addresses,
            vec!["list@example.com", "member@example.com"]
        );
    }

    #[test]
    fn test_expansion_recursion_cap() {
        let mut deep = HashMapTable::new("deep");
        for i in 0..50 {
            deep.insert(
                &format!("hop{i}@example.com"),
                format!("hop{}@example.com", i + 1),
            );
        }
        let expansion = map_one_to_many(&deep, "hop0@example.com", 5, 100).unwrap();
        assert!(expansion.truncated);
        assert_eq!(expansion.addresses, vec!["hop5@example.com"]);
    }

    #[test]
    fn test_expansion_fanout_cap() {
        let members: Vec<String> = (0..20).map(|i| format!("m{i}@example.com")).collect();
        let table = table(&[("big@example.com", &members.join(", "))]);
        let expansion = map_one_to_many(&table, "big@example.com", 10, 5).unwrap();
        assert!(expansion.truncated);
        assert_eq!(expansion.addresses.len(), 5);
    }

    #[test]
    fn test_table_error_aborts_expansion() {
        assert!(map_one_to_many(&BrokenTable, "x@example.com", 10, 100).is_err());
    }
}
