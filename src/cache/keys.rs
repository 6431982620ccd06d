//! Cache key scheme: `"<table>:<id>"`, bulk patterns `"<table>:*"`.

use std::fmt;

const SEPARATOR: char = ':';
const WILDCARD: char = '*';

/// Key of one cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub table: &'static str,
    pub id: i64,
}

impl EntityKey {
    pub fn new(table: &'static str, id: i64) -> Self {
        Self { table, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.table, self.id)
    }
}

/// Pattern matching every key of `table`.
pub fn table_pattern(table: &str) -> String {
    format!("{table}{SEPARATOR}{WILDCARD}")
}

/// A pattern ending in `*` matches by prefix, anything else exactly.
pub fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}
