//! Cache transition verbs
//!
//! An `Act` is the outcome of classifying one incoming item against a cache.
//! It describes a single transition and is never persisted.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Act {
    /// Append at the end (item is newer than the last entry).
    Add,
    /// Insert at its sorted position (older than the last entry, new timestamp).
    AddOld,
    /// Replace the entry with the same timestamp and a different payload.
    Update,
    /// Remove an existing entry.
    Delete,
    /// Truncate and regenerate the cache from the item's timestamp forward.
    Rebuild,
    /// Duplicate or otherwise a no-op.
    Ignore,
}

impl Act {
    /// Label for structured logging.
    pub fn label(&self) -> &'static str {
        match self {
            Act::Add => "add",
            Act::AddOld => "add_old",
            Act::Update => "update",
            Act::Delete => "delete",
            Act::Rebuild => "rebuild",
            Act::Ignore => "ignore",
        }
    }

    /// Whether this transition changes cache contents.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Act::Ignore | Act::Rebuild)
    }
}

impl fmt::Display for Act {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
