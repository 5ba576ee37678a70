//! Identifier allocation for merged definitions.

use std::collections::HashMap;

/// Old → new identifier map recorded by one merge step.
pub type IdMap = HashMap<String, String>;

/// Monotonic numeric ID counter seeded from the base document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    last: i64,
}

impl IdAllocator {
    /// Seed from the IDs already present; the first allocation is
    /// `max(existing ∪ {floor}) + 1`.
    pub fn seeded<I>(existing: I, floor: i64) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let last = existing.into_iter().fold(floor, i64::max);
        Self { last }
    }

    /// Hand out the next free ID.
    pub fn allocate(&mut self) -> i64 {
        self.last += 1;
        self.last
    }

    /// Last ID handed out (or the seed).
    pub fn last(&self) -> i64 {
        self.last
    }
}

/// Parse a numeric ID attribute value.
pub fn parse_id(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}
