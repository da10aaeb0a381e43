//! Unique identifier generation for users, projects, and step-up tickets.
//!
//! Identifiers are ULIDs: 26-character Crockford base32, lexicographically
//! sortable by creation time. A single process-wide generator keeps IDs
//! monotonic within the same millisecond.

use std::sync::Mutex;

use ulid::{Generator, Ulid};

pub struct IdGenerator {
    inner: Mutex<Generator>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Produce the next identifier. Falls back to a fresh random ULID if the
    /// monotonic counter overflows within a millisecond or the lock is
    /// poisoned, so this never fails.
    pub fn next_id(&self) -> String {
        let ulid = self
            .inner
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok())
            .unwrap_or_else(Ulid::new);
        ulid.to_string()
    }
}
