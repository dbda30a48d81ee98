//! Synchronous event fan-out with priorities and namespaces.
//!
//! A listener registered for `insert` also hears `insert:paragraph`. Listeners
//! run by priority (highest first), then in registration order, until one of
//! them stops the event.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Priority = Priority(100_000);
    pub const HIGH: Priority = Priority(1_000);
    pub const NORMAL: Priority = Priority(0);
    pub const LOW: Priority = Priority(-1_000);
    pub const LOWEST: Priority = Priority(-100_000);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// State of one firing, shared by all listeners called for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    name: String,
    stopped: bool,
}

impl EventInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stopped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Skips the remaining listeners of this firing.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

struct Registration<L> {
    event: String,
    priority: Priority,
    sequence: usize,
    listener: L,
}

pub struct Emitter<L> {
    registrations: Vec<Registration<L>>,
}

impl<L> Default for Emitter<L> {
    fn default() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }
}

impl<L> std::fmt::Debug for Emitter<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|r| (&r.event, r.priority)))
            .finish()
    }
}

fn matches(registered: &str, fired: &str) -> bool {
    fired == registered
        || fired
            .strip_prefix(registered)
            .is_some_and(|rest| rest.starts_with(':'))
}

impl<L: Clone> Emitter<L> {
    pub fn on(&mut self, event: impl Into<String>, priority: Priority, listener: L) {
        let sequence = self.registrations.len();
        self.registrations.push(Registration {
            event: event.into(),
            priority,
            sequence,
            listener,
        });
    }

    /// Listeners that hear `name`, in calling order.
    pub fn listeners_for(&self, name: &str) -> Vec<L> {
        let mut matching: Vec<&Registration<L>> = self
            .registrations
            .iter()
            .filter(|registration| matches(&registration.event, name))
            .collect();
        matching.sort_by_key(|registration| (Reverse(registration.priority), registration.sequence));
        matching
            .into_iter()
            .map(|registration| registration.listener.clone())
            .collect()
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.registrations
            .iter()
            .any(|registration| matches(&registration.event, name))
    }
}
