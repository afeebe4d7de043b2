//! Bounded, timestamped event log kept by each vehicle node.

use std::collections::VecDeque;

use chrono::{DateTime, Local, TimeZone};

/// Entries kept before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Ring buffer of `[YYYY-MM-DD HH:MM:SS.mmm] message` lines.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Append `message` stamped with the local time and return the entry.
    pub fn record(&mut self, message: &str) -> &str {
        self.record_at(&Local::now(), message)
    }

    pub fn record_at<Tz: TimeZone>(&mut self, at: &DateTime<Tz>, message: &str) -> &str
    where
        Tz::Offset: std::fmt::Display,
    {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries
            .push_back(format!("[{}] {message}", at.format("%Y-%m-%d %H:%M:%S%.3f")));
        self.entries.back().map_or("", String::as_str)
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
