//! Bounded scheduler event log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Append-only ring buffer; the oldest entry is evicted once full.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp,
            message: message.into(),
        });
    }

    /// The most recent `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 24, 12, minute, 0).unwrap()
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.push(ts(i), format!("event {i}"));
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.tail(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn tail_returns_newest_in_order() {
        let mut log = EventLog::new(10);
        log.push(ts(0), "a");
        log.push(ts(1), "b");
        log.push(ts(2), "c");

        let tail = log.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "b");
        assert_eq!(tail[1].message, "c");
        assert!(log.tail(0).is_empty());
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut log = EventLog::new(0);
        assert!(log.is_empty());
        log.push(ts(0), "a");
        log.push(ts(1), "b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.tail(5)[0].message, "b");
    }
}
