//! Scheduler log ring buffer
//!
//! Fixed-size circular buffer of recent log lines with a monotonic sequence
//! number. Single writer (the scheduler), many readers; readers copy a
//! bounded snapshot and the lock is never held across I/O.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::SchedulerLogLine;

pub struct LogRingBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    next_seq: u64,
    lines: VecDeque<SchedulerLogLine>,
}

impl LogRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                next_seq: 0,
                lines: VecDeque::new(),
            }),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        let mut inner = self.inner.lock().expect("log buffer poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.lines.len() == self.capacity {
            inner.lines.pop_front();
        }
        inner.lines.push_back(SchedulerLogLine {
            seq,
            timestamp: Utc::now(),
            line,
        });
    }

    /// Copy out the most recent `limit` lines, oldest first.
    pub fn snapshot(&self, limit: usize) -> Vec<SchedulerLogLine> {
        let inner = self.inner.lock().expect("log buffer poisoned");
        let skip = inner.lines.len().saturating_sub(limit);
        inner.lines.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_capacity_and_keeps_sequence_monotonic() {
        let buffer = LogRingBuffer::new(3);
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }
        let snapshot = buffer.snapshot(10);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].seq, 2);
        assert_eq!(snapshot[2].seq, 4);
        assert_eq!(snapshot[2].line, "line 4");
    }

    #[test]
    fn snapshot_is_bounded() {
        let buffer = LogRingBuffer::new(10);
        for i in 0..10 {
            buffer.push(format!("line {i}"));
        }
        let snapshot = buffer.snapshot(2);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].line, "line 8");
    }
}
