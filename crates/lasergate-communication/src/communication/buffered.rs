//! Command queue and in-flight ledger for character-counting flow control
//!
//! GRBL acknowledges every line with exactly one `ok` or `error:n`, in the order
//! the lines were received. The ledger mirrors the firmware's receive buffer:
//! every transmitted line is recorded with its transmitted length, and every
//! acknowledgement releases the oldest record.
//!
//! # Features
//! - FIFO command queue with in-band job sentinels
//! - Byte accounting against the firmware's receive buffer
//! - Origin tracking so acknowledgements are attributed to jobs or manual lines

use lasergate_core::JobId;
use std::collections::VecDeque;

/// Who put a line on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    /// Part of a submitted job, counts toward progress
    Job,
    /// Caller-issued command (`$H`, `$X`, jogs, ...)
    Manual,
    /// Periodic `$G` written by the processing loop itself
    ModalRefresh,
    /// Blank line written on open to flush the firmware's line buffer
    Flush,
}

/// A normalized line waiting in the command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedLine {
    /// Normalized text without the terminating newline
    pub text: String,
    /// Origin of the line
    pub origin: LineOrigin,
}

impl QueuedLine {
    /// Create a job line
    pub fn job(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: LineOrigin::Job,
        }
    }

    /// Create a manual line
    pub fn manual(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: LineOrigin::Manual,
        }
    }
}

/// An entry in the command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// A line to transmit
    Line(QueuedLine),
    /// Hold back everything behind this marker until the machine reports idle
    WaitIdle,
    /// The job that queued this marker has been fully processed
    EndOfJob(JobId),
}

/// FIFO of lines and sentinels awaiting transmission
#[derive(Debug, Default)]
pub struct CommandQueue {
    items: VecDeque<QueueItem>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item
    pub fn push(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    /// Put an item ahead of everything already queued
    pub fn push_front(&mut self, item: QueueItem) {
        self.items.push_front(item);
    }

    /// Oldest item, if any
    pub fn front(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    /// Remove and return the oldest item
    pub fn pop(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Keep only the lines matching `keep`; sentinels are dropped
    pub fn retain_lines(&mut self, mut keep: impl FnMut(&QueuedLine) -> bool) {
        self.items.retain(|item| match item {
            QueueItem::Line(line) => keep(line),
            _ => false,
        });
    }

    /// Number of items, sentinels included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Number of lines, sentinels excluded
    pub fn line_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, QueueItem::Line(_)))
            .count()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A transmitted line awaiting its acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightEntry {
    /// Line text without the newline
    pub line: String,
    /// Bytes charged against the receive buffer, newline included
    pub len: usize,
    /// Origin of the line
    pub origin: LineOrigin,
}

/// Lines written to the firmware but not yet acknowledged
#[derive(Debug)]
pub struct InFlightLedger {
    entries: VecDeque<InFlightEntry>,
    bytes: usize,
    capacity: usize,
}

impl InFlightLedger {
    /// Create a ledger for a firmware receive buffer of `rx_buffer_size` bytes
    ///
    /// One byte of the buffer is always kept free, so the ledger never
    /// accounts for more than `rx_buffer_size - 1` bytes.
    pub fn new(rx_buffer_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            bytes: 0,
            capacity: rx_buffer_size.saturating_sub(1),
        }
    }

    /// Largest number of bytes the ledger may hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when a line of `len` transmitted bytes fits right now
    pub fn can_accept(&self, len: usize) -> bool {
        self.bytes + len <= self.capacity
    }

    /// Record a line about to be written
    pub fn push(&mut self, entry: InFlightEntry) {
        self.bytes += entry.len;
        self.entries.push_back(entry);
    }

    /// Release the oldest entry
    pub fn acknowledge(&mut self) -> Option<InFlightEntry> {
        let entry = self.entries.pop_front()?;
        self.bytes = self.bytes.saturating_sub(entry.len);
        Some(entry)
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    /// Bytes currently accounted for
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Number of unacknowledged lines
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when every transmitted line has been acknowledged
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines in transmission order, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.line.as_str())
    }

    /// True while any entry of `origin` is unacknowledged
    pub fn contains(&self, origin: LineOrigin) -> bool {
        self.entries.iter().any(|entry| entry.origin == origin)
    }

    /// Drop every entry of `origin`, returning how many were dropped
    pub fn discard(&mut self, origin: LineOrigin) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.origin != origin);
        self.bytes = self.entries.iter().map(|entry| entry.len).sum();
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(line: &str) -> InFlightEntry {
        InFlightEntry {
            line: line.to_string(),
            len: line.len() + 1,
            origin: LineOrigin::Job,
        }
    }

    #[test]
    fn test_ledger_keeps_one_byte_free() {
        let mut ledger = InFlightLedger::new(128);
        assert_eq!(ledger.capacity(), 127);
        assert!(ledger.can_accept(127));
        assert!(!ledger.can_accept(128));

        ledger.push(entry(&"G".repeat(99)));
        assert_eq!(ledger.bytes(), 100);
        assert!(ledger.can_accept(27));
        assert!(!ledger.can_accept(28));
    }

    #[test]
    fn test_ledger_acknowledges_in_fifo_order() {
        let mut ledger = InFlightLedger::new(128);
        ledger.push(entry("G0X1"));
        ledger.push(entry("G0X2"));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.bytes(), 10);

        assert_eq!(ledger.acknowledge().map(|e| e.line), Some("G0X1".to_string()));
        assert_eq!(ledger.bytes(), 5);
        assert_eq!(ledger.acknowledge().map(|e| e.line), Some("G0X2".to_string()));
        assert!(ledger.is_empty());
        assert_eq!(ledger.bytes(), 0);
        assert_eq!(ledger.acknowledge(), None);
    }

    #[test]
    fn test_ledger_discards_by_origin() {
        let mut ledger = InFlightLedger::new(128);
        let flush = InFlightEntry {
            line: String::new(),
            len: 1,
            origin: LineOrigin::Flush,
        };
        ledger.push(flush.clone());
        ledger.push(entry("G0X1"));
        ledger.push(flush);
        assert!(ledger.contains(LineOrigin::Flush));
        assert_eq!(ledger.bytes(), 7);

        assert_eq!(ledger.discard(LineOrigin::Flush), 2);
        assert!(!ledger.contains(LineOrigin::Flush));
        assert_eq!(ledger.bytes(), 5);
        assert_eq!(ledger.lines().collect::<Vec<_>>(), vec!["G0X1"]);

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.bytes(), 0);
    }

    #[test]
    fn test_queue_counts_lines_and_sentinels() {
        let mut queue = CommandQueue::new();
        queue.push(QueueItem::Line(QueuedLine::job("G0X1")));
        queue.push(QueueItem::Line(QueuedLine::manual("$H")));
        queue.push(QueueItem::WaitIdle);
        queue.push(QueueItem::EndOfJob(JobId::new()));

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.line_count(), 2);
        assert_eq!(
            queue.pop(),
            Some(QueueItem::Line(QueuedLine::job("G0X1")))
        );
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_retain_lines_drops_sentinels() {
        let mut queue = CommandQueue::new();
        queue.push(QueueItem::Line(QueuedLine::job("G0X1")));
        queue.push(QueueItem::Line(QueuedLine::manual("$X")));
        queue.push(QueueItem::WaitIdle);
        queue.push_front(QueueItem::Line(QueuedLine::manual("$H")));

        queue.retain_lines(|line| line.text.starts_with('$'));
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.front(),
            Some(&QueueItem::Line(QueuedLine::manual("$H")))
        );
    }
}
