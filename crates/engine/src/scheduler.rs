use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Cancellation token for a scheduled entry. Cancelling twice, or after the
/// entry already fired, does nothing.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

#[derive(Debug)]
struct Entry<A> {
    due_ms: u64,
    seq: u64,
    interval_ms: Option<u64>,
    action: A,
    cancelled: Rc<Cell<bool>>,
}

impl<A> PartialEq for Entry<A> {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl<A> Eq for Entry<A> {}

impl<A> PartialOrd for Entry<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for Entry<A> {
    // BinaryHeap is a max-heap; invert so the earliest (due, seq) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-threaded timer queue. Entries due at the same instant fire in
/// registration order.
#[derive(Debug)]
pub struct Scheduler<A> {
    queue: BinaryHeap<Entry<A>>,
    next_seq: u64,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<A: Clone> Scheduler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` once, `delay_ms` after `now_ms`.
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, action: A) -> TimerHandle {
        self.push(now_ms.saturating_add(delay_ms), None, action)
    }

    /// Runs `action` every `interval_ms` until cancelled.
    pub fn schedule_cycle(&mut self, now_ms: u64, interval_ms: u64, action: A) -> TimerHandle {
        let interval_ms = interval_ms.max(1);
        self.push(now_ms.saturating_add(interval_ms), Some(interval_ms), action)
    }

    /// Pops the next entry due at or before `now_ms`, skipping cancelled
    /// ones. Cyclic entries are re-armed before being returned.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<A> {
        loop {
            if self.queue.peek()?.due_ms > now_ms {
                return None;
            }
            let mut entry = self.queue.pop()?;
            if entry.cancelled.get() {
                continue;
            }

            match entry.interval_ms {
                Some(interval_ms) => {
                    let action = entry.action.clone();
                    entry.due_ms = entry.due_ms.saturating_add(interval_ms);
                    self.queue.push(entry);
                    return Some(action);
                }
                None => {
                    entry.cancelled.set(true);
                    return Some(entry.action);
                }
            }
        }
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue
            .iter()
            .filter(|entry| !entry.cancelled.get())
            .map(|entry| entry.due_ms)
            .min()
    }

    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .filter(|entry| !entry.cancelled.get())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    fn push(&mut self, due_ms: u64, interval_ms: Option<u64>, action: A) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let cancelled = Rc::new(Cell::new(false));
        self.queue.push(Entry {
            due_ms,
            seq,
            interval_ms,
            action,
            cancelled: Rc::clone(&cancelled),
        });
        TimerHandle { id: seq, cancelled }
    }
}
