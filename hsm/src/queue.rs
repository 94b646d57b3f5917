//! The single-consumer message queue bound to one machine.
//!
//! Ordered by `(priority, scheduled_at, sequence)`: front-inserted messages
//! (quit_now's marker, the post-transition deferred-queue flush) always sort
//! ahead of every normally-sent message. Within a priority class, ties break
//! by `(scheduled_at, sequence)` so delayed sends never overtake an
//! earlier-due message and same-instant sends stay FIFO.
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Front,
    Normal,
}

struct QueueItem {
    priority: Priority,
    scheduled_at: Instant,
    sequence: u64,
    message: Message,
}

impl QueueItem {
    fn key(&self) -> (Priority, Instant, u64) {
        (self.priority, self.scheduled_at, self.sequence)
    }
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for QueueItem {}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// What the dispatch loop should do next.
pub(crate) enum Dequeued {
    Message(Message),
    Quit,
    /// Non-blocking callers only: nothing is due right now.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuitState {
    None,
    Graceful,
    Immediate,
}

struct Inner {
    heap: BinaryHeap<Reverse<QueueItem>>,
    sequence: u64,
    quit: QuitState,
    stopped: bool,
}

/// FIFO-by-arrival, time-sorted, single-consumer message queue.
pub(crate) struct MessageQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl MessageQueue {
    pub(crate) fn new() -> Self {
        MessageQueue {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                sequence: 0,
                quit: QuitState::None,
                stopped: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn push(&self, mut inner: std::sync::MutexGuard<'_, Inner>, priority: Priority, scheduled_at: Instant, message: Message) {
        let sequence = inner.sequence;
        inner.sequence += 1;
        inner.heap.push(Reverse(QueueItem {
            priority,
            scheduled_at,
            sequence,
            message,
        }));
        drop(inner);
        self.ready.notify_all();
    }

    /// `send`: enqueue with `scheduled_at = now`. Silently dropped once the
    /// queue has been stopped (send-after-quit-consumed).
    pub(crate) fn send(&self, message: Message) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.stopped {
            return;
        }
        self.push(inner, Priority::Normal, Instant::now(), message);
    }

    /// `sendDelayed`: enqueue with `scheduled_at = now + delay`.
    pub(crate) fn send_delayed(&self, message: Message, delay: Duration) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.stopped {
            return;
        }
        self.push(inner, Priority::Normal, Instant::now() + delay, message);
    }

    /// `sendAtFront`: used internally to flush the deferred queue, always
    /// immediately due and ahead of any other pending message.
    pub(crate) fn send_at_front(&self, message: Message) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.stopped {
            return;
        }
        self.push(inner, Priority::Front, Instant::now(), message);
    }

    /// Graceful quit: marker conceptually at the tail. Modeled as a flag
    /// rather than a literal queued item so that messages sent *after*
    /// `quit()` but drained before the flag is observed are still
    /// processed, and the machine only halts once the queue is fully
    /// drained (see DESIGN.md).
    pub(crate) fn request_quit(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.quit == QuitState::None {
            inner.quit = QuitState::Graceful;
        }
        drop(inner);
        self.ready.notify_all();
    }

    /// Immediate quit: discards everything pending and arms the marker so
    /// the next dequeue returns `Quit` without waiting for due-ness.
    pub(crate) fn request_quit_now(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.heap.clear();
        inner.quit = QuitState::Immediate;
        inner.stopped = true;
        drop(inner);
        self.ready.notify_all();
    }

    /// Marks the queue stopped without touching pending messages or the
    /// quit marker. Used when the machine halts via
    /// `transition_to_halting_state` rather than `quit`/`quit_now`, so later
    /// sends are silently dropped instead of piling up forever.
    pub(crate) fn stop(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stopped = true;
    }

    fn try_pop_due(inner: &mut Inner, now: Instant) -> Option<Message> {
        match inner.heap.peek() {
            Some(Reverse(item)) if item.scheduled_at <= now => {
                Some(inner.heap.pop().unwrap().0.message)
            }
            _ => None,
        }
    }

    fn next_wake(inner: &Inner) -> Option<Instant> {
        inner.heap.peek().map(|Reverse(item)| item.scheduled_at)
    }

    /// Non-blocking: returns `Idle` immediately if nothing is ready, so a
    /// shared worker thread can move on to another machine.
    pub(crate) fn try_dequeue(&self) -> Dequeued {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if inner.quit == QuitState::Immediate {
            inner.quit = QuitState::None;
            return Dequeued::Quit;
        }
        if let Some(m) = Self::try_pop_due(&mut inner, now) {
            return Dequeued::Message(m);
        }
        if inner.quit == QuitState::Graceful && inner.heap.is_empty() {
            inner.quit = QuitState::None;
            inner.stopped = true;
            return Dequeued::Quit;
        }
        Dequeued::Idle
    }

    /// Blocks until a due message is ready or quit is requested and
    /// satisfied.
    pub(crate) fn dequeue_blocking(&self) -> Dequeued {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let now = Instant::now();
            if inner.quit == QuitState::Immediate {
                inner.quit = QuitState::None;
                return Dequeued::Quit;
            }
            if let Some(m) = Self::try_pop_due(&mut inner, now) {
                return Dequeued::Message(m);
            }
            if inner.quit == QuitState::Graceful && inner.heap.is_empty() {
                inner.quit = QuitState::None;
                inner.stopped = true;
                return Dequeued::Quit;
            }
            inner = match Self::next_wake(&inner) {
                Some(wake_at) if wake_at > now => {
                    let (guard, _timeout) = self
                        .ready
                        .wait_timeout(inner, wake_at - now)
                        .unwrap_or_else(|e| e.into_inner());
                    guard
                }
                _ => self.ready.wait(inner).unwrap_or_else(|e| e.into_inner()),
            };
        }
    }
}

/// Deferred queue: arrival order, flushed to the front of the main queue on
/// the next transition. Discarded on halt if no transition ever occurred.
pub(crate) struct DeferredQueue {
    items: VecDeque<Message>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        DeferredQueue {
            items: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.items.push_back(message);
    }

    /// Drains in arrival order; the caller re-sends each in that order via
    /// `send_at_front` so arrival order is preserved at the front.
    pub(crate) fn drain(&mut self) -> Vec<Message> {
        self.items.drain(..).collect()
    }
}
