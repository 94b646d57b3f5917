//! Bounded circular buffer of recent dispatches and lifecycle events.
use std::collections::VecDeque;

use crate::message::EventTag;
use crate::state::StateId;

pub(crate) const DEFAULT_CAPACITY: usize = 20;

/// One processed dispatch or lifecycle event.
#[derive(Debug, Clone)]
pub struct LogRec {
    pub sequence: u64,
    pub what: EventTag,
    /// State that ultimately handled the message, after bubbling.
    pub handler: Option<StateId>,
    /// The active leaf at the moment dispatch began.
    pub origin: Option<StateId>,
    /// Requested transition target, if any.
    pub destination: Option<StateId>,
}

impl std::fmt::Display for LogRec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {:?} handler={:?} origin={:?} dest={:?}",
            self.sequence, self.what, self.handler, self.origin, self.destination
        )
    }
}

pub(crate) struct LogRing {
    capacity: usize,
    records: VecDeque<LogRec>,
    total_count: u64,
    next_sequence: u64,
}

impl LogRing {
    pub(crate) fn new(capacity: usize) -> Self {
        LogRing {
            capacity,
            records: VecDeque::with_capacity(capacity),
            total_count: 0,
            next_sequence: 0,
        }
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub(crate) fn push(
        &mut self,
        what: EventTag,
        handler: Option<StateId>,
        origin: Option<StateId>,
        destination: Option<StateId>,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.total_count += 1;

        if self.capacity == 0 {
            return;
        }
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(LogRec {
            sequence,
            what,
            handler,
            origin,
            destination,
        });
    }

    pub(crate) fn get(&self, index: usize) -> Option<&LogRec> {
        self.records.get(index)
    }

    pub(crate) fn size(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn count(&self) -> u64 {
        self.total_count
    }

    pub(crate) fn snapshot(&self) -> Vec<LogRec> {
        self.records.iter().cloned().collect()
    }
}
