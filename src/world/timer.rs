use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::world::time::GameTick;

/// Handle for a countdown registered in a [`TimerQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountdownId(pub u64);

#[derive(Clone, Copy, Debug)]
struct TimerEntry {
    due: GameTick,
    seq: u64,
    id: CountdownId,
    generation: u64,
}

/// Min-heap by deadline, ties broken by scheduling order.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

#[derive(Debug)]
struct CountdownSlot<E> {
    event: E,
    // Bumped on every set_end/cancel; heap entries carrying an older value are stale.
    generation: u64,
    due: Option<GameTick>,
    one_shot: bool,
}

/// Single-threaded cooperative timer queue.
///
/// Timers carry a typed event instead of a closure. The owner drains due
/// events with [`TimerQueue::pop_due`] and dispatches them itself, so a
/// handler is free to reschedule or cancel any countdown, including the one
/// that just fired. Rescheduling a countdown invalidates its previous firing
/// through a generation counter; cancelling guarantees the event is never
/// returned.
#[derive(Debug)]
pub struct TimerQueue<E> {
    heap: BinaryHeap<TimerEntry>,
    slots: HashMap<CountdownId, CountdownSlot<E>>,
    next_id: u64,
    next_seq: u64,
}

impl<E: Clone> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> TimerQueue<E> {
    pub fn new() -> Self {
        TimerQueue {
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// Registers an idle countdown that fires `event` once armed with `set_end`.
    pub fn create(&mut self, event: E) -> CountdownId {
        self.insert_slot(event, false)
    }

    /// One-shot timer; its handle is released after it fires.
    pub fn schedule(&mut self, at: GameTick, event: E) -> CountdownId {
        let id = self.insert_slot(event, true);
        self.set_end(id, at);
        id
    }

    /// Arms (or re-arms) the countdown. Returns false for unknown handles.
    pub fn set_end(&mut self, id: CountdownId, at: GameTick) -> bool {
        let seq = self.next_seq;
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        slot.due = Some(at);
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(TimerEntry {
            due: at,
            seq,
            id,
            generation: slot.generation,
        });
        true
    }

    /// Stops the countdown without releasing it. Returns true if it was running.
    pub fn cancel(&mut self, id: CountdownId) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        slot.due.take().is_some()
    }

    /// Releases the countdown; a pending firing is dropped.
    pub fn remove(&mut self, id: CountdownId) -> Option<E> {
        self.slots.remove(&id).map(|slot| slot.event)
    }

    pub fn set_event(&mut self, id: CountdownId, event: E) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.event = event;
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: CountdownId) -> bool {
        self.slots
            .get(&id)
            .map(|slot| slot.due.is_some())
            .unwrap_or(false)
    }

    pub fn end_of(&self, id: CountdownId) -> Option<GameTick> {
        self.slots.get(&id).and_then(|slot| slot.due)
    }

    pub fn remaining(&self, id: CountdownId, now: GameTick) -> Option<u64> {
        self.end_of(id).map(|due| due.saturating_since(now))
    }

    /// Deadline of the earliest live countdown.
    pub fn next_due(&mut self) -> Option<GameTick> {
        self.discard_stale();
        self.heap.peek().map(|entry| entry.due)
    }

    /// Pops the earliest countdown whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: GameTick) -> Option<(CountdownId, E)> {
        self.discard_stale();
        let entry = *self.heap.peek()?;
        if entry.due > now {
            return None;
        }
        self.heap.pop();
        let slot = self.slots.get_mut(&entry.id)?;
        slot.due = None;
        if slot.one_shot {
            let slot = self.slots.remove(&entry.id)?;
            return Some((entry.id, slot.event));
        }
        Some((entry.id, slot.event.clone()))
    }

    /// Number of armed countdowns.
    pub fn len(&self) -> usize {
        self.slots.values().filter(|slot| slot.due.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_slot(&mut self, event: E, one_shot: bool) -> CountdownId {
        let id = CountdownId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.slots.insert(
            id,
            CountdownSlot {
                event,
                generation: 0,
                due: None,
                one_shot,
            },
        );
        id
    }

    fn discard_stale(&mut self) {
        while let Some(entry) = self.heap.peek() {
            let live = self
                .slots
                .get(&entry.id)
                .map(|slot| slot.generation == entry.generation && slot.due == Some(entry.due))
                .unwrap_or(false);
            if live {
                return;
            }
            self.heap.pop();
        }
    }
}
