//! Logical transport clock.
//!
//! Every scheduler in the engine registers callbacks against one timeline and
//! the [`Transport`] runs them strictly in timestamp order (first-scheduled
//! first on ties). Callbacks receive the clock itself so they can schedule
//! their own continuation; that is how the drone scheduler perpetuates itself
//! and how chord cycles place their note triggers.
//!
//! Time is plain `f64` seconds. The transport never looks at a wall clock:
//! realtime hosts call [`Transport::advance_to`] with elapsed time plus a
//! lookahead, offline hosts advance as fast as they like.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

pub type EventId = u64;

pub type OnceCallback = Box<dyn FnOnce(&mut dyn TransportClock)>;

/// Repeating callback; return `ControlFlow::Break(())` to stop repeating.
pub type RepeatCallback = Box<dyn FnMut(&mut dyn TransportClock) -> ControlFlow<()>>;

/// Shortest accepted repeat interval, seconds.
pub const MIN_REPEAT_INTERVAL: f64 = 1.0e-3;

pub trait TransportClock {
    /// Current logical time, seconds.
    fn now(&self) -> f64;

    /// Run `callback` once, `relative_time` seconds from now. Negative or
    /// zero offsets run at the current time, after anything already queued
    /// for it.
    fn schedule_once(&mut self, callback: OnceCallback, relative_time: f64) -> EventId;

    /// Run `callback` at absolute `start_time` (clamped to now) and then every
    /// `interval` seconds until it breaks or is cleared.
    fn schedule_repeat(&mut self, callback: RepeatCallback, interval: f64, start_time: f64) -> EventId;

    /// Drop a pending event. Unknown or already-run ids are ignored.
    fn clear(&mut self, id: EventId);
}

/// Shared stop flag for self-scheduling work. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }
    #[inline] pub fn cancel(&self) { self.0.set(true); }
    #[inline] pub fn is_cancelled(&self) -> bool { self.0.get() }
}

enum Task {
    Once(OnceCallback),
    Repeat { callback: RepeatCallback, interval: f64 },
}

struct Entry {
    time: f64,
    seq: u64,
    id: EventId,
    task: Task,
}

// BinaryHeap is a max-heap; invert so the earliest (time, seq) pops first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}
impl Eq for Entry {}

/// Event-queue implementation of [`TransportClock`].
#[derive(Default)]
pub struct Transport {
    now: f64,
    queue: BinaryHeap<Entry>,
    live: HashSet<EventId>,
    next_id: EventId,
    next_seq: u64,
    executed: u64,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("now", &self.now)
            .field("pending", &self.live.len())
            .field("executed", &self.executed)
            .finish()
    }
}

impl Transport {
    pub fn new() -> Self { Self::default() }

    /// Number of events still scheduled.
    #[inline] pub fn pending(&self) -> usize { self.live.len() }

    /// Callbacks run since creation.
    #[inline] pub fn executed(&self) -> u64 { self.executed }

    fn push(&mut self, time: f64, id: EventId, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry { time, seq, id, task });
    }

    fn allocate(&mut self) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        id
    }

    /// Run every event due at or before `target`, then move the clock to
    /// `target`. Events scheduled by callbacks run in the same call when they
    /// fall inside the window. Returns the number of callbacks run.
    pub fn advance_to(&mut self, target: f64) -> usize {
        let mut ran = 0;
        while self.queue.peek().is_some_and(|head| head.time <= target) {
            let Some(entry) = self.queue.pop() else { break };
            if !self.live.contains(&entry.id) {
                continue;
            }
            self.now = self.now.max(entry.time);
            self.executed += 1;
            ran += 1;
            match entry.task {
                Task::Once(callback) => {
                    self.live.remove(&entry.id);
                    callback(self);
                }
                Task::Repeat { mut callback, interval } => {
                    let flow = callback(self);
                    if flow.is_continue() && self.live.contains(&entry.id) {
                        self.push(entry.time + interval, entry.id, Task::Repeat { callback, interval });
                    } else {
                        self.live.remove(&entry.id);
                    }
                }
            }
        }
        self.now = self.now.max(target);
        ran
    }

    #[inline]
    pub fn advance_by(&mut self, dt: f64) -> usize {
        self.advance_to(self.now + dt.max(0.0))
    }
}

impl TransportClock for Transport {
    #[inline]
    fn now(&self) -> f64 { self.now }

    fn schedule_once(&mut self, callback: OnceCallback, relative_time: f64) -> EventId {
        let id = self.allocate();
        let at = self.now + relative_time.max(0.0);
        self.push(at, id, Task::Once(callback));
        id
    }

    fn schedule_repeat(&mut self, callback: RepeatCallback, interval: f64, start_time: f64) -> EventId {
        let id = self.allocate();
        let at = start_time.max(self.now);
        let interval = interval.max(MIN_REPEAT_INTERVAL);
        self.push(at, id, Task::Repeat { callback, interval });
        id
    }

    fn clear(&mut self, id: EventId) {
        self.live.remove(&id);
    }
}
