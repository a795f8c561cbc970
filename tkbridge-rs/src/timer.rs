//! One-shot and interval timers fired by the event loop.
//!
//! [`TimerQueue`] keeps timers in registration order.  Each loop iteration
//! calls [`TimerQueue::fire_due`] with the current time; every timer whose
//! target has passed fires once, in registration order.  One-shots are
//! removed before their callback runs; intervals are rescheduled to
//! `now + delay` before theirs does.
//!
//! Callbacks may add or cancel timers while the queue is firing:
//!
//! * a timer added during a pass fires in a later pass at the earliest,
//! * a timer cancelled before its turn in the current pass does not fire,
//! * an interval that cancels itself is not rescheduled.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// Handle returned when scheduling; used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Interval,
}

pub type TimerCallback = Rc<dyn Fn() -> Result<()>>;

/// A scheduled callback.
pub struct Timer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub delay: Duration,
    /// When the timer should next fire.
    pub target: Instant,
    callback: TimerCallback,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("delay", &self.delay)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

// ── TimerQueue ────────────────────────────────────────────────────────────────

pub struct TimerQueue {
    timers: RefCell<Vec<Timer>>,
    next_id: Cell<u64>,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue {
    pub fn new() -> Self {
        Self { timers: RefCell::new(Vec::new()), next_id: Cell::new(1) }
    }

    /// Fire `callback` once, `delay` from now.
    pub fn add_timeout<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.add(TimerKind::OneShot, delay, Rc::new(callback))
    }

    /// Fire `callback` every `delay` until cancelled.
    pub fn add_interval<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.add(TimerKind::Interval, delay, Rc::new(callback))
    }

    fn add(&self, kind: TimerKind, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let target = Instant::now() + delay;
        self.timers.borrow_mut().push(Timer { id, kind, delay, target, callback });
        debug!(%id, ?kind, ?delay, "timer scheduled");
        id
    }

    /// Remove a timer.  Returns `true` if it was scheduled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let removed = {
            let mut timers = self.timers.borrow_mut();
            timers.iter().position(|t| t.id == id).map(|pos| timers.remove(pos))
        };
        removed.is_some()
    }

    /// Fire every timer due at `now`; returns how many fired.
    ///
    /// An error from a callback stops the pass and is returned; timers not
    /// yet reached stay due for the next pass.
    pub fn fire_due(&self, now: Instant) -> Result<usize> {
        let due: Vec<TimerId> = self
            .timers
            .borrow()
            .iter()
            .filter(|t| t.target <= now)
            .map(|t| t.id)
            .collect();

        let mut fired = 0;
        for id in due {
            let callback = {
                let mut timers = self.timers.borrow_mut();
                // Cancelled by an earlier callback in this pass.
                let Some(pos) = timers.iter().position(|t| t.id == id) else { continue };
                match timers[pos].kind {
                    TimerKind::OneShot => timers.remove(pos).callback,
                    TimerKind::Interval => {
                        let timer = &mut timers[pos];
                        timer.target = now + timer.delay;
                        timer.callback.clone()
                    }
                }
            };
            fired += 1;
            callback()?;
        }
        Ok(fired)
    }

    /// Soonest target across all timers.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.timers.borrow().iter().map(|t| t.target).min()
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.borrow().iter().any(|t| t.id == id)
    }

    /// Target of a scheduled timer.
    pub fn target(&self, id: TimerId) -> Option<Instant> {
        self.timers.borrow().iter().find(|t| t.id == id).map(|t| t.target)
    }

    pub fn len(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.borrow().is_empty()
    }

    /// Drop every timer.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.timers.borrow_mut());
        debug!(count = dropped.len(), "timers cleared");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Result<()>) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, move || {
            c.set(c.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn ids_are_unique_and_cancel_removes() {
        let q = TimerQueue::new();
        let a = q.add_timeout(ms(10), || Ok(()));
        let b = q.add_interval(ms(10), || Ok(()));
        assert_ne!(a, b);
        assert_eq!(q.len(), 2);
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert!(!q.contains(a));
        assert!(q.contains(b));
    }

    #[test]
    fn one_shot_fires_once_and_is_removed() {
        let q = TimerQueue::new();
        let (count, cb) = counter();
        let before = Instant::now();
        let id = q.add_timeout(ms(500), cb);
        let target = q.target(id).unwrap();
        assert!(target >= before + ms(500));
        assert_eq!(q.fire_due(target - ms(1)).unwrap(), 0);
        assert_eq!(q.fire_due(target).unwrap(), 1);
        assert_eq!(q.fire_due(target + ms(500)).unwrap(), 0);
        assert_eq!(count.get(), 1);
        assert!(!q.contains(id));
    }

    #[test]
    fn interval_reschedules_from_now() {
        let q = TimerQueue::new();
        let (count, cb) = counter();
        let id = q.add_interval(ms(100), cb);
        let late = q.target(id).unwrap() + ms(30);
        q.fire_due(late).unwrap();
        assert_eq!(q.target(id), Some(late + ms(100)));
        assert_eq!(q.fire_due(late + ms(99)).unwrap(), 0);
        q.fire_due(late + ms(100)).unwrap();
        assert_eq!(count.get(), 2);
        assert!(q.contains(id));
    }

    #[test]
    fn due_timers_fire_in_registration_order() {
        let q = TimerQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (name, delay) in [("a", 30), ("b", 10), ("c", 20)] {
            let order = order.clone();
            q.add_timeout(ms(delay), move || {
                order.borrow_mut().push(name);
                Ok(())
            });
        }
        let start = Instant::now();
        assert_eq!(q.fire_due(start + ms(50)).unwrap(), 3);
        assert_eq!(*order.borrow(), ["a", "b", "c"]);
    }

    #[test]
    fn cancelling_a_later_timer_mid_pass_prevents_firing() {
        let q = Rc::new(TimerQueue::new());
        let (count, cb) = counter();
        let victim = Rc::new(Cell::new(None));
        let (q2, v2) = (Rc::downgrade(&q), victim.clone());
        q.add_timeout(ms(0), move || {
            if let (Some(q), Some(id)) = (q2.upgrade(), v2.get()) {
                q.cancel(id);
            }
            Ok(())
        });
        victim.set(Some(q.add_timeout(ms(0), cb)));
        let start = Instant::now();
        assert_eq!(q.fire_due(start + ms(1)).unwrap(), 1);
        assert_eq!(count.get(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn interval_cancelling_itself_is_not_rescheduled() {
        let q = Rc::new(TimerQueue::new());
        let me = Rc::new(Cell::new(None));
        let (q2, me2) = (Rc::downgrade(&q), me.clone());
        me.set(Some(q.add_interval(ms(10), move || {
            if let (Some(q), Some(id)) = (q2.upgrade(), me2.get()) {
                q.cancel(id);
            }
            Ok(())
        })));
        let start = Instant::now();
        assert_eq!(q.fire_due(start + ms(10)).unwrap(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn timers_added_during_a_pass_wait_for_the_next() {
        let q = Rc::new(TimerQueue::new());
        let (count, cb) = counter();
        let cb = Rc::new(cb);
        let q2 = Rc::downgrade(&q);
        q.add_timeout(ms(0), move || {
            let cb = cb.clone();
            if let Some(q) = q2.upgrade() {
                q.add_timeout(ms(0), move || cb());
            }
            Ok(())
        });
        let start = Instant::now();
        assert_eq!(q.fire_due(start + ms(1)).unwrap(), 1);
        assert_eq!(count.get(), 0);
        assert_eq!(q.len(), 1);
        assert_eq!(q.fire_due(Instant::now() + ms(1)).unwrap(), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn callback_error_stops_the_pass() {
        let q = TimerQueue::new();
        let (count, cb) = counter();
        q.add_timeout(ms(0), || Err(BridgeError::Toolkit("boom".into())));
        q.add_timeout(ms(0), cb);
        let start = Instant::now();
        assert!(q.fire_due(start + ms(1)).is_err());
        assert_eq!(count.get(), 0);
        assert_eq!(q.fire_due(start + ms(1)).unwrap(), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn next_wakeup_is_soonest_target() {
        let q = TimerQueue::new();
        assert!(q.next_wakeup().is_none());
        q.add_timeout(ms(200), || Ok(()));
        let b = q.add_timeout(ms(50), || Ok(()));
        assert_eq!(q.next_wakeup(), q.target(b));
        q.clear();
        assert!(q.is_empty());
    }
}
