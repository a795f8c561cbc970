//! Cooperative event loop.
//!
//! Everything runs on the loop's thread.  One iteration has two phases:
//!
//! ```text
//!   ┌──────────────────────────────────────────┐
//!   │  EventLoop::run()                        │
//!   │   1. pump one native event (no waiting)  │
//!   │   2. fire every due timer                │
//!   │   3. sleep `idle`, then repeat           │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! Native callbacks and timer callbacks therefore never overlap; a callback
//! that evaluates a script may still pump nested native events, which is
//! reentrancy rather than concurrency.  The timer clock is
//! [`tokio::time::Instant`], so paused-time tests drive the loop exactly.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Result;
use crate::interp::Interpreter;
use crate::timer::TimerQueue;

/// Default yield between iterations.
pub const DEFAULT_IDLE: Duration = Duration::from_millis(1);

/// Stops a running loop from inside a callback.
#[derive(Debug, Clone, Default)]
pub struct LoopControl(Rc<Cell<bool>>);

impl LoopControl {
    /// Make the loop return after the current iteration.
    pub fn stop(&self) {
        self.0.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.get()
    }

    /// Withdraw a pending stop request.
    pub fn reset(&self) {
        self.0.set(false);
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopTick {
    /// A native event was processed.
    pub pumped: bool,
    /// Timers fired.
    pub fired: usize,
}

pub struct EventLoop {
    interp: Rc<Interpreter>,
    timers: Rc<TimerQueue>,
    control: LoopControl,
    idle: Duration,
}

impl EventLoop {
    pub fn new(interp: Rc<Interpreter>, timers: Rc<TimerQueue>, idle: Duration) -> Self {
        Self { interp, timers, control: LoopControl::default(), idle }
    }

    pub fn control(&self) -> LoopControl {
        self.control.clone()
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// One iteration without the trailing sleep.
    pub fn run_once(&self) -> Result<LoopTick> {
        let pumped = self.interp.do_one_event();
        let fired = self.timers.fire_due(Instant::now())?;
        if pumped || fired > 0 {
            trace!(pumped, fired, "loop tick");
        }
        Ok(LoopTick { pumped, fired })
    }

    /// Iterate until [`LoopControl::stop`] is called or a timer callback
    /// fails.  Returns immediately if the loop was already stopped.
    ///
    /// Returning consumes the stop request, so a later `run` iterates again.
    pub async fn run(&self) -> Result<()> {
        debug!(idle = ?self.idle, "event loop started");
        let outcome = self.iterate().await;
        self.control.reset();
        debug!("event loop stopped");
        outcome
    }

    async fn iterate(&self) -> Result<()> {
        while !self.control.is_stopped() {
            self.run_once()?;
            if self.control.is_stopped() {
                break;
            }
            tokio::time::sleep(self.idle).await;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
