//! Poll loops driven by an injectable [`Timer`].
//!
//! Both periodic activities (status every 5 s, progress every 500 ms) are
//! [`PollLoop`]s: wait one interval, run a step, record the tick, repeat until
//! the step says stop or someone stops the loop through its [`PollHandle`].

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

/// Source of delays. Tests substitute a timer that returns immediately.
#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}

/// Outcome of one loop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Cloneable stop flag for a running loop.
#[derive(Debug, Clone, Default)]
pub struct PollHandle {
    stopped: Rc<Cell<bool>>,
}

impl PollHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

/// A named periodic loop.
#[derive(Debug)]
pub struct PollLoop {
    name: &'static str,
    interval: Duration,
    running: bool,
    ticks: u64,
    handle: PollHandle,
}

impl PollLoop {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self::with_handle(name, interval, PollHandle::new())
    }

    /// Loop stopped through an existing handle.
    pub fn with_handle(name: &'static str, interval: Duration, handle: PollHandle) -> Self {
        Self {
            name,
            interval,
            running: false,
            ticks: 0,
            handle,
        }
    }

    pub fn handle(&self) -> PollHandle {
        self.handle.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.handle.is_stopped()
    }

    pub fn start(&mut self) {
        log::debug!("Starting {} loop ({:?})", self.name, self.interval);
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            log::debug!("Stopping {} loop after {} ticks", self.name, self.ticks);
        }
        self.running = false;
    }

    /// Record a completed step. Returns whether the loop keeps going.
    pub fn tick(&mut self, control: LoopControl) -> bool {
        self.ticks += 1;
        if control == LoopControl::Stop {
            self.stop();
        }
        self.is_running()
    }

    /// Run until a step returns [`LoopControl::Stop`] or the handle is
    /// stopped. Each step runs after one interval has elapsed.
    pub async fn run<F, Fut>(&mut self, timer: &dyn Timer, mut step: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LoopControl>,
    {
        self.start();
        while self.is_running() {
            timer.sleep(self.interval).await;
            // Stopped while asleep
            if !self.is_running() {
                break;
            }
            let control = step().await;
            if !self.tick(control) {
                break;
            }
        }
        self.stop();
    }
}
