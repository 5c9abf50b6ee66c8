//! Frame scheduler.
//!
//! # Motivation
//!
//! Stylesheet modification spreads expensive work across frames so a
//! page with hundreds of sheets stays responsive. Instead of hiding
//! that behind an event loop, the scheduler is an explicit object the
//! session owns and tests drive by hand with [`FrameScheduler::tick`].
//!
//! # Design
//!
//! Three facilities:
//! - a task queue that runs queued closures each tick until the frame
//!   budget (1000/60 ms) is spent and carries the rest over,
//! - throttled callbacks that run at most once immediately and once
//!   more at the end of the frame no matter how often they fire,
//! - cancellation tokens checked by deferred continuations.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Wall-clock budget of one frame; budgeted queues stop draining once
/// it is spent and carry the rest over.
pub const FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 60);

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerInner {
    tasks: RefCell<VecDeque<Task>>,
    frame_callbacks: RefCell<Vec<Task>>,
}

/// Cooperative single-threaded scheduler. Nothing runs until `tick()`.
#[derive(Clone, Default)]
pub struct FrameScheduler {
    inner: Rc<SchedulerInner>,
}

impl FrameScheduler {
    pub fn new() -> FrameScheduler {
        FrameScheduler::default()
    }

    /// Queues a task for the budgeted queue.
    pub fn add_task(&self, task: impl FnOnce() + 'static) {
        self.inner.tasks.borrow_mut().push_back(Box::new(task));
    }

    /// Queues a callback that runs at the start of the next tick,
    /// before the task queue.
    pub fn on_next_frame(&self, callback: impl FnOnce() + 'static) {
        self.inner
            .frame_callbacks
            .borrow_mut()
            .push(Box::new(callback));
    }

    pub fn has_work(&self) -> bool {
        !self.inner.tasks.borrow().is_empty() || !self.inner.frame_callbacks.borrow().is_empty()
    }

    /// Runs one frame: pending frame callbacks first, then queued tasks
    /// until the frame budget runs out. Overrun tasks stay queued for
    /// the next tick.
    pub fn tick(&self) {
        let callbacks = std::mem::take(&mut *self.inner.frame_callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }

        let start = Instant::now();
        loop {
            // Tasks may queue more tasks, so the queue borrow cannot be
            // held across the call.
            let task = self.inner.tasks.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            if start.elapsed() >= FRAME_DURATION {
                break;
            }
        }
    }

    /// Drives ticks until no work remains.
    pub fn run_to_completion(&self) {
        while self.has_work() {
            self.tick();
        }
    }

    pub fn clear(&self) {
        self.inner.tasks.borrow_mut().clear();
        self.inner.frame_callbacks.borrow_mut().clear();
    }

    /// Wraps a callback so repeated calls within one frame coalesce:
    /// the first call runs immediately, later calls collapse into one
    /// trailing run at the next tick.
    pub fn throttle(&self, callback: impl Fn() + 'static) -> Throttled {
        Throttled {
            scheduler: self.clone(),
            state: Rc::new(ThrottleState {
                in_frame: Cell::new(false),
                pending: Cell::new(false),
                cancelled: Cell::new(false),
            }),
            callback: Rc::new(callback),
        }
    }
}

struct ThrottleState {
    in_frame: Cell<bool>,
    pending: Cell<bool>,
    cancelled: Cell<bool>,
}

#[derive(Clone)]
pub struct Throttled {
    scheduler: FrameScheduler,
    state: Rc<ThrottleState>,
    callback: Rc<dyn Fn()>,
}

impl Throttled {
    pub fn call(&self) {
        if self.state.cancelled.get() {
            return;
        }
        if self.state.in_frame.get() {
            self.state.pending.set(true);
            return;
        }
        (self.callback)();
        self.state.in_frame.set(true);
        let state = Rc::clone(&self.state);
        let callback = Rc::clone(&self.callback);
        self.scheduler.on_next_frame(move || {
            state.in_frame.set(false);
            if state.pending.replace(false) && !state.cancelled.get() {
                callback();
            }
        });
    }

    /// Drops the trailing run and ignores further calls.
    pub fn cancel(&self) {
        self.state.cancelled.set(true);
        self.state.pending.set(false);
    }
}

/// Shared cancellation flag for deferred continuations.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== task queue =====

    #[test]
    fn test_tasks_run_only_on_tick() {
        let scheduler = FrameScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        scheduler.add_task(move || c.set(c.get() + 1));
        assert_eq!(count.get(), 0);
        scheduler.tick();
        assert_eq!(count.get(), 1);
        scheduler.tick();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_tasks_can_enqueue_tasks() {
        let scheduler = FrameScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&order);
        let inner_scheduler = scheduler.clone();
        scheduler.add_task(move || {
            o.borrow_mut().push("outer");
            let o2 = Rc::clone(&o);
            inner_scheduler.add_task(move || o2.borrow_mut().push("inner"));
        });
        scheduler.run_to_completion();
        assert_eq!(*order.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_clear_drops_queued_work() {
        let scheduler = FrameScheduler::new();
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        scheduler.add_task(move || r.set(true));
        scheduler.clear();
        scheduler.tick();
        assert!(!ran.get());
    }

    // ===== throttling =====

    #[test]
    fn test_throttle_coalesces_within_frame() {
        let scheduler = FrameScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let throttled = scheduler.throttle(move || c.set(c.get() + 1));

        throttled.call();
        throttled.call();
        throttled.call();
        // Leading call ran immediately, the rest collapsed.
        assert_eq!(count.get(), 1);
        scheduler.tick();
        assert_eq!(count.get(), 2);
        // Nothing pending anymore.
        scheduler.tick();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_throttle_cancel_drops_trailing_run() {
        let scheduler = FrameScheduler::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let throttled = scheduler.throttle(move || c.set(c.get() + 1));
        throttled.call();
        throttled.call();
        throttled.cancel();
        scheduler.tick();
        assert_eq!(count.get(), 1);
        throttled.call();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
