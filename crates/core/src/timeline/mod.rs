//! Deterministic frame and timer scheduling.
//!
//! Stands in for the browser's animation-frame scheduler and timer queue.
//! Nothing runs until the host drives it with [`Scheduler::advance`] and
//! [`Scheduler::run_frame`] (or [`Scheduler::tick`] for both), which keeps
//! animation loops reproducible in tests and in the headless CLI.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Callback invoked with the frame timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;
pub type TimerCallback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Either kind of pending task. Visualization state keeps one of these
/// instead of a raw id so cancellation always goes to the right queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskHandle {
    Frame(FrameHandle),
    Timer(TimerHandle),
}

impl From<FrameHandle> for TaskHandle {
    fn from(handle: FrameHandle) -> Self {
        Self::Frame(handle)
    }
}

impl From<TimerHandle> for TaskHandle {
    fn from(handle: TimerHandle) -> Self {
        Self::Timer(handle)
    }
}

/// Entries recorded when the journal is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    FrameRequested(FrameHandle),
    FrameCancelled(FrameHandle),
    TimerSet(TimerHandle),
    TimerCleared(TimerHandle),
}

struct Timer {
    due: f64,
    callback: TimerCallback,
}

#[derive(Default)]
struct SchedulerState {
    now: f64,
    next_id: u64,
    frames: BTreeMap<u64, FrameCallback>,
    timers: BTreeMap<u64, Timer>,
    journal: Option<Vec<SchedulerEvent>>,
}

impl SchedulerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, event: SchedulerEvent) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(event);
        }
    }
}

/// Shared handle to the single-threaded scheduler. Clones refer to the same
/// queues.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that records every request and cancellation.
    pub fn with_journal() -> Self {
        let scheduler = Self::new();
        scheduler.inner.borrow_mut().journal = Some(Vec::new());
        scheduler
    }

    /// Current time in milliseconds.
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    pub fn request_frame(&self, callback: impl FnOnce(f64) + 'static) -> FrameHandle {
        let mut state = self.inner.borrow_mut();
        let handle = FrameHandle(state.next_id());
        state.frames.insert(handle.0, Box::new(callback));
        state.record(SchedulerEvent::FrameRequested(handle));
        handle
    }

    /// Returns `false` when the frame already ran or was cancelled.
    pub fn cancel_frame(&self, handle: FrameHandle) -> bool {
        let mut state = self.inner.borrow_mut();
        let removed = state.frames.remove(&handle.0).is_some();
        if removed {
            state.record(SchedulerEvent::FrameCancelled(handle));
        }
        removed
    }

    pub fn set_timeout(&self, delay_ms: f64, callback: impl FnOnce() + 'static) -> TimerHandle {
        let mut state = self.inner.borrow_mut();
        let handle = TimerHandle(state.next_id());
        let due = state.now + delay_ms.max(0.0);
        state.timers.insert(
            handle.0,
            Timer {
                due,
                callback: Box::new(callback),
            },
        );
        state.record(SchedulerEvent::TimerSet(handle));
        handle
    }

    pub fn clear_timeout(&self, handle: TimerHandle) -> bool {
        let mut state = self.inner.borrow_mut();
        let removed = state.timers.remove(&handle.0).is_some();
        if removed {
            state.record(SchedulerEvent::TimerCleared(handle));
        }
        removed
    }

    pub fn cancel(&self, task: TaskHandle) -> bool {
        match task {
            TaskHandle::Frame(handle) => self.cancel_frame(handle),
            TaskHandle::Timer(handle) => self.clear_timeout(handle),
        }
    }

    pub fn is_pending(&self, task: TaskHandle) -> bool {
        let state = self.inner.borrow();
        match task {
            TaskHandle::Frame(handle) => state.frames.contains_key(&handle.0),
            TaskHandle::Timer(handle) => state.timers.contains_key(&handle.0),
        }
    }

    pub fn pending_frames(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn journal(&self) -> Vec<SchedulerEvent> {
        self.inner.borrow().journal.clone().unwrap_or_default()
    }

    /// Moves the clock forward, firing due timers in deadline order. Timers
    /// scheduled by a callback fire in the same call if they fall inside the
    /// window.
    pub fn advance(&self, delta_ms: f64) {
        let target = self.now() + delta_ms.max(0.0);
        loop {
            let next = {
                let mut state = self.inner.borrow_mut();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by(|(a_id, a), (b_id, b)| a.due.total_cmp(&b.due).then(a_id.cmp(b_id)))
                    .map(|(id, _)| *id);
                due.and_then(|id| state.timers.remove(&id)).map(|timer| {
                    state.now = state.now.max(timer.due);
                    timer.callback
                })
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
        self.inner.borrow_mut().now = target;
    }

    /// Runs every frame callback requested before this call. Callbacks that
    /// request another frame land in the next one. Returns how many ran.
    pub fn run_frame(&self) -> usize {
        let (now, frames) = {
            let mut state = self.inner.borrow_mut();
            (state.now, std::mem::take(&mut state.frames))
        };
        let count = frames.len();
        for (_, callback) in frames {
            callback(now);
        }
        count
    }

    /// Advances by one frame interval and runs the frame.
    pub fn tick(&self, frame_ms: f64) -> usize {
        self.advance(frame_ms);
        self.run_frame()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &state.now)
            .field("frames", &state.frames.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn frames_requested_during_a_frame_run_next_time() {
        let scheduler = Scheduler::new();
        let runs = Rc::new(Cell::new(0));

        let inner = scheduler.clone();
        let counter = runs.clone();
        scheduler.request_frame(move |_| {
            counter.set(counter.get() + 1);
            let counter = counter.clone();
            inner.request_frame(move |_| counter.set(counter.get() + 1));
        });

        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduler.pending_frames(), 1);
        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn cancelled_frames_never_run() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let handle = scheduler.request_frame(move |_| flag.set(true));

        assert!(scheduler.cancel_frame(handle));
        assert!(!scheduler.cancel_frame(handle));
        scheduler.run_frame();
        assert!(!ran.get());
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (delay, label) in [(30.0, "late"), (10.0, "early"), (20.0, "middle")] {
            let order = order.clone();
            scheduler.set_timeout(delay, move || order.borrow_mut().push(label));
        }

        scheduler.advance(15.0);
        assert_eq!(*order.borrow(), vec!["early"]);
        scheduler.advance(15.0);
        assert_eq!(*order.borrow(), vec!["early", "middle", "late"]);
        assert_eq!(scheduler.now(), 30.0);
    }

    #[test]
    fn chained_timers_inside_the_window_fire() {
        let scheduler = Scheduler::new();
        let fired = Rc::new(Cell::new(0));
        let inner = scheduler.clone();
        let count = fired.clone();
        scheduler.set_timeout(5.0, move || {
            count.set(count.get() + 1);
            let count = count.clone();
            inner.set_timeout(5.0, move || count.set(count.get() + 1));
        });

        scheduler.advance(10.0);
        assert_eq!(fired.get(), 2);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn journal_records_requests_and_cancellations() {
        let scheduler = Scheduler::with_journal();
        let frame = scheduler.request_frame(|_| {});
        scheduler.cancel(frame.into());
        let timer = scheduler.set_timeout(1.0, || {});
        scheduler.cancel(timer.into());

        assert_eq!(
            scheduler.journal(),
            vec![
                SchedulerEvent::FrameRequested(frame),
                SchedulerEvent::FrameCancelled(frame),
                SchedulerEvent::TimerSet(timer),
                SchedulerEvent::TimerCleared(timer),
            ]
        );
    }
}
