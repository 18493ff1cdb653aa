//! Logical-time timer queue.
//!
//! [`AsyncClock`] owns pending timers and the current logical time but never
//! runs a callback itself: callbacks usually need mutable access to whatever
//! owns the clock, so firing goes through a [`TimerHost`], which hands each due
//! timer back to its owner.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::{Error, Result};

/// How many fired or cancelled timers keep a queryable [`TimerState`].
pub const SETTLED_STATE_RETENTION: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Pending,
    Fired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub handle: TimerHandle,
    pub due_at: u64,
    pub order: u64,
}

/// A timer taken off the queue, ready to run.
pub struct DueTimer<C> {
    pub handle: TimerHandle,
    pub due_at: u64,
    pub callback: C,
}

struct ScheduledTask<C> {
    handle: TimerHandle,
    due_at: u64,
    order: u64,
    callback: C,
}

pub struct AsyncClock<C> {
    task_queue: Vec<ScheduledTask<C>>,
    states: HashMap<TimerHandle, TimerState>,
    settled: VecDeque<TimerHandle>,
    now_ms: u64,
    step_limit: usize,
    next_timer_id: u64,
    next_task_order: u64,
}

impl<C> fmt::Debug for AsyncClock<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncClock")
            .field("now_ms", &self.now_ms)
            .field("pending", &self.pending_timers())
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

impl<C> Default for AsyncClock<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> AsyncClock<C> {
    pub fn new() -> Self {
        Self::with_step_limit(10_000)
    }

    /// A zero limit is raised to one.
    pub fn with_step_limit(step_limit: usize) -> Self {
        Self {
            task_queue: Vec::new(),
            states: HashMap::new(),
            settled: VecDeque::new(),
            now_ms: 0,
            step_limit: step_limit.max(1),
            next_timer_id: 1,
            next_task_order: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }

    /// Caps how many timers a single `advance` may fire.
    pub fn set_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::InvalidConfig(
                "timer step limit requires at least 1 step".into(),
            ));
        }
        self.step_limit = max_steps;
        Ok(())
    }

    pub fn schedule_after(&mut self, delay_ms: u64, callback: C) -> TimerHandle {
        let handle = TimerHandle(self.next_timer_id);
        self.next_timer_id += 1;
        let order = self.next_task_order;
        self.next_task_order += 1;
        self.task_queue.push(ScheduledTask {
            handle,
            due_at: self.now_ms.saturating_add(delay_ms),
            order,
            callback,
        });
        self.states.insert(handle, TimerState::Pending);
        handle
    }

    /// Returns `true` when a pending timer was cancelled. Fired and already
    /// cancelled timers are left as they are.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let Some(pos) = self
            .task_queue
            .iter()
            .position(|task| task.handle == handle)
        else {
            return false;
        };
        self.task_queue.remove(pos);
        self.settle(handle, TimerState::Cancelled);
        true
    }

    pub fn cancel_all(&mut self) -> usize {
        let tasks = std::mem::take(&mut self.task_queue);
        for task in &tasks {
            self.settle(task.handle, TimerState::Cancelled);
        }
        tasks.len()
    }

    /// `None` for unknown handles and for settled timers older than the last
    /// [`SETTLED_STATE_RETENTION`] ones.
    pub fn state(&self, handle: TimerHandle) -> Option<TimerState> {
        self.states.get(&handle).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.task_queue.len()
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut timers = self
            .task_queue
            .iter()
            .map(|task| PendingTimer {
                handle: task.handle,
                due_at: task.due_at,
                order: task.order,
            })
            .collect::<Vec<_>>();
        timers.sort_by_key(|timer| (timer.due_at, timer.order));
        timers
    }

    pub fn next_due_at(&self) -> Option<u64> {
        self.task_queue.iter().map(|task| task.due_at).min()
    }

    /// Removes the earliest timer due at or before `limit` (registration order
    /// breaks ties), moves logical time up to its due time and marks it fired.
    pub fn take_next_due(&mut self, limit: u64) -> Option<DueTimer<C>> {
        let idx = self
            .task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due_at <= limit)
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)?;
        let task = self.task_queue.remove(idx);
        if task.due_at > self.now_ms {
            self.now_ms = task.due_at;
        }
        self.settle(task.handle, TimerState::Fired);
        Some(DueTimer {
            handle: task.handle,
            due_at: task.due_at,
            callback: task.callback,
        })
    }

    fn settle(&mut self, handle: TimerHandle, state: TimerState) {
        self.states.insert(handle, state);
        self.settled.push_back(handle);
        while self.settled.len() > SETTLED_STATE_RETENTION {
            if let Some(oldest) = self.settled.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    fn move_to(&mut self, target_ms: u64) {
        if target_ms > self.now_ms {
            self.now_ms = target_ms;
        }
    }

    fn starvation(&self, steps: usize) -> Error {
        Error::ClockStarvation {
            steps,
            now_ms: self.now_ms,
            pending: self.task_queue.len(),
        }
    }
}

/// Owner of an [`AsyncClock`] that knows how to run its callbacks.
pub trait TimerHost {
    type Callback;

    fn clock(&self) -> &AsyncClock<Self::Callback>;

    fn clock_mut(&mut self) -> &mut AsyncClock<Self::Callback>;

    fn fire_timer(&mut self, timer: DueTimer<Self::Callback>) -> Result<()>;
}

/// Moves logical time forward by `by_ms`, firing every timer that falls due on
/// the way, including timers scheduled by the callbacks themselves. Returns the
/// number of timers fired.
pub fn advance<H: TimerHost + ?Sized>(host: &mut H, by_ms: u64) -> Result<usize> {
    let target = host.clock().now_ms().saturating_add(by_ms);
    run_until(host, target)
}

pub fn advance_to<H: TimerHost + ?Sized>(host: &mut H, target_ms: u64) -> Result<usize> {
    let now = host.clock().now_ms();
    if target_ms < now {
        return Err(Error::InvalidOperation(format!(
            "advance_to requires target >= now_ms (target={target_ms}, now_ms={now})"
        )));
    }
    run_until(host, target_ms)
}

/// Fires timers in due order, jumping logical time to each one, until none
/// remain. Fails once `max_steps` timers have fired and more are still queued.
pub fn drain_all<H: TimerHost + ?Sized>(host: &mut H, max_steps: usize) -> Result<usize> {
    let mut steps = 0usize;
    while host.clock().next_due_at().is_some() {
        if steps >= max_steps {
            return Err(host.clock().starvation(steps));
        }
        let Some(timer) = host.clock_mut().take_next_due(u64::MAX) else {
            break;
        };
        steps += 1;
        host.fire_timer(timer)?;
    }
    Ok(steps)
}

fn run_until<H: TimerHost + ?Sized>(host: &mut H, target_ms: u64) -> Result<usize> {
    let limit = host.clock().step_limit();
    let mut steps = 0usize;
    while host
        .clock()
        .next_due_at()
        .is_some_and(|due_at| due_at <= target_ms)
    {
        if steps >= limit {
            return Err(host.clock().starvation(steps));
        }
        let Some(timer) = host.clock_mut().take_next_due(target_ms) else {
            break;
        };
        steps += 1;
        host.fire_timer(timer)?;
    }
    host.clock_mut().move_to(target_ms);
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Job {
        Log(&'static str),
        Chain(&'static str, u64, &'static str),
        Forever,
        CancelOther(TimerHandle),
    }

    #[derive(Default)]
    struct Recorder {
        clock: AsyncClock<Job>,
        fired: Vec<(u64, &'static str)>,
    }

    impl TimerHost for Recorder {
        type Callback = Job;

        fn clock(&self) -> &AsyncClock<Job> {
            &self.clock
        }

        fn clock_mut(&mut self) -> &mut AsyncClock<Job> {
            &mut self.clock
        }

        fn fire_timer(&mut self, timer: DueTimer<Job>) -> Result<()> {
            let now = self.clock.now_ms();
            match timer.callback {
                Job::Log(label) => self.fired.push((now, label)),
                Job::Chain(label, delay, next) => {
                    self.fired.push((now, label));
                    self.clock.schedule_after(delay, Job::Log(next));
                }
                Job::Forever => {
                    self.clock.schedule_after(1, Job::Forever);
                }
                Job::CancelOther(other) => {
                    self.clock.cancel(other);
                    self.fired.push((now, "cancel"));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn advance_fires_in_due_order_with_registration_tiebreak() -> Result<()> {
        let mut host = Recorder::default();
        host.clock.schedule_after(300, Job::Log("c"));
        host.clock.schedule_after(100, Job::Log("a"));
        host.clock.schedule_after(100, Job::Log("b"));
        host.clock.schedule_after(301, Job::Log("late"));

        assert_eq!(advance(&mut host, 300)?, 3);
        assert_eq!(host.fired, vec![(100, "a"), (100, "b"), (300, "c")]);
        assert_eq!(host.clock.now_ms(), 300);
        assert_eq!(host.clock.pending_count(), 1);
        Ok(())
    }

    #[test]
    fn chained_timers_fire_within_the_same_advance_when_due() -> Result<()> {
        let mut host = Recorder::default();
        host.clock.schedule_after(800, Job::Chain("save", 200, "reload"));

        assert_eq!(advance(&mut host, 1000)?, 2);
        assert_eq!(host.fired, vec![(800, "save"), (1000, "reload")]);

        host.clock.schedule_after(0, Job::Chain("edit", 1, "too-late"));
        assert_eq!(advance(&mut host, 0)?, 1);
        assert_eq!(host.clock.pending_count(), 1);
        Ok(())
    }

    #[test]
    fn cancelled_timers_never_fire() -> Result<()> {
        let mut host = Recorder::default();
        let doomed = host.clock.schedule_after(50, Job::Log("doomed"));
        let also_doomed = host.clock.schedule_after(20, Job::Log("also-doomed"));
        host.clock.schedule_after(10, Job::CancelOther(also_doomed));

        assert!(host.clock.cancel(doomed));
        assert!(!host.clock.cancel(doomed));
        advance(&mut host, 100)?;

        assert_eq!(host.fired, vec![(10, "cancel")]);
        assert_eq!(host.clock.state(doomed), Some(TimerState::Cancelled));
        assert_eq!(host.clock.state(also_doomed), Some(TimerState::Cancelled));
        Ok(())
    }

    #[test]
    fn fired_timers_cannot_be_cancelled() -> Result<()> {
        let mut host = Recorder::default();
        let handle = host.clock.schedule_after(5, Job::Log("once"));
        advance(&mut host, 5)?;
        assert!(!host.clock.cancel(handle));
        assert_eq!(host.clock.state(handle), Some(TimerState::Fired));
        Ok(())
    }

    #[test]
    fn settled_states_are_retained_up_to_a_bound() -> Result<()> {
        let mut host = Recorder::default();
        let first = host.clock.schedule_after(1, Job::Log("first"));
        host.clock.cancel(first);
        for _ in 0..SETTLED_STATE_RETENTION {
            let handle = host.clock.schedule_after(1, Job::Log("cycle"));
            assert!(host.clock.cancel(handle));
        }
        let fired = host.clock.schedule_after(1, Job::Log("kept"));
        advance(&mut host, 1)?;

        assert_eq!(host.clock.state(first), None);
        assert_eq!(host.clock.state(fired), Some(TimerState::Fired));
        assert!(host.clock.states.len() <= SETTLED_STATE_RETENTION);
        assert_eq!(host.clock.settled.len(), SETTLED_STATE_RETENTION);
        assert_eq!(host.clock.pending_count(), 0);
        Ok(())
    }

    #[test]
    fn drain_all_jumps_to_each_due_time() -> Result<()> {
        let mut host = Recorder::default();
        host.clock.schedule_after(800, Job::Chain("first", 800, "second"));
        assert_eq!(drain_all(&mut host, 10)?, 2);
        assert_eq!(host.fired, vec![(800, "first"), (1600, "second")]);
        assert_eq!(drain_all(&mut host, 0)?, 0);
        Ok(())
    }

    #[test]
    fn drain_all_reports_starvation_for_self_rescheduling_timers() {
        let mut host = Recorder::default();
        host.clock.schedule_after(1, Job::Forever);
        match drain_all(&mut host, 1000) {
            Err(Error::ClockStarvation { steps, pending, .. }) => {
                assert_eq!(steps, 1000);
                assert_eq!(pending, 1);
            }
            other => panic!("expected clock starvation, got {other:?}"),
        }
    }

    #[test]
    fn advance_is_bounded_by_the_step_limit() -> Result<()> {
        let mut host = Recorder::default();
        host.clock.set_step_limit(50)?;
        host.clock.schedule_after(1, Job::Forever);
        assert!(matches!(
            advance(&mut host, 10_000),
            Err(Error::ClockStarvation { steps: 50, .. })
        ));
        assert!(host.clock.set_step_limit(0).is_err());
        Ok(())
    }

    #[test]
    fn advance_to_rejects_going_backwards() -> Result<()> {
        let mut host = Recorder::default();
        advance(&mut host, 10)?;
        assert!(matches!(
            advance_to(&mut host, 5),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(advance_to(&mut host, 10)?, 0);
        Ok(())
    }
}
