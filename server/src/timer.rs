//! Room-time scheduler with cancellable handles.
//!
//! All game timers (phase countdowns, power-up spawns, ice walls) live in one [`Scheduler`]
//! driven by the room clock. Whoever arms a timer owns its [`TimerHandle`] and cancels it when
//! the state that armed it goes away; a fired handle that nobody owns any more is stale and is
//! ignored by the owner's check.

use blitz_shared::protocol::TeamId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One-second tick of the current phase countdown
    Countdown,
    PowerUpSpawn,
    /// Expiry of the ice wall in front of this team's goal
    IceWall(TeamId),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    due: f64,
    kind: TimerKind,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: BTreeMap<TimerHandle, Pending>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: f64, delay: f64, kind: TimerKind) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.pending.insert(
            handle,
            Pending {
                due: now + delay.max(0.0),
                kind,
            },
        );
        handle
    }

    /// Returns true if the timer was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Remove and return the earliest timer due at `now`, oldest handle first on ties.
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerHandle, TimerKind, f64)> {
        let (&handle, pending) = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .min_by(|a, b| a.1.due.total_cmp(&b.1.due).then(a.0.cmp(b.0)))?;
        let (kind, due) = (pending.kind, pending.due);
        self.pending.remove(&handle);
        Some((handle, kind, due))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Whole-second countdown backed by a chain of one-second timers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Countdown {
    pub remaining: u32,
    handle: TimerHandle,
}

impl Countdown {
    pub fn start(sched: &mut Scheduler, now: f64, seconds: u32) -> Self {
        Self {
            remaining: seconds,
            handle: sched.schedule(now, 1.0, TimerKind::Countdown),
        }
    }

    pub fn owns(&self, handle: TimerHandle) -> bool {
        self.handle == handle
    }

    /// Consume one second. Returns true when the countdown has run out; otherwise the next
    /// second is scheduled relative to `due` so late ticks do not drift.
    pub fn advance(&mut self, due: f64, sched: &mut Scheduler) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            return true;
        }
        self.handle = sched.schedule(due, 1.0, TimerKind::Countdown);
        false
    }

    pub fn cancel(&self, sched: &mut Scheduler) {
        sched.cancel(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_due_order() {
        let mut sched = Scheduler::new();
        let late = sched.schedule(0.0, 2.0, TimerKind::PowerUpSpawn);
        let early = sched.schedule(0.0, 1.0, TimerKind::Countdown);

        assert_eq!(sched.pop_due(0.5), None);
        assert_eq!(sched.pop_due(3.0).map(|t| t.0), Some(early));
        assert_eq!(sched.pop_due(3.0).map(|t| t.0), Some(late));
        assert!(sched.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut sched = Scheduler::new();
        let h = sched.schedule(0.0, 1.0, TimerKind::IceWall(TeamId::Red));
        assert!(sched.cancel(h));
        assert!(!sched.cancel(h));
        assert_eq!(sched.pop_due(10.0), None);
    }

    #[test]
    fn countdown_runs_out_after_n_advances() {
        let mut sched = Scheduler::new();
        let mut cd = Countdown::start(&mut sched, 0.0, 3);
        let mut now = 0.0;
        let mut finished = false;
        let mut ticks = 0;
        while !finished {
            now += 1.0;
            let (handle, kind, due) = sched.pop_due(now).expect("countdown tick pending");
            assert_eq!(kind, TimerKind::Countdown);
            assert!(cd.owns(handle));
            finished = cd.advance(due, &mut sched);
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert!(sched.is_empty());
    }

    #[test]
    fn cancelled_countdown_leaves_nothing_pending() {
        let mut sched = Scheduler::new();
        let cd = Countdown::start(&mut sched, 0.0, 10);
        cd.cancel(&mut sched);
        assert!(sched.is_empty());
    }
}
