use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pattern::PhaseStep;

/// Handle of a scheduled phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

/// A deferred phase transition, tagged with the generation it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub due_ms: u64,
    pub generation: u64,
    /// Step to enter when the timer fires.
    pub step: PhaseStep,
}

/// Pending timers ordered by due time, then by issue order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    pending: BTreeMap<(u64, u64), PendingTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: u64, generation: u64, step: PhaseStep) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.insert(
            (due_ms, id.0),
            PendingTimer {
                id,
                due_ms,
                generation,
                step,
            },
        );
        id
    }

    /// Drop every pending timer. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// Remove and return every timer due at or before `now_ms`, earliest first.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<PendingTimer> {
        let later = self.pending.split_off(&(now_ms.saturating_add(1), 0));
        std::mem::replace(&mut self.pending, later)
            .into_values()
            .collect()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.keys().next().map(|(due, _)| *due)
    }

    pub fn handles(&self) -> Vec<TimerId> {
        self.pending.values().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_due_returns_in_due_order_and_keeps_future() {
        let mut q = TimerQueue::new();
        q.schedule(300, 0, PhaseStep::Exhale);
        q.schedule(100, 0, PhaseStep::Hold1);
        q.schedule(100, 1, PhaseStep::Inhale);
        q.schedule(900, 0, PhaseStep::Hold2);

        let due = q.pop_due(300);
        let steps: Vec<_> = due.iter().map(|t| t.step).collect();
        assert_eq!(steps, vec![PhaseStep::Hold1, PhaseStep::Inhale, PhaseStep::Exhale]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due_ms(), Some(900));
    }

    #[test]
    fn cancel_all_empties_queue() {
        let mut q = TimerQueue::new();
        q.schedule(5, 0, PhaseStep::Inhale);
        q.schedule(6, 0, PhaseStep::Exhale);
        assert_eq!(q.cancel_all(), 2);
        assert!(q.is_empty());
        assert!(q.pop_due(u64::MAX).is_empty());
        assert_eq!(q.next_due_ms(), None);
    }

    #[test]
    fn handles_are_unique() {
        let mut q = TimerQueue::new();
        let a = q.schedule(5, 0, PhaseStep::Inhale);
        let b = q.schedule(5, 0, PhaseStep::Inhale);
        assert_ne!(a, b);
        assert_eq!(q.handles(), vec![a, b]);
    }
}
