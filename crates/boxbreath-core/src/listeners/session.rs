use serde::Serialize;

use crate::bus::PhaseListener;
use crate::events::{CycleEvent, PhaseEvent};
use crate::timer::ControlHandle;

/// Progress of a guided session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub completed_cycles: u64,
    /// `0` means unlimited.
    pub target_cycles: u64,
    pub finished: bool,
}

/// Counts completed breathing cycles and stops the scheduler once the
/// target is reached.
///
/// Cycles completed before a reconfiguration restart are kept, so changing
/// the pattern mid-session does not reset the count.
#[derive(Debug)]
pub struct SessionCounter {
    control: ControlHandle,
    target_cycles: u64,
    /// Cycles banked from earlier generations.
    banked: u64,
    /// (generation, cycles completed in it) of the last event seen.
    current: Option<(u64, u64)>,
    finished: bool,
}

impl SessionCounter {
    pub const DEFAULT_TARGET: u64 = 5;

    pub fn new(control: ControlHandle, target_cycles: u64) -> Self {
        Self {
            control,
            target_cycles,
            banked: 0,
            current: None,
            finished: false,
        }
    }

    pub fn completed_cycles(&self) -> u64 {
        self.banked + self.current.map(|(_, c)| c).unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            completed_cycles: self.completed_cycles(),
            target_cycles: self.target_cycles,
            finished: self.finished,
        }
    }

    /// Start counting a fresh session.
    pub fn reset(&mut self) {
        self.banked = 0;
        self.current = None;
        self.finished = false;
    }

    fn observe(&mut self, generation: u64, cycles: u64) {
        if let Some((seen, done)) = self.current {
            if seen != generation {
                self.banked += done;
            }
        }
        self.current = Some((generation, cycles));
    }
}

impl PhaseListener for SessionCounter {
    fn name(&self) -> &str {
        "session-counter"
    }

    fn on_phase_event(&mut self, event: &PhaseEvent) {
        if !self.finished {
            self.observe(event.generation, event.cycle);
        }
    }

    /// The stop is posted here so it lands on the cycle boundary, before the
    /// next inhale reaches anyone.
    fn on_cycle_complete(&mut self, event: &CycleEvent) {
        if self.finished {
            return;
        }
        self.observe(event.generation, event.cycles);

        if self.target_cycles > 0 && self.completed_cycles() >= self.target_cycles {
            self.finished = true;
            tracing::info!(
                cycles = self.completed_cycles(),
                "session target reached, requesting stop"
            );
            if !self.control.stop() {
                tracing::warn!("scheduler gone before session stop could be posted");
            }
        }
    }
}
