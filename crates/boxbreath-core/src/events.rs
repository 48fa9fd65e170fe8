use serde::{Deserialize, Serialize};

use crate::pattern::{Phase, PhaseStep, Variant};

/// Emitted at the instant a phase begins.
///
/// Listeners observe these through the [`PhaseBus`](crate::bus::PhaseBus);
/// they are never stored by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub phase: Phase,
    pub step: PhaseStep,
    pub duration_seconds: f64,
    pub variant: Variant,
    /// Generation of the timer chain that produced this event.
    pub generation: u64,
    /// Full cycles completed in this generation before this phase began.
    pub cycle: u64,
    /// Scheduler clock time of the phase boundary, in milliseconds.
    pub at_ms: u64,
}

impl PhaseEvent {
    pub fn label(&self) -> &'static str {
        self.phase.label()
    }
}

/// Emitted when a cycle's last phase runs out, before the next cycle's first
/// phase begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub variant: Variant,
    pub generation: u64,
    /// Full cycles completed in this generation, this one included.
    pub cycles: u64,
    pub at_ms: u64,
}
