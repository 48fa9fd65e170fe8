mod clock;
mod engine;
mod queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    Command, ControlHandle, PhaseScheduler, ScheduleState, SchedulerOptions, SchedulerState,
};
pub use queue::{PendingTimer, TimerId, TimerQueue};
