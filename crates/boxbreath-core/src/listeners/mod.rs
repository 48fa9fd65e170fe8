//! Phase event listeners.
//!
//! Listeners only observe. Anything that needs to change the schedule goes
//! through a [`ControlHandle`](crate::timer::ControlHandle).

mod audio;
mod session;

pub use audio::{playback_rate, AudioCueTrigger, Cue, CueSink, MixerLevels, TracingCueSink};
pub use session::{SessionCounter, SessionProgress};
