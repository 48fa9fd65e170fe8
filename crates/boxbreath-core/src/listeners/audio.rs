//! Assistance audio triggered by phase events.
//!
//! Sample loading and the mixing graph belong to the host's audio engine,
//! reached through [`CueSink`]. This side only decides which cue to play,
//! how fast, and how loud.

use serde::{Deserialize, Serialize};

use crate::bus::PhaseListener;
use crate::events::PhaseEvent;
use crate::pattern::Phase;

/// One-shot breath sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Inhale,
    Exhale,
}

/// The host audio engine.
pub trait CueSink {
    /// Start a one-shot instance of `cue`.
    fn start_cue(&mut self, cue: Cue, playback_rate: f64, gain: f64);

    /// Stop the running instance of `cue`, if any.
    fn stop_cue(&mut self, cue: Cue);

    /// Set the ambient background track's gain.
    fn set_background_gain(&mut self, _gain: f64) {}
}

/// Shortest phase or sample the rate fitting applies to.
const MIN_FIT_SECS: f64 = 0.05;
const MIN_RATE: f64 = 0.25;
const MAX_RATE: f64 = 4.0;

/// Playback rate that stretches a sample to fill the phase.
pub fn playback_rate(sample_secs: f64, phase_secs: f64) -> f64 {
    if phase_secs > MIN_FIT_SECS && sample_secs > MIN_FIT_SECS {
        (sample_secs / phase_secs).clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn clamp_level(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// Volume controls, each in 0.0 ..= 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixerLevels {
    pub master: f64,
    pub assist: f64,
    pub background: f64,
}

impl MixerLevels {
    pub fn new(master: f64, assist: f64, background: f64) -> Self {
        Self {
            master: clamp_unit(master),
            assist: clamp_unit(assist),
            background: clamp_unit(background),
        }
    }
}

impl Default for MixerLevels {
    fn default() -> Self {
        Self {
            master: 1.0,
            assist: 0.2,
            background: 0.0,
        }
    }
}

/// Plays inhale/exhale cues in step with the breathing phases.
#[derive(Debug)]
pub struct AudioCueTrigger<S: CueSink> {
    sink: S,
    levels: MixerLevels,
    inhale_level: f64,
    exhale_level: f64,
    inhale_sample_secs: Option<f64>,
    exhale_sample_secs: Option<f64>,
    armed: bool,
}

impl<S: CueSink> AudioCueTrigger<S> {
    pub const DEFAULT_CUE_LEVEL: f64 = 1.5;

    pub fn new(sink: S, levels: MixerLevels) -> Self {
        Self {
            sink,
            levels: MixerLevels::new(levels.master, levels.assist, levels.background),
            inhale_level: Self::DEFAULT_CUE_LEVEL,
            exhale_level: Self::DEFAULT_CUE_LEVEL,
            inhale_sample_secs: None,
            exhale_sample_secs: None,
            armed: false,
        }
    }

    /// Record the length of a loaded sample. Cues without a sample are silent.
    pub fn set_sample(&mut self, cue: Cue, secs: f64) {
        let secs = (secs.is_finite() && secs > 0.0).then_some(secs);
        match cue {
            Cue::Inhale => self.inhale_sample_secs = secs,
            Cue::Exhale => self.exhale_sample_secs = secs,
        }
    }

    pub fn set_cue_level(&mut self, cue: Cue, level: f64) {
        match cue {
            Cue::Inhale => self.inhale_level = clamp_level(level),
            Cue::Exhale => self.exhale_level = clamp_level(level),
        }
    }

    pub fn set_master_volume(&mut self, v: f64) {
        self.levels.master = clamp_unit(v);
        self.push_background();
    }

    pub fn set_assist_volume(&mut self, v: f64) {
        self.levels.assist = clamp_unit(v);
    }

    pub fn set_background_volume(&mut self, v: f64) {
        self.levels.background = clamp_unit(v);
        self.push_background();
    }

    pub fn levels(&self) -> MixerLevels {
        self.levels
    }

    /// Let cues play. Until armed, phase events are ignored.
    pub fn arm(&mut self) {
        if self.armed {
            return;
        }
        self.armed = true;
        self.push_background();
    }

    /// Silence everything and ignore further phase events.
    pub fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        self.sink.stop_cue(Cue::Inhale);
        self.sink.stop_cue(Cue::Exhale);
        self.sink.set_background_gain(0.0);
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn push_background(&mut self) {
        if self.armed {
            let gain = self.levels.background * self.levels.master;
            self.sink.set_background_gain(gain);
        }
    }

    fn trigger(&mut self, cue: Cue, phase_secs: f64) {
        let (sample, level) = match cue {
            Cue::Inhale => (self.inhale_sample_secs, self.inhale_level),
            Cue::Exhale => (self.exhale_sample_secs, self.exhale_level),
        };
        let Some(sample_secs) = sample else {
            return;
        };
        self.sink.stop_cue(cue);
        let rate = playback_rate(sample_secs, phase_secs);
        let gain = level * self.levels.assist * self.levels.master;
        self.sink.start_cue(cue, rate, gain);
    }
}

impl<S: CueSink> PhaseListener for AudioCueTrigger<S> {
    fn name(&self) -> &str {
        "audio-cues"
    }

    fn on_phase_event(&mut self, event: &PhaseEvent) {
        if !self.armed {
            return;
        }
        match event.phase {
            Phase::Inhale => self.trigger(Cue::Inhale, event.duration_seconds),
            Phase::Exhale => self.trigger(Cue::Exhale, event.duration_seconds),
            Phase::Hold => {}
        }
    }
}

/// A [`CueSink`] that only logs, for hosts without audio output.
#[derive(Debug, Default)]
pub struct TracingCueSink {
    started: u64,
}

impl TracingCueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues_started(&self) -> u64 {
        self.started
    }
}

impl CueSink for TracingCueSink {
    fn start_cue(&mut self, cue: Cue, playback_rate: f64, gain: f64) {
        self.started += 1;
        tracing::info!(?cue, playback_rate, gain, "audio cue");
    }

    fn stop_cue(&mut self, cue: Cue) {
        tracing::trace!(?cue, "audio cue stopped");
    }

    fn set_background_gain(&mut self, gain: f64) {
        tracing::debug!(gain, "background gain");
    }
}
