//! # Boxbreath Core Library
//!
//! This library provides the phase-driven timing and animation engine behind
//! Boxbreath's guided breathing sessions. Every operation is available via a
//! standalone CLI binary; any graphical front end is a thin layer over the
//! same core.
//!
//! ## Architecture
//!
//! - **Phase Scheduler**: a clock-driven, cooperative state machine that the
//!   caller advances with `tick()`; every phase boundary is a generation-tagged
//!   timer, so stop and reconfigure never leave a stale transition behind
//! - **Animation Driver**: continuous fill/marker/label rendering that follows
//!   whatever the scheduler dictates
//! - **Phase Event Bus**: typed publish/subscribe from the scheduler to
//!   listeners such as the session counter and audio cues
//! - **Integrations**: HTTP clients for the pattern config server and the chat
//!   backend, plus plan extraction from chat replies
//! - **Storage**: TOML-based local configuration
//!
//! ## Key Components
//!
//! - [`PhaseScheduler`]: Core phase state machine
//! - [`BreathingPattern`]: Validated durations for one variant
//! - [`PhaseBus`]: Listener registry
//! - [`Config`]: Local configuration management

pub mod animation;
pub mod bus;
pub mod error;
pub mod events;
pub mod integrations;
pub mod listeners;
pub mod pattern;
pub mod plan;
pub mod storage;
pub mod timer;

pub use animation::{AnimationDriver, Frame, Point};
pub use bus::{ListenerId, PhaseBus, PhaseListener};
pub use error::{ConfigError, CoreError, Result};
pub use events::{CycleEvent, PhaseEvent};
pub use integrations::{
    ChatApi, ChatClient, ConfigApi, ConfigClient, ConfigUpdate, Conversation, RemoteConfig,
};
pub use listeners::{AudioCueTrigger, CueSink, MixerLevels, SessionCounter, TracingCueSink};
pub use pattern::{normalize, BreathingPattern, PatternSet, Phase, PhaseStep, RawPattern, Variant};
pub use plan::{extract_plan, parse_summary, summarize_plan, Plan, PlanSummary};
pub use storage::Config;
pub use timer::{Clock, ManualClock, PhaseScheduler, ScheduleState, SchedulerState, SystemClock};
