//! Phase scheduler implementation.
//!
//! The scheduler is a cooperative, single-threaded state machine. It does not
//! own a thread or a runtime - the host calls `tick()` whenever
//! `next_deadline_ms()` has passed (or more often; extra ticks are cheap).
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Idle
//! ```
//!
//! ## Cancellation
//!
//! Every scheduled transition carries the generation it was issued under.
//! `stop()`, `set_variant()` and `set_pattern()` advance the generation and
//! drop the queue, and a timer whose generation is stale does nothing when it
//! fires. Listeners never touch the scheduler directly: they post commands
//! through a [`ControlHandle`], which are applied between timer firings and
//! right after a cycle completes, before the next cycle's first phase.
//!
//! ## Usage
//!
//! ```ignore
//! let mut scheduler = PhaseScheduler::new(SystemClock::new(), Variant::Box, PatternSet::default());
//! scheduler.start();
//! // In a loop:
//! scheduler.tick(); // fires due phase boundaries
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::clock::{Clock, SystemClock};
use super::queue::{PendingTimer, TimerId, TimerQueue};
use crate::animation::{AnimationDriver, Frame};
use crate::bus::{PhaseBus, PhaseListener};
use crate::events::{CycleEvent, PhaseEvent};
use crate::pattern::{BreathingPattern, PatternSet, PhaseStep, Variant};

/// Upper bound on control commands applied in one drain, so a listener that
/// keeps restarting the scheduler cannot wedge the host loop.
const MAX_COMMANDS_PER_DRAIN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Requests a listener (or any other party) can post to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    SetVariant(Variant),
    SetPattern(BreathingPattern),
}

/// Cloneable mailbox into a scheduler.
///
/// Commands are applied the next time the scheduler runs (`tick()` or any
/// public command call), never in the middle of a phase event delivery.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: UnboundedSender<Command>,
}

impl ControlHandle {
    /// Post a command. Returns `false` if the scheduler has been dropped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn start(&self) -> bool {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    pub fn set_variant(&self, variant: Variant) -> bool {
        self.send(Command::SetVariant(variant))
    }

    pub fn set_pattern(&self, pattern: BreathingPattern) -> bool {
        self.send(Command::SetPattern(pattern))
    }
}

/// Presentation options that do not affect timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerOptions {
    /// Show the inhale/hold/exhale guide for non-box variants while running.
    pub show_guide: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { show_guide: true }
    }
}

/// Snapshot of a scheduler instance.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleState {
    pub running: bool,
    pub current_variant: Variant,
    pub active_pattern: BreathingPattern,
    pub pending_timers: Vec<TimerId>,
    pub cycle_guide_visible: bool,
    pub generation: u64,
    pub cycle: u64,
}

/// Drives a breathing pattern's phases in a loop.
pub struct PhaseScheduler<C: Clock = SystemClock> {
    clock: C,
    state: SchedulerState,
    variant: Variant,
    patterns: PatternSet,
    options: SchedulerOptions,
    generation: u64,
    /// Full cycles completed in the current generation.
    cycle: u64,
    /// Phase events emitted over the scheduler's lifetime.
    emitted: u64,
    timers: TimerQueue,
    driver: AnimationDriver,
    bus: PhaseBus,
    control_tx: UnboundedSender<Command>,
    control_rx: UnboundedReceiver<Command>,
}

impl<C: Clock> PhaseScheduler<C> {
    /// Create an idle scheduler. No timers exist until `start()`.
    pub fn new(clock: C, variant: Variant, patterns: PatternSet) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            clock,
            state: SchedulerState::Idle,
            variant,
            patterns,
            options: SchedulerOptions::default(),
            generation: 0,
            cycle: 0,
            emitted: 0,
            timers: TimerQueue::new(),
            driver: AnimationDriver::new(variant),
            bus: PhaseBus::new(),
            control_tx,
            control_rx,
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing bus (e.g. one shared with other components).
    pub fn with_bus(mut self, bus: PhaseBus) -> Self {
        self.bus = bus;
        self
    }

    /// Attach a listener at construction time.
    pub fn with_listener<L>(self, listener: L) -> Self
    where
        L: PhaseListener + 'static,
    {
        self.bus.subscribe(listener);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn active_pattern(&self) -> BreathingPattern {
        self.patterns.get(self.variant)
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn events_emitted(&self) -> u64 {
        self.emitted
    }

    pub fn pending_timers(&self) -> Vec<TimerId> {
        self.timers.handles()
    }

    /// When the host should call `tick()` next, on this scheduler's clock.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.timers.next_due_ms()
    }

    pub fn cycle_guide_visible(&self) -> bool {
        self.is_running() && self.options.show_guide && self.variant != Variant::Box
    }

    pub fn bus(&self) -> &PhaseBus {
        &self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn control(&self) -> ControlHandle {
        ControlHandle {
            tx: self.control_tx.clone(),
        }
    }

    /// Rendered state right now.
    pub fn frame(&self) -> Frame {
        self.driver.sample(self.clock.now_ms())
    }

    pub fn frame_at(&self, ms: u64) -> Frame {
        self.driver.sample(ms)
    }

    pub fn snapshot(&self) -> ScheduleState {
        ScheduleState {
            running: self.is_running(),
            current_variant: self.variant,
            active_pattern: self.active_pattern(),
            pending_timers: self.pending_timers(),
            cycle_guide_visible: self.cycle_guide_visible(),
            generation: self.generation,
            cycle: self.cycle,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin the loop at the first phase. No-op if already running.
    pub fn start(&mut self) -> bool {
        let started = self.start_chain();
        self.drain_commands();
        started
    }

    /// Cancel every pending transition and go idle. No-op if idle.
    ///
    /// No phase event is delivered after this returns.
    pub fn stop(&mut self) -> bool {
        let stopped = self.stop_chain();
        self.drain_commands();
        stopped
    }

    /// Switch the phase sequence. Restarts at the first phase if running.
    pub fn set_variant(&mut self, variant: Variant) {
        self.switch_variant(variant);
        self.drain_commands();
    }

    /// Replace the durations for `pattern`'s variant. Restarts at the first
    /// phase if running that variant.
    pub fn set_pattern(&mut self, pattern: BreathingPattern) {
        self.replace_pattern(pattern);
        self.drain_commands();
    }

    /// Fire every transition that is due. Returns the number of phase events
    /// emitted during this call.
    pub fn tick(&mut self) -> usize {
        let before = self.emitted;
        self.drain_commands();
        let now = self.clock.now_ms();
        loop {
            let due = self.timers.pop_due(now);
            if due.is_empty() {
                break;
            }
            for timer in due {
                self.fire(timer);
                self.drain_commands();
            }
        }
        (self.emitted - before) as usize
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Apply posted commands. Returns `true` if some were left queued.
    fn drain_commands(&mut self) -> bool {
        for _ in 0..MAX_COMMANDS_PER_DRAIN {
            match self.control_rx.try_recv() {
                Ok(command) => self.apply(command),
                Err(_) => return false,
            }
        }
        if self.control_rx.is_empty() {
            return false;
        }
        tracing::warn!("command limit reached; remaining commands deferred to next tick");
        true
    }

    fn apply(&mut self, command: Command) {
        tracing::debug!(?command, "applying control command");
        match command {
            Command::Start => {
                self.start_chain();
            }
            Command::Stop => {
                self.stop_chain();
            }
            Command::SetVariant(variant) => self.switch_variant(variant),
            Command::SetPattern(pattern) => self.replace_pattern(pattern),
        }
    }

    fn start_chain(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = SchedulerState::Running;
        let stale = self.timers.cancel_all();
        if stale > 0 {
            tracing::debug!(stale, "cleared stale timers on start");
        }
        self.cycle = 0;
        tracing::info!(
            variant = %self.variant,
            pattern = %self.active_pattern().cycle_label(),
            generation = self.generation,
            "phase scheduler started"
        );
        let now = self.clock.now_ms();
        self.enter(PhaseStep::Inhale, now);
        true
    }

    fn stop_chain(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.generation += 1;
        let cancelled = self.timers.cancel_all();
        self.state = SchedulerState::Idle;
        self.driver.freeze(self.clock.now_ms());
        tracing::info!(
            cancelled,
            generation = self.generation,
            cycles = self.cycle,
            "phase scheduler stopped"
        );
        true
    }

    fn switch_variant(&mut self, variant: Variant) {
        let now = self.clock.now_ms();
        self.generation += 1;
        self.variant = variant;
        self.driver.set_variant(variant, now);
        tracing::info!(%variant, generation = self.generation, "variant changed");
        if self.is_running() {
            self.restart_chain(now);
        }
    }

    fn replace_pattern(&mut self, pattern: BreathingPattern) {
        let target = pattern.variant();
        self.patterns.set(pattern);
        if target != self.variant {
            // The live chain keeps its generation; nothing it depends on changed.
            tracing::debug!(variant = %target, "stored pattern for inactive variant");
            return;
        }
        self.generation += 1;
        tracing::info!(
            pattern = %pattern.cycle_label(),
            generation = self.generation,
            "pattern changed"
        );
        if self.is_running() {
            let now = self.clock.now_ms();
            self.restart_chain(now);
        }
    }

    fn restart_chain(&mut self, now: u64) {
        let cancelled = self.timers.cancel_all();
        tracing::debug!(cancelled, "restarting chain at first phase");
        self.cycle = 0;
        self.driver.freeze(now);
        self.enter(PhaseStep::Inhale, now);
    }

    fn fire(&mut self, timer: PendingTimer) {
        if timer.generation != self.generation || !self.is_running() {
            tracing::debug!(
                id = ?timer.id,
                timer_generation = timer.generation,
                generation = self.generation,
                "voided stale timer"
            );
            return;
        }
        if timer.step == self.variant.sequence()[0] && !self.close_cycle(timer.due_ms) {
            return;
        }
        self.enter(timer.step, timer.due_ms);
    }

    /// Count a finished cycle and give listeners the chance to react before
    /// the next one begins. Returns `false` if a command applied in response
    /// stopped or replaced this chain.
    fn close_cycle(&mut self, at_ms: u64) -> bool {
        self.cycle += 1;
        let generation = self.generation;
        tracing::debug!(cycles = self.cycle, at_ms, "cycle complete");
        self.bus.publish_cycle(&CycleEvent {
            variant: self.variant,
            generation,
            cycles: self.cycle,
            at_ms,
        });
        self.drain_commands();
        self.is_running() && self.generation == generation
    }

    /// Enter `first`, skipping zero-length phases, then schedule the next
    /// boundary relative to `at_ms` so late ticks do not accumulate drift.
    fn enter(&mut self, first: PhaseStep, at_ms: u64) {
        let pattern = self.active_pattern();
        let mut step = first;

        // Normalization guarantees a positive phase within one lap.
        for _ in 0..self.variant.sequence().len() {
            let duration_ms = pattern.duration_ms(step);
            if duration_ms == 0 {
                tracing::trace!(?step, "zero-length phase, snapping");
                self.driver.begin(step, at_ms, 0, None);
                step = self.variant.next_step(step);
                if step == self.variant.sequence()[0] && !self.close_cycle(at_ms) {
                    return;
                }
                continue;
            }

            let phase = step.phase();
            self.driver.begin(step, at_ms, duration_ms, Some(phase));
            let next = self.variant.next_step(step);
            self.timers
                .schedule(at_ms.saturating_add(duration_ms), self.generation, next);

            let event = PhaseEvent {
                phase,
                step,
                duration_seconds: pattern.duration_secs(step),
                variant: self.variant,
                generation: self.generation,
                cycle: self.cycle,
                at_ms,
            };
            self.emitted += 1;
            tracing::debug!(
                phase = event.label(),
                duration = event.duration_seconds,
                at_ms,
                cycle = self.cycle,
                "phase boundary"
            );
            self.bus.publish(&event);
            return;
        }

        tracing::error!(variant = %self.variant, "pattern has no positive phase, chain halted");
    }
}

impl<C: Clock> Drop for PhaseScheduler<C> {
    fn drop(&mut self) {
        if self.is_running() {
            self.generation += 1;
            self.timers.cancel_all();
            tracing::debug!("scheduler dropped while running, timers cancelled");
        }
    }
}
