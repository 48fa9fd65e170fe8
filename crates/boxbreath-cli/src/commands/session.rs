use std::cell::RefCell;
use std::rc::Rc;

use boxbreath_core::listeners::Cue;
use boxbreath_core::{
    AudioCueTrigger, BreathingPattern, Clock, Config, Frame, ManualClock, PhaseEvent,
    PhaseScheduler, SessionCounter, SystemClock, TracingCueSink, Variant,
};
use clap::Args;
use serde::Serialize;

use super::{print_line, runtime, PatternSelector};

/// Sampling interval for `simulate --frames`.
const FRAME_INTERVAL_MS: u64 = 250;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    select: PatternSelector,
    /// Do not trigger assistance audio cues
    #[arg(long)]
    mute: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    select: PatternSelector,
    /// Virtual seconds to simulate
    #[arg(long, default_value_t = 60.0)]
    seconds: f64,
    /// Include sampled animation frames
    #[arg(long)]
    frames: bool,
}

#[derive(Serialize)]
struct SessionStart {
    variant: Variant,
    pattern: BreathingPattern,
    cycle: String,
    target_cycles: u64,
}

#[derive(Serialize)]
struct SessionSummary {
    completed_cycles: u64,
    target_cycles: u64,
    events: u64,
    interrupted: bool,
}

#[derive(Serialize)]
struct FrameRecord {
    at_ms: u64,
    #[serde(flatten)]
    frame: Frame,
}

#[derive(Serialize)]
struct Simulation {
    variant: Variant,
    pattern: BreathingPattern,
    target_cycles: u64,
    simulated_ms: u64,
    completed_cycles: u64,
    stopped: bool,
    events: Vec<PhaseEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<Vec<FrameRecord>>,
}

fn audio_trigger(config: &Config) -> AudioCueTrigger<TracingCueSink> {
    let mut trigger = AudioCueTrigger::new(TracingCueSink::new(), config.mixer_levels());
    trigger.set_cue_level(Cue::Inhale, config.audio.inhale_level);
    trigger.set_cue_level(Cue::Exhale, config.audio.exhale_level);
    trigger.set_sample(Cue::Inhale, config.audio.inhale_sample_secs);
    trigger.set_sample(Cue::Exhale, config.audio.exhale_sample_secs);
    trigger
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let rt = runtime()?;
    rt.block_on(run_session(args, config))
}

async fn run_session(args: RunArgs, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let remote = args.select.fetch_remote(&config).await;
    let (variant, patterns) = args.select.resolve(&config, remote.as_ref())?;
    let target_cycles = args.select.target_cycles(&config);

    let mut scheduler = PhaseScheduler::new(SystemClock::new(), variant, patterns)
        .with_options(config.scheduler_options());
    let counter = Rc::new(RefCell::new(SessionCounter::new(
        scheduler.control(),
        target_cycles,
    )));
    scheduler.bus().subscribe_shared(counter.clone());

    if config.audio.enabled && !args.mute {
        let mut trigger = audio_trigger(&config);
        trigger.arm();
        scheduler.bus().subscribe(trigger);
    }
    scheduler.bus().subscribe(|event: &PhaseEvent| {
        if let Err(e) = print_line("phase", event) {
            tracing::error!(error = %e, "failed to write phase event");
        }
    });

    let active = scheduler.active_pattern();
    print_line(
        "session_start",
        &SessionStart {
            variant,
            pattern: active,
            cycle: active.cycle_label(),
            target_cycles,
        },
    )?;

    scheduler.start();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while scheduler.is_running() {
        let Some(deadline) = scheduler.next_deadline_ms() else {
            break;
        };
        let wake = tokio::time::Instant::from_std(scheduler.clock().instant_at(deadline));
        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {
                scheduler.tick();
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                interrupted = true;
                scheduler.stop();
            }
        }
    }

    let progress = counter.borrow().progress();
    print_line(
        "session_end",
        &SessionSummary {
            completed_cycles: progress.completed_cycles,
            target_cycles,
            events: scheduler.events_emitted(),
            interrupted,
        },
    )?;
    Ok(())
}

pub fn simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.seconds.is_finite() || args.seconds < 0.0 {
        return Err(format!("--seconds must be a non-negative number, got {}", args.seconds).into());
    }
    let config = Config::load_or_default();
    let remote = runtime()?.block_on(args.select.fetch_remote(&config));
    let (variant, patterns) = args.select.resolve(&config, remote.as_ref())?;
    let target_cycles = args.select.target_cycles(&config);

    let clock = ManualClock::new();
    let mut scheduler = PhaseScheduler::new(clock.clone(), variant, patterns)
        .with_options(config.scheduler_options());
    let counter = Rc::new(RefCell::new(SessionCounter::new(
        scheduler.control(),
        target_cycles,
    )));
    scheduler.bus().subscribe_shared(counter.clone());
    let events = Rc::new(RefCell::new(Vec::new()));
    {
        let events = Rc::clone(&events);
        scheduler
            .bus()
            .subscribe(move |event: &PhaseEvent| events.borrow_mut().push(event.clone()));
    }

    let end_ms = (args.seconds * 1000.0).round() as u64;
    let mut frames = args.frames.then(Vec::new);
    let mut next_frame = 0;

    scheduler.start();
    loop {
        let now = clock.now_ms();
        if let Some(frames) = frames.as_mut() {
            if next_frame <= now {
                frames.push(FrameRecord {
                    at_ms: now,
                    frame: scheduler.frame(),
                });
                next_frame = now + FRAME_INTERVAL_MS;
            }
        }
        if now >= end_ms || !scheduler.is_running() {
            break;
        }

        let mut wake = end_ms;
        if let Some(deadline) = scheduler.next_deadline_ms() {
            wake = wake.min(deadline);
        }
        if frames.is_some() {
            wake = wake.min(next_frame);
        }
        clock.set_ms(wake);
        scheduler.tick();
    }

    let simulation = Simulation {
        variant,
        pattern: scheduler.active_pattern(),
        target_cycles,
        simulated_ms: clock.now_ms(),
        completed_cycles: counter.borrow().completed_cycles(),
        stopped: !scheduler.is_running(),
        events: events.take(),
        frames,
    };
    println!("{}", serde_json::to_string_pretty(&simulation)?);
    Ok(())
}
