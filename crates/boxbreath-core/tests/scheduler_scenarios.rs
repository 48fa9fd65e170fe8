//! Integration tests for the phase scheduler driven by a manual clock.

use std::cell::RefCell;
use std::rc::Rc;

use boxbreath_core::{
    normalize, ManualClock, PatternSet, Phase, PhaseEvent, PhaseScheduler, PhaseStep, RawPattern,
    SessionCounter, Variant,
};

type Log = Rc<RefCell<Vec<PhaseEvent>>>;

fn recorded(variant: Variant, values: &[f64]) -> (PhaseScheduler<ManualClock>, ManualClock, Log) {
    let clock = ManualClock::new();
    let mut patterns = PatternSet::default();
    patterns.set(normalize(variant, &RawPattern::from_values(variant, values)).unwrap());
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let s = PhaseScheduler::new(clock.clone(), variant, patterns)
        .with_listener(move |e: &PhaseEvent| sink.borrow_mut().push(e.clone()));
    (s, clock, log)
}

/// Advance in `step_ms` increments until `until_ms`, ticking each time.
fn run_until(s: &mut PhaseScheduler<ManualClock>, clock: &ManualClock, until_ms: u64, step_ms: u64) {
    use boxbreath_core::Clock;
    while clock.now_ms() < until_ms {
        clock.advance_ms(step_ms.min(until_ms - clock.now_ms()));
        s.tick();
    }
}

fn timeline(log: &Log) -> Vec<(u64, Phase, f64)> {
    log.borrow()
        .iter()
        .map(|e| (e.at_ms, e.phase, e.duration_seconds))
        .collect()
}

#[test]
fn test_box_pattern_emits_each_phase_on_time() {
    let (mut s, clock, log) = recorded(Variant::Box, &[4.0, 4.0, 4.0, 4.0]);
    s.start();
    run_until(&mut s, &clock, 16_000, 100);

    assert_eq!(
        timeline(&log),
        vec![
            (0, Phase::Inhale, 4.0),
            (4_000, Phase::Hold, 4.0),
            (8_000, Phase::Exhale, 4.0),
            (12_000, Phase::Hold, 4.0),
            (16_000, Phase::Inhale, 4.0),
        ]
    );
    let steps: Vec<_> = log.borrow().iter().map(|e| e.step).collect();
    assert_eq!(steps[1], PhaseStep::Hold1);
    assert_eq!(steps[3], PhaseStep::Hold2);
    assert_eq!(log.borrow()[4].cycle, 1);
}

#[test]
fn test_triangular_without_hold_skips_it() {
    let (mut s, clock, log) = recorded(Variant::Triangular, &[3.0, 0.0, 3.0]);
    s.start();
    run_until(&mut s, &clock, 3_000, 250);
    // The skipped hold snapped the animation straight into the exhale.
    assert_eq!(s.frame().label, Some(Phase::Exhale));
    assert_eq!(s.frame().fill, 1.0);

    run_until(&mut s, &clock, 6_000, 250);
    assert_eq!(
        timeline(&log),
        vec![
            (0, Phase::Inhale, 3.0),
            (3_000, Phase::Exhale, 3.0),
            (6_000, Phase::Inhale, 3.0),
        ]
    );
}

#[test]
fn test_variant_switch_mid_phase_restarts_under_new_variant() {
    let (mut s, clock, log) = recorded(Variant::Box, &[4.0, 4.0, 4.0, 4.0]);
    s.start();
    run_until(&mut s, &clock, 2_000, 500);
    s.set_variant(Variant::Dual);
    run_until(&mut s, &clock, 10_000, 500);

    let events = log.borrow();
    assert_eq!(events[0].variant, Variant::Box);
    assert_eq!((events[1].at_ms, events[1].phase), (2_000, Phase::Inhale));
    assert!(events[1..].iter().all(|e| e.variant == Variant::Dual));
    assert!(events[1..].iter().all(|e| e.generation == s.generation()));
    // Dual default is 4-4: exhale at 6s, inhale at 10s.
    let times: Vec<_> = events[1..].iter().map(|e| e.at_ms).collect();
    assert_eq!(times, vec![2_000, 6_000, 10_000]);
}

#[test]
fn test_pattern_change_while_running_restarts_at_inhale() {
    let (mut s, clock, log) = recorded(Variant::Box, &[4.0, 4.0, 4.0, 4.0]);
    s.start();
    run_until(&mut s, &clock, 5_000, 500);
    let old_generation = s.generation();

    let faster = normalize(Variant::Box, &RawPattern::from_values(Variant::Box, &[2.0, 2.0, 2.0, 2.0])).unwrap();
    s.set_pattern(faster);
    run_until(&mut s, &clock, 9_000, 500);

    let events = log.borrow();
    let after: Vec<_> = events.iter().filter(|e| e.generation != old_generation).collect();
    assert_eq!(after[0].phase, Phase::Inhale);
    assert_eq!(after[0].at_ms, 5_000);
    assert_eq!(after.iter().map(|e| e.at_ms).collect::<Vec<_>>(), vec![5_000, 7_000, 9_000]);
    // Nothing from the old chain after the switch.
    assert!(events
        .iter()
        .filter(|e| e.generation == old_generation)
        .all(|e| e.at_ms < 5_000));
}

#[test]
fn test_stop_with_due_timers_delivers_nothing() {
    let (mut s, clock, log) = recorded(Variant::Box, &[4.0, 4.0, 4.0, 4.0]);
    s.start();
    // Several boundaries are already due, but nobody has ticked yet.
    clock.advance_ms(12_500);
    s.stop();
    assert_eq!(s.tick(), 0);
    clock.advance_ms(60_000);
    assert_eq!(s.tick(), 0);
    assert_eq!(log.borrow().len(), 1);
    assert!(s.pending_timers().is_empty());
}

#[test]
fn test_n_loops_yield_n_of_each_phase_with_matching_gaps() {
    let durations = [1.0, 2.0, 3.0, 4.0];
    let (mut s, clock, log) = recorded(Variant::Box, &durations);
    s.start();
    // Three loops of ten seconds, stopping just short of the fourth.
    run_until(&mut s, &clock, 29_999, 333);

    let events = log.borrow();
    assert_eq!(events.len(), 12);
    for step in Variant::Box.sequence() {
        assert_eq!(events.iter().filter(|e| e.step == *step).count(), 3);
    }
    for pair in events.windows(2) {
        let gap = pair[1].at_ms - pair[0].at_ms;
        assert_eq!(gap as f64, pair[0].duration_seconds * 1000.0);
    }
}

#[test]
fn test_zero_length_box_holds_are_skipped_but_loop_progresses() {
    let (mut s, clock, log) = recorded(Variant::Box, &[4.0, 0.0, 4.0, 0.0]);
    s.start();
    run_until(&mut s, &clock, 16_000, 1_000);

    assert!(log.borrow().iter().all(|e| e.phase != Phase::Hold));
    assert_eq!(log.borrow().len(), 5);
    assert_eq!(s.cycle(), 2);
}

#[test]
fn test_tiny_positive_durations_still_advance() {
    let (mut s, clock, log) = recorded(Variant::Box, &[0.0004, 0.0, 0.0, 0.0]);
    s.start();
    clock.advance_ms(10);
    s.tick();
    // Rounded up to one millisecond per inhale.
    assert_eq!(log.borrow().len(), 11);
}

#[test]
fn test_late_tick_does_not_drift() {
    let (mut s, clock, log) = recorded(Variant::Box, &[4.0, 4.0, 4.0, 4.0]);
    s.start();
    clock.advance_ms(4_700);
    s.tick();
    assert_eq!(log.borrow()[1].at_ms, 4_000);
    assert_eq!(s.next_deadline_ms(), Some(8_000));
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let (mut s, clock, log) = recorded(Variant::Dual, &[4.0, 4.0]);
    assert!(s.start());
    assert!(!s.start());
    run_until(&mut s, &clock, 8_000, 1_000);
    assert_eq!(log.borrow().len(), 3);

    assert!(s.stop());
    let generation = s.generation();
    assert!(!s.stop());
    assert_eq!(s.generation(), generation);
}

#[test]
fn test_session_counter_stops_at_target() {
    let clock = ManualClock::new();
    let s = PhaseScheduler::new(clock.clone(), Variant::Box, PatternSet::default());
    let counter = SessionCounter::new(s.control(), 2);
    let mut s = s.with_listener(counter);
    s.start();

    run_until(&mut s, &clock, 31_999, 1_000);
    assert!(s.is_running());
    run_until(&mut s, &clock, 32_000, 1);
    assert!(!s.is_running());
    assert!(s.pending_timers().is_empty());
}

#[test]
fn test_listener_can_detach_itself_mid_stream() {
    let clock = ManualClock::new();
    let mut s = PhaseScheduler::new(clock.clone(), Variant::Dual, PatternSet::default());
    let bus = s.bus().clone();
    let seen = Rc::new(RefCell::new(0u32));
    let id = Rc::new(RefCell::new(None));

    let (seen_in, id_in, bus_in) = (Rc::clone(&seen), Rc::clone(&id), bus.clone());
    let listener_id = bus.subscribe(move |_: &PhaseEvent| {
        *seen_in.borrow_mut() += 1;
        if *seen_in.borrow() == 2 {
            if let Some(id) = *id_in.borrow() {
                bus_in.unsubscribe(id);
            }
        }
    });
    *id.borrow_mut() = Some(listener_id);

    s.start();
    run_until(&mut s, &clock, 40_000, 2_000);
    assert_eq!(*seen.borrow(), 2);
    assert!(bus.is_empty());
    assert!(s.is_running());
}

#[test]
fn test_animation_tracks_scheduler() {
    let (mut s, clock, _log) = recorded(Variant::Box, &[4.0, 4.0, 4.0, 4.0]);
    s.start();
    clock.advance_ms(2_000);
    s.tick();
    let frame = s.frame();
    assert_eq!(frame.label, Some(Phase::Inhale));
    assert!((frame.fill - 0.5).abs() < 1e-3);
    assert!((frame.marker.y - 50.0).abs() < 1e-9);

    s.stop();
    clock.advance_ms(10_000);
    assert_eq!(s.frame().fill, frame.fill);
}
