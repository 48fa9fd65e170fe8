//! Animation driver.
//!
//! Renders whatever the scheduler dictates: a fill level, a marker tracing
//! the shape's perimeter and a pace label. Every transition starts from the
//! state rendered at the phase boundary, never from a fixed baseline, so a
//! restart mid-phase continues smoothly from where the shape currently is.

use serde::Serialize;

use crate::pattern::{Phase, PhaseStep, Variant};

/// Centre of the dual variant's circle.
const CIRCLE_CENTER: Point = Point::new(50.0, 50.0);
const CIRCLE_RADIUS: f64 = 50.0;

/// Position in percent of the shape's bounding box, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn lerp(self, to: Point, t: f64) -> Point {
        Point {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }

    /// Angle and distance from `center`, y pointing down.
    fn polar(self, center: Point) -> (f64, f64) {
        let (dx, dy) = (self.x - center.x, self.y - center.y);
        (dy.atan2(dx), dx.hypot(dy))
    }

    /// Walk clockwise around `center` from `self` to `to`.
    ///
    /// The radius blends from the start's distance to the target's, so a
    /// marker that starts off the circle joins it by the end.
    fn arc(self, to: Point, center: Point, t: f64) -> Point {
        if t <= 0.0 {
            return self;
        }
        if t >= 1.0 {
            return to;
        }
        let (from_angle, from_radius) = self.polar(center);
        let (to_angle, to_radius) = to.polar(center);
        let sweep = (to_angle - from_angle).rem_euclid(std::f64::consts::TAU);
        let angle = from_angle + sweep * t;
        let radius = from_radius + (to_radius - from_radius) * t;
        Point {
            x: center.x + radius * angle.cos(),
            y: center.y + radius * angle.sin(),
        }
    }
}

/// Renderable state of the shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Visual {
    /// 0.0 (empty) .. 1.0 (full).
    pub fill: f64,
    pub marker: Point,
}

/// A sampled moment of the animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frame {
    pub fill: f64,
    pub marker: Point,
    pub label: Option<Phase>,
    /// 0.0 .. 1.0 through the current transition; 1.0 when settled.
    pub progress: f64,
}

/// CSS-style cubic Bézier timing function with fixed end points (0,0) and (1,1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

/// Easing used for the fill level.
pub const FILL_EASING: CubicBezier = CubicBezier::new(0.2, 0.0, 0.8, 1.0);

impl CubicBezier {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn curve(a1: f64, a2: f64, t: f64) -> f64 {
        let u = 1.0 - t;
        3.0 * u * u * t * a1 + 3.0 * u * t * t * a2 + t * t * t
    }

    fn curve_slope(a1: f64, a2: f64, t: f64) -> f64 {
        let u = 1.0 - t;
        3.0 * u * u * a1 + 6.0 * u * t * (a2 - a1) + 3.0 * t * t * (1.0 - a2)
    }

    /// Parameter `t` whose x coordinate is `x`.
    fn solve_t(&self, x: f64) -> f64 {
        let mut t = x;
        for _ in 0..8 {
            let err = Self::curve(self.x1, self.x2, t) - x;
            if err.abs() < 1e-7 {
                return t;
            }
            let slope = Self::curve_slope(self.x1, self.x2, t);
            if slope.abs() < 1e-6 {
                break;
            }
            t -= err / slope;
        }

        // Newton stalled; bisect.
        let (mut lo, mut hi) = (0.0, 1.0);
        t = x;
        for _ in 0..64 {
            let v = Self::curve(self.x1, self.x2, t);
            if (v - x).abs() < 1e-7 {
                break;
            }
            if v < x {
                lo = t;
            } else {
                hi = t;
            }
            t = (lo + hi) / 2.0;
        }
        t
    }

    /// Eased progress for linear progress `x` in 0.0 ..= 1.0.
    pub fn ease(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        Self::curve(self.y1, self.y2, self.solve_t(x))
    }
}

/// Where the shape sits before the first inhale.
pub fn rest_visual(variant: Variant) -> Visual {
    let marker = match variant {
        Variant::Box | Variant::Triangular => Point::new(0.0, 100.0),
        Variant::Dual => Point::new(50.0, 100.0),
    };
    Visual { fill: 0.0, marker }
}

/// Where the shape ends up at the close of `step`.
///
/// Box walks the square's corners (left edge up on inhale, across the top on
/// the first hold), triangular walks a triangle's vertices and dual goes
/// round the circle: up the left side on inhale, down the right on exhale.
pub fn target_visual(variant: Variant, step: PhaseStep) -> Visual {
    let fill = match step.phase() {
        Phase::Inhale | Phase::Hold if step != PhaseStep::Hold2 => 1.0,
        _ => 0.0,
    };
    let marker = match (variant, step) {
        (Variant::Box, PhaseStep::Inhale) => Point::new(0.0, 0.0),
        (Variant::Box, PhaseStep::Hold1) => Point::new(100.0, 0.0),
        (Variant::Box, PhaseStep::Exhale) => Point::new(100.0, 100.0),
        (Variant::Box, PhaseStep::Hold2) => Point::new(0.0, 100.0),
        (Variant::Triangular, PhaseStep::Inhale) => Point::new(50.0, 0.0),
        (Variant::Triangular, PhaseStep::Hold1 | PhaseStep::Hold2) => Point::new(100.0, 100.0),
        (Variant::Triangular, PhaseStep::Exhale) => Point::new(0.0, 100.0),
        (Variant::Dual, PhaseStep::Inhale | PhaseStep::Hold1) => {
            Point::new(CIRCLE_CENTER.x, CIRCLE_CENTER.y - CIRCLE_RADIUS)
        }
        (Variant::Dual, PhaseStep::Exhale | PhaseStep::Hold2) => {
            Point::new(CIRCLE_CENTER.x, CIRCLE_CENTER.y + CIRCLE_RADIUS)
        }
    };
    Visual { fill, marker }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    /// Marker follows the circle instead of a straight edge.
    circular: bool,
    from: Visual,
    to: Visual,
    start_ms: u64,
    duration_ms: u64,
}

impl Transition {
    fn progress(&self, now_ms: u64) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now_ms.saturating_sub(self.start_ms) as f64;
        (elapsed / self.duration_ms as f64).clamp(0.0, 1.0)
    }

    fn at(&self, now_ms: u64) -> Visual {
        let t = self.progress(now_ms);
        Visual {
            fill: self.from.fill + (self.to.fill - self.from.fill) * FILL_EASING.ease(t),
            marker: if self.circular {
                self.from.marker.arc(self.to.marker, CIRCLE_CENTER, t)
            } else {
                self.from.marker.lerp(self.to.marker, t)
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnimationDriver {
    variant: Variant,
    settled: Visual,
    transition: Option<Transition>,
    label: Option<Phase>,
}

impl AnimationDriver {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            settled: rest_visual(variant),
            transition: None,
            label: None,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Change the path the next transitions follow.
    ///
    /// The rendered state is untouched; the next `begin` moves from wherever
    /// the shape currently is.
    pub fn set_variant(&mut self, variant: Variant, now_ms: u64) {
        self.freeze(now_ms);
        self.variant = variant;
    }

    /// Start moving toward the end state of `step`.
    ///
    /// A zero `duration_ms` snaps immediately. `label` of `None` keeps the
    /// current label (used for skipped zero-length phases).
    pub fn begin(&mut self, step: PhaseStep, at_ms: u64, duration_ms: u64, label: Option<Phase>) {
        let from = self.visual_at(at_ms);
        let to = target_visual(self.variant, step);
        if let Some(label) = label {
            self.label = Some(label);
        }
        if duration_ms == 0 {
            self.settled = to;
            self.transition = None;
        } else {
            self.settled = from;
            self.transition = Some(Transition {
                circular: self.variant == Variant::Dual,
                from,
                to,
                start_ms: at_ms,
                duration_ms,
            });
        }
    }

    /// Hold the current visual state until the next `begin`.
    pub fn freeze(&mut self, now_ms: u64) {
        self.settled = self.visual_at(now_ms);
        self.transition = None;
    }

    pub fn is_moving(&self, now_ms: u64) -> bool {
        self.transition
            .map(|t| t.progress(now_ms) < 1.0)
            .unwrap_or(false)
    }

    fn visual_at(&self, now_ms: u64) -> Visual {
        match &self.transition {
            Some(t) => t.at(now_ms),
            None => self.settled,
        }
    }

    pub fn sample(&self, now_ms: u64) -> Frame {
        let visual = self.visual_at(now_ms);
        Frame {
            fill: visual.fill,
            marker: visual.marker,
            label: self.label,
            progress: self
                .transition
                .map(|t| t.progress(now_ms))
                .unwrap_or(1.0),
        }
    }
}
