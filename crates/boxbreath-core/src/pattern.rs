//! Breathing pattern model.
//!
//! A [`BreathingPattern`] can only be obtained through normalization, so
//! every pattern that reaches the scheduler has finite, non-negative
//! durations and at least one phase with something to animate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of the breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Four phases: inhale, hold, exhale, hold.
    #[serde(rename = "box")]
    Box,
    /// Three phases: inhale, hold, exhale.
    #[serde(rename = "three")]
    Triangular,
    /// Two phases: inhale, exhale.
    #[serde(rename = "two")]
    Dual,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Box, Variant::Triangular, Variant::Dual];

    /// Wire name used by the config server.
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Box => "box",
            Variant::Triangular => "three",
            Variant::Dual => "two",
        }
    }

    /// Steps walked by the scheduler, in order.
    pub fn sequence(self) -> &'static [PhaseStep] {
        match self {
            Variant::Box => &[
                PhaseStep::Inhale,
                PhaseStep::Hold1,
                PhaseStep::Exhale,
                PhaseStep::Hold2,
            ],
            Variant::Triangular => &[PhaseStep::Inhale, PhaseStep::Hold1, PhaseStep::Exhale],
            Variant::Dual => &[PhaseStep::Inhale, PhaseStep::Exhale],
        }
    }

    /// The step that follows `step` in this variant's loop.
    pub fn next_step(self, step: PhaseStep) -> PhaseStep {
        let seq = self.sequence();
        let idx = seq.iter().position(|s| *s == step).unwrap_or(seq.len() - 1);
        seq[(idx + 1) % seq.len()]
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "box" | "square" | "four" => Ok(Variant::Box),
            "three" | "triangular" | "triangle" => Ok(Variant::Triangular),
            "two" | "dual" | "circle" => Ok(Variant::Dual),
            other => Err(CoreError::invalid_pattern(
                other,
                "unknown variant (expected box, three or two)",
            )),
        }
    }
}

/// Public name of a phase, as carried on phase events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Inhale,
    Hold,
    Exhale,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Inhale => "Inhale",
            Phase::Hold => "Hold",
            Phase::Exhale => "Exhale",
        }
    }
}

/// Position inside a variant's sequence.
///
/// Triangular patterns use `Hold1` for their single hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStep {
    Inhale,
    Hold1,
    Exhale,
    Hold2,
}

impl PhaseStep {
    pub fn phase(self) -> Phase {
        match self {
            PhaseStep::Inhale => Phase::Inhale,
            PhaseStep::Hold1 | PhaseStep::Hold2 => Phase::Hold,
            PhaseStep::Exhale => Phase::Exhale,
        }
    }

    fn index(self) -> usize {
        match self {
            PhaseStep::Inhale => 0,
            PhaseStep::Hold1 => 1,
            PhaseStep::Exhale => 2,
            PhaseStep::Hold2 => 3,
        }
    }
}

fn default_secs() -> f64 {
    4.0
}

/// Wire shape of a 4-phase pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxPattern {
    #[serde(default = "default_secs")]
    pub inhale: f64,
    #[serde(default = "default_secs")]
    pub hold1: f64,
    #[serde(default = "default_secs")]
    pub exhale: f64,
    #[serde(default = "default_secs")]
    pub hold2: f64,
}

/// Wire shape of a 3-phase pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriPattern {
    #[serde(default = "default_secs")]
    pub inhale: f64,
    #[serde(default = "default_secs")]
    pub hold: f64,
    #[serde(default = "default_secs")]
    pub exhale: f64,
}

/// Wire shape of a 2-phase pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DualPattern {
    #[serde(default = "default_secs")]
    pub inhale: f64,
    #[serde(default = "default_secs")]
    pub exhale: f64,
}

/// Request body for a pattern write, one shape per variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatternBody {
    Box(BoxPattern),
    Three(TriPattern),
    Two(DualPattern),
}

/// Un-normalized durations as they arrive from a user or a collaborator.
///
/// Missing values and `null` are treated as zero. `hold` and `hold1` are
/// interchangeable for the first hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPattern {
    #[serde(default)]
    pub inhale: Option<f64>,
    #[serde(default)]
    pub hold1: Option<f64>,
    #[serde(default)]
    pub hold: Option<f64>,
    #[serde(default)]
    pub exhale: Option<f64>,
    #[serde(default)]
    pub hold2: Option<f64>,
}

impl RawPattern {
    /// Build from positional values in the variant's sequence order
    /// (e.g. `[4, 7, 8]` for a triangular pattern).
    pub fn from_values(variant: Variant, values: &[f64]) -> Self {
        let at = |i: usize| values.get(i).copied();
        match variant {
            Variant::Box => RawPattern {
                inhale: at(0),
                hold1: at(1),
                exhale: at(2),
                hold2: at(3),
                ..Default::default()
            },
            Variant::Triangular => RawPattern {
                inhale: at(0),
                hold: at(1),
                exhale: at(2),
                ..Default::default()
            },
            Variant::Dual => RawPattern {
                inhale: at(0),
                exhale: at(1),
                ..Default::default()
            },
        }
    }

    /// Parse a dash-separated cycle such as `"4-7-8"`.
    pub fn parse_cycle(variant: Variant, cycle: &str) -> Result<Self> {
        let values = cycle
            .split(['-', ',', ' '])
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>().map_err(|_| {
                    CoreError::invalid_pattern(variant.as_str(), format!("'{part}' is not a number"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let expected = variant.sequence().len();
        if values.len() != expected {
            return Err(CoreError::invalid_pattern(
                variant.as_str(),
                format!("expected {expected} durations, got {}", values.len()),
            ));
        }
        Ok(Self::from_values(variant, &values))
    }
}

impl From<BoxPattern> for RawPattern {
    fn from(p: BoxPattern) -> Self {
        RawPattern::from_values(Variant::Box, &[p.inhale, p.hold1, p.exhale, p.hold2])
    }
}

impl From<TriPattern> for RawPattern {
    fn from(p: TriPattern) -> Self {
        RawPattern::from_values(Variant::Triangular, &[p.inhale, p.hold, p.exhale])
    }
}

impl From<DualPattern> for RawPattern {
    fn from(p: DualPattern) -> Self {
        RawPattern::from_values(Variant::Dual, &[p.inhale, p.exhale])
    }
}

/// Validated durations (seconds) for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreathingPattern {
    variant: Variant,
    /// Indexed by [`PhaseStep`]; steps the variant does not walk stay zero.
    durations: [f64; 4],
}

/// Clamp a raw duration: negative, NaN and infinite inputs become zero.
fn clamp_secs(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// Validate and clamp raw durations for `variant`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPattern`] when every phase of the variant ends
/// up zero; the caller is expected to substitute a default.
pub fn normalize(variant: Variant, raw: &RawPattern) -> Result<BreathingPattern> {
    let durations = match variant {
        Variant::Box => [
            clamp_secs(raw.inhale),
            clamp_secs(raw.hold1.or(raw.hold)),
            clamp_secs(raw.exhale),
            clamp_secs(raw.hold2),
        ],
        Variant::Triangular => [
            clamp_secs(raw.inhale),
            clamp_secs(raw.hold.or(raw.hold1)),
            clamp_secs(raw.exhale),
            0.0,
        ],
        Variant::Dual => [clamp_secs(raw.inhale), 0.0, clamp_secs(raw.exhale), 0.0],
    };

    if durations.iter().all(|d| *d == 0.0) {
        return Err(CoreError::invalid_pattern(
            variant.as_str(),
            "every phase duration is zero, nothing to animate",
        ));
    }

    Ok(BreathingPattern { variant, durations })
}

/// Normalize, falling back to `fallback` when the input is unusable.
pub fn normalize_or(variant: Variant, raw: &RawPattern, fallback: BreathingPattern) -> BreathingPattern {
    match normalize(variant, raw) {
        Ok(pattern) => pattern,
        Err(err) => {
            tracing::warn!(%variant, error = %err, "falling back to default pattern");
            fallback
        }
    }
}

impl BreathingPattern {
    /// Built-in default for a variant: 4-4-4-4, 4-4-4 or 4-4.
    pub fn default_for(variant: Variant) -> Self {
        let durations = match variant {
            Variant::Box => [4.0, 4.0, 4.0, 4.0],
            Variant::Triangular => [4.0, 4.0, 4.0, 0.0],
            Variant::Dual => [4.0, 0.0, 4.0, 0.0],
        };
        Self { variant, durations }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Duration of `step` in seconds (zero for steps this variant skips).
    pub fn duration_secs(&self, step: PhaseStep) -> f64 {
        if self.variant.sequence().contains(&step) {
            self.durations[step.index()]
        } else {
            0.0
        }
    }

    /// Duration of `step` in milliseconds.
    ///
    /// Positive durations never round down to zero, so the loop always makes
    /// forward progress on the clock.
    pub fn duration_ms(&self, step: PhaseStep) -> u64 {
        let secs = self.duration_secs(step);
        if secs <= 0.0 {
            return 0;
        }
        ((secs * 1000.0).round() as u64).max(1)
    }

    /// Length of one full cycle in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.variant
            .sequence()
            .iter()
            .map(|s| self.duration_secs(*s))
            .sum()
    }

    /// Dash-separated durations, e.g. `"4-7-8"`.
    pub fn cycle_label(&self) -> String {
        self.variant
            .sequence()
            .iter()
            .map(|s| format!("{}", self.duration_secs(*s)))
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Request body for the config server's pattern endpoint.
    pub fn to_body(&self) -> PatternBody {
        let d = self.durations;
        match self.variant {
            Variant::Box => PatternBody::Box(BoxPattern {
                inhale: d[0],
                hold1: d[1],
                exhale: d[2],
                hold2: d[3],
            }),
            Variant::Triangular => PatternBody::Three(TriPattern {
                inhale: d[0],
                hold: d[1],
                exhale: d[2],
            }),
            Variant::Dual => PatternBody::Two(DualPattern {
                inhale: d[0],
                exhale: d[2],
            }),
        }
    }
}

impl Default for BreathingPattern {
    fn default() -> Self {
        Self::default_for(Variant::Box)
    }
}

/// One stored pattern per variant.
///
/// Switching variants picks up whatever was last stored for the new variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSet {
    #[serde(rename = "box")]
    box_pattern: BreathingPattern,
    three: BreathingPattern,
    two: BreathingPattern,
}

impl PatternSet {
    pub fn get(&self, variant: Variant) -> BreathingPattern {
        match variant {
            Variant::Box => self.box_pattern,
            Variant::Triangular => self.three,
            Variant::Dual => self.two,
        }
    }

    /// Store `pattern` under its own variant.
    pub fn set(&mut self, pattern: BreathingPattern) {
        match pattern.variant() {
            Variant::Box => self.box_pattern = pattern,
            Variant::Triangular => self.three = pattern,
            Variant::Dual => self.two = pattern,
        }
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self {
            box_pattern: BreathingPattern::default_for(Variant::Box),
            three: BreathingPattern::default_for(Variant::Triangular),
            two: BreathingPattern::default_for(Variant::Dual),
        }
    }
}

/// A named, built-in pattern.
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub pattern: BreathingPattern,
}

const PRESETS: [(&str, &str, &str, Variant, [f64; 4]); 5] = [
    ("box", "Box breathing", "Steady focus, 4-4-4-4", Variant::Box, [4.0, 4.0, 4.0, 4.0]),
    ("relax", "4-7-8", "Long hold and slow exhale for sleep", Variant::Triangular, [4.0, 7.0, 8.0, 0.0]),
    ("triangle", "Triangle breathing", "Even inhale, hold, exhale", Variant::Triangular, [4.0, 4.0, 4.0, 0.0]),
    ("calm", "Extended exhale", "No hold, longer exhale", Variant::Triangular, [4.0, 0.0, 6.0, 0.0]),
    ("equal", "Equal breathing", "Balanced 5-5 rhythm", Variant::Dual, [5.0, 0.0, 5.0, 0.0]),
];

/// All built-in presets.
pub fn presets() -> Vec<Preset> {
    PRESETS
        .iter()
        .map(|&(name, label, description, variant, durations)| Preset {
            name,
            label,
            description,
            pattern: BreathingPattern {
                variant,
                durations,
            },
        })
        .collect()
}

/// Look up a preset by name (case-insensitive).
pub fn preset(name: &str) -> Option<Preset> {
    presets()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}
