use boxbreath_core::pattern::presets as builtin_presets;
use boxbreath_core::pattern::PatternBody;
use boxbreath_core::{
    normalize, BreathingPattern, Config, ConfigApi, ConfigUpdate, RawPattern, RemoteConfig,
    Variant,
};
use clap::Subcommand;
use serde::Serialize;

use super::{config_client, runtime};

#[derive(Subcommand)]
pub enum PatternAction {
    /// Show the patterns stored on the config server
    Show,
    /// Store a pattern on the config server
    Set {
        /// Variant: box, three or two
        variant: Variant,
        /// Durations in seconds in phase order, e.g. 4-4-4-4
        durations: String,
    },
    /// Update box scale, cycle length or the box pattern in one request
    Update {
        /// Scale applied to the drawn box
        #[arg(long)]
        box_scale: Option<f64>,
        /// Total cycle length in seconds; clears stored patterns
        #[arg(long, conflicts_with = "box_pattern")]
        cycle_seconds: Option<f64>,
        /// Box durations, e.g. 4-4-4-4; replaces every stored pattern
        #[arg(long)]
        box_pattern: Option<String>,
    },
}

#[derive(Serialize)]
struct PatternView {
    variant: Variant,
    cycle: String,
    total_seconds: f64,
    pattern: BreathingPattern,
}

impl From<BreathingPattern> for PatternView {
    fn from(pattern: BreathingPattern) -> Self {
        Self {
            variant: pattern.variant(),
            cycle: pattern.cycle_label(),
            total_seconds: pattern.total_seconds(),
            pattern,
        }
    }
}

#[derive(Serialize)]
struct RemoteView {
    active: PatternView,
    box_scale: f64,
    server: RemoteConfig,
}

impl From<RemoteConfig> for RemoteView {
    fn from(remote: RemoteConfig) -> Self {
        Self {
            active: remote.active_pattern().into(),
            box_scale: remote.box_scale,
            server: remote,
        }
    }
}

pub fn run(action: PatternAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let client = config_client(&config)?;
    let rt = runtime()?;

    match action {
        PatternAction::Show => {
            let remote = rt.block_on(client.fetch_config())?;
            println!("{}", serde_json::to_string_pretty(&RemoteView::from(remote))?);
        }
        PatternAction::Set { variant, durations } => {
            let raw = RawPattern::parse_cycle(variant, &durations)?;
            let pattern = normalize(variant, &raw)?;
            let remote = rt.block_on(client.post_pattern(&pattern))?;
            println!("{}", serde_json::to_string_pretty(&RemoteView::from(remote))?);
        }
        PatternAction::Update {
            box_scale,
            cycle_seconds,
            box_pattern,
        } => {
            let pattern = match box_pattern {
                Some(cycle) => {
                    let raw = RawPattern::parse_cycle(Variant::Box, &cycle)?;
                    match normalize(Variant::Box, &raw)?.to_body() {
                        PatternBody::Box(body) => Some(body),
                        _ => None,
                    }
                }
                None => None,
            };
            let update = ConfigUpdate {
                box_scale,
                pattern,
                cycle_seconds,
            };
            if update.is_empty() {
                return Err("nothing to update: pass --box-scale, --cycle-seconds or --box-pattern".into());
            }
            let remote = rt.block_on(client.update_config(&update))?;
            println!("{}", serde_json::to_string_pretty(&RemoteView::from(remote))?);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PresetView {
    name: &'static str,
    label: &'static str,
    description: &'static str,
    #[serde(flatten)]
    pattern: PatternView,
}

pub fn presets() -> Result<(), Box<dyn std::error::Error>> {
    let list: Vec<PresetView> = builtin_presets()
        .into_iter()
        .map(|p| PresetView {
            name: p.name,
            label: p.label,
            description: p.description,
            pattern: p.pattern.into(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}
