pub mod chat;
pub mod config;
pub mod pattern;
pub mod session;

use std::time::Duration;

use boxbreath_core::pattern::preset;
use boxbreath_core::{
    normalize, ChatClient, Config, ConfigApi, ConfigClient, PatternSet, RawPattern, RemoteConfig,
    Variant,
};
use clap::Args;
use serde::Serialize;

/// The CLI drives everything from a single-threaded runtime.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn request_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.server.timeout_secs.max(1))
}

pub(crate) fn config_client(config: &Config) -> Result<ConfigClient, Box<dyn std::error::Error>> {
    Ok(ConfigClient::with_timeout(&config.server.base_url, request_timeout(config))?)
}

pub(crate) fn chat_client(config: &Config) -> Result<ChatClient, Box<dyn std::error::Error>> {
    Ok(ChatClient::with_timeout(&config.server.base_url, request_timeout(config))?)
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    ts: String,
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(flatten)]
    data: &'a T,
}

/// Print one timestamped JSON object per line.
pub(crate) fn print_line<T: Serialize>(kind: &str, data: &T) -> Result<(), serde_json::Error> {
    let line = Line {
        ts: chrono::Utc::now().to_rfc3339(),
        kind,
        data,
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

/// Which pattern a session runs.
#[derive(Args, Debug, Clone)]
pub struct PatternSelector {
    /// Variant: box, three or two
    #[arg(long)]
    pub variant: Option<Variant>,
    /// Durations in seconds in phase order, e.g. 4-7-8
    #[arg(long)]
    pub pattern: Option<String>,
    /// Built-in preset (see `boxbreath presets`)
    #[arg(long, conflicts_with_all = ["variant", "pattern"])]
    pub preset: Option<String>,
    /// Stop after N cycles; 0 runs until interrupted
    #[arg(long)]
    pub cycles: Option<u64>,
    /// Do not contact the config server
    #[arg(long)]
    pub offline: bool,
}

impl PatternSelector {
    /// Remote configuration, or `None` when offline or unreachable.
    pub async fn fetch_remote(&self, config: &Config) -> Option<RemoteConfig> {
        if self.offline {
            return None;
        }
        let client = match config_client(config) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "invalid server URL, running offline");
                return None;
            }
        };
        match client.fetch_config().await {
            Ok(remote) => Some(remote),
            Err(e) => {
                tracing::warn!(error = %e, "config server unavailable, using local defaults");
                None
            }
        }
    }

    /// Starting variant and patterns: command line over server over local config.
    pub fn resolve(
        &self,
        config: &Config,
        remote: Option<&RemoteConfig>,
    ) -> Result<(Variant, PatternSet), Box<dyn std::error::Error>> {
        let (mut variant, mut patterns) = match remote {
            Some(remote) => (remote.active_pattern().variant(), remote.patterns()),
            None => (config.session.variant, PatternSet::default()),
        };

        if let Some(name) = &self.preset {
            let chosen = preset(name).ok_or_else(|| format!("unknown preset: {name}"))?;
            patterns.set(chosen.pattern);
            return Ok((chosen.pattern.variant(), patterns));
        }

        if let Some(v) = self.variant {
            variant = v;
        }
        if let Some(cycle) = &self.pattern {
            let raw = RawPattern::parse_cycle(variant, cycle)?;
            patterns.set(normalize(variant, &raw)?);
        }
        Ok((variant, patterns))
    }

    pub fn target_cycles(&self, config: &Config) -> u64 {
        self.cycles.unwrap_or(config.session.target_cycles)
    }
}
