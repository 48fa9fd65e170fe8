use crate::error::Result;
use crate::pattern::BreathingPattern;
use crate::plan::PlanSummary;

use super::chat::{ChatReply, Conversation};
use super::config_server::{ConfigUpdate, RemoteConfig};

/// The pattern configuration server.
///
/// Implementations report transport and status failures as
/// [`CoreError::ConfigFetchFailed`](crate::error::CoreError::ConfigFetchFailed).
#[allow(async_fn_in_trait)]
pub trait ConfigApi {
    /// Current configuration, including the stored pattern of every variant.
    async fn fetch_config(&self) -> Result<RemoteConfig>;

    /// Store `pattern` under its variant. Returns the updated configuration.
    async fn post_pattern(&self, pattern: &BreathingPattern) -> Result<RemoteConfig>;

    /// Apply a partial update of scale, cycle length or box pattern.
    async fn update_config(&self, update: &ConfigUpdate) -> Result<RemoteConfig>;

    /// Fetch the configuration, substituting the built-in default when the
    /// server cannot be reached.
    async fn load_or_default(&self) -> RemoteConfig {
        match self.fetch_config().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "config server unavailable, using defaults");
                RemoteConfig::default()
            }
        }
    }
}

/// The chat backend.
#[allow(async_fn_in_trait)]
pub trait ChatApi {
    /// Send the whole transcript and return the assistant's next turn.
    async fn send(&self, conversation: &Conversation) -> Result<ChatReply>;

    /// Ask for a plan picked from the given transcript lines.
    ///
    /// Transport and status failures are
    /// [`CoreError::ChatFailed`](crate::error::CoreError::ChatFailed); an
    /// answer without a readable plan is
    /// [`CoreError::PlanParseFailed`](crate::error::CoreError::PlanParseFailed).
    async fn summarize(&self, lines: &[String]) -> Result<PlanSummary>;
}
