//! Config server client: reads and writes breathing patterns over HTTP.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use super::base_url;
use super::traits::ConfigApi;
use crate::error::{CoreError, Result};
use crate::pattern::{
    normalize, normalize_or, BoxPattern, BreathingPattern, PatternSet, RawPattern, Variant,
};

fn default_box_scale() -> f64 {
    1.0
}

/// Configuration as served by `GET /api/config`.
///
/// The server may hold a pattern for only one variant at a time; the others
/// come back as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Declared variant (`"box"`, `"three"`, `"two"`), if any.
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub pattern: Option<RawPattern>,
    #[serde(default)]
    pub pattern_three: Option<RawPattern>,
    #[serde(default)]
    pub pattern_two: Option<RawPattern>,
    #[serde(default)]
    pub cycle_seconds: Option<f64>,
    #[serde(default = "default_box_scale")]
    pub box_scale: f64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            variant: Some(Variant::Box.as_str().to_string()),
            pattern: None,
            pattern_three: None,
            pattern_two: None,
            cycle_seconds: None,
            box_scale: default_box_scale(),
        }
    }
}

impl RemoteConfig {
    /// The declared variant, ignoring names this client does not know.
    pub fn declared_variant(&self) -> Option<Variant> {
        self.variant.as_deref().and_then(|v| v.parse().ok())
    }

    fn raw_for(&self, variant: Variant) -> Option<&RawPattern> {
        match variant {
            Variant::Box => self.pattern.as_ref(),
            Variant::Triangular => self.pattern_three.as_ref(),
            Variant::Dual => self.pattern_two.as_ref(),
        }
    }

    /// The pattern the session should run.
    ///
    /// Resolution order: the declared variant's pattern, the box pattern,
    /// `cycle_seconds` split into four equal box phases, the 4-4-4-4 default.
    pub fn active_pattern(&self) -> BreathingPattern {
        if let Some(variant) = self.declared_variant() {
            if let Some(p) = self.raw_for(variant).and_then(|raw| normalize(variant, raw).ok()) {
                return p;
            }
        }
        if let Some(p) = self
            .pattern
            .as_ref()
            .and_then(|raw| normalize(Variant::Box, raw).ok())
        {
            return p;
        }
        if let Some(cycle) = self.cycle_seconds.filter(|c| c.is_finite() && *c > 0.0) {
            let quarter = cycle / 4.0;
            let raw = RawPattern::from_values(Variant::Box, &[quarter; 4]);
            if let Ok(p) = normalize(Variant::Box, &raw) {
                return p;
            }
        }
        BreathingPattern::default()
    }

    /// A stored pattern per variant, defaults where the server has none.
    pub fn patterns(&self) -> PatternSet {
        let mut set = PatternSet::default();
        for variant in Variant::ALL {
            if let Some(raw) = self.raw_for(variant) {
                set.set(normalize_or(variant, raw, BreathingPattern::default_for(variant)));
            }
        }
        set.set(self.active_pattern());
        set
    }
}

/// Partial update for `POST /api/config`. Absent fields are left alone.
///
/// A box pattern replaces every stored pattern; a cycle length clears them
/// all so the session splits it into four equal phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<BoxPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_seconds: Option<f64>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.box_scale.is_none() && self.pattern.is_none() && self.cycle_seconds.is_none()
    }

    /// Reject values the server would refuse before sending them.
    pub fn validate(&self) -> Result<()> {
        if let Some(scale) = self.box_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(CoreError::invalid_pattern(
                    Variant::Box.as_str(),
                    format!("box scale must be positive, got {scale}"),
                ));
            }
        }
        if let Some(cycle) = self.cycle_seconds {
            if !cycle.is_finite() || cycle <= 0.0 {
                return Err(CoreError::invalid_pattern(
                    Variant::Box.as_str(),
                    format!("cycle length must be positive, got {cycle}"),
                ));
            }
        }
        if let Some(p) = &self.pattern {
            let raw = RawPattern::from_values(Variant::Box, &[p.inhale, p.hold1, p.exhale, p.hold2]);
            normalize(Variant::Box, &raw)?;
        }
        Ok(())
    }
}

/// HTTP client for the config server.
#[derive(Debug, Clone)]
pub struct ConfigClient {
    base_url: Url,
    http_client: Client,
}

impl ConfigClient {
    /// Create a client rooted at `base_url` (e.g. `http://127.0.0.1:8000`).
    ///
    /// # Errors
    /// Returns [`CoreError::Url`] if `base_url` does not parse.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: super::base_url(base_url)?,
            http_client: Client::new(),
        })
    }

    /// Like [`new`](Self::new) with a per-request timeout.
    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::ConfigFetchFailed(e.to_string()))?;
        Ok(Self {
            base_url: base_url(base)?,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn read_config(resp: Response) -> Result<RemoteConfig> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::ConfigFetchFailed(format!(
                "config server error (HTTP {status}): {text}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| CoreError::ConfigFetchFailed(format!("malformed config: {e}")))
    }

    /// Stored pattern of one variant (`GET /api/patterns/{variant}`).
    pub async fn fetch_pattern(&self, variant: Variant) -> Result<BreathingPattern> {
        let url = self.endpoint(&format!("api/patterns/{}", variant.as_str()))?;
        let resp = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::ConfigFetchFailed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::ConfigFetchFailed(format!(
                "config server error (HTTP {status})"
            )));
        }
        let raw: RawPattern = resp
            .json()
            .await
            .map_err(|e| CoreError::ConfigFetchFailed(format!("malformed pattern: {e}")))?;
        normalize(variant, &raw)
    }
}

impl ConfigApi for ConfigClient {
    async fn fetch_config(&self) -> Result<RemoteConfig> {
        let url = self.endpoint("api/config")?;
        tracing::debug!(%url, "fetching remote config");
        let resp = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::ConfigFetchFailed(e.to_string()))?;
        Self::read_config(resp).await
    }

    async fn post_pattern(&self, pattern: &BreathingPattern) -> Result<RemoteConfig> {
        let url = self.endpoint(&format!("api/patterns/{}", pattern.variant().as_str()))?;
        tracing::info!(%url, pattern = %pattern.cycle_label(), "storing pattern");
        let resp = self
            .http_client
            .post(url)
            .json(&pattern.to_body())
            .send()
            .await
            .map_err(|e| CoreError::ConfigFetchFailed(e.to_string()))?;
        Self::read_config(resp).await
    }

    async fn update_config(&self, update: &ConfigUpdate) -> Result<RemoteConfig> {
        update.validate()?;
        let url = self.endpoint("api/config")?;
        tracing::info!(%url, ?update, "updating remote config");
        let resp = self
            .http_client
            .post(url)
            .json(update)
            .send()
            .await
            .map_err(|e| CoreError::ConfigFetchFailed(e.to_string()))?;
        Self::read_config(resp).await
    }
}
