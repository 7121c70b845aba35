use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Which data source the agenda pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Canvas,
    Feed,
}

/// Resolved active-source configuration, handed to the aggregation core as
/// an opaque union. `None` fields in the file simply leave that source
/// unconfigured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Canvas {
        base_url: Url,
        token: String,
        context_codes: Vec<String>,
    },
    Feed {
        url: Url,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceKind,
    pub canvas_url: Option<String>,
    pub api_token: Option<String>,
    pub feed_url: Option<String>,
    #[serde(default)]
    pub context_codes: Vec<String>,
    /// Auto-refresh interval; values below five minutes are clamped up.
    pub refresh_interval_minutes: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config at {}", path.display()))?;
                let config: Config = toml::from_str(&contents)
                    .with_context(|| "Failed to parse config.toml")?;
                return Ok(config);
            }
        }

        // Env-var fallback: a feed URL wins over Canvas credentials.
        if let Ok(feed_url) = std::env::var("CANVAS_AGENDA_FEED") {
            return Ok(Self {
                source: SourceKind::Feed,
                canvas_url: None,
                api_token: None,
                feed_url: Some(feed_url),
                context_codes: Vec::new(),
                refresh_interval_minutes: None,
            });
        }

        let canvas_url = std::env::var("CANVAS_AGENDA_URL")
            .with_context(|| "CANVAS_AGENDA_URL not set. Create a config file or set the env var.")?;
        let api_token = std::env::var("CANVAS_AGENDA_TOKEN")
            .with_context(|| "CANVAS_AGENDA_TOKEN not set. Create a config file or set the env var.")?;

        Ok(Self {
            source: SourceKind::Canvas,
            canvas_url: Some(canvas_url),
            api_token: Some(api_token),
            feed_url: None,
            context_codes: Vec::new(),
            refresh_interval_minutes: None,
        })
    }

    pub fn generate_default() -> Result<PathBuf> {
        let path = Self::config_path()
            .with_context(|| "Could not determine config directory")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let default = Config {
            source: SourceKind::Canvas,
            canvas_url: Some("https://your-school.instructure.com".into()),
            api_token: Some("your-api-token-here".into()),
            feed_url: Some("https://your-school.instructure.com/feeds/calendars/user_abc.ics".into()),
            context_codes: Vec::new(),
            refresh_interval_minutes: Some(15),
        };

        let toml_str = toml::to_string_pretty(&default)?;
        std::fs::write(&path, toml_str)?;
        Ok(path)
    }

    /// The active source, or `None` when the selected source is missing a
    /// required field — the aggregation core reports that as "not
    /// configured" rather than attempting network I/O.
    pub fn source_config(&self) -> Option<SourceConfig> {
        match self.source {
            SourceKind::Canvas => {
                let base_url = Url::parse(self.canvas_url.as_deref()?).ok()?;
                let token = self.api_token.clone().filter(|t| !t.is_empty())?;
                Some(SourceConfig::Canvas {
                    base_url,
                    token,
                    context_codes: self.context_codes.clone(),
                })
            }
            SourceKind::Feed => {
                let url = Url::parse(self.feed_url.as_deref()?).ok()?;
                Some(SourceConfig::Feed { url })
            }
        }
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("canvas-agenda").join("config.toml"))
    }
}
