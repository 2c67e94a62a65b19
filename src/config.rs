//! Environment-level configuration and scenario files
//!
//! Nothing in the agent loop reads process state. [`AgentConfig`] is parsed
//! once, at the edge, from a key lookup (the process environment in the
//! runner binary, a closure in tests) and passed in explicitly.

use crate::actions::click::DEFAULT_DISMISS_BUTTON;
use crate::agent::RunConfig;
use crate::error::ConfigError;
use crate::output::OutputSchema;
use crate::sequencer::InitialAction;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_UI_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Base URL of the UI under test
    pub base_url: Url,

    /// Run Chrome headless. Forced on when `CI` is set.
    pub headless: bool,

    /// Running under CI
    pub ci: bool,

    pub max_steps: usize,

    pub max_duration: Duration,

    /// Button that closes the welcome modal; `None` skips the dismissal
    pub welcome_button: Option<String>,
}

impl AgentConfig {
    /// Read `UI_URL`, `CI`, `HEADLESS`, `AGENT_MAX_STEPS`, `AGENT_TIMEOUT_SECS` and
    /// `AGENT_WELCOME_BUTTON` from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let limits = RunConfig::default();
        let mut config = Self {
            base_url: parse_base_url(lookup("UI_URL").as_deref().unwrap_or(DEFAULT_UI_URL))?,
            headless: true,
            ci: false,
            max_steps: limits.max_steps,
            max_duration: limits.max_duration,
            welcome_button: Some(DEFAULT_DISMISS_BUTTON.to_string()),
        };

        if let Some(headless) = lookup("HEADLESS") {
            config.headless = parse_flag("HEADLESS", &headless)?;
        }
        config.ci = lookup("CI").is_some_and(|ci| parse_flag("CI", &ci).unwrap_or(true));
        if config.ci {
            config.headless = true;
        }

        if let Some(steps) = lookup("AGENT_MAX_STEPS") {
            config.max_steps = parse_positive("AGENT_MAX_STEPS", &steps)?;
        }
        if let Some(secs) = lookup("AGENT_TIMEOUT_SECS") {
            config.max_duration = Duration::from_secs(parse_positive("AGENT_TIMEOUT_SECS", &secs)? as u64);
        }

        if let Some(button) = lookup("AGENT_WELCOME_BUTTON") {
            let button = button.trim();
            config.welcome_button = (!button.is_empty()).then(|| button.to_string());
        }

        Ok(config)
    }

    /// Absolute URL for a path of the UI under test
    pub fn url_for(&self, path: &str) -> Result<Url, ConfigError> {
        self.base_url.join(path.trim_start_matches('/')).map_err(|e| ConfigError::Invalid {
            key: "path".to_string(),
            reason: format!("'{}': {}", path, e),
        })
    }

    /// Default setup: open the page, then close the welcome modal if one is configured
    pub fn initial_actions(&self, path: &str) -> Result<Vec<InitialAction>, ConfigError> {
        let mut actions = vec![InitialAction::open_url(self.url_for(path)?.as_str())];
        if let Some(button) = &self.welcome_button {
            actions.push(InitialAction::dismiss_modal(button.as_str()));
        }
        Ok(actions)
    }

    /// Run limits taken from this configuration
    pub fn run_config(&self) -> RunConfig {
        RunConfig::default()
            .max_steps(self.max_steps)
            .max_duration(self.max_duration)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "UI_URL".to_string(),
        reason,
    };

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(format!("'{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("'{}' is not an http(s) URL", raw)));
    }
    // `join` treats a base without a trailing slash as a file
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("expected a positive integer, got '{}'", raw),
        }),
    }
}

/// A task for the agent, as stored in a scenario file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub task: String,

    /// Page of the UI to start on, relative to the base URL
    #[serde(default)]
    pub path: Option<String>,

    /// Explicit setup sequence; replaces the default open-and-dismiss setup
    #[serde(default)]
    pub initial_actions: Option<Vec<InitialAction>>,

    pub expected_output: OutputSchema,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let scenario: Scenario = serde_json::from_str(json).map_err(|e| ConfigError::Invalid {
            key: "scenario".to_string(),
            reason: e.to_string(),
        })?;
        if scenario.task.trim().is_empty() {
            return Err(ConfigError::Missing("scenario task".to_string()));
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            key: "scenario".to_string(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }

    /// Setup sequence for this scenario under `config`
    pub fn setup(&self, config: &AgentConfig) -> Result<Vec<InitialAction>, ConfigError> {
        match &self.initial_actions {
            Some(actions) => Ok(actions.clone()),
            None => config.initial_actions(self.path.as_deref().unwrap_or("")),
        }
    }
}
