use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::query::QueryConfig;
use crate::reddit::{ClientConfig, DEFAULT_BASE_URL};
use crate::state::DEFAULT_SUBREDDIT;

const DEFAULT_ENV_PREFIX: &str = "REDDIT_LENS";
const APP_DIR: &str = "reddit-lens";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub query: QuerySection,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

impl RedditConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            user_agent: self.user_agent.clone(),
            base_url: Some(self.base_url.clone()),
            timeout: Some(self.timeout),
            http_client: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("reddit-lens/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuerySection {
    #[serde(default = "default_keep_unused_for", with = "humantime_serde")]
    pub keep_unused_for: Duration,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            keep_unused_for: default_keep_unused_for(),
            workers: default_workers(),
        }
    }
}

impl From<&QuerySection> for QueryConfig {
    fn from(section: &QuerySection) -> Self {
        QueryConfig {
            workers: section.workers,
            keep_unused_for: section.keep_unused_for,
        }
    }
}

fn default_keep_unused_for() -> Duration {
    Duration::from_secs(60)
}

fn default_workers() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_debounce() -> Duration {
    Duration::from_millis(500)
}

fn default_min_chars() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_subreddit")]
    pub default_subreddit: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            default_subreddit: default_subreddit(),
        }
    }
}

fn default_subreddit() -> String {
    DEFAULT_SUBREDDIT.into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

/// Defaults, then the YAML file, then `<PREFIX>_SECTION__KEY` variables.
pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = match options.config_file.as_ref() {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            read_config_file(path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => Config::default(),
        },
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    for (key, value) in load_env(prefix) {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    debug!("reading config from {}", path.display());
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn load_env(prefix: &str) -> HashMap<String, String> {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect()
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.base_url" => cfg.reddit.base_url = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.timeout" => set_duration(&mut cfg.reddit.timeout, key, &value),
        "query.keep_unused_for" => set_duration(&mut cfg.query.keep_unused_for, key, &value),
        "query.workers" => set_parsed(&mut cfg.query.workers, key, &value),
        "search.debounce" => set_duration(&mut cfg.search.debounce, key, &value),
        "search.min_chars" => set_parsed(&mut cfg.search.min_chars, key, &value),
        "ui.default_subreddit" => cfg.ui.default_subreddit = value,
        _ => debug!("ignoring unknown config variable {key}"),
    }
}

fn set_duration(slot: &mut Duration, key: &str, value: &str) {
    match humantime::parse_duration(value) {
        Ok(duration) => *slot = duration,
        Err(err) => warn!("ignoring {key}={value:?}: {err}"),
    }
}

fn set_parsed(slot: &mut usize, key: &str, value: &str) {
    match value.trim().parse::<usize>() {
        Ok(parsed) => *slot = parsed,
        Err(err) => warn!("ignoring {key}={value:?}: {err}"),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
}
