// Run configuration loaded from a TOML file.
//
// Example:
// [mailchimp]
// list_id = "1234"
// account = "ctl"
// api_key = "123xyz-us6"
//
// [run]
// push = false

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::contact::SubscriptionStatus;
use crate::error::{Error, Result};
use crate::reconcile::RunMode;

pub const DEFAULT_REPORT_PREFIX: &str = "unsubscribed_contacts";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mailchimp: MailchimpSettings,
    pub run: RunSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailchimpSettings {
    pub list_id: String,
    pub account: String,
    pub api_key: String,
    /// Overrides the URL derived from the API key's datacenter suffix.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_status_if_new")]
    pub status_if_new: SubscriptionStatus,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    pub push: bool,
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,
}

fn default_status_if_new() -> SubscriptionStatus {
    SubscriptionStatus::Subscribed
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_report_prefix() -> String {
    DEFAULT_REPORT_PREFIX.to_string()
}

impl Config {
    /// Read and validate the config file. `api_key` replaces the file's key
    /// before validation (used for the environment override).
    pub fn load(path: &Path, api_key: Option<&str>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::config(path, e))?;
        Self::parse(&text, api_key).map_err(|message| Error::config(path, message))
    }

    /// Parse and validate config text. The error is a human-readable message.
    pub fn parse(text: &str, api_key: Option<&str>) -> std::result::Result<Self, String> {
        let mut config: Config = toml::from_str(text).map_err(|e| e.to_string())?;
        if let Some(key) = api_key {
            config.mailchimp.api_key = key.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let mc = &self.mailchimp;
        for (key, value) in [
            ("mailchimp.list_id", &mc.list_id),
            ("mailchimp.account", &mc.account),
            ("mailchimp.api_key", &mc.api_key),
        ] {
            if value.trim().is_empty() {
                return Err(format!("`{key}` must not be empty"));
            }
        }
        if mc.base_url().is_none() {
            return Err("`mailchimp.api_key` has no datacenter suffix (e.g. `-us6`) and no `api_base` is set".into());
        }
        if !matches!(
            mc.status_if_new,
            SubscriptionStatus::Subscribed | SubscriptionStatus::Pending | SubscriptionStatus::Unsubscribed
        ) {
            return Err(format!(
                "`mailchimp.status_if_new` must be subscribed, pending or unsubscribed, not `{}`",
                mc.status_if_new
            ));
        }
        if mc.timeout_secs == 0 {
            return Err("`mailchimp.timeout_secs` must be greater than 0".into());
        }
        Ok(())
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::from_push_flag(self.run.push)
    }
}

impl MailchimpSettings {
    /// API root, e.g. `https://us6.api.mailchimp.com/3.0`.
    pub fn base_url(&self) -> Option<String> {
        if let Some(base) = &self.api_base {
            return Some(base.clone());
        }
        let (_, dc) = self.api_key.rsplit_once('-')?;
        if dc.is_empty() || !dc.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(format!("https://{dc}.api.mailchimp.com/3.0"))
    }
}

/// `<config_dir>/roster-sync/config.toml`, falling back to the working
/// directory when the platform has no config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("roster-sync"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}
