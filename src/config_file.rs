//! Installation configuration: everything a run needs, as one JSON document.
//!
//! The same document drives headless installs (`install --config`) and is
//! what the interactive wizard produces and can save with `--save-config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::disk::model::Disk;
use crate::disk::validate::validate_plan;
use crate::error::InstallerError;
use crate::types::DesktopEnvironment;

/// Provisioning root used when the document does not name one.
pub const DEFAULT_TMP_FOLDER: &str = "/mnt/alinix-temp";

/// Mirror used when no repository was chosen.
pub const DEFAULT_REPO: &str = "http://archive.ubuntu.com/ubuntu/";

fn default_tmp_folder() -> PathBuf {
    PathBuf::from(DEFAULT_TMP_FOLDER)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Full name, stored in the GECOS field
    #[serde(default)]
    pub name: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationConfig {
    pub user: UserRecord,

    pub disks: Vec<Disk>,

    /// IANA name such as `America/Sao_Paulo`
    #[serde(default)]
    pub timezone: Option<String>,

    /// Apt mirrors; the first one is written to sources.list
    #[serde(default)]
    pub repos: Vec<String>,

    /// Extra apt packages
    #[serde(default)]
    pub apps: Vec<String>,

    #[serde(default)]
    pub desktop: Option<DesktopEnvironment>,

    #[serde(default)]
    pub wifi: Option<WifiCredentials>,

    #[serde(default = "default_tmp_folder", alias = "tmpFolder")]
    pub tmp_folder: PathBuf,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            user: UserRecord::default(),
            disks: Vec::new(),
            timezone: None,
            repos: Vec::new(),
            apps: Vec::new(),
            desktop: None,
            wifi: None,
            tmp_folder: default_tmp_folder(),
        }
    }
}

impl InstallationConfig {
    /// Load from a file path or, when the text starts with `{`, from inline JSON.
    pub fn load(source: &str) -> Result<Self> {
        if source.trim_start().starts_with('{') {
            Self::from_json(source).context("Failed to parse inline configuration JSON")
        } else {
            Self::load_from_file(source)
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| InstallerError::from(e).into())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Mirror written to the target's sources.list
    pub fn primary_repo(&self) -> &str {
        self.repos
            .first()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REPO)
    }

    /// Check the user record, timezone, repos and the partition plan.
    pub fn validate(&self) -> Result<()> {
        validate_username(&self.user.username).map_err(anyhow::Error::msg)?;
        validate_hostname(&self.user.hostname).map_err(anyhow::Error::msg)?;
        validate_password(&self.user.password).map_err(anyhow::Error::msg)?;

        if let Some(tz) = &self.timezone {
            let valid = tz.contains('/')
                && !tz.contains("..")
                && !tz.starts_with('/')
                && tz.chars().all(|c| c.is_ascii_alphanumeric() || "/_-+".contains(c));
            if !valid {
                anyhow::bail!("Timezone '{}' is not an Area/City name", tz);
            }
        }

        for repo in &self.repos {
            if !repo.starts_with("http://") && !repo.starts_with("https://") {
                anyhow::bail!("Repository '{}' must start with http:// or https://", repo);
            }
        }

        if let Some(wifi) = &self.wifi {
            if wifi.ssid.trim().is_empty() {
                anyhow::bail!("Wi-Fi SSID must not be empty");
            }
        }

        if self.disks.is_empty() {
            anyhow::bail!("At least one disk must be configured");
        }

        let issues = validate_plan(&self.disks);
        if !issues.is_empty() {
            return Err(InstallerError::Validation(issues).into());
        }

        Ok(())
    }
}

/// Linux login name: lowercase letter or `_`, then up to 31 of `[a-z0-9_-]`.
pub fn validate_username(username: &str) -> std::result::Result<(), String> {
    let mut chars = username.chars();
    let Some(first) = chars.next() else {
        return Err("Username must be specified".to_string());
    };
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err("Username must start with a lowercase letter or '_'".to_string());
    }
    if username.len() > 32 {
        return Err("Username must be at most 32 characters long".to_string());
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err("Username can only contain lowercase letters, numbers, '-' and '_'".to_string());
    }
    Ok(())
}

/// RFC 1123 label: 1-63 of `[A-Za-z0-9-]`, no leading or trailing hyphen.
pub fn validate_hostname(hostname: &str) -> std::result::Result<(), String> {
    if hostname.is_empty() {
        return Err("Hostname must be specified".to_string());
    }
    if hostname.len() > 63 {
        return Err("Hostname must be at most 63 characters long".to_string());
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        return Err("Hostname cannot start or end with '-'".to_string());
    }
    if !hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("Hostname can only contain letters, numbers and '-'".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> std::result::Result<(), String> {
    if password.chars().count() < 4 {
        return Err("Password must be at least 4 characters long".to_string());
    }
    if password.contains('\n') || password.contains(':') {
        return Err("Password cannot contain ':' or line breaks".to_string());
    }
    Ok(())
}
