use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.yml";
pub const API_URL_ENV: &str = "VOICEOVER_API_URL";
/// `phase_count + 1` marks "script received", so it must still fit in a `u8`.
pub const MAX_PHASE_COUNT: u8 = u8::MAX - 1;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub wizard: WizardConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    #[serde(default = "default_speakable_path")]
    pub speakable_path: String,
    #[serde(default = "default_synthesize_path")]
    pub synthesize_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WizardConfig {
    /// Number of cosmetic progress phases shown while a script is generated.
    #[serde(default = "default_phase_count")]
    pub phase_count: u8,
    #[serde(default = "default_phase_interval")]
    pub phase_interval_ms: u64,
    /// Pause between the final phase and revealing the script.
    #[serde(default = "default_reveal_delay")]
    pub reveal_delay_ms: u64,
    #[serde(default = "default_tags")]
    pub available_tags: Vec<String>,
    #[serde(default = "default_duration")]
    pub default_duration: u8,
    #[serde(default = "default_max_duration")]
    pub max_duration: u8,
}

fn default_output() -> String {
    "output".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_generate_path() -> String {
    "/api/generate-script".to_string()
}
fn default_speakable_path() -> String {
    "/api/prepare-voiceover".to_string()
}
fn default_synthesize_path() -> String {
    "/api/text-to-speech".to_string()
}
fn default_timeout() -> u64 {
    60
}
fn default_phase_count() -> u8 {
    3
}
fn default_phase_interval() -> u64 {
    1500
}
fn default_reveal_delay() -> u64 {
    500
}
fn default_tags() -> Vec<String> {
    ["Educational", "Entertainment", "Tutorial", "Travel", "Review", "Storytelling"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}
fn default_duration() -> u8 {
    5
}
fn default_max_duration() -> u8 {
    15
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            generate_path: default_generate_path(),
            speakable_path: default_speakable_path(),
            synthesize_path: default_synthesize_path(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            phase_count: default_phase_count(),
            phase_interval_ms: default_phase_interval(),
            reveal_delay_ms: default_reveal_delay(),
            available_tags: default_tags(),
            default_duration: default_duration(),
            max_duration: default_max_duration(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: default_output(),
            api: ApiConfig::default(),
            wizard: WizardConfig::default(),
        }
    }
}

impl WizardConfig {
    pub fn phase_interval(&self) -> Duration {
        Duration::from_millis(self.phase_interval_ms)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    /// `phase_count` bounded to `1..=MAX_PHASE_COUNT`.
    pub fn phase_total(&self) -> u8 {
        self.phase_count.clamp(1, MAX_PHASE_COUNT)
    }

    /// Same wizard without the cosmetic delays.
    pub fn instant() -> Self {
        Self {
            phase_interval_ms: 0,
            reveal_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Loads `config.yml`, writing the defaults out first if it does not exist yet.
    pub fn load_or_default() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            return Self::load_from(path);
        }

        warn!("{} not found, using defaults", CONFIG_FILE);
        let config = Config::default();
        config.save()?;
        info!("Wrote default configuration to {}", CONFIG_FILE);

        let mut config = config;
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(CONFIG_FILE, content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
    }
}
