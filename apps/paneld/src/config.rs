use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Daemon configuration, read from `config.json` in the panel data dir.
/// A missing file means defaults; a malformed one is an error so typos do
/// not silently fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default = "default_mc_dir")]
    pub mc_dir: PathBuf,
    #[serde(default = "default_java_args")]
    pub java_args: Vec<String>,
    #[serde(default = "default_jar_name")]
    pub jar_name: String,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            mc_dir: default_mc_dir(),
            java_args: default_java_args(),
            jar_name: default_jar_name(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl PanelConfig {
    /// Live world directory, replaced in place during a restore.
    pub fn world_dir(&self) -> PathBuf {
        self.mc_dir.join("world")
    }

    /// Root the backup mod writes its tiers under.
    pub fn backup_root(&self) -> PathBuf {
        self.mc_dir.join("backups")
    }
}

pub fn load() -> Result<PanelConfig, String> {
    let path = config_path()?;
    let content = match fs::read_to_string(&path) {
        Ok(value) => value,
        Err(_) => return Ok(PanelConfig::default()),
    };

    serde_json::from_str::<PanelConfig>(&content)
        .map_err(|err| format!("Failed to parse panel config: {err}"))
}

pub fn panel_log_path() -> PathBuf {
    data_dir()
        .map(|dir| dir.join("panel.log"))
        .unwrap_or_else(|_| std::env::temp_dir().join("panel.log"))
}

fn config_path() -> Result<PathBuf, String> {
    Ok(data_dir()?.join("config.json"))
}

fn data_dir() -> Result<PathBuf, String> {
    if let Some(base) = dirs::data_dir() {
        return Ok(base.join("mc-panel").join("paneld"));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".mc-panel").join("paneld"));
    }
    Err("Unable to resolve a writable data directory".to_string())
}

fn default_mc_dir() -> PathBuf {
    data_dir()
        .map(|dir| dir.join("mc_server"))
        .unwrap_or_else(|_| PathBuf::from("mc_server"))
}

fn default_java_args() -> Vec<String> {
    vec!["-Xms1G".to_string(), "-Xmx4G".to_string()]
}

fn default_jar_name() -> String {
    "fabric-server-launch.jar".to_string()
}

fn default_stop_timeout_secs() -> u64 {
    30
}
