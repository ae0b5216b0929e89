use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:42607";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceBackend {
    /// SQLite database in the config directory.
    #[default]
    Local,
    /// The notebook store's settings endpoints.
    Remote,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub preferences: PreferenceBackend,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            preferences: PreferenceBackend::default(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl AppConfig {
    /// `ENO_API_URL` wins over the configured base URL.
    pub fn api_base_url(&self) -> String {
        std::env::var("ENO_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.general.api_base_url.clone())
            .trim_end_matches('/')
            .to_string()
    }
}

pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ENO_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".eno");
    path
}

pub fn load_config() -> AppConfig {
    let path = get_config_dir();
    fs::create_dir_all(&path).ok();
    load_config_from(&path.join("config.toml"))
}

/// Reads `path`, writing defaults if it does not exist and setting aside a
/// file that does not parse.
pub fn load_config_from(path: &Path) -> AppConfig {
    if !path.exists() {
        let default_config = AppConfig::default();
        if let Ok(toml_str) = toml::to_string_pretty(&default_config) {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                options.mode(0o600);
            }
            if let Ok(mut file) = options.open(path) {
                let _ = file.write_all(toml_str.as_bytes());
            }
        }
        return default_config;
    }

    match fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to parse config.toml: {}.", e);
                let backup_path = path.with_extension("toml.bak");
                if let Err(backup_err) = fs::rename(path, &backup_path) {
                    eprintln!("Failed to backup corrupted config: {}", backup_err);
                } else {
                    eprintln!("Corrupted config backed up to {:?}", backup_path);
                }
                eprintln!("Using default configuration.");
                AppConfig::default()
            }
        },
        Err(e) => {
            eprintln!("Failed to read config file: {}. Using default.", e);
            AppConfig::default()
        }
    }
}
