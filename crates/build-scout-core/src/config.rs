use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

const CONFIG_FILE: &str = "config.toml";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# build-scout configuration file
# Location: ~/.build-scout/config.toml

[library]
# Folder holding installed builds (stable/, daily/, experimental/, custom/)
# Default: ~/.build-scout/library
# folder = "/opt/blender-library"

[sources]
# Index pages scraped for each channel
stable = "https://download.blender.org/release/"
daily = "https://builder.blender.org/download"
experimental = "https://builder.blender.org/download/experimental"
patch = "https://builder.blender.org/download/patch"
# Redirects to the newest launcher release; the final path segment is the tag
latest_release = "https://github.com/DotBow/Blender-Launcher/releases/latest"

[watcher]
# Seconds between library folder scans
poll_interval_secs = 3

[http]
# Per-request timeout in seconds
timeout_secs = 30
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library folder; `<base>/library` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
}

/// Index URLs of the distribution channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_stable")]
    pub stable: String,
    #[serde(default = "default_daily")]
    pub daily: String,
    #[serde(default = "default_experimental")]
    pub experimental: String,
    #[serde(default = "default_patch")]
    pub patch: String,
    #[serde(default = "default_latest_release")]
    pub latest_release: String,
}

fn default_stable() -> String {
    "https://download.blender.org/release/".to_string()
}

fn default_daily() -> String {
    "https://builder.blender.org/download".to_string()
}

fn default_experimental() -> String {
    "https://builder.blender.org/download/experimental".to_string()
}

fn default_patch() -> String {
    "https://builder.blender.org/download/patch".to_string()
}

fn default_latest_release() -> String {
    "https://github.com/DotBow/Blender-Launcher/releases/latest".to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            stable: default_stable(),
            daily: default_daily(),
            experimental: default_experimental(),
            patch: default_patch(),
            latest_release: default_latest_release(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    3
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| ScoutError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Library folder, resolved against the base directory
    pub fn library_folder(&self, base_dir: &Path) -> PathBuf {
        self.library
            .folder
            .clone()
            .unwrap_or_else(|| base_dir.join("library"))
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "library.folder" => {
                self.library.folder = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "sources.stable" => self.sources.stable = parse_url(key, value)?,
            "sources.daily" => self.sources.daily = parse_url(key, value)?,
            "sources.experimental" => self.sources.experimental = parse_url(key, value)?,
            "sources.patch" => self.sources.patch = parse_url(key, value)?,
            "sources.latest_release" => self.sources.latest_release = parse_url(key, value)?,
            "watcher.poll_interval_secs" => {
                self.watcher.poll_interval_secs = parse_seconds(key, value)?
            }
            "http.timeout_secs" => self.http.timeout_secs = parse_seconds(key, value)?,
            _ => {
                return Err(ScoutError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "library.folder".to_string(),
                self.library
                    .folder
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            ("sources.stable".to_string(), self.sources.stable.clone()),
            ("sources.daily".to_string(), self.sources.daily.clone()),
            (
                "sources.experimental".to_string(),
                self.sources.experimental.clone(),
            ),
            ("sources.patch".to_string(), self.sources.patch.clone()),
            (
                "sources.latest_release".to_string(),
                self.sources.latest_release.clone(),
            ),
            (
                "watcher.poll_interval_secs".to_string(),
                self.watcher.poll_interval_secs.to_string(),
            ),
            (
                "http.timeout_secs".to_string(),
                self.http.timeout_secs.to_string(),
            ),
        ]
    }
}

fn parse_url(key: &str, value: &str) -> Result<String> {
    reqwest::Url::parse(value)
        .map(|_| value.to_string())
        .map_err(|_| ScoutError::InvalidConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_seconds(key: &str, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ScoutError::InvalidConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.watcher.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.sources.stable, "https://download.blender.org/release/");
        assert!(config.library.folder.is_none());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.sources.daily, default_daily());
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str("[watcher]\npoll_interval_secs = 10\n").unwrap();
        assert_eq!(config.watcher.poll_interval_secs, 10);
        assert_eq!(config.sources.patch, default_patch());
    }

    #[test]
    fn test_config_get_set() {
        let mut config = Config::default();

        config
            .set("sources.daily", "https://mirror.example.com/daily")
            .unwrap();
        assert_eq!(
            config.get("sources.daily").as_deref(),
            Some("https://mirror.example.com/daily")
        );

        config.set("watcher.poll_interval_secs", "5").unwrap();
        assert_eq!(config.watcher.poll_interval_secs, 5);

        assert!(config.set("watcher.poll_interval_secs", "0").is_err());
        assert!(config.set("sources.stable", "not a url").is_err());
        assert!(config.set("nope", "1").is_err());
        assert!(config.get("nope").is_none());
    }

    #[test]
    fn test_library_folder_resolution() {
        let mut config = Config::default();
        let base = Path::new("/home/u/.build-scout");
        assert_eq!(config.library_folder(base), base.join("library"));

        config.set("library.folder", "/opt/blender").unwrap();
        assert_eq!(config.library_folder(base), PathBuf::from("/opt/blender"));
    }

    #[test]
    fn test_save_load_init() {
        let temp = TempDir::new().unwrap();

        let path = Config::init(temp.path()).unwrap();
        assert!(path.exists());
        assert_eq!(Config::load(temp.path()).unwrap().http.timeout_secs, 30);

        let mut config = Config::default();
        config.set("http.timeout_secs", "7").unwrap();
        config.save(temp.path()).unwrap();
        assert_eq!(Config::load(temp.path()).unwrap().http.timeout_secs, 7);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "[watcher\n").unwrap();
        let err = Config::load(temp.path()).unwrap_err();
        assert!(matches!(err, ScoutError::ConfigParse { .. }));
    }
}
