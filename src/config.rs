use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{JsonOptions, XmlOptions};

const CONFIG_ENV: &str = "GRAPH_EXPLORER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub explorer: ExplorerConfig,
    /// Default options of the JSON data source
    pub json: JsonOptions,
    /// Default options of the XML data source
    pub xml: XmlOptions,
    pub sources: SourcesConfig,
    pub http_server: HttpServerConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SQLite file holding saved workspaces
    #[serde(default = "default_workspace_db")]
    pub workspace_db: PathBuf,
    #[serde(default = "default_visualizer")]
    pub default_visualizer: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workspace_db: default_workspace_db(),
            default_visualizer: default_visualizer(),
        }
    }
}

/// Source reading settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl SourcesConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workspace_db() -> PathBuf {
    PathBuf::from("workspaces.db")
}

fn default_visualizer() -> String {
    "simple_visualizer".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads `.env` (if present) first. The file is taken from
    /// `GRAPH_EXPLORER_CONFIG` when set, which must then exist; otherwise
    /// `./config.toml` is used if present, else built-in defaults.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    log::debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.json.max_depth == 0 {
            anyhow::bail!("json.max_depth must be greater than 0");
        }
        if self.xml.max_depth == 0 {
            anyhow::bail!("xml.max_depth must be greater than 0");
        }
        if self.sources.http_timeout_secs == 0 {
            anyhow::bail!("sources.http_timeout_secs must be greater than 0");
        }
        if self.http_server.port == 0 {
            anyhow::bail!("http_server.port must not be 0");
        }
        Ok(())
    }

    /// Get workspace database path
    pub fn workspace_db(&self) -> &Path {
        &self.explorer.workspace_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide cwd and env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[explorer]
log_level = "debug"
workspace_db = "./ws.db"
default_visualizer = "block_visualizer"

[json]
id_field = "key"
max_depth = 4

[xml]
ref_attributes = ["next"]
allow_cycles = false

[sources]
http_timeout_secs = 5

[http_server]
port = 9000
allowed_origins = ["http://localhost:3000"]
"#;

    /// Restores cwd when dropped (e.g. on panic).
    struct CwdGuard(PathBuf);
    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    fn with_config_env(config_path: Option<&Path>, f: impl FnOnce()) {
        let original = std::env::var(CONFIG_ENV).ok();
        match config_path {
            Some(p) => std::env::set_var(CONFIG_ENV, p),
            None => std::env::remove_var(CONFIG_ENV),
        }
        f();
        std::env::remove_var(CONFIG_ENV);
        if let Some(val) = original {
            std::env::set_var(CONFIG_ENV, val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("explorer.toml");
        fs::write(&config_path, FULL_CONFIG).unwrap();

        with_config_env(Some(&config_path), || {
            let config = Config::load().unwrap();
            assert_eq!(config.explorer.log_level, "debug");
            assert_eq!(config.explorer.default_visualizer, "block_visualizer");
            assert_eq!(config.json.id_field, "key");
            assert_eq!(config.json.max_depth, 4);
            assert_eq!(config.json.children_field, "children");
            assert_eq!(config.xml.ref_attributes, vec!["next".to_string()]);
            assert!(!config.xml.allow_cycles);
            assert_eq!(config.xml.max_depth, 50);
            assert_eq!(config.sources.http_timeout(), Duration::from_secs(5));
            assert_eq!(config.http_server.port, 9000);
            assert_eq!(config.http_server.host, "127.0.0.1");
        });
    }

    #[test]
    fn test_config_defaults_without_file() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();

        with_config_env(None, || {
            let config = Config::load().unwrap();
            assert_eq!(config.explorer.log_level, "info");
            assert_eq!(config.json.id_field, "@id");
            assert_eq!(config.sources.http_timeout_secs, 30);
            assert_eq!(config.http_server.port, 8080);
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(Some(Path::new("nonexistent.toml")), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("nonexistent.toml"));
        });
    }

    #[test]
    fn test_config_validation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");

        fs::write(&path, "[sources]\nhttp_timeout_secs = 0\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("http_timeout_secs"));

        fs::write(&path, "[xml]\nmax_depth = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "[http_server]\nport = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
