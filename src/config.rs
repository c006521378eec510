use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix; `ROUTEFAN_ENGINES__DIRECTORY` maps to `engines.directory`.
pub const ENV_PREFIX: &str = "ROUTEFAN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engines: EngineConfig,
    pub cache: CacheConfig,
    pub geocoder: GeocoderConfig,
    pub rendering: RenderingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub directory: PathBuf,
    pub time_budget_secs: u64,
    pub kill_grace_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub graph_dir: PathBuf,
    pub asset_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub nominatim_url: String,
    pub overpass_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    pub output_dir: PathBuf,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub domain_log_file: Option<String>,
}

impl Config {
    /// Layered load: defaults, then the TOML file, then `ROUTEFAN_*` environment variables.
    ///
    /// Without an explicit path an optional `routefan.toml` in the working directory is used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("routefan").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl EngineConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_millis)
    }
}

impl GeocoderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("engines"),
            time_budget_secs: 30,
            kill_grace_millis: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            graph_dir: PathBuf::from("cache/graphs"),
            asset_dir: PathBuf::from("cache/assets"),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            nominatim_url: "https://nominatim.openstreetmap.org/search".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            user_agent: format!("routefan/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 180,
        }
    }
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            stylesheets: vec!["https://unpkg.com/leaflet@1.9.4/dist/leaflet.css".to_string()],
            scripts: vec!["https://unpkg.com/leaflet@1.9.4/dist/leaflet.js".to_string()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            domain_log_file: None,
        }
    }
}
