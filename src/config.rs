use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feed::fetcher::DEFAULT_PROXY_URL;
use crate::feed::FeedSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered feed registry; read-only during a session.
    #[serde(default = "default_sources")]
    pub sources: Vec<FeedSource>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Overrides the platform cache directory when set.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            settings: Settings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| Error::Config(format!("Config not found: {}", path.as_ref().display())))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(Error::Config("Source name cannot be empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate source name: {}",
                    source.name
                )));
            }

            let parsed = url::Url::parse(&source.url)
                .map_err(|_| Error::InvalidUrl(source.url.clone()))?;
            match parsed.scheme() {
                "http" | "https" => {}
                scheme => {
                    return Err(Error::InvalidUrl(format!(
                        "Unsupported scheme '{}' for {}",
                        scheme, source.name
                    )))
                }
            }
        }

        if self.settings.timeout_ms == 0 {
            return Err(Error::Config(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }
        if self.settings.cache_ttl_ms == 0 {
            return Err(Error::Config(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(proxy) = std::env::var("NEWSDECK_PROXY_URL") {
            self.settings.proxy_url = proxy;
        }

        if let Ok(timeout) = std::env::var("NEWSDECK_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse() {
                self.settings.timeout_ms = val;
            }
        }

        if let Ok(ttl) = std::env::var("NEWSDECK_CACHE_TTL_MS") {
            if let Ok(val) = ttl.parse() {
                self.settings.cache_ttl_ms = val;
            }
        }

        if let Ok(level) = std::env::var("NEWSDECK_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            timeout_ms: default_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_path: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sources() -> Vec<FeedSource> {
    vec![
        FeedSource::new("TechCrunch", "https://techcrunch.com/feed/"),
        FeedSource::new("The Verge", "https://www.theverge.com/rss/index.xml"),
        FeedSource::new("Ars Technica", "https://feeds.arstechnica.com/arstechnica/index"),
        FeedSource::new("Wired", "https://www.wired.com/feed/rss"),
        FeedSource::new("ITmedia", "https://rss.itmedia.co.jp/rss/2.0/news_bursts.xml"),
        FeedSource::new("Gigazine", "https://gigazine.net/news/rss_2.0/"),
        FeedSource::new("Publickey", "https://www.publickey1.jp/atom.xml"),
        FeedSource::new("ZDNet Japan", "https://japan.zdnet.com/rss/"),
        FeedSource::new("Hacker News", "https://hnrss.org/frontpage"),
    ]
}

fn default_proxy_url() -> String {
    DEFAULT_PROXY_URL.to_string()
}
fn default_timeout_ms() -> u64 {
    6000
}
fn default_cache_ttl_ms() -> u64 {
    600_000
}
fn default_user_agent() -> String {
    format!("newsdeck/{}", env!("CARGO_PKG_VERSION"))
}
fn default_log_level() -> String {
    "info".to_string()
}
