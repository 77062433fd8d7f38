use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the page (and its static assets) is served from
  pub origin: String,
  pub api: ApiConfig,
  pub assets: AssetsConfig,
  pub records: RecordsConfig,
  /// Database file for both stores (defaults to the data directory)
  pub database: Option<PathBuf>,
  /// Network timeout in seconds
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Requests to this port are data API calls
  pub port: u16,
  /// Name of the collection root path segment
  pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
  /// Name of the response cache
  pub cache_name: String,
  /// Paths fetched and cached at install time, relative to `origin`
  pub manifest: Vec<String>,
  /// Every request whose path contains this filename shares one cache entry
  pub detail_page: String,
  /// Served in place of images that cannot be fetched
  pub placeholder: String,
  /// Path suffixes that mark a request as an image (case-insensitive)
  pub image_suffixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
  pub name: String,
  pub version: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8000".to_string(),
      api: ApiConfig::default(),
      assets: AssetsConfig::default(),
      records: RecordsConfig::default(),
      database: None,
      timeout_secs: 10,
    }
  }
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      port: 1337,
      collection: "restaurants".to_string(),
    }
  }
}

impl Default for AssetsConfig {
  fn default() -> Self {
    let manifest = [
      "/",
      "/index.html",
      "/restaurant.html",
      "/css/styles.css",
      "/js/dbhelper.js",
      "/js/main.js",
      "/js/restaurant_info.js",
      "/img/na.png",
      "/js/register.js",
    ];

    Self {
      cache_name: "mws-restaruant-001".to_string(),
      manifest: manifest.iter().map(|s| s.to_string()).collect(),
      detail_page: "restaurant.html".to_string(),
      placeholder: "/img/na.png".to_string(),
      image_suffixes: vec![".jpg".to_string()],
    }
  }
}

impl Default for RecordsConfig {
  fn default() -> Self {
    Self {
      name: "fm-udacity-restaurant".to_string(),
      version: 1,
    }
  }
}

impl Config {
  /// Load configuration from file, falling back to built-in defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./rrcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rrcache/config.yaml
  ///
  /// `RRCACHE_ORIGIN` overrides the origin from any source.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var("RRCACHE_ORIGIN") {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rrcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rrcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if self.records.version == 0 {
      return Err(eyre!("records.version must be at least 1"));
    }
    if !self.assets.manifest.contains(&self.assets.placeholder) {
      tracing::warn!(
        placeholder = %self.assets.placeholder,
        "Placeholder image is not in the install manifest; image fallback will not work"
      );
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }

  /// Root of the data API: the origin's host on the API port.
  pub fn api_base(&self) -> Result<Url> {
    let mut url = self.origin_url()?;
    url
      .set_port(Some(self.api.port))
      .map_err(|_| eyre!("Origin {} cannot carry a port", self.origin))?;
    url.set_path("/");
    Ok(url)
  }

  /// Install manifest resolved against the origin.
  pub fn manifest_urls(&self) -> Result<Vec<Url>> {
    let origin = self.origin_url()?;
    self
      .assets
      .manifest
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map_err(|e| eyre!("Invalid manifest entry {}: {}", path, e))
      })
      .collect()
  }

  pub fn placeholder_url(&self) -> Result<Url> {
    let origin = self.origin_url()?;
    origin
      .join(&self.assets.placeholder)
      .map_err(|e| eyre!("Invalid placeholder {}: {}", self.assets.placeholder, e))
  }

  /// Database path: explicit setting, else the platform data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.database {
      return Ok(path.clone());
    }
    Ok(data_dir()?.join("cache.db"))
  }
}

/// Directory for the database and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("rrcache"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.port, 1337);
    assert_eq!(config.assets.manifest.len(), 9);
    assert!(config.assets.manifest.contains(&config.assets.placeholder));
    assert_eq!(
      config.api_base().unwrap().as_str(),
      "http://localhost:1337/"
    );
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      "origin: http://example.test:9000\napi:\n  port: 4000\nrecords:\n  version: 2\n",
    )
    .unwrap();

    assert_eq!(config.api.port, 4000);
    assert_eq!(config.api.collection, "restaurants");
    assert_eq!(config.records.version, 2);
    assert_eq!(config.records.name, "fm-udacity-restaurant");
    assert_eq!(config.assets.detail_page, "restaurant.html");
    assert_eq!(
      config.api_base().unwrap().as_str(),
      "http://example.test:4000/"
    );
  }

  #[test]
  fn test_manifest_resolves_against_origin() {
    let config = Config::default();
    let urls = config.manifest_urls().unwrap();
    assert_eq!(urls[0].as_str(), "http://localhost:8000/");
    assert_eq!(urls[3].as_str(), "http://localhost:8000/css/styles.css");
    assert_eq!(
      config.placeholder_url().unwrap().as_str(),
      "http://localhost:8000/img/na.png"
    );
  }

  #[test]
  fn test_invalid_origin_is_rejected() {
    let config = Config {
      origin: "not a url".to_string(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_config_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/rrcache.yaml"))).is_err());
  }
}
