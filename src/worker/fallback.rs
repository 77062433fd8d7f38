//! Responses served when neither the cache nor the network can answer.

use tracing::{debug, warn};
use url::Url;

use crate::cache::AssetCache;
use crate::http::{Request, Response};

pub const OFFLINE_MESSAGE: &str = "Application is not connected to the internet";
pub const API_ERROR_MESSAGE: &str = "Error fetching data";

#[derive(Debug, Clone)]
pub struct FallbackPolicy {
  image_suffixes: Vec<String>,
  /// Asset cache key of the placeholder image
  placeholder_key: String,
}

impl FallbackPolicy {
  pub fn new(image_suffixes: &[String], placeholder_key: impl Into<String>) -> Self {
    Self {
      image_suffixes: image_suffixes
        .iter()
        .map(|s| s.to_ascii_lowercase())
        .collect(),
      placeholder_key: placeholder_key.into(),
    }
  }

  pub fn is_image(&self, request: &Request) -> bool {
    let path = Url::parse(&request.url)
      .map(|u| u.path().to_ascii_lowercase())
      .unwrap_or_else(|_| request.url.to_ascii_lowercase());

    self
      .image_suffixes
      .iter()
      .any(|suffix| path.ends_with(suffix.as_str()))
  }

  /// Degraded response for a static request. Only ever reads the cache.
  pub fn respond<A: AssetCache + ?Sized>(&self, cache: &A, request: &Request) -> Response {
    if self.is_image(request) {
      match cache.lookup(&self.placeholder_key) {
        Ok(Some(placeholder)) => {
          debug!(url = %request.url, "Serving placeholder image");
          return placeholder;
        }
        Ok(None) => warn!(key = %self.placeholder_key, "Placeholder image is not cached"),
        Err(e) => warn!(error = %e, "Failed to read placeholder image"),
      }
    }

    offline()
  }
}

/// The 404 served for static requests while offline.
pub fn offline() -> Response {
  Response::text(404, OFFLINE_MESSAGE, OFFLINE_MESSAGE)
}

/// The 500 served when a data API call cannot be answered.
pub fn api_error() -> Response {
  Response::text(500, "Internal Server Error", API_ERROR_MESSAGE)
}
