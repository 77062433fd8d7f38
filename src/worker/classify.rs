//! Deciding where an intercepted request is resolved, and under which key.

use url::Url;

use crate::config::Config;
use crate::http::Request;

/// Key used for the whole-collection response.
pub const COLLECTION_KEY: &str = "-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
  /// Data API call, resolved against the record store
  Api,
  /// Anything else, resolved against the asset cache
  Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
  pub kind: RequestKind,
  pub key: String,
}

impl Classification {
  fn static_key(key: impl Into<String>) -> Self {
    Self {
      kind: RequestKind::Static,
      key: key.into(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Classifier {
  api_port: u16,
  collection: String,
  detail_page: String,
}

impl Classifier {
  pub fn new(api_port: u16, collection: &str, detail_page: &str) -> Self {
    Self {
      api_port,
      collection: collection.to_string(),
      detail_page: detail_page.to_string(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(
      config.api.port,
      &config.api.collection,
      &config.assets.detail_page,
    )
  }

  /// Classify a request. Never fails: anything unparseable is a static
  /// request keyed by its raw URL.
  pub fn classify(&self, request: &Request) -> Classification {
    self.classify_url(&request.url)
  }

  pub fn classify_url(&self, raw: &str) -> Classification {
    let Ok(mut url) = Url::parse(raw) else {
      return Classification::static_key(raw);
    };
    url.set_fragment(None);

    // Only an explicit port marks the API; default-port URLs are the site
    if url.port() == Some(self.api_port) {
      return Classification {
        kind: RequestKind::Api,
        key: self.api_key(&url),
      };
    }

    if !self.detail_page.is_empty() && url.path().contains(&self.detail_page) {
      return Classification::static_key(self.detail_page.clone());
    }

    Classification::static_key(url.as_str())
  }

  /// Key for a data API call.
  ///
  /// The last non-empty path segment names the resource; the collection
  /// root maps to the sentinel. A query string is kept so that filtered
  /// listings (reviews by restaurant) do not collide with each other.
  fn api_key(&self, url: &Url) -> String {
    let segment = url
      .path_segments()
      .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
      .unwrap_or_default();

    let base = if segment == self.collection {
      COLLECTION_KEY
    } else {
      segment
    };

    match url.query() {
      Some(query) if !query.is_empty() => format!("{}?{}", base, query),
      _ => base.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new(1337, "restaurants", "restaurant.html")
  }

  fn classify(url: &str) -> Classification {
    classifier().classify(&Request::get(url))
  }

  #[test]
  fn test_collection_root_is_sentinel() {
    let c = classify("http://localhost:1337/restaurants");
    assert_eq!(c.kind, RequestKind::Api);
    assert_eq!(c.key, COLLECTION_KEY);

    assert_eq!(classify("http://localhost:1337/restaurants/").key, "-1");
  }

  #[test]
  fn test_default_port_is_never_the_api() {
    let on_80 = Classifier::new(80, "restaurants", "restaurant.html");

    let page = on_80.classify_url("http://localhost/index.html");
    assert_eq!(page.kind, RequestKind::Static);
    assert_eq!(page.key, "http://localhost/index.html");
    assert_eq!(
      on_80.classify_url("http://localhost/restaurants/3").kind,
      RequestKind::Static
    );
    assert_eq!(
      on_80.classify_url("http://localhost:8000/img/1.jpg").kind,
      RequestKind::Static
    );
  }

  #[test]
  fn test_resource_id_is_key() {
    let c = classify("http://localhost:1337/restaurants/42");
    assert_eq!(c.kind, RequestKind::Api);
    assert_eq!(c.key, "42");
  }

  #[test]
  fn test_reviews_keep_their_query() {
    let one = classify("http://localhost:1337/restaurants/reviews/?restaurant_id=1");
    let two = classify("http://localhost:1337/restaurants/reviews/?restaurant_id=2");
    assert_eq!(one.kind, RequestKind::Api);
    assert_eq!(one.key, "reviews?restaurant_id=1");
    assert_ne!(one.key, two.key);
  }

  #[test]
  fn test_other_ports_are_static() {
    let c = classify("http://localhost:8000/css/styles.css");
    assert_eq!(c.kind, RequestKind::Static);
    assert_eq!(c.key, "http://localhost:8000/css/styles.css");
  }

  #[test]
  fn test_detail_pages_share_one_key() {
    let one = classify("http://localhost:8000/restaurant.html?id=1");
    let two = classify("http://localhost:8000/restaurant.html?id=2");
    let bare = classify("http://localhost:8000/restaurant.html");
    assert_eq!(one.kind, RequestKind::Static);
    assert_eq!(one.key, "restaurant.html");
    assert_eq!(one, two);
    assert_eq!(one, bare);
  }

  #[test]
  fn test_detail_page_name_in_query_only_is_not_canonicalized() {
    let c = classify("http://localhost:8000/index.html?next=restaurant.html");
    assert_eq!(c.key, "http://localhost:8000/index.html?next=restaurant.html");
  }

  #[test]
  fn test_unparseable_url_defaults_to_static() {
    let c = classify("not a url at all");
    assert_eq!(c.kind, RequestKind::Static);
    assert_eq!(c.key, "not a url at all");
  }

  #[test]
  fn test_fragment_is_dropped() {
    assert_eq!(
      classify("http://localhost:8000/index.html#map").key,
      "http://localhost:8000/index.html"
    );
  }
}
