//! Restaurant data client.
//!
//! Issues ordinary requests and lets the controller decide whether they are
//! answered from the record store or the network. It never touches a store
//! itself; any non-2xx response just means "data unavailable".

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Mutex;
use tracing::debug;
use url::Url;

use super::types::{Restaurant, Review};
use crate::cache::{AssetCache, RecordStore};
use crate::config::Config;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::worker::Controller;

/// Filter value that matches every restaurant.
pub const ALL: &str = "all";

/// Distinct neighborhoods and cuisines, in first-seen order.
#[derive(Debug, Clone, Default)]
struct Facets {
  neighborhoods: Vec<String>,
  cuisines: Vec<String>,
}

impl Facets {
  fn from_restaurants(restaurants: &[Restaurant]) -> Self {
    Self {
      neighborhoods: distinct(restaurants.iter().map(|r| r.neighborhood.as_str())),
      cuisines: distinct(restaurants.iter().map(|r| r.cuisine_type.as_str())),
    }
  }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut seen: Vec<String> = Vec::new();
  for value in values {
    if !seen.iter().any(|s| s == value) {
      seen.push(value.to_string());
    }
  }
  seen
}

pub struct RestaurantClient<R, A, N> {
  controller: Controller<R, A, N>,
  /// `<api origin>/<collection>/`
  collection_url: Url,
  /// Filled by the first successful collection fetch
  facets: Mutex<Option<Facets>>,
}

impl<R, A, N> RestaurantClient<R, A, N>
where
  R: RecordStore,
  A: AssetCache,
  N: Network,
{
  pub fn new(controller: Controller<R, A, N>, config: &Config) -> Result<Self> {
    let collection_url = config
      .api_base()?
      .join(&format!("{}/", config.api.collection))
      .map_err(|e| eyre!("Invalid collection {}: {}", config.api.collection, e))?;

    Ok(Self {
      controller,
      collection_url,
      facets: Mutex::new(None),
    })
  }

  async fn get(&self, url: &Url) -> Response {
    debug!(url = %url, "Requesting");
    self.controller.handle_fetch(&Request::get(url.as_str())).await
  }

  fn join(&self, path: &str) -> Result<Url> {
    self
      .collection_url
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  /// Fetch all restaurants.
  pub async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>> {
    // Collection root without the trailing slash
    let mut url = self.collection_url.clone();
    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let response = self.get(&url).await;
    if !response.ok() {
      return Err(eyre!(
        "Request failed. Returned status of {}",
        response.status
      ));
    }

    let restaurants: Vec<Restaurant> = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse restaurants: {}", e))?;

    if !restaurants.is_empty() {
      self.remember_facets(&restaurants);
    }

    Ok(restaurants)
  }

  /// Fetch a single restaurant by id.
  ///
  /// Some servers answer the detail endpoint with the whole collection; in
  /// that case the matching entry is picked out of it.
  pub async fn fetch_restaurant(&self, id: u64) -> Result<Restaurant> {
    let response = self.get(&self.join(&id.to_string())?).await;
    if !response.ok() {
      return Err(eyre!(
        "Request failed. Returned status of {}",
        response.status
      ));
    }

    let value: Value = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse restaurant {}: {}", id, e))?;

    let restaurant = match value {
      Value::Array(items) => {
        let restaurants: Vec<Restaurant> = serde_json::from_value(Value::Array(items))
          .map_err(|e| eyre!("Failed to parse restaurant {}: {}", id, e))?;
        restaurants.into_iter().find(|r| r.id == id)
      }
      Value::Object(_) => Some(
        serde_json::from_value(value)
          .map_err(|e| eyre!("Failed to parse restaurant {}: {}", id, e))?,
      ),
      _ => None,
    };

    restaurant.ok_or_else(|| eyre!("Restaurant does not exist"))
  }

  /// Fetch all reviews for one restaurant.
  pub async fn fetch_reviews(&self, restaurant_id: u64) -> Result<Vec<Review>> {
    let mut url = self.join("reviews/")?;
    url.set_query(Some(&format!("restaurant_id={}", restaurant_id)));

    let response = self.get(&url).await;
    if !response.ok() {
      return Err(eyre!("No reviews available"));
    }

    serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse reviews for {}: {}", restaurant_id, e))
  }

  /// Restaurants matching both filters; [`ALL`] matches anything.
  pub async fn by_cuisine_and_neighborhood(
    &self,
    cuisine: &str,
    neighborhood: &str,
  ) -> Result<Vec<Restaurant>> {
    let restaurants = self.fetch_restaurants().await?;

    Ok(
      restaurants
        .into_iter()
        .filter(|r| cuisine == ALL || r.cuisine_type == cuisine)
        .filter(|r| neighborhood == ALL || r.neighborhood == neighborhood)
        .collect(),
    )
  }

  pub async fn by_cuisine(&self, cuisine: &str) -> Result<Vec<Restaurant>> {
    self.by_cuisine_and_neighborhood(cuisine, ALL).await
  }

  pub async fn by_neighborhood(&self, neighborhood: &str) -> Result<Vec<Restaurant>> {
    self.by_cuisine_and_neighborhood(ALL, neighborhood).await
  }

  /// Distinct neighborhoods, fetching the collection only if needed.
  pub async fn neighborhoods(&self) -> Result<Vec<String>> {
    Ok(self.facets().await?.neighborhoods)
  }

  /// Distinct cuisines, fetching the collection only if needed.
  pub async fn cuisines(&self) -> Result<Vec<String>> {
    Ok(self.facets().await?.cuisines)
  }

  async fn facets(&self) -> Result<Facets> {
    if let Some(facets) = self.cached_facets() {
      return Ok(facets);
    }

    let restaurants = self.fetch_restaurants().await?;
    Ok(Facets::from_restaurants(&restaurants))
  }

  fn cached_facets(&self) -> Option<Facets> {
    self
      .facets
      .lock()
      .ok()
      .and_then(|facets| facets.clone())
  }

  fn remember_facets(&self, restaurants: &[Restaurant]) {
    if let Ok(mut facets) = self.facets.lock() {
      *facets = Some(Facets::from_restaurants(restaurants));
    }
  }
}

/// Relative link to a restaurant's detail page.
pub fn url_for_restaurant(restaurant: &Restaurant) -> String {
  format!("./restaurant.html?id={}", restaurant.id)
}

/// Image path for a restaurant at a given size (e.g. "small", "large").
pub fn image_url_for_restaurant(restaurant: &Restaurant, size: &str) -> String {
  match &restaurant.photograph {
    Some(photo) => format!("/img/{}/{}", size, photo),
    None => format!("/img/{}/{}", size, restaurant.id),
  }
}
