//! Payloads served by the restaurants API.
//!
//! Only the fields the client filters or links on are typed; everything else
//! is kept verbatim in `extra` so nothing is lost when a record is printed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub neighborhood: String,
  #[serde(default)]
  pub cuisine_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub photograph: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub latlng: Option<LatLng>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: u64,
  #[serde(deserialize_with = "deserialize_id")]
  pub restaurant_id: u64,
  pub name: String,
  #[serde(deserialize_with = "deserialize_id")]
  pub rating: u64,
  #[serde(default)]
  pub comments: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// The API is inconsistent about numbers: ids and ratings arrive either as
/// JSON numbers or as numeric strings.
fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum NumberOrString {
    Number(u64),
    String(String),
  }

  match NumberOrString::deserialize(deserializer)? {
    NumberOrString::Number(n) => Ok(n),
    NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_restaurant_keeps_unknown_fields() {
    let restaurant: Restaurant = serde_json::from_value(json!({
      "id": 1,
      "name": "Mission Chinese Food",
      "neighborhood": "Manhattan",
      "cuisine_type": "Asian",
      "photograph": "1.jpg",
      "latlng": {"lat": 40.713829, "lng": -73.989667},
      "operating_hours": {"Monday": "5:30 pm - 11:00 pm"}
    }))
    .unwrap();

    assert_eq!(restaurant.id, 1);
    assert_eq!(restaurant.latlng.as_ref().unwrap().lat, 40.713829);
    assert!(restaurant.extra.contains_key("operating_hours"));
  }

  #[test]
  fn test_review_accepts_string_numbers() {
    let review: Review = serde_json::from_value(json!({
      "id": 5,
      "restaurant_id": "2",
      "name": "Steve",
      "rating": "4",
      "comments": "Great pizza",
      "createdAt": 1504095567183u64
    }))
    .unwrap();

    assert_eq!(review.restaurant_id, 2);
    assert_eq!(review.rating, 4);
    assert!(review.extra.contains_key("createdAt"));
  }

  #[test]
  fn test_bad_id_is_rejected() {
    let result: Result<Review, _> = serde_json::from_value(json!({
      "id": 5,
      "restaurant_id": "two",
      "name": "Steve",
      "rating": 4
    }));
    assert!(result.is_err());
  }
}
