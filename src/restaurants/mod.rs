//! The data-access side: what the page asks for, expressed as plain requests
//! that go through the controller like any other fetch.

mod client;
mod types;

pub use client::{image_url_for_restaurant, url_for_restaurant, RestaurantClient, ALL};
