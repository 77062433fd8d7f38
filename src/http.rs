//! Request and response values exchanged between the page and the controller.

use serde_json::Value;

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: String,
}

impl Request {
  pub fn new(method: &str, url: impl Into<String>) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.into(),
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new("GET", url)
  }

  /// Only GET requests are eligible for the asset cache.
  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }
}

/// A fully buffered HTTP response.
///
/// Not `Clone`. A response handed to the page is consumed once; any path
/// that both stores and returns one goes through [`Response::duplicate`].
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: status_text.into(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// A 200 response carrying `value` serialized as JSON.
  pub fn json(value: &Value) -> Self {
    Self::new(200, "OK", value.to_string()).with_header("content-type", "application/json")
  }

  /// A plain text response whose status text may differ from the body.
  pub fn text(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
    Self::new(status, status_text, body.into()).with_header("content-type", "text/plain")
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_ascii_lowercase(), value.to_string()));
    self
  }

  /// True for any 2xx status.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Explicit copy of the whole response, body included.
  pub fn duplicate(&self) -> Self {
    Self {
      status: self.status,
      status_text: self.status_text.clone(),
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
impl Response {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_request_method_is_uppercased() {
    let req = Request::new("get", "http://localhost:8000/");
    assert!(req.is_get());
    assert!(!Request::new("POST", "http://localhost:8000/").is_get());
  }

  #[test]
  fn test_json_response() {
    let resp = Response::json(&json!([]));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"[]");
    assert_eq!(resp.header("Content-Type"), Some("application/json"));
  }

  #[test]
  fn test_duplicate_is_independent() {
    let original = Response::text(200, "OK", "shell");
    let mut copy = original.duplicate();
    copy.body.clear();
    assert_eq!(original.body_text(), "shell");
    assert!(copy.body.is_empty());
  }

  #[test]
  fn test_ok_range() {
    assert!(Response::new(204, "No Content", Vec::<u8>::new()).ok());
    assert!(!Response::new(404, "Not Found", Vec::<u8>::new()).ok());
    assert!(!Response::new(500, "Internal Server Error", Vec::<u8>::new()).ok());
  }
}
