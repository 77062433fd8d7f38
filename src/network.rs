//! The network side of the controller.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, WorkerError};
use crate::http::{Request, Response};

/// Anything that can turn a request into a response over the wire.
///
/// Only transport failures are errors; a 404 from the server is still a
/// successful fetch.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Network access backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  /// When set, every fetch fails as if the host had no connectivity
  offline: bool,
}

impl HttpNetwork {
  pub fn new(timeout: Duration, offline: bool) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| WorkerError::NetworkFailure(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { client, offline })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    if self.offline {
      return Err(WorkerError::NetworkFailure(format!(
        "{} {}: network disabled",
        request.method, request.url
      )));
    }

    let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
      WorkerError::NetworkFailure(format!("Invalid method {}: {}", request.method, e))
    })?;

    let resp = self
      .client
      .request(method, request.url.as_str())
      .send()
      .await
      .map_err(|e| {
        WorkerError::NetworkFailure(format!("{} {}: {}", request.method, request.url, e))
      })?;

    let status = resp.status();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = resp.bytes().await.map_err(|e| {
      WorkerError::NetworkFailure(format!("Failed to read body of {}: {}", request.url, e))
    })?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

#[cfg(test)]
pub mod testing {
  //! Scripted network for controller tests.

  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;

  /// Serves canned responses by exact URL and counts every call.
  /// Unknown URLs get a 404, like a real server would.
  pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
    online: AtomicBool,
    /// Time every fetch spends "on the wire" before answering
    delay: Option<Duration>,
  }

  impl FakeNetwork {
    pub fn new() -> Self {
      Self {
        routes: Mutex::new(HashMap::new()),
        calls: AtomicUsize::new(0),
        online: AtomicBool::new(true),
        delay: None,
      }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
      self.delay = Some(delay);
      self
    }

    pub fn route(self, url: &str, response: Response) -> Self {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
      self
    }

    pub fn set_online(&self, online: bool) {
      self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
      self.calls.store(0, Ordering::SeqCst);
    }
  }

  impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }

      if !self.online.load(Ordering::SeqCst) {
        return Err(WorkerError::NetworkFailure(format!("{}: offline", request.url)));
      }

      let routes = self.routes.lock().unwrap();
      Ok(
        routes
          .get(&request.url)
          .map(Response::duplicate)
          .unwrap_or_else(|| Response::text(404, "Not Found", "not found")),
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_offline_network_fails_without_connecting() {
    let network = HttpNetwork::new(Duration::from_secs(1), true).unwrap();
    let err = network
      .fetch(&Request::get("http://localhost:1337/restaurants"))
      .await
      .unwrap_err();
    assert!(matches!(err, WorkerError::NetworkFailure(_)));
  }

  #[tokio::test]
  async fn test_invalid_method_is_a_network_failure() {
    let network = HttpNetwork::new(Duration::from_secs(1), false).unwrap();
    let err = network
      .fetch(&Request::new("BAD METHOD", "http://localhost:1337/"))
      .await
      .unwrap_err();
    assert!(matches!(err, WorkerError::NetworkFailure(_)));
  }
}
