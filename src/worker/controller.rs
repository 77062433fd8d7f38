//! The interception controller: lifecycle plus per-request resolution.

use color_eyre::Result as AppResult;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use super::classify::{Classification, Classifier, RequestKind};
use super::fallback::{self, FallbackPolicy};
use super::install::preload;
use crate::cache::{AssetCache, RecordStore};
use crate::config::Config;
use crate::error::{Result, WorkerError};
use crate::http::{Request, Response};
use crate::network::Network;

/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Uninstalled,
  Installing,
  /// Installed and waiting for activation
  Installed,
  Active,
  /// Install failed; this controller will never intercept
  Redundant,
}

impl WorkerState {
  pub fn can_intercept(&self) -> bool {
    matches!(self, Self::Active)
  }
}

/// Host lifecycle events that drive [`WorkerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  Install,
  Activate,
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Record store hit
  Records,
  /// Asset cache hit
  Assets,
  /// Fetched from the network (and written back where applicable)
  Network,
  /// Synthesized after cache and network both failed
  Fallback,
  /// Not intercepted: the controller was not active yet
  Passthrough,
}

/// A response together with where it came from.
#[derive(Debug)]
pub struct Resolved {
  pub response: Response,
  pub source: ResponseSource,
}

impl Resolved {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }
}

/// Sits between the page and the network.
///
/// Cheap to clone; clones share stores, network and lifecycle state, so each
/// intercepted request can run as its own task.
pub struct Controller<R, A, N> {
  records: Arc<R>,
  assets: Arc<A>,
  network: Arc<N>,
  classifier: Classifier,
  fallback: FallbackPolicy,
  manifest: Arc<Vec<Url>>,
  state: Arc<Mutex<WorkerState>>,
}

impl<R, A, N> Controller<R, A, N>
where
  R: RecordStore,
  A: AssetCache,
  N: Network,
{
  pub fn new(
    records: R,
    assets: A,
    network: N,
    classifier: Classifier,
    fallback: FallbackPolicy,
    manifest: Vec<Url>,
  ) -> Self {
    Self {
      records: Arc::new(records),
      assets: Arc::new(assets),
      network: Arc::new(network),
      classifier,
      fallback,
      manifest: Arc::new(manifest),
      state: Arc::new(Mutex::new(WorkerState::Uninstalled)),
    }
  }

  /// Build a controller with classifier, fallback and manifest taken from
  /// `config`.
  pub fn from_config(config: &Config, records: R, assets: A, network: N) -> AppResult<Self> {
    let classifier = Classifier::from_config(config);
    let placeholder_key = classifier
      .classify_url(config.placeholder_url()?.as_str())
      .key;
    let fallback = FallbackPolicy::new(&config.assets.image_suffixes, placeholder_key);

    Ok(Self::new(
      records,
      assets,
      network,
      classifier,
      fallback,
      config.manifest_urls()?,
    ))
  }

  pub fn records(&self) -> &R {
    &self.records
  }

  pub fn assets(&self) -> &A {
    &self.assets
  }

  fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
    // Poisoning cannot leave a Copy enum half-written
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn state(&self) -> WorkerState {
    *self.lock_state()
  }

  /// Move from `from` to `to`, or fail if the state has moved on.
  fn advance(&self, from: WorkerState, to: WorkerState, event: LifecycleEvent) -> Result<()> {
    let mut state = self.lock_state();
    if *state != from {
      return Err(WorkerError::Lifecycle {
        state: *state,
        event,
      });
    }
    *state = to;
    info!(?from, ?to, "Worker state changed");
    Ok(())
  }

  /// Feed a lifecycle event to the state machine.
  ///
  /// `Install` only succeeds from `Uninstalled`, `Activate` only from
  /// `Installed`. A failed install leaves the controller `Redundant`.
  pub async fn dispatch(&self, event: LifecycleEvent) -> Result<WorkerState> {
    match event {
      LifecycleEvent::Install => {
        self.advance(WorkerState::Uninstalled, WorkerState::Installing, event)?;
        match self.install().await {
          Ok(()) => self.advance(WorkerState::Installing, WorkerState::Installed, event)?,
          Err(e) => {
            self.advance(WorkerState::Installing, WorkerState::Redundant, event)?;
            return Err(e);
          }
        }
      }
      LifecycleEvent::Activate => {
        self.advance(WorkerState::Installed, WorkerState::Active, event)?;
      }
    }

    Ok(self.state())
  }

  /// Open the asset cache and preload the manifest.
  ///
  /// Only a cache that cannot be opened fails the install. A failed preload
  /// is logged; requests populate the cache as they come.
  async fn install(&self) -> Result<()> {
    self.assets.open()?;

    if let Err(e) = preload(
      self.assets.as_ref(),
      self.network.as_ref(),
      &self.classifier,
      &self.manifest,
    )
    .await
    {
      warn!(error = %e, "Preload failed, continuing with a partial cache");
    }

    Ok(())
  }

  /// The response to serve for `request`. Never fails.
  pub async fn handle_fetch(&self, request: &Request) -> Response {
    self.resolve(request).await.response
  }

  /// Like [`handle_fetch`](Self::handle_fetch), but also reports where the
  /// response came from.
  pub async fn resolve(&self, request: &Request) -> Resolved {
    let classification = self.classifier.classify(request);

    if !self.state().can_intercept() {
      return self.passthrough(request, classification.kind).await;
    }

    let Classification { kind, key } = classification;
    debug!(url = %request.url, ?kind, key = %key, "Intercepted request");

    match kind {
      RequestKind::Api if request.is_get() => self.resolve_api(request, &key).await,
      RequestKind::Api => self.passthrough(request, kind).await,
      RequestKind::Static => self.resolve_static(request, &key).await,
    }
  }

  /// Straight to the network, with the usual failure responses.
  async fn passthrough(&self, request: &Request, kind: RequestKind) -> Resolved {
    match self.network.fetch(request).await {
      Ok(response) => Resolved::new(response, ResponseSource::Passthrough),
      Err(e) => {
        warn!(url = %request.url, error = %e, "Fetch failed");
        let response = match kind {
          RequestKind::Api => fallback::api_error(),
          RequestKind::Static => self.fallback.respond(self.assets.as_ref(), request),
        };
        Resolved::new(response, ResponseSource::Fallback)
      }
    }
  }

  /// Record store first; on a miss fetch, store and return the JSON.
  async fn resolve_api(&self, request: &Request, key: &str) -> Resolved {
    if let Some(data) = self.cached_record(key) {
      debug!(key, "Record store hit");
      return Resolved::new(Response::json(&data), ResponseSource::Records);
    }

    match self.fetch_json(request).await {
      Ok(json) => {
        if let Err(e) = self.records.put(key, &json) {
          warn!(key, error = %e, "Failed to store record");
        }
        Resolved::new(Response::json(&json), ResponseSource::Network)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "API fetch failed");
        Resolved::new(fallback::api_error(), ResponseSource::Fallback)
      }
    }
  }

  /// A store that cannot be read is treated as a miss.
  fn cached_record(&self, key: &str) -> Option<Value> {
    match self.records.open().and_then(|()| self.records.get(key)) {
      Ok(data) => data,
      Err(e) => {
        warn!(key, error = %e, "Record store unavailable");
        None
      }
    }
  }

  async fn fetch_json(&self, request: &Request) -> Result<Value> {
    let response = self.network.fetch(request).await?;
    if !response.ok() {
      return Err(WorkerError::NetworkFailure(format!(
        "{} returned {}",
        request.url, response.status
      )));
    }
    Ok(serde_json::from_slice(&response.body)?)
  }

  /// Asset cache first; on a miss fetch, keep a copy and return the original.
  async fn resolve_static(&self, request: &Request, key: &str) -> Resolved {
    let cacheable = request.is_get();

    if cacheable {
      match self.assets.lookup(key) {
        Ok(Some(hit)) => {
          debug!(key, "Asset cache hit");
          return Resolved::new(hit, ResponseSource::Assets);
        }
        Ok(None) => {}
        Err(e) => warn!(key, error = %e, "Asset cache unavailable"),
      }
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        // Partial responses are never cached
        if cacheable && response.ok() && response.status != 206 {
          if let Err(e) = self.assets.store(key, &response) {
            warn!(key, error = %e, "Failed to cache response");
          }
        }
        Resolved::new(response, ResponseSource::Network)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Static fetch failed, using fallback");
        Resolved::new(
          self.fallback.respond(self.assets.as_ref(), request),
          ResponseSource::Fallback,
        )
      }
    }
  }
}

#[cfg(test)]
impl<R, A, N> Controller<R, A, N> {
  pub fn network(&self) -> &N {
    &self.network
  }
}

impl<R, A, N> Clone for Controller<R, A, N> {
  fn clone(&self) -> Self {
    Self {
      records: Arc::clone(&self.records),
      assets: Arc::clone(&self.assets),
      network: Arc::clone(&self.network),
      classifier: self.classifier.clone(),
      fallback: self.fallback.clone(),
      manifest: Arc::clone(&self.manifest),
      state: Arc::clone(&self.state),
    }
  }
}
