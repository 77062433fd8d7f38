//! Install-time population of the asset cache.

use futures::future::try_join_all;
use tracing::info;
use url::Url;

use super::classify::Classifier;
use crate::cache::AssetCache;
use crate::error::{Result, WorkerError};
use crate::http::Request;
use crate::network::Network;

/// Fetch every manifest entry and cache it under its classified key.
///
/// All-or-nothing: entries are fetched concurrently, and nothing is written
/// unless every one of them came back 2xx. Returns the number of entries
/// stored. The caller is expected to have opened `cache` already.
pub async fn preload<A, N>(
  cache: &A,
  network: &N,
  classifier: &Classifier,
  manifest: &[Url],
) -> Result<usize>
where
  A: AssetCache + ?Sized,
  N: Network,
{
  let requests: Vec<Request> = manifest
    .iter()
    .map(|url| Request::get(url.as_str()))
    .collect();

  let responses = try_join_all(requests.iter().map(|request| async move {
    let response = network.fetch(request).await?;
    if !response.ok() {
      return Err(WorkerError::NetworkFailure(format!(
        "{} returned {}",
        request.url, response.status
      )));
    }
    Ok(response)
  }))
  .await?;

  for (request, response) in requests.iter().zip(&responses) {
    let key = classifier.classify(request).key;
    cache.store(&key, response)?;
  }

  info!(count = responses.len(), "Preloaded install manifest");
  Ok(responses.len())
}
