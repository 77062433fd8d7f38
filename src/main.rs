mod cache;
mod config;
mod error;
mod http;
mod logging;
mod network;
mod restaurants;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::time::Duration;

use cache::{
  AssetCache, MemoryAssetCache, MemoryRecordStore, RecordStore, SqliteAssetCache,
  SqliteRecordStore,
};
use config::Config;
use http::Request;
use network::{HttpNetwork, Network};
use restaurants::{image_url_for_restaurant, url_for_restaurant, RestaurantClient, ALL};
use worker::{Controller, LifecycleEvent};

#[derive(Parser, Debug)]
#[command(name = "rrcache")]
#[command(about = "Offline-first cache in front of a restaurant reviews site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rrcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Database file for both stores (overrides the config file)
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  /// Keep all cached data in memory for this run only
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Behave as if the network were unreachable
  #[arg(long, global = true)]
  offline: bool,

  /// Also write logs to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install and activate the controller, preloading the asset manifest
  Install,
  /// Fetch URLs through the controller, each as its own task
  Fetch {
    #[arg(required = true)]
    urls: Vec<String>,
    /// Print response bodies
    #[arg(long)]
    body: bool,
  },
  /// List restaurants
  Restaurants {
    #[arg(long, default_value = ALL)]
    cuisine: String,
    #[arg(long, default_value = ALL)]
    neighborhood: String,
  },
  /// Show one restaurant
  Restaurant { id: u64 },
  /// Show reviews for one restaurant
  Reviews { id: u64 },
  /// List distinct neighborhoods
  Neighborhoods,
  /// List distinct cuisines
  Cuisines,
  /// Remove every stored record and cached response
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&config::data_dir()?.join("logs"), args.verbose)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override database if specified on command line
  let config = if let Some(db) = args.db.clone() {
    Config {
      database: Some(db),
      ..config
    }
  } else {
    config
  };

  let network = HttpNetwork::new(Duration::from_secs(config.timeout_secs), args.offline)?;

  if args.ephemeral {
    run(
      &args.command,
      &config,
      MemoryRecordStore::new(),
      MemoryAssetCache::new(),
      network,
    )
    .await
  } else {
    let path = config.database_path()?;
    tracing::debug!(path = %path.display(), "Using cache database");

    let records = SqliteRecordStore::new(&path, &config.records.name, config.records.version);
    let assets = SqliteAssetCache::new(&path, &config.assets.cache_name);
    run(&args.command, &config, records, assets, network).await
  }
}

async fn run<R, A, N>(
  command: &Command,
  config: &Config,
  records: R,
  assets: A,
  network: N,
) -> Result<()>
where
  R: RecordStore + 'static,
  A: AssetCache + 'static,
  N: Network + 'static,
{
  let controller = Controller::from_config(config, records, assets, network)?;

  if !matches!(command, Command::Clear) {
    controller.dispatch(LifecycleEvent::Install).await?;
    controller.dispatch(LifecycleEvent::Activate).await?;
  }

  match command {
    Command::Install => {
      println!(
        "Installed and active ({} manifest entries)",
        config.assets.manifest.len()
      );
    }
    Command::Fetch { urls, body } => fetch_all(&controller, urls, *body).await?,
    Command::Restaurants {
      cuisine,
      neighborhood,
    } => {
      let client = RestaurantClient::new(controller, config)?;
      let list = match (cuisine.as_str(), neighborhood.as_str()) {
        (ALL, ALL) => client.fetch_restaurants().await?,
        (cuisine, ALL) => client.by_cuisine(cuisine).await?,
        (ALL, neighborhood) => client.by_neighborhood(neighborhood).await?,
        (cuisine, neighborhood) => {
          client
            .by_cuisine_and_neighborhood(cuisine, neighborhood)
            .await?
        }
      };
      for r in list {
        println!(
          "{:>4}  {:<36} {:<16} {:<12} {}",
          r.id,
          r.name,
          r.neighborhood,
          r.cuisine_type,
          url_for_restaurant(&r)
        );
      }
    }
    Command::Restaurant { id } => {
      let client = RestaurantClient::new(controller, config)?;
      let restaurant = client.fetch_restaurant(*id).await?;
      println!("{}", serde_json::to_string_pretty(&restaurant)?);
      println!("image: {}", image_url_for_restaurant(&restaurant, "large"));
    }
    Command::Reviews { id } => {
      let client = RestaurantClient::new(controller, config)?;
      for review in client.fetch_reviews(*id).await? {
        println!("{} ({}/5): {}", review.name, review.rating, review.comments);
      }
    }
    Command::Neighborhoods => {
      let client = RestaurantClient::new(controller, config)?;
      for n in client.neighborhoods().await? {
        println!("{}", n);
      }
    }
    Command::Cuisines => {
      let client = RestaurantClient::new(controller, config)?;
      for c in client.cuisines().await? {
        println!("{}", c);
      }
    }
    Command::Clear => {
      controller.records().clear()?;
      controller.assets().clear()?;
      println!("Cleared cached records and responses");
    }
  }

  Ok(())
}

/// Resolve every URL concurrently and report where each answer came from.
async fn fetch_all<R, A, N>(
  controller: &Controller<R, A, N>,
  urls: &[String],
  body: bool,
) -> Result<()>
where
  R: RecordStore + 'static,
  A: AssetCache + 'static,
  N: Network + 'static,
{
  let tasks: Vec<_> = urls
    .iter()
    .map(|url| {
      let controller = controller.clone();
      let request = Request::get(url.clone());
      tokio::spawn(async move { controller.resolve(&request).await })
    })
    .collect();

  for (url, task) in urls.iter().zip(tasks) {
    let resolved = task
      .await
      .map_err(|e| eyre!("Fetch task for {} failed: {}", url, e))?;

    println!(
      "{} {} {} [{:?}, {} bytes]",
      resolved.response.status,
      resolved.response.status_text,
      url,
      resolved.source,
      resolved.response.body.len()
    );
    if body {
      println!("{}", resolved.response.body_text());
    }
  }

  Ok(())
}
