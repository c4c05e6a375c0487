use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ticket_scout::{
    load_criteria, remember_criteria, BackendApi, ConfigStore, SearchOrchestrator, SearchParams,
    SearchSnapshot, SearchStatus, SqliteScratch,
};

/// Search ticket vendors and list results cheapest first, then nearest.
#[derive(Parser, Debug)]
#[command(name = "ticket-scout", version, about)]
struct Args {
    /// Results URL whose query string carries the search
    #[arg(long, conflicts_with_all = ["query", "last"])]
    url: Option<String>,

    /// Artist or event to search for
    #[arg(short, long)]
    query: Option<String>,

    /// City, address, or "lat, lng"
    #[arg(short, long)]
    location: Option<String>,

    /// First day of the window (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    start_date: Option<String>,

    /// Last day of the window (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    end_date: Option<String>,

    /// Budget ceiling per ticket
    #[arg(long)]
    max_price: Option<String>,

    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<String>,

    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<String>,

    /// Re-run the last stored search
    #[arg(long)]
    last: bool,

    /// Only check that the backend is reachable
    #[arg(long)]
    health: bool,
}

impl Args {
    fn params(&self) -> Result<Option<SearchParams>> {
        if let Some(raw) = &self.url {
            let url = reqwest::Url::parse(raw).with_context(|| format!("invalid url {raw}"))?;
            return Ok(Some(SearchParams::from_url(&url)));
        }
        if self.query.is_none() && self.location.is_none() {
            return Ok(None);
        }
        Ok(Some(SearchParams {
            query: self.query.clone(),
            location: self.location.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            max_price: self.max_price.clone(),
            lat: self.lat.clone(),
            lng: self.lng.clone(),
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = ConfigStore::load()
        .context("failed to load configuration")?
        .read()?;
    info!(backend = %config.backend_url, zone = %config.event_timezone, "config loaded");

    let backend = BackendApi::from_config(&config)?;
    let orchestrator = SearchOrchestrator::new(backend, config.timezone());

    if args.health {
        let health = orchestrator.health().await?;
        println!("{} (version {})", health.status, health.version);
        return Ok(());
    }

    let scratch = SqliteScratch::open_default().context("failed to open scratch store")?;

    if args.last {
        let Some(criteria) = load_criteria(&scratch)? else {
            bail!("no saved search; provide --query and --location or --url");
        };
        orchestrator.search(&criteria).await;
        return report(&orchestrator.snapshot());
    }

    let Some(params) = args.params()? else {
        bail!("no search criteria provided; use --query and --location, --url, or --last");
    };

    let now = Utc::now();
    match params.clone().into_criteria(now) {
        Ok(criteria) => {
            remember_criteria(&scratch, &criteria)?;
            orchestrator.search(&criteria).await;
        }
        Err(_) => {
            orchestrator.search_from_params(params, now).await;
        }
    }
    report(&orchestrator.snapshot())
}

fn report(snapshot: &SearchSnapshot) -> Result<()> {
    match snapshot.status {
        SearchStatus::Success if snapshot.events.is_empty() => {
            println!("No events found. Try widening the dates or budget.");
        }
        SearchStatus::Success => {
            for event in &snapshot.events {
                println!(
                    "${:>8.2}  {:>7.1} mi  {}  @ {}  {}  [{}]",
                    event.lowest_price,
                    event.distance,
                    event.headline(),
                    event.venue.name,
                    event.date.format("%Y-%m-%d %H:%M UTC"),
                    event.vendor_source,
                );
            }
        }
        SearchStatus::Error => {
            let message = snapshot.error.as_deref().unwrap_or("Failed to search events");
            bail!("{message}");
        }
        SearchStatus::Idle | SearchStatus::Loading => {
            bail!("search did not complete");
        }
    }
    Ok(())
}
