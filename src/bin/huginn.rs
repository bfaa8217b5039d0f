//! huginn: venue back-office CLI
//!
//! Browse events and speakers through the query cache, run the archival
//! sweep, or walk through the cache against an in-memory backend.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;

use huginn::types::{
    EventFilters, EventStatus, PageOptions, RegistrationInput, SpeakerFilters,
};
use huginn::{
    Config, Entity, Gateway, HuginnError, MemoryBackend, QueryCache, Secrets, VenueClient,
    WebhookClient, keys,
};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Venue back-office data client")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml, then /etc/huginn/config.toml)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Use an empty in-memory backend instead of the configured one
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List events
    Events {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// draft | active | archived | cancelled
        #[arg(long, value_parser = parse_status)]
        status: Option<EventStatus>,
        /// Title substring
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one event
    Event {
        id: String,
    },

    /// List active speakers
    Speakers,

    /// Archive every active event that has ended
    Archive,

    /// Print the public URL of a stored file
    Url {
        bucket: String,
        path: String,
    },

    /// Walk through caching and invalidation against seeded in-memory data
    Demo,
}

fn parse_status(s: &str) -> Result<EventStatus, String> {
    serde_json::from_value(json!(s.to_ascii_lowercase()))
        .map_err(|_| format!("unknown status '{s}'"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    // Commands that don't require a configured backend
    if let Command::Demo = args.command {
        demo().await?;
        return Ok(());
    }

    let client = if args.memory {
        VenueClient::new(
            Gateway::memory(Arc::new(MemoryBackend::new())),
            QueryCache::default(),
        )
    } else {
        connect(args.config.as_deref())?
    };

    match args.command {
        Command::Events {
            page,
            limit,
            status,
            search,
        } => {
            let filters = EventFilters {
                status,
                search,
                ..Default::default()
            };
            let options = PageOptions::new(filters).page(page).limit(limit);
            let result = client.events_now(options).await?;
            if result.data.is_empty() {
                println!("no events");
            }
            for event in &result.data {
                println!(
                    "{}  {}  [{}]  {}",
                    event.id,
                    event.start_date.format("%Y-%m-%d %H:%M"),
                    event.status.as_str(),
                    event.title
                );
            }
            println!(
                "page {page}: {} of {} total{}",
                result.data.len(),
                result.count,
                if result.has_more { " (more)" } else { "" }
            );
        }

        Command::Event { id } => {
            let event = client.event_now(&id).await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }

        Command::Speakers => {
            let filters = SpeakerFilters {
                active: Some(true),
                ..Default::default()
            };
            let speakers = client.speakers_now(PageOptions::new(filters).limit(100)).await?;
            for speaker in &speakers.data {
                println!(
                    "{}  {}  {}",
                    speaker.id,
                    speaker.name,
                    speaker.field_of_expertise.as_deref().unwrap_or("-")
                );
            }
            println!("{} speakers", speakers.count);
        }

        Command::Archive => {
            let report = client.archive_events().await?;
            println!("archived {} of {} active events", report.processed, report.total);
            for event in &report.events {
                println!("  {}  {}", event.id, event.title.as_deref().unwrap_or("-"));
            }
        }

        Command::Url { bucket, path } => {
            println!("{}", client.gateway().storage().public_url(&bucket, &path));
        }

        Command::Demo => unreachable!("handled above"),
    }

    client.cache().dispose();
    Ok(())
}

fn connect(config_path: Option<&std::path::Path>) -> huginn::Result<VenueClient> {
    let config = Config::load(config_path)?;
    let secrets = Secrets::load()?;
    let api_key = secrets.api_key().ok_or_else(|| {
        HuginnError::Configuration(
            "no API key: set [backend].api_key in secrets.toml or HUGINN_API_KEY".to_string(),
        )
    })?;

    let gateway = Gateway::builder()
        .rest(&config.backend.url, api_key)
        .timeout(config.backend.timeout_secs)
        .build()?;
    let cache = QueryCache::new(config.cache.query_config());
    let mut client = VenueClient::new(gateway, cache);

    if let Some(hooks) = &config.webhooks {
        let mut webhooks = WebhookClient::new(&hooks.archive_url, &hooks.save_event_url)?;
        if let Some(token) = secrets.webhook_token() {
            webhooks = webhooks.with_token(token);
        }
        client = client.with_webhooks(webhooks);
    }
    Ok(client)
}

async fn demo() -> huginn::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let now = Utc::now();
    backend.seed(
        Entity::Events,
        (1..=3).map(|n| {
            json!({
                "id": format!("ev{n}"),
                "title": format!("Evening talk #{n}"),
                "description": "Demo event",
                "start_date": (now + Duration::days(n)).to_rfc3339(),
                "status": "active",
                "is_featured": n == 1,
            })
        }),
    );

    let cache = QueryCache::default();
    cache.init()?;
    let client = VenueClient::new(Gateway::memory(backend), cache.clone());

    let page = client.events_now(PageOptions::default()).await?;
    println!("fetched {} events ({} cache entries)", page.data.len(), cache.len());
    let again = client.events_now(PageOptions::default()).await?;
    println!("second read served from cache: {} events", again.data.len());

    let user = "demo-user";
    let mut favorite = client.is_favorite(user, "ev1")?;
    let before = favorite.settled().await?;
    println!("ev1 favorite before toggle: {:?}", before.data);
    client.toggle_favorite(user, "ev1").await?;
    println!("ev1 favorite after toggle:  {:?}", favorite.data());

    client
        .register(RegistrationInput {
            event_id: "ev2".to_string(),
            user_id: Some(user.to_string()),
            full_name: "Demo Visitor".to_string(),
            email: "visitor@example.com".to_string(),
            phone: None,
            comment: None,
            adult_tickets: 1,
            child_tickets: 0,
            total_amount: 0.0,
        })
        .await?;
    let registrations = client.user_registrations_now(user).await?;
    println!("{user} has {} registration(s)", registrations.len());

    client.delete_event("ev3").await?;
    let stale = cache.is_stale(&keys::list_with_params(
        Entity::Events,
        PageOptions::<EventFilters>::default().to_params(),
    ));
    println!("event list stale after delete: {stale:?}");
    match client.event_now("ev3").await {
        Err(HuginnError::NotFound { .. }) => println!("ev3 is gone"),
        other => println!("unexpected: {other:?}"),
    }

    favorite.unsubscribe();
    cache.dispose();
    Ok(())
}
