//! `trackpoint` - CLI for the trackpoint collector
//!
//! This binary runs the HTTP collector and provides commands for inspecting
//! stored events and sending test events through the tracking client.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use trackpoint::aggregate::{AggregationService, StatsReport};
use trackpoint::cli::{
    Cli, Command, ConfigCommand, EventsCommand, OutputFormat, RealtimeCommand, SendCommand,
    ServeCommand, StatsCommand,
};
use trackpoint::client::{
    ClientEnvironment, ContextEnricher, EventDispatcher, HttpTransport, PageContext, Transport,
    identity_from_config,
};
use trackpoint::event::{EventFilter, StoredEvent, TimeRange, parse_bound};
use trackpoint::storage::EventStore;
use trackpoint::value::Properties;
use trackpoint::{Config, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Serve(cmd) => handle_serve(config, cmd).await,
        Command::Events(cmd) => handle_events(&config, &cmd),
        Command::Stats(cmd) => handle_stats(&config, &cmd).await,
        Command::Realtime(cmd) => handle_realtime(config, &cmd).await,
        Command::Send(cmd) => handle_send(&config, cmd).await,
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<EventStore>> {
    let path = config.database_path();
    let store = EventStore::open(&path)
        .with_context(|| format!("opening event store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn range_from_args(since: Option<&str>, until: Option<&str>) -> anyhow::Result<TimeRange> {
    Ok(TimeRange {
        start: since.map(|s| parse_bound("since", s, false)).transpose()?,
        end: until.map(|s| parse_bound("until", s, true)).transpose()?,
    })
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(bind) = cmd.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let store = open_store(&config)?;
    trackpoint::server::serve(&config, store).await?;
    Ok(())
}

fn handle_events(config: &Config, cmd: &EventsCommand) -> anyhow::Result<()> {
    let filter = EventFilter {
        event_name: cmd.event_name.clone(),
        client_id: cmd.client_id.clone(),
        user_id: cmd.user_id.clone(),
        session_id: cmd.session_id.clone(),
        range: range_from_args(cmd.since.as_deref(), cmd.until.as_deref())?,
        limit: cmd.limit.min(config.aggregation.max_page_size),
        offset: cmd.offset,
    };

    let events = open_store(config)?.query(&filter)?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Plain => {
            for event in &events {
                println!("{}", plain_line(event));
            }
        }
        OutputFormat::Table => {
            println!(
                "{:>8}  {:<24}  {:<24}  {:<36}  {}",
                "ID", "TIMESTAMP", "EVENT", "CLIENT", "PAGE"
            );
            for event in &events {
                let e = &event.envelope;
                println!(
                    "{:>8}  {:<24}  {:<24}  {:<36}  {}",
                    event.id,
                    e.timestamp.as_datetime().format("%Y-%m-%d %H:%M:%S%.3f"),
                    e.event_name,
                    e.client_id,
                    e.page_path.as_deref().unwrap_or("-"),
                );
            }
            println!();
            println!("{} event(s)", events.len());
        }
    }
    Ok(())
}

fn plain_line(event: &StoredEvent) -> String {
    let e = &event.envelope;
    format!(
        "{} {} {} {}",
        e.timestamp.as_datetime().to_rfc3339(),
        e.event_name,
        e.client_id,
        e.page_path.as_deref().unwrap_or("-")
    )
}

async fn handle_stats(config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let range = range_from_args(cmd.since.as_deref(), cmd.until.as_deref())?;
    let service = AggregationService::new(open_store(config)?, &config.aggregation);
    let report = service.stats(range).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &StatsReport) {
    println!("Events");
    println!("------");
    for stat in &report.events {
        println!(
            "  {:<28} {:>8} events  {:>6} users  {:>6} sessions",
            stat.event_name, stat.count, stat.unique_users, stat.unique_sessions
        );
    }
    println!();
    println!("Pages");
    println!("-----");
    for stat in &report.pages {
        println!(
            "  {:<40} {:>8} views  {:>6} users",
            stat.page_path, stat.page_views, stat.unique_users
        );
    }
    println!();
    println!("Devices");
    println!("-------");
    for stat in &report.devices {
        println!(
            "  {:<10} {:<10} {:<10} {:>8}",
            stat.device_type,
            stat.os.as_deref().unwrap_or("-"),
            stat.browser.as_deref().unwrap_or("-"),
            stat.count
        );
    }
}

async fn handle_realtime(mut config: Config, cmd: &RealtimeCommand) -> anyhow::Result<()> {
    if let Some(window) = cmd.window {
        config.aggregation.realtime_window_secs = window;
    }
    config.validate()?;

    let service = AggregationService::new(open_store(&config)?, &config.aggregation);
    let snapshot = service.realtime().await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!(
            "Last {}s as of {}",
            config.aggregation.realtime_window_secs,
            snapshot.timestamp.as_datetime().to_rfc3339()
        );
        println!("  Active sessions: {}", snapshot.active_sessions);
        println!("  Active users:    {}", snapshot.active_users);
    }
    Ok(())
}

async fn handle_send(config: &Config, cmd: SendCommand) -> anyhow::Result<()> {
    config.validate()?;
    let endpoint = cmd.endpoint.unwrap_or_else(|| config.client.endpoint.clone());
    let transport = Arc::new(HttpTransport::new(endpoint, config.request_timeout())?);

    let environment = ClientEnvironment {
        language: std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(|l| l.replace('_', "-"))),
        ..ClientEnvironment::with_user_agent(format!("trackpoint/{}", env!("CARGO_PKG_VERSION")))
    };
    let dispatcher = EventDispatcher::new(
        identity_from_config(config),
        ContextEnricher::new(environment),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    dispatcher.navigate(PageContext::new(&cmd.page));

    let properties: Properties = cmd.properties.into_iter().collect();
    let envelope = dispatcher.build(&cmd.event_name, properties, cmd.user.as_deref(), None);
    let event_id = transport
        .send_now(&envelope)
        .await
        .with_context(|| format!("sending to {}", transport.endpoint()))?;

    match event_id {
        Some(id) => println!("Sent '{}' (event id {id})", cmd.event_name),
        None => println!("Sent '{}'", cmd.event_name),
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let summary = store.summary()?;
    let format_ts = |ts: Option<trackpoint::event::Timestamp>| {
        ts.map_or_else(|| "-".to_string(), |t| t.as_datetime().to_rfc3339())
    };

    if json {
        let status = serde_json::json!({
            "database_path": store.path(),
            "total_events": summary.total_events,
            "oldest_event": summary.oldest_event,
            "newest_event": summary.newest_event,
            "db_size_bytes": summary.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("trackpoint status");
        println!("-----------------");
        println!("Database:      {}", store.path().display());
        println!("Events:        {}", summary.total_events);
        println!("Oldest event:  {}", format_ts(summary.oldest_event));
        println!("Newest event:  {}", format_ts(summary.newest_event));
        println!("Size:          {} bytes", summary.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Listen address:     {}", config.listen_addr());
                println!("  CORS max age (s):   {}", config.server.cors_max_age_secs);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Aggregation]");
                println!(
                    "  Realtime window (s): {}",
                    config.aggregation.realtime_window_secs
                );
                println!("  Query timeout (ms): {}", config.aggregation.query_timeout_ms);
                println!(
                    "  Page size:          {} (max {})",
                    config.aggregation.default_page_size, config.aggregation.max_page_size
                );
                println!();
                println!("[Client]");
                println!("  Endpoint:           {}", config.client.endpoint);
                println!("  Identity file:      {}", config.identity_path().display());
                println!("  Scroll thresholds:  {:?}", config.client.scroll_thresholds);
                println!();
                println!("[Privacy]");
                println!(
                    "  Extra denylisted:   {}",
                    config.privacy.denylisted_fields.len()
                );
                println!("  Redaction enabled:  {}", config.privacy.redact_enabled);
                println!(
                    "  Extra patterns:     {}",
                    config.privacy.extra_patterns.len()
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)).and_then(|c| c.validate()) {
                Ok(()) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
