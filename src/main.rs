use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hfn_notify::config::{self, Config, DesktopMode};
use hfn_notify::desktop::{DesktopNotifier, Disabled, LogDesktop};
use hfn_notify::models::{Notification, NotificationId, NotificationKind, Tab};
use hfn_notify::normalize;
use hfn_notify::transport::api::{NotificationApi, RestClient};
use hfn_notify::{DeliveryPath, Feed, FeedEvent, PageState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export only when an endpoint is configured; plain stderr logs otherwise.
    use opentelemetry::KeyValue;

    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "hfn-notify"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "hfn_notify=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Watch { focused }) => watch(&cfg, focused).await,
        None => watch(&cfg, false).await,
        Some(cli::Commands::List { tab }) => list(&cfg, tab).await,
        Some(cli::Commands::Read { id }) => {
            let api = rest_client(&cfg)?;
            api.mark_read(&NotificationId::from(id.as_str()))
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
            println!("marked {} read", id);
            Ok(())
        }
        Some(cli::Commands::ReadAll) => {
            let api = rest_client(&cfg)?;
            api.mark_all_read()
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
            println!("marked all notifications read");
            Ok(())
        }
        Some(cli::Commands::Settings { command }) => handle_settings_command(&cfg, command),
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn rest_client(cfg: &Config) -> anyhow::Result<RestClient> {
    let session = cfg.session()?;
    RestClient::new(&cfg.origin, &session, cfg.request_timeout()).context("failed to build REST client")
}

async fn watch(cfg: &Config, focused: bool) -> anyhow::Result<()> {
    let session = cfg.session()?;
    let settings = cfg
        .settings_file()
        .load()
        .with_context(|| format!("failed to load settings from {}", cfg.settings_path.display()))?;
    let api: Arc<dyn NotificationApi> = Arc::new(rest_client(cfg)?);
    let desktop: Arc<dyn DesktopNotifier> = match cfg.desktop {
        DesktopMode::Log => Arc::new(LogDesktop),
        DesktopMode::Off => Arc::new(Disabled),
    };

    tracing::info!(origin = %cfg.origin, user_id = %session.user_id, "watching notifications");

    let mut handle = Feed::new(cfg.feed_config(), session, api)
        .with_desktop(desktop)
        .with_settings(settings)
        .with_page_state(PageState { visible: true, focused })
        .spawn();
    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(FeedEvent::Delivered { notification, via }) => {
                    let tag = match via {
                        DeliveryPath::Push => "push",
                        DeliveryPath::Poll => "poll",
                    };
                    println!("[{}] {}  (unread: {})", tag, render(&notification, Utc::now()), handle.unread_count());
                }
                Ok(FeedEvent::TransportChanged(mode)) => {
                    tracing::info!(?mode, "transport changed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn list(cfg: &Config, tab: Tab) -> anyhow::Result<()> {
    let api = rest_client(cfg)?;
    let records = api
        .list()
        .await
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
    let now = Utc::now();
    let batch = normalize::from_poll_records(records, now);

    let shown: Vec<&Notification> = batch.iter().filter(|n| tab.includes(n.kind)).collect();
    if shown.is_empty() {
        println!("No notifications");
        return Ok(());
    }
    for n in &shown {
        println!("{}", render(n, now));
    }
    let unread = shown.iter().filter(|n| !n.read).count();
    println!("{} shown, {} unread", shown.len(), unread);
    Ok(())
}

fn handle_settings_command(cfg: &Config, cmd: cli::SettingsCommands) -> anyhow::Result<()> {
    let file = cfg.settings_file();
    let mut settings = file
        .load()
        .with_context(|| format!("failed to load settings from {}", file.path().display()))?;

    match cmd {
        cli::SettingsCommands::Show => {
            println!("{:<12} {:<6} {:<6}", "CATEGORY", "EMAIL", "PUSH");
            for kind in NotificationKind::ALL {
                let t = settings.toggles(kind);
                println!("{:<12} {:<6} {:<6}", kind, on_off(t.email), on_off(t.push));
            }
        }
        cli::SettingsCommands::Set { kind, channel, state } => {
            settings.set(kind, channel, state);
            file.save(&settings)
                .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
            println!("{} {} notifications {}", kind, channel, on_off(state));
        }
    }
    Ok(())
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

fn render(n: &Notification, now: DateTime<Utc>) -> String {
    format!(
        "{} {:<10} {:<8} {}  ({})",
        if n.read { " " } else { "*" },
        n.id,
        n.kind,
        n.text,
        relative_time(n.timestamp, now)
    )
}

fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s if s < 7 * 86_400 => format!("{}d ago", s / 86_400),
        _ => ts.format("%b %-d, %Y").to_string(),
    }
}
