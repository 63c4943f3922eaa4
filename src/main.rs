use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reaction_gate::authorizer::EmojiPolicy;
use reaction_gate::correlator::Correlator;
use reaction_gate::notification::callback::HttpDispatcher;
use reaction_gate::registry::Registry;
use reaction_gate::slack::{self, SlackClient};
use reaction_gate::store::file::FileStateStore;
use reaction_gate::store::{Snapshot, StateStore};
use reaction_gate::{api, cli, config, jobs, AppState};

/// Bound on reactions waiting for the correlator.
const INTAKE_QUEUE: usize = 256;
/// How long shutdown waits for the intake to close and the correlator to finish its current event.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load();
    init_tracing(&cfg);

    let args = cli::Cli::parse();
    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Apps { command }) => handle_apps_command(&cfg, command).await,
        Some(cli::Commands::Requests { command }) => handle_requests_command(&cfg, command).await,
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(cfg: &config::Config) {
    let default_filter = if cfg.debug {
        "reaction_gate=debug,tower_http=debug"
    } else {
        "reaction_gate=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(cfg.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cfg.log_json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn run_server(mut cfg: config::Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        cfg.port = port;
    }

    let store = Arc::new(FileStateStore::new(&cfg.state_file));
    tracing::info!(path = %store.path().display(), "Restoring registry...");
    let registry = Arc::new(Registry::restore(store, cfg.max_expire_secs).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Reaction intake: Socket Mode -> channel -> correlator.
    let mut intake_task = None;
    let mut correlator_task = None;
    match (cfg.slack_app_token.clone(), cfg.slack_bot_token.clone()) {
        (Some(app_token), Some(bot_token)) => {
            let client = SlackClient::new(bot_token, Some(app_token))?;
            let dispatcher = HttpDispatcher::new(cfg.dispatch.clone())?;
            let policy = EmojiPolicy::new(&cfg.approve_emojis, &cfg.reject_emojis);
            let correlator = Correlator::new(
                registry.clone(),
                policy,
                Arc::new(client.clone()),
                Arc::new(dispatcher),
            );

            let (events_tx, events_rx) = mpsc::channel(INTAKE_QUEUE);
            correlator_task = Some(tokio::spawn(correlator.run(events_rx)));
            intake_task = Some(tokio::spawn(slack::socket::run(
                client,
                events_tx,
                shutdown_rx.clone(),
            )));
            tracing::info!("Slack reaction intake started");
        }
        _ => {
            tracing::warn!(
                "SLACK_APP_TOKEN and SLACK_BOT_TOKEN not both set; reaction intake disabled"
            );
        }
    }

    let sweep_task = jobs::sweep::spawn(registry.clone(), cfg.sweep_interval, shutdown_rx.clone());
    tracing::info!(every = ?cfg.sweep_interval, "Background expiry sweep started");

    let app = api::router(Arc::new(AppState::new(registry)));

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("reactgate listening on {}", addr);

    let signal_tx = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received, draining...");
            let _ = signal_tx.send(true);
        })
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);

    // The intake owns the only sender; once it exits the correlator drains and stops.
    if let Some(task) = intake_task {
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            tracing::warn!("reaction intake did not stop within {:?}", DRAIN_TIMEOUT);
        }
    }
    if let Some(task) = correlator_task {
        if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
            tracing::warn!("correlator did not finish within {:?}", DRAIN_TIMEOUT);
        }
    }
    let _ = sweep_task.await;

    tracing::info!("reactgate stopped");
    Ok(())
}

async fn load_snapshot(cfg: &config::Config) -> anyhow::Result<Snapshot> {
    let store = FileStateStore::new(&cfg.state_file);
    Ok(store.load().await?.unwrap_or_default())
}

async fn handle_apps_command(
    cfg: &config::Config,
    cmd: cli::AppsCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::AppsCommands::List => {
            let snapshot = load_snapshot(cfg).await?;
            if snapshot.apps.is_empty() {
                println!("No applications registered.");
                return Ok(());
            }
            println!("{:<20} {:<45} {:<30}", "NAME", "CALLBACK", "APPROVERS");
            for app in snapshot.apps.values() {
                let approvers: Vec<&str> =
                    app.authorized_approvers.iter().map(String::as_str).collect();
                println!(
                    "{:<20} {:<45} {:<30}",
                    app.name,
                    app.callback_url,
                    approvers.join(",")
                );
            }
        }
    }
    Ok(())
}

async fn handle_requests_command(
    cfg: &config::Config,
    cmd: cli::RequestsCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::RequestsCommands::List => {
            let snapshot = load_snapshot(cfg).await?;
            if snapshot.requests.is_empty() {
                println!("No pending requests.");
                return Ok(());
            }
            println!(
                "{:<22} {:<20} {:<30} {:<26}",
                "ID", "APP", "EMOJIS", "EXPIRES"
            );
            for req in snapshot.requests.values() {
                let emojis: Vec<&str> = req.valid_emojis.iter().map(String::as_str).collect();
                let expires = req
                    .expires_at()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{:<22} {:<20} {:<30} {:<26}",
                    req.id,
                    req.application_name,
                    emojis.join(","),
                    expires
                );
            }
        }
    }
    Ok(())
}
