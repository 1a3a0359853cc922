use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ielts_common::{Config, IeltsError};
use ielts_monitor::fetcher::HttpPageFetcher;
use ielts_monitor::listener::{
    sleep_unless_shutdown, UpdateListener, POLL_ERROR_BACKOFF, POLL_TIMEOUT_SECS,
};
use ielts_monitor::notify::{
    MessageTransport, Notification, Notifier, OutgoingMessage, TelegramTransport,
};
use ielts_monitor::{scheduler, Monitor, StateBacking, StateStore, TickOutcome};
use telegram_client::TelegramClient;

#[derive(Parser)]
#[command(name = "ielts-monitor")]
#[command(about = "Watches the Bilkent IELTS page and notifies Telegram subscribers of date changes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor, command listener and scheduler (default)
    Run,
    /// Run a single check and print what happened
    Check,
    /// Print the persisted monitor state as JSON
    Status,
    /// Forget the stored dates and subscribers
    Reset,
    /// Send a test message to every subscriber
    TestMessage,
    /// Print the chat id of every incoming message until Ctrl+C
    ChatIds,
}

/// Everything the subcommands share, built once from the config.
struct App {
    config: Config,
    client: TelegramClient,
    store: Arc<StateStore>,
    notifier: Arc<Notifier>,
    monitor: Arc<Monitor>,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let client = TelegramClient::with_options(
            &config.bot_token,
            telegram_client::DEFAULT_BASE_URL,
            config.fetch_timeout,
        )
        .context("Failed to create Telegram client")?;
        let transport: Arc<dyn MessageTransport> = Arc::new(TelegramTransport::new(client.clone()));

        let store = Arc::new(StateStore::open(&config.state));
        let notifier = Arc::new(Notifier::new(transport, store.clone()));
        let fetcher = Arc::new(HttpPageFetcher::new(config.fetch_timeout)?);
        let monitor = Arc::new(Monitor::new(
            fetcher,
            store.clone(),
            notifier.clone(),
            &config.target_url,
            config.check_interval_minutes,
        ));

        Ok(Self {
            config,
            client,
            store,
            notifier,
            monitor,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::from(1);
        }
    };
    config.log_redacted();

    if let Err(e) = run(cli.command.unwrap_or(Commands::Run), config).await {
        error!("{e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ielts_monitor={level},ielts_common={level},telegram_client={level},warn"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let app = App::build(config)?;
    match command {
        Commands::Run => cmd_run(app).await,
        Commands::Check => cmd_check(app).await,
        Commands::Status => cmd_status(app),
        Commands::Reset => cmd_reset(app),
        Commands::TestMessage => cmd_test_message(app).await,
        Commands::ChatIds => cmd_chat_ids(app).await,
    }
}

async fn cmd_run(app: App) -> Result<()> {
    info!("Starting IELTS exam date monitor");

    let bot = app.client.get_me().await.context("Telegram token check failed")?;
    info!(username = bot.username.as_deref().unwrap_or_default(), "Connected to Telegram");
    info!(subscribers = app.store.subscriber_count(), "Loaded subscribers");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let listener = UpdateListener::new(
        app.client.clone(),
        app.notifier.transport().clone(),
        app.store.clone(),
        &app.config.target_url,
        app.config.check_interval_minutes,
    );
    tasks.push(tokio::spawn(listener.run(shutdown_rx.clone())));

    tasks.push(tokio::spawn(scheduler::run_checks(
        app.monitor.clone(),
        app.config.check_interval(),
        shutdown_rx.clone(),
    )));

    if app.config.send_startup_message {
        tasks.push(tokio::spawn(scheduler::send_startup_message(
            app.notifier.clone(),
            shutdown_rx.clone(),
        )));
    }

    info!(
        interval_minutes = app.config.check_interval_minutes,
        "Monitor running, press Ctrl+C to stop"
    );

    shutdown_signal().await;
    info!("Shutting down gracefully");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Task ended abnormally");
        }
    }

    info!("Monitor stopped");
    Ok(())
}

async fn cmd_check(app: App) -> Result<()> {
    let outcome = app.monitor.tick().await;
    println!("{outcome}");

    if let TickOutcome::ExtractionFailed { reason, .. } = outcome {
        return Err(IeltsError::Extraction(reason).into());
    }
    Ok(())
}

fn cmd_status(app: App) -> Result<()> {
    let status = serde_json::to_string_pretty(&app.monitor.status())?;
    println!("{status}");
    Ok(())
}

fn cmd_reset(app: App) -> Result<()> {
    if *app.store.backing() == StateBacking::Ephemeral {
        return Err(IeltsError::State(
            "STATE_FILE is not set, there is no stored state to reset".into(),
        )
        .into());
    }
    app.store.reset();
    println!("State reset");
    Ok(())
}

async fn cmd_test_message(app: App) -> Result<()> {
    let bot = app.client.get_me().await.context("Telegram token check failed")?;
    println!("Bot: {} (@{})", bot.full_name(), bot.username.as_deref().unwrap_or("-"));

    let summary = app.notifier.broadcast(&Notification::liveness()).await;
    println!("Test message: {summary}");
    Ok(())
}

async fn cmd_chat_ids(app: App) -> Result<()> {
    println!("Send any message to the bot to see its chat id. Press Ctrl+C to stop.");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let transport = app.notifier.transport().clone();
    let mut offset = None;
    loop {
        let updates = tokio::select! {
            _ = shutdown_rx.changed() => break,
            updates = app.client.get_updates(offset, POLL_TIMEOUT_SECS) => updates,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Polling error, retrying in 5s");
                if sleep_unless_shutdown(&mut shutdown_rx, POLL_ERROR_BACKOFF).await {
                    break;
                }
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };

            let chat_id = message.chat.id;
            let name = message
                .from
                .as_ref()
                .map(|user| user.full_name())
                .unwrap_or_default();
            let username = message
                .from
                .as_ref()
                .and_then(|user| user.username.as_deref())
                .unwrap_or("-");
            println!("Chat ID: {chat_id}");
            println!("  Name: {name}");
            println!("  Username: @{username}");
            println!("  Message: {:?}", message.text.as_deref().unwrap_or(""));

            let reply = OutgoingMessage::markdown(format!(
                "✅ Chat ID: `{chat_id}`\n\nBildirim almak için /start komutunu kullanın."
            ));
            let outcome = transport.send(chat_id, &reply).await;
            if !outcome.is_delivered() {
                warn!(chat_id, outcome = %outcome, "Failed to reply with chat id");
            }
        }
    }

    println!("Stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
