use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    chatlink_api::AppState,
    chatlink_client::ChatLinkClient,
    chatlink_mq::{Broker, MqConfig},
    chatlink_storage::Storage,
    chatlink_worker::Worker,
};

#[derive(Parser)]
#[command(name = "chatlink", about = "Chat and LLM orchestration behind a message queue")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address the HTTP API binds to.
    #[arg(long, global = true, env = "CHATLINK_LISTEN", default_value = "127.0.0.1:5000")]
    listen: String,

    /// SQLite database file.
    #[arg(long, global = true, env = "CHATLINK_DB", default_value = "chatlink.db")]
    db: PathBuf,

    /// Drop and recreate the schema before serving.
    #[arg(long, global = true, default_value_t = false)]
    reset_db: bool,

    /// Run the worker without the HTTP API.
    #[arg(long, global = true, default_value_t = false)]
    no_api: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the worker and HTTP API (default when no subcommand is provided).
    Serve,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "chatlink starting");

    match cli.command {
        None | Some(Commands::Serve) => serve(cli).await,
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let config = MqConfig::from_env();
    let broker = Broker::new(&config);

    let storage = Storage::open(&cli.db).await?;
    if cli.reset_db {
        storage.reset().await?;
        info!(db = %cli.db.display(), "database reset");
    }

    let shutdown = CancellationToken::new();
    let worker = Worker::new(broker.clone(), config.clone(), storage);
    let worker_task = tokio::spawn(worker.run(shutdown.clone()));

    let api_task = if cli.no_api {
        None
    } else {
        let client = ChatLinkClient::connect(broker.clone(), config).await?;
        let app = chatlink_api::app(AppState::new(client));
        let listener = TcpListener::bind(&cli.listen).await?;
        info!(addr = %listener.local_addr()?, "http api listening");
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }))
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining");
    shutdown.cancel();

    worker_task.await??;
    if let Some(task) = api_task {
        task.await??;
    }
    broker.stop();
    info!("chatlink stopped");
    Ok(())
}
