use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nodepulse::config::ServerConfig;
use nodepulse::db::services::SeaOrmMonitorRepository;
use nodepulse::db::repository::MonitorRepository;
use nodepulse::monitoring::cleaner::HistoryCleaner;
use nodepulse::monitoring::executors::Prober;
use nodepulse::monitoring::recorder::StatusRecorder;
use nodepulse::monitoring::scheduler::Scheduler;
use nodepulse::notifications::engine::{ChannelDispatcher, NotificationEngine};
use nodepulse::web::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "nodepulse.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    init_logging();
    dotenv().ok();
    info!("Starting nodepulse server.");

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Failed to load server configuration: {}", e);
            return Err(e.into());
        }
    };

    // --- Database Pool Setup ---
    let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let mut options = ConnectOptions::new(database_url);
    options.max_connections(10);
    let db: DatabaseConnection = Database::connect(options).await?;
    let repo: Arc<dyn MonitorRepository> = Arc::new(SeaOrmMonitorRepository::new(db));

    // --- Engine Wiring ---
    let recorder = Arc::new(StatusRecorder::new(repo.clone()));
    let dispatcher = Arc::new(ChannelDispatcher::new());
    let engine = Arc::new(NotificationEngine::new(repo.clone(), dispatcher));
    let prober = Arc::new(Prober::new(
        repo.clone(),
        server_config.cert_expiry_threshold_days,
    ));
    let scheduler = Scheduler::new(repo.clone(), prober, recorder.clone(), engine);
    scheduler.start().await?;

    // --- History Cleaner Task ---
    let cleaner = Arc::new(HistoryCleaner::new(
        repo.clone(),
        server_config.retention_days,
    ));
    let sweep_interval = Duration::from_secs(server_config.sweep_interval_hours * 60 * 60);
    tokio::spawn(cleaner.run(sweep_interval));

    // --- HTTP Surface (push ingestion + health) ---
    let state = AppState {
        repo: repo.clone(),
        recorder: recorder.clone(),
    };
    let app = create_router(state);

    let addr: SocketAddr = server_config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening.");

    axum::serve(listener, app.into_make_service()).await?;

    scheduler.stop().await;
    Ok(())
}
