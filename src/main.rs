use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{Level, info};

use caudal::commands;
use caudal::config::AppConfig;
use caudal::database::init_db;
use caudal::seed;
use caudal::state::AppState;
use caudal::storage::MediaStorage;
use caudal::utils::rate_limit::FixedWindowLimiter;

#[derive(Parser)]
#[command(name = "caudal", about = "Field-data collection service for flow-meter readings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Create demo operator accounts with randomized readings.
    SeedDemo {
        /// Number of demo companies to create.
        #[arg(long, default_value_t = 5)]
        companies: usize,
        /// Readings per company.
        #[arg(long, default_value_t = 20)]
        measurements: usize,
    },
    /// Fill missing measurement coordinates from company profiles.
    BackfillCoordinates {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Dump the database and copy the media root.
    Backup {
        /// Directory receiving the timestamped backup files.
        #[arg(long, default_value = "./backups")]
        output_dir: PathBuf,
    },
    /// Create an admin account.
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let command = cli.command.unwrap_or(Command::Serve);

    if let Command::Backup { output_dir } = &command {
        // pg_dump connects on its own; opening an application connection
        // here would first schema-sync the database being dumped.
        commands::backup::run(&config, output_dir).await?;
        return Ok(());
    }

    let db = init_db(&config.database.url).await?;
    let storage = MediaStorage::new(config.storage.media_root.clone());

    match command {
        Command::Serve => {
            seed::seed_role_permissions(&db).await?;
            seed::ensure_indexes(&db).await?;
            storage.ensure_layout().await?;

            let login_limiter = Arc::new(FixedWindowLimiter::new(
                config.auth.login_attempts_per_minute,
                Duration::from_secs(60),
            ));

            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid server address: {e}"))?;

            let state = AppState {
                db,
                config,
                storage,
                login_limiter,
            };
            let app = caudal::build_router(state);

            info!("Server running at http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::SeedDemo {
            companies,
            measurements,
        } => {
            seed::seed_role_permissions(&db).await?;
            storage.ensure_layout().await?;
            commands::seed_demo::run(&db, &storage, companies, measurements).await?;
        }
        Command::BackfillCoordinates { dry_run } => {
            commands::backfill::run(&db, dry_run).await?;
        }
        Command::Backup { .. } => {
            // Handled before the database connection is opened.
        }
        Command::CreateAdmin { username, password } => {
            seed::seed_role_permissions(&db).await?;
            commands::create_admin::run(&db, &username, &password).await?;
        }
    }

    Ok(())
}
