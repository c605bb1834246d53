#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

mod cli;
mod config;
mod db;
mod drive;
mod seed;
mod streaming;
mod supabase;
mod utils;
mod web;

use cli::{Cli, Command};
use config::Config;
use drive::DriveClient;
use supabase::SupabaseStorage;
use web::WebServer;
use web::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (config, warnings) = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let config = Arc::new(config);
    utils::logging::init_tracing(&config.logging);
    for warning in &warnings {
        warn!("{}", warning);
    }
    Metrics::init();

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    match cli.command() {
        Command::Migrate => {
            info!("migrations applied");
            Ok(ExitCode::SUCCESS)
        }
        Command::Seed => {
            let ids = seed::seed_movies(db_manager.movie_store()).await?;
            info!("seeded {} demo movies", ids.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckToken => {
            let drive = DriveClient::new(config.drive.clone(), db_manager.settings_store());
            if drive.restore_token().await? {
                info!("google drive token is stored");
                Ok(ExitCode::SUCCESS)
            } else {
                warn!("no google drive token stored");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Serve => {
            serve(config, db_manager).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config: Arc<Config>, db_manager: Arc<db::DatabaseManager>) -> Result<()> {
    info!("neon stream starting up");

    tokio::fs::create_dir_all(&config.server.uploads_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create uploads dir {}",
                config.server.uploads_dir.display()
            )
        })?;

    let drive = Arc::new(DriveClient::new(
        config.drive.clone(),
        db_manager.settings_store(),
    ));
    match drive.restore_token().await {
        Ok(true) => info!("google drive token restored"),
        Ok(false) => info!("google drive not connected yet"),
        Err(e) => error!("failed to restore google drive token: {}", e),
    }

    let supabase = config
        .supabase
        .as_ref()
        .map(|cfg| Arc::new(SupabaseStorage::new(cfg)));
    match &supabase {
        Some(storage) => info!("posters stored in supabase bucket {}", storage.bucket()),
        None => info!("posters stored locally"),
    }

    let web_server = WebServer::new(config.clone(), db_manager, drive, supabase).await?;

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    tokio::select! {
        _ = web_handle => {},
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        },
    }

    info!("neon stream shutting down");
    Ok(())
}
