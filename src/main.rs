mod audit;
mod config;
mod control;
mod execution;
mod scenario;
mod scheduling;
mod types;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::audit::audit_log::AuditLog;
use crate::config::DeskConfig;
use crate::control::api::{self, AppState};
use crate::control::desk::TradingDesk;
use crate::execution::worker_pool::WorkerPool;
use crate::scenario::scenario::Scenario;
use crate::scenario::venues::VenueKind;
use crate::scheduling::session_scheduler::SessionScheduler;

#[derive(Debug, Clone, Parser)]
struct Args {
    #[arg(long, default_value = DeskConfig::FILE_NAME)]
    pub config: PathBuf,

    #[arg(long, value_enum)]
    pub venue: Option<VenueKind>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

impl Args {
    fn apply(self, mut config: DeskConfig) -> Result<DeskConfig> {
        if let Some(venue) = self.venue {
            config.venue = venue;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(audit_log) = self.audit_log {
            config.audit_log = audit_log;
        }
        if let Some(bind) = self.bind {
            config.api.bind = bind;
        }

        config.validate().context("invalid command line override")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dispatcher=debug".parse()?)
                .add_directive("axum=info".parse()?),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let config = DeskConfig::load(&args.config)?;
    let config = args.apply(config)?;

    info!(
        venue = %config.venue,
        workers = config.workers,
        audit_log = %config.audit_log.display(),
        duration_minutes = config.session.duration_minutes,
        cooldown_minutes = config.session.cooldown_minutes,
        gated = config.enforce_session_gate,
        "starting dispatcher"
    );

    let venue = Scenario::execution_venue(config.venue, &config);
    let audit = Arc::new(
        AuditLog::open(&config.audit_log)
            .with_context(|| format!("failed to open audit log {}", config.audit_log.display()))?,
    );
    let pool = Arc::new(WorkerPool::new(config.workers, venue.clone(), audit.clone()));
    let scheduler = SessionScheduler::new(config.session);
    let desk = Arc::new(TradingDesk::new(
        pool,
        scheduler,
        venue,
        config.enforce_session_gate,
    ));

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, shutting down");
    };

    let served = api::serve(config.api.bind, AppState::new(desk.clone(), audit), shutdown).await;

    desk.shutdown().await;
    info!(stats = ?desk.status().dispatch, "dispatcher stopped");

    served
}
