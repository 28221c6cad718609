use std::{future::Future, path::Path, sync::Arc};

use accrual_client::AccrualApi;
use log::*;
use loyalty_engine::{DispatchError, JobDispatcher, SqliteDatabase};

use crate::{config::ServerConfig, errors::ServerError, stats_worker::start_stats_worker};

/// Runs the reconciliation service until Ctrl-C is pressed.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑️ Ctrl-C received. Shutting down."),
            Err(e) => error!("🛑️ Could not listen for Ctrl-C, shutting down. {e}"),
        }
    };
    run_server_until(config, ctrl_c).await
}

/// Runs the reconciliation service until `signal` resolves, then shuts the dispatcher down and waits for every job
/// to stop.
pub async fn run_server_until<F>(config: ServerConfig, signal: F) -> Result<(), ServerError>
where F: Future<Output = ()> {
    let url = config.database_url.reveal();
    prepare_data_dir(url)?;
    let db = SqliteDatabase::new_with_url(url, config.max_db_connections).await?;
    db.migrate().await?;
    let db = Arc::new(db);
    let accrual = AccrualApi::new(config.accrual.clone()).map_err(DispatchError::from)?;
    info!("🚀️ Reconciling orders against the accrual service at {}", config.accrual.normalized_base_url());

    let dispatcher = JobDispatcher::new(Arc::clone(&db), config.dispatcher.clone());
    let jobs = dispatcher.start(Arc::new(accrual))?;
    if config.resume_pending {
        let resumer = dispatcher.clone();
        tokio::spawn(async move {
            match resumer.resume_pending_orders().await {
                Ok(n) => info!("🚀️ {n} unfinished orders queued for reconciliation"),
                Err(DispatchError::JobChannelClosed) => debug!("🚀️ Shut down before all unfinished orders were queued"),
                Err(e) => error!("🚀️ Could not resume unfinished orders. {e}"),
            }
        });
    }
    let reporter = start_stats_worker(dispatcher.clone(), config.stats_interval);

    signal.await;
    dispatcher.shutdown().await;
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    jobs.await.map_err(|e| ServerError::InitializeError(format!("The job dispatcher did not stop cleanly. {e}")))?;
    info!("🛑️ Final job statistics. {}", dispatcher.stats());
    db.close().await;
    Ok(())
}

/// SQLite creates the database file on demand, but not the directory it lives in.
fn prepare_data_dir(url: &str) -> Result<(), ServerError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .ok_or_else(|| ServerError::ConfigurationError("LOYALTY_DATABASE_URL must be a sqlite: URL".into()))?;
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            info!("🗃️ Creating data directory {}", dir.display());
            std::fs::create_dir_all(dir)?;
            Ok(())
        },
        _ => Ok(()),
    }
}
