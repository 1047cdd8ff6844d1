use log::*;
use p2p_order_engine::SqliteDatabase;

use crate::{config::ServerConfig, errors::ServerError};

/// Connects to the order database and brings its schema up to date.
pub async fn connect_database(config: &ServerConfig) -> Result<SqliteDatabase, ServerError> {
    if config.database_url.is_empty() {
        return Err(ServerError::ConfigurationError("P2P_DATABASE_URL is not set".into()));
    }
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    debug!("🗃️ Connected to {}", config.database_url);
    Ok(db)
}

/// Resolves with the name of the signal once the process is asked to stop (SIGINT, or SIGTERM on unix).
pub async fn shutdown_signal() -> Result<&'static str, ServerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT").map_err(ServerError::from),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT")
    }
}
