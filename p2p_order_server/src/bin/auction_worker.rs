//! Runs the auto-bump auction over the matching pool as its own process.
//!
//! Exits with 0 after SIGINT or SIGTERM, and with 1 if it cannot start.
use std::process::ExitCode;

use dotenvy::dotenv;
use log::*;
use p2p_order_engine::{events::EventHandlers, MempoolApi};
use p2p_order_server::{
    bump_worker::bump_worker_loop,
    cli::handle_command_line_args,
    config::ServerConfig,
    errors::ServerError,
    helpers::{connect_database, shutdown_signal},
    server::create_event_hooks,
};

fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return ExitCode::SUCCESS;
    }
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("🕰️ Could not start the auction worker runtime. {e}");
            return ExitCode::FAILURE;
        },
    };
    match runtime.block_on(run_worker(ServerConfig::from_env_or_default())) {
        Ok(signal) => {
            info!("🕰️ {signal} received. Auction worker stopped.");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("🕰️ Auction worker failed to start. {e}");
            ExitCode::FAILURE
        },
    }
}

async fn run_worker(config: ServerConfig) -> Result<&'static str, ServerError> {
    let db = connect_database(&config).await?;
    let handlers = EventHandlers::new(config.event_buffer_size, create_event_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = MempoolApi::new(db, producers);
    info!("🚀️ Auction worker running against {}", config.database_url);
    tokio::select! {
        _ = bump_worker_loop(api, config.bump_poll_interval) => Ok("Worker loop ended"),
        signal = shutdown_signal() => signal,
    }
}
