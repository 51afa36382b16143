use fidpos_server::{Config, Server, ServerState, init_logger_with_file};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment (.env first so Config::from_env sees it)
    let _ = dotenv::dotenv();

    // 2. Load configuration and create the working directory tree
    let config = Config::from_env();
    config.ensure_work_dir()?;

    // 3. Logging (stdout + daily-rolling file under work_dir/logs)
    let log_dir = config.logs_dir();
    init_logger_with_file(
        std::env::var("LOG_LEVEL").ok().as_deref(),
        log_dir.to_str(),
    );

    tracing::info!("FidPOS server starting...");

    // 4. Initialize server state (database, gateway, receipt pipeline)
    let state = ServerState::initialize(&config).await?;

    // 5. Run the HTTP server (background tasks start inside run())
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {e}");
        return Err(e.into());
    }

    Ok(())
}
