use clap::Parser;
use lorekeeper::app::{App, load_config};
use lorekeeper::cli::{Args, ServiceName};
use lorekeeper::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let enabled_services = args.enabled_services();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        enabled_services = ?enabled_services,
        "starting lorekeeper"
    );

    let mut app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = app.setup_services(&enabled_services) {
        error!(error = ?e, "Failed to setup services");
        return ExitCode::FAILURE;
    }

    if enabled_services.contains(&ServiceName::Bot)
        && let Err(e) = app.setup_bot_service().await
    {
        error!(error = ?e, "Failed to setup bot service");
        return ExitCode::FAILURE;
    }

    if let Err(e) = app.start_services() {
        error!(error = ?e, "Failed to start services");
        return ExitCode::FAILURE;
    }
    app.run().await
}
