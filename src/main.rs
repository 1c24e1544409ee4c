//! CRM Gateway - caching gateway in front of the CRM API

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use crm_gateway::{
    cli::{Cli, Command},
    clock::SystemClock,
    config::Config,
    crm::ResourceType,
    gateway::{Gateway, Services},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let Some(config) = load_config(&cli) else {
        return ExitCode::FAILURE;
    };

    match cli.command {
        Some(Command::Token { force }) => run_token(&config, force).await,
        Some(Command::List {
            ref resource,
            page,
            page_size,
        }) => run_list(&config, resource, page, page_size).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Build services for a one-shot command
async fn build_services(config: &Config) -> Option<Services> {
    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {e}");
        return None;
    }
    match Services::build(config, Arc::new(SystemClock)).await {
        Ok(services) => Some(services),
        Err(e) => {
            eprintln!("❌ Failed to initialise: {e}");
            None
        }
    }
}

/// Print the current access token
async fn run_token(config: &Config, force: bool) -> ExitCode {
    let Some(services) = build_services(config).await else {
        return ExitCode::FAILURE;
    };

    let result = if force {
        services.tokens.force_refresh().await
    } else {
        services.tokens.get_token().await
    };

    match result {
        Ok(token) => {
            println!("{token}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to obtain access token: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Print one page of a resource as JSON
async fn run_list(config: &Config, resource: &str, page: u32, page_size: u32) -> ExitCode {
    let resource: ResourceType = match resource.parse() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(services) = build_services(config).await else {
        return ExitCode::FAILURE;
    };

    match services.recent.page(resource, page, page_size).await {
        Ok(objects) => match serde_json::to_string_pretty(&objects) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("❌ Failed to fetch {resource}: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        crm = %config.crm.base_url,
        "Starting CRM Gateway"
    );

    let gateway = match Gateway::new(config).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
