//! # Doorman Proxy Service
//!
//! Binary entry point for the Doorman Proxy release intake service.
//!
//! This executable:
//! - Loads configuration from `proxy.env`, files and environment
//! - Initializes logging
//! - Connects to the configuration source and registers the record types
//! - Starts the HTTP server from doorman-proxy-api

use doorman_proxy_api::{
    proxy_auth_gate, start_server, AppState, ConfigError, LoggingConfig, ServiceConfig,
    ServiceError,
};
use doorman_proxy_core::{store::register_schemas, HttpSourceClient, ReleaseQueue, SourceStore};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Optional file of `KEY=value` lines loaded into the environment at startup
const ENV_FILE: &str = "proxy.env";

const EXIT_BIND: i32 = 1;
const EXIT_SERVER: i32 = 2;
const EXIT_CONFIGURATION: i32 = 3;
const EXIT_SCHEMA_REGISTRATION: i32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file_loaded = dotenv::from_filename(ENV_FILE).is_ok();

    // Logging settings live in the configuration, so load it before reporting
    // any configuration failure.
    let loaded = load_configuration();
    init_logging(
        loaded
            .as_ref()
            .map(|c| c.logging.clone())
            .unwrap_or_default(),
    );

    info!("Starting Doorman Proxy");
    if env_file_loaded {
        info!(file = ENV_FILE, "Loaded environment variables from file");
    }

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };
    info!(config = ?service_config, "Configuration loaded");

    // -------------------------------------------------------------------------
    // Connect to the configuration source
    // -------------------------------------------------------------------------
    let source = match HttpSourceClient::new(
        &service_config.source.uri,
        &service_config.source.user,
        &service_config.source.password,
        service_config.source.client_options(),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Cannot create configuration source client; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };
    let store: Arc<dyn SourceStore> = Arc::new(source);

    if let Err(e) = register_schemas(store.as_ref()).await {
        error!(
            error = %e,
            uri = %service_config.source.uri,
            "Cannot register record types with the configuration source; aborting"
        );
        std::process::exit(EXIT_SCHEMA_REGISTRATION);
    }

    let auth = match proxy_auth_gate(store.clone(), &service_config.admin) {
        Ok(gate) => gate,
        Err(e) => {
            error!(error = %e, "Cannot build authentication gate; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        request_logging = service_config.logging.request_logging,
        "Starting HTTP server"
    );

    let state = AppState::new(service_config, ReleaseQueue::new(store), auth);

    if let Err(e) = start_server(state).await {
        error!("Failed to start server: {}", e);
        std::process::exit(exit_code_for(&e));
    }

    Ok(())
}

// ============================================================================
// Private helpers
// ============================================================================

/// Process exit code reported for a server failure
fn exit_code_for(error: &ServiceError) -> i32 {
    match error {
        ServiceError::BindFailed { .. } => EXIT_BIND,
        ServiceError::ServerFailed { .. } => EXIT_SERVER,
        ServiceError::Configuration(_) => EXIT_CONFIGURATION,
    }
}

/// Load and validate the service configuration
///
/// Sources, later ones overriding earlier ones:
///  1. /etc/doorman-proxy/proxy.yaml
///  2. ./config/proxy.yaml
///  3. file named by DPROXY_CONFIG_FILE
///  4. environment variables prefixed DPROXY__ (e.g. DPROXY__SOURCE__URI)
///  5. flat DPROXY_SOURCE_* and DPROXY_LOGGING variables
fn load_configuration() -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/doorman-proxy/proxy")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/proxy")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("DPROXY_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            builder = builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    let mut service_config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix("DPROXY").separator("__"))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;

    service_config.apply_flat_env(|name| std::env::var(name).ok());
    service_config.validate()?;
    Ok(service_config)
}

fn init_logging(logging: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = logging.json_format;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
