use std::{path::Path, sync::Arc};

#[cfg(unix)]
use std::fs;

use actix_web::{middleware::Logger, web, App, HttpServer};
use thiserror::Error;

use trailfund_domain::config::{ApiConfig, ConfigError};
use trailfund_domain::services::events::{self, LogNotifier, SponsorshipNotifier};
use trailfund_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use trailfund_processor::{HttpProcessor, WebhookVerifier};
use trailfund_storage::SeaOrmStorage;

use crate::{
    handlers::{
        begin_checkout_handler, cancel_sponsorship_handler, confirm_checkout_handler,
        list_tiers_handler, metrics_handler, refund_handler, upsert_tier_handler, webhook_handler,
    },
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let storage = SeaOrmStorage::connect(config.database_url()).await?;

    let processor = Arc::new(
        HttpProcessor::new(config.processor())
            .map_err(|err| BootstrapError::Processor(err.to_string()))?,
    );
    let webhook = Arc::new(WebhookVerifier::new(config.processor().webhook_secret()));

    let (events, receiver) = events::channel();
    let notifiers: Vec<Arc<dyn SponsorshipNotifier>> = vec![Arc::new(LogNotifier)];
    tokio::spawn(events::run_dispatcher(receiver, notifiers));

    let state = AppState::new(
        storage,
        processor,
        webhook,
        config.payments().fee_schedule(),
        config.payments().currency().to_string(),
        events,
        telemetry.clone(),
    );

    // With an internal listener configured, metrics stay off the public
    // surface.
    let include_metrics_on_public = !config.has_internal_listener();

    let public_state = state.clone();

    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .route("/api/v1/checkout", web::post().to(begin_checkout_handler))
            .route(
                "/api/v1/checkout/confirm",
                web::post().to(confirm_checkout_handler),
            )
            .route(
                "/api/v1/processor/webhook",
                web::post().to(webhook_handler),
            )
            .route("/api/v1/tiers", web::get().to(list_tiers_handler))
            .route("/api/v1/tiers/{tier_id}", web::put().to(upsert_tier_handler))
            .route("/api/v1/refunds", web::post().to(refund_handler))
            .route(
                "/api/v1/sponsorships/{sponsorship_id}/cancel",
                web::post().to(cancel_sponsorship_handler),
            );

        if include_metrics_on_public {
            app = app.route("/metrics", web::get().to(metrics_handler));
        }

        app
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .route("/metrics", web::get().to(metrics_handler))
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] trailfund_domain::storage::StorageError),
    #[error("processor client error: {0}")]
    Processor(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// A stale socket file from an unclean shutdown makes bind fail.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}
