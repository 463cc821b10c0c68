#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use reportr_adapter::{serve, AdapterConfig, AppState, GoogleIdentityProvider, LogFormat};
use reportr_os::{AdminAllowList, IdentityVerifier, ReportDesk, SessionRegistry};
use reportr_storage::ReportStore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AdapterConfig::from_env()?;
    init_tracing(config.log_format);

    let admins = AdminAllowList::load(&config.admins_path)?;
    if admins.is_empty() {
        warn!(path = %config.admins_path.display(), "admin allow-list is empty; exports are disabled");
    }
    let store = ReportStore::open_journal(&config.store_path)?;
    let provider = GoogleIdentityProvider::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        Some(config.trusted_domain.as_str().to_string()),
        Duration::from_millis(config.provider_timeout_ms),
    );
    let state = AppState::new(
        ReportDesk::new(store, admins),
        SessionRegistry::new(config.session_ttl_secs),
        IdentityVerifier::new(config.trusted_domain.clone()),
        Arc::new(provider),
        config.cookie_secure,
        config.redirect_uri(),
        config.static_dir.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        bind = %config.bind,
        trusted_domain = %config.trusted_domain.as_str(),
        store = %config.store_path.display(),
        "reportr_adapter_http listening"
    );
    serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    })
    .await?;
    Ok(())
}
