//! Atrium admin API entry point.
//!
//! # Purpose
//! Wires configuration, storage, the IdP validator and the login
//! orchestrator, then serves the API and metrics listeners.
use admin_api::app::{AppState, build_router};
use admin_api::auth::keys::load_signing_keys;
use admin_api::auth::oidc::UpstreamOidcValidator;
use admin_api::auth::orchestrator::LoginOrchestrator;
use admin_api::config::{ServiceConfig, StorageBackend};
use admin_api::observability;
use admin_api::store::{IdentityStore, memory::InMemoryStore, postgres::PostgresStore};
use anyhow::Context;
use atrium_authz::{InternalTokenService, OrganizationScopePolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env_or_yaml().context("admin api config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: ServiceConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle =
        observability::init_observability("atrium-admin-api", config.environment)?;
    let state = build_state(config.clone()).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
        std::future::pending(),
    ));

    let app = build_router(state.clone());
    let addr = config.bind_addr;
    tracing::info!(
        %addr,
        storage = state.store.backend_name(),
        provisioning_mode = state.orchestrator.mode().as_str(),
        "admin api listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: ServiceConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn IdentityStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };
    if config.oidc.is_none() {
        tracing::warn!("no ATRIUM_OIDC_ISSUER configured; every login will be rejected");
    }
    let validator = UpstreamOidcValidator::with_defaults(config.oidc.iter().cloned().collect());

    let keys = load_signing_keys(&config.token)?;
    let tokens = InternalTokenService::new(
        config.token.issuer.clone(),
        config.token.audience.clone(),
        Duration::from_secs(config.token.ttl_secs),
        Duration::from_secs(config.token.leeway_secs),
        keys,
    )
    .context("build internal token service")?;

    let orchestrator = LoginOrchestrator::new(
        Arc::new(validator),
        store.clone(),
        OrganizationScopePolicy::new(config.staff_organizations.iter().cloned()),
        tokens,
        config.provisioning_mode,
    );

    Ok(AppState {
        store,
        orchestrator: Arc::new(orchestrator),
        secure_cookies: config.environment.is_production(),
    })
}
