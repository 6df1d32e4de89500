//! `csa-cache` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise telemetry (JSON logs, OTLP spans when configured).
//! 3. Load the fixture-backed collaborators.
//! 4. Start the services, provider and CRM caches.
//! 5. Log cache sizes periodically until Ctrl-C.
//! 6. Stop every refresher and flush telemetry.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use common::Language;
use tracing::info;

use csa_cache::clients::{CrmClient, FixtureBackend, NoopCrmClient};
use csa_cache::config::Config;
use csa_cache::{telemetry, CrmCache, ProviderCache, ServicesCache};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&cfg.log_level, cfg.otel_exporter_otlp_endpoint.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        crm_enabled = cfg.crm_enabled,
        fixtures_dir = %cfg.fixtures_dir,
        "csa-cache starting"
    );

    // -----------------------------------------------------------------------
    // 3. Collaborators
    // -----------------------------------------------------------------------
    let backend = Arc::new(
        FixtureBackend::load(&cfg.fixtures_dir)
            .await
            .context("failed to load fixtures")?,
    );
    let crm: Arc<dyn CrmClient> = if cfg.crm_enabled {
        backend.clone()
    } else {
        Arc::new(NoopCrmClient)
    };

    // -----------------------------------------------------------------------
    // 4. Caches
    // -----------------------------------------------------------------------
    let services = ServicesCache::start(
        backend.clone(),
        backend.clone(),
        cfg.services_schedule(),
        cfg.services_call_delay(),
    );
    let providers = ProviderCache::start(backend, cfg.provider_schedule());
    let crm_cache = CrmCache::start(crm, cfg.crm_schedule());

    // -----------------------------------------------------------------------
    // 5. Status loop
    // -----------------------------------------------------------------------
    let mut status = tokio::time::interval(Duration::from_secs(cfg.status_log_interval_secs));
    status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for shutdown signal")?;
                info!("shutdown requested");
                break;
            }
            _ = status.tick() => {
                info!(
                    services_en = services.service_count(Language::En),
                    services_nl = services.service_count(Language::Nl),
                    tracked_idps = providers.tracked_count(),
                    identity_providers = providers.identity_provider_count(),
                    licenses = crm_cache.license_count(),
                    articles = crm_cache.article_count(),
                    "cache status"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // 6. Shutdown
    // -----------------------------------------------------------------------
    services.shutdown().await;
    providers.shutdown().await;
    crm_cache.shutdown().await;
    info!("csa-cache stopped");
    telemetry::shutdown_telemetry();

    Ok(())
}
