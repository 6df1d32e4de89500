//! [`ServicesCache`]: lock-free, wholesale-replaced catalog snapshot.

use std::{collections::HashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use common::{IdentityProvider, Language, Service};
use tracing::debug;

use super::{load_catalog, load_usage, CatalogSnapshot, UsageSnapshot};
use crate::clients::{DirectoryClient, ServiceCatalog};
use crate::error::CacheError;
use crate::refresh::{self, spawn_refresher, RefreshHandle, RefreshSchedule, Repopulate};

struct ServicesState {
    catalog: Arc<dyn ServiceCatalog>,
    directory: Arc<dyn DirectoryClient>,
    call_delay: Duration,
    services: ArcSwap<CatalogSnapshot>,
    usage: ArcSwap<UsageSnapshot>,
}

#[async_trait]
impl Repopulate for ServicesState {
    fn cache_name(&self) -> &'static str {
        "services"
    }

    async fn repopulate(&self) -> anyhow::Result<()> {
        let services = load_catalog(self.catalog.as_ref()).await?;
        self.services.store(Arc::new(services));

        let usage = load_usage(self.directory.as_ref(), self.call_delay).await?;
        self.usage.store(Arc::new(usage));
        Ok(())
    }
}

/// Catalog of all services per language, recomputed wholesale every cycle.
///
/// Backed by [`ArcSwap`] so readers never block and the refresher can swap
/// in a completely new map.
#[derive(Clone)]
pub struct ServicesCache {
    state: Arc<ServicesState>,
    refresher: RefreshHandle,
}

impl ServicesCache {
    /// Create the cache and schedule its first population.
    ///
    /// `call_delay` is the pause between consecutive directory calls while
    /// rebuilding the per-IdP usage index.
    pub fn start(
        catalog: Arc<dyn ServiceCatalog>,
        directory: Arc<dyn DirectoryClient>,
        schedule: RefreshSchedule,
        call_delay: Duration,
    ) -> Self {
        let state = Arc::new(ServicesState {
            catalog,
            directory,
            call_delay,
            services: ArcSwap::from_pointee(HashMap::new()),
            usage: ArcSwap::from_pointee(HashMap::new()),
        });
        let refresher = spawn_refresher(state.clone(), schedule);
        Self { state, refresher }
    }

    /// All services published in `lang`, as an owned copy.
    ///
    /// Empty until the first successful cycle.
    pub fn all_services(&self, lang: Language) -> Vec<Service> {
        match self.state.services.load().get(&lang) {
            Some(services) => services.clone(),
            None => {
                debug!(lang = %lang, "services cache miss; returning empty list");
                Vec::new()
            }
        }
    }

    /// Like [`all_services`](Self::all_services) for a raw language code.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnsupportedLanguage`] for anything but `en`/`nl`.
    pub fn all_services_for(&self, lang: &str) -> Result<Vec<Service>, CacheError> {
        Ok(self.all_services(lang.parse()?))
    }

    /// Number of services currently published in `lang`.
    pub fn service_count(&self, lang: Language) -> usize {
        self.state.services.load().get(&lang).map_or(0, Vec::len)
    }

    /// Entity ids of the services `idp` uses, empty if unknown.
    pub fn find_used_service_ids(&self, idp: &IdentityProvider) -> Vec<String> {
        self.state.usage.load().get(&idp.id).cloned().unwrap_or_default()
    }

    /// Schedule an immediate refresh on the background task.
    pub fn evict(&self) {
        self.refresher.evict();
    }

    /// Refresh now and return once done. Failures are logged, not returned;
    /// the result tells whether the cycle succeeded.
    pub async fn evict_synchronously(&self) -> bool {
        refresh::run_guarded(self.state.clone()).await
    }

    /// Stop the background refresher.
    pub async fn shutdown(&self) {
        self.refresher.shutdown().await;
    }
}
