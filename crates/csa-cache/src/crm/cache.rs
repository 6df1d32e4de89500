//! [`CrmCache`]: license and article tables published together as one snapshot.

use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use common::{Article, License, MappingEntry, Service};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{load_articles, load_licenses, ArticleTable, LicenseTable};
use crate::clients::CrmClient;
use crate::refresh::{self, spawn_refresher, RefreshHandle, RefreshSchedule, Repopulate};

/// Everything one CRM cycle produced.
///
/// Published as a unit, so the tables always agree with each other and with
/// the mappings they were derived from.
#[derive(Debug, Default)]
pub struct CrmSnapshot {
    /// Institution id → CRM account id.
    pub institutions: Vec<MappingEntry>,
    /// Sp entity id → CRM article id.
    pub services: Vec<MappingEntry>,
    pub licenses: LicenseTable,
    pub articles: ArticleTable,
}

struct CrmState {
    crm: Arc<dyn CrmClient>,
    snapshot: ArcSwap<CrmSnapshot>,
    /// Serialises cycles (scheduled and synchronous evictions).
    cycle: Mutex<()>,
}

#[async_trait]
impl Repopulate for CrmState {
    fn cache_name(&self) -> &'static str {
        "crm"
    }

    async fn repopulate(&self) -> anyhow::Result<()> {
        let _cycle = self.cycle.lock().await;

        let institutions = self
            .crm
            .list_institution_mappings()
            .await
            .context("failed to fetch institution mappings")?;
        let services = self
            .crm
            .list_service_mappings()
            .await
            .context("failed to fetch service mappings")?;

        let licenses = load_licenses(self.crm.as_ref(), &institutions, &services).await?;
        let articles = load_articles(self.crm.as_ref(), &services).await?;

        info!(
            institutions = institutions.len(),
            services = services.len(),
            licenses = licenses.len(),
            articles = articles.values().filter(|a| a.is_some()).count(),
            "crm snapshot built"
        );
        self.snapshot.store(Arc::new(CrmSnapshot {
            institutions,
            services,
            licenses,
            articles,
        }));
        Ok(())
    }
}

/// License lookups by `(institution, service)` and article lookups by service.
#[derive(Clone)]
pub struct CrmCache {
    state: Arc<CrmState>,
    refresher: RefreshHandle,
}

impl CrmCache {
    /// Create the cache and schedule its first population.
    pub fn start(crm: Arc<dyn CrmClient>, schedule: RefreshSchedule) -> Self {
        let state = Arc::new(CrmState {
            crm,
            snapshot: ArcSwap::from_pointee(CrmSnapshot::default()),
            cycle: Mutex::new(()),
        });
        let refresher = spawn_refresher(state.clone(), schedule);
        Self { state, refresher }
    }

    /// The license `institution_id` holds for `service`.
    ///
    /// `None` when the service has no entity id (CRM-only services), when no
    /// institution is given, or when the CRM has no license for the pair.
    pub fn license(&self, service: &Service, institution_id: Option<&str>) -> Option<License> {
        let (Some(sp_entity_id), Some(institution_id)) =
            (service.sp_entity_id.as_deref(), institution_id)
        else {
            return None;
        };

        let key = MappingEntry::new(institution_id, sp_entity_id);
        let license = self.state.snapshot.load().licenses.get(&key).cloned();
        debug!(
            sp_entity_id,
            institution_id,
            found = license.is_some(),
            "license lookup"
        );
        license
    }

    /// A private copy of the article describing `service`.
    ///
    /// `None` when the service has no entity id or the CRM has no article.
    pub fn article(&self, service: &Service) -> Option<Article> {
        let sp_entity_id = service.sp_entity_id.as_deref()?;
        self.state
            .snapshot
            .load()
            .articles
            .get(sp_entity_id)
            .and_then(Option::as_ref)
            .map(Article::duplicate)
    }

    /// The snapshot currently served to readers.
    pub fn snapshot(&self) -> Arc<CrmSnapshot> {
        self.state.snapshot.load_full()
    }

    /// Number of `(institution, service)` pairs with a license.
    pub fn license_count(&self) -> usize {
        self.state.snapshot.load().licenses.len()
    }

    /// Number of services with an article.
    pub fn article_count(&self) -> usize {
        self.state
            .snapshot
            .load()
            .articles
            .values()
            .filter(|a| a.is_some())
            .count()
    }

    /// Schedule an immediate refresh on the background task.
    pub fn evict(&self) {
        self.refresher.evict();
    }

    /// Refresh now and return once done; `false` if the cycle failed.
    pub async fn evict_synchronously(&self) -> bool {
        refresh::run_guarded(self.state.clone()).await
    }

    /// Stop the background refresher.
    pub async fn shutdown(&self) {
        self.refresher.shutdown().await;
    }
}
