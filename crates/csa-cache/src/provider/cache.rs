//! [`ProviderCache`]: lazily grown map of IdP → linked service ids, plus a
//! wholesale-replaced identity provider snapshot.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use common::IdentityProvider;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::clients::DirectoryClient;
use crate::error::CacheError;
use crate::refresh::{self, spawn_refresher, RefreshHandle, RefreshSchedule, Repopulate};

struct ProviderState {
    directory: Arc<dyn DirectoryClient>,
    /// Linked service ids per identity provider id; keys only ever come from misses.
    linked: DashMap<String, Vec<String>>,
    identity_providers: ArcSwap<HashMap<String, IdentityProvider>>,
}

impl ProviderState {
    async fn refresh_linked(&self) -> anyhow::Result<()> {
        let keys: Vec<String> = self.linked.iter().map(|e| e.key().clone()).collect();

        // Fetch everything first so a failure leaves every entry untouched.
        let mut fresh = Vec::with_capacity(keys.len());
        for idp_id in keys {
            let ids = self
                .directory
                .get_linked_service_ids(&idp_id)
                .await
                .with_context(|| format!("failed to refresh linked services for {idp_id}"))?;
            fresh.push((idp_id, ids));
        }

        let count = fresh.len();
        for (idp_id, ids) in fresh {
            self.linked.insert(idp_id, ids);
        }
        debug!(count, "linked services refreshed");
        Ok(())
    }

    async fn refresh_identity_providers(&self) -> anyhow::Result<()> {
        let all = self
            .directory
            .get_all_identity_providers()
            .await
            .context("failed to list identity providers")?;
        let snapshot: HashMap<String, IdentityProvider> =
            all.into_iter().map(|idp| (idp.id.clone(), idp)).collect();
        info!(count = snapshot.len(), "identity providers refreshed");
        self.identity_providers.store(Arc::new(snapshot));
        Ok(())
    }
}

#[async_trait]
impl Repopulate for ProviderState {
    fn cache_name(&self) -> &'static str {
        "providers"
    }

    async fn repopulate(&self) -> anyhow::Result<()> {
        self.refresh_linked().await?;
        self.refresh_identity_providers().await
    }
}

/// Cache of the services linked to each identity provider, filled on demand.
///
/// Hits never touch the directory. A miss blocks the caller on one directory
/// call; concurrent misses for the same key may each call the directory, and
/// the first answer stored wins.
#[derive(Clone)]
pub struct ProviderCache {
    state: Arc<ProviderState>,
    refresher: RefreshHandle,
}

impl ProviderCache {
    /// Create the cache and schedule its first refresh.
    pub fn start(directory: Arc<dyn DirectoryClient>, schedule: RefreshSchedule) -> Self {
        let state = Arc::new(ProviderState {
            directory,
            linked: DashMap::new(),
            identity_providers: ArcSwap::from_pointee(HashMap::new()),
        });
        let refresher = spawn_refresher(state.clone(), schedule);
        Self { state, refresher }
    }

    /// Entity ids of the services linked to `idp_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Fill`] if the key was not cached and the directory
    /// call failed. Nothing is stored in that case.
    pub async fn service_ids(&self, idp_id: &str) -> Result<Vec<String>, CacheError> {
        if let Some(ids) = self.state.linked.get(idp_id) {
            return Ok(ids.value().clone());
        }

        debug!(idp_id, "linked services cache miss");
        let fetched = self
            .state
            .directory
            .get_linked_service_ids(idp_id)
            .await
            .map_err(|source| CacheError::Fill {
                key: idp_id.to_owned(),
                source,
            })?;

        let stored = self
            .state
            .linked
            .entry(idp_id.to_owned())
            .or_insert(fetched)
            .value()
            .clone();
        Ok(stored)
    }

    /// Look up an identity provider.
    ///
    /// Served from the last snapshot; an id missing from it (registered since
    /// the last cycle) is fetched from the directory and added.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Fill`] if the fallback directory call fails.
    pub async fn identity_provider(
        &self,
        idp_id: &str,
    ) -> Result<Option<IdentityProvider>, CacheError> {
        if let Some(idp) = self.state.identity_providers.load().get(idp_id) {
            return Ok(Some(idp.clone()));
        }

        let fetched = self
            .state
            .directory
            .get_identity_provider(idp_id)
            .await
            .map_err(|source| CacheError::Fill {
                key: idp_id.to_owned(),
                source,
            })?;

        if let Some(idp) = &fetched {
            debug!(idp_id, "identity provider added outside refresh cycle");
            self.state.identity_providers.rcu(|current| {
                let mut next = HashMap::clone(current);
                next.insert(idp.id.clone(), idp.clone());
                next
            });
        }
        Ok(fetched)
    }

    /// Number of identity providers whose linked services are tracked.
    pub fn tracked_count(&self) -> usize {
        self.state.linked.len()
    }

    /// Number of identity providers in the current snapshot.
    pub fn identity_provider_count(&self) -> usize {
        self.state.identity_providers.load().len()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockDirectoryClient;
    use common::ServiceError;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    const IDP_ID: &str = "http://mock-idp";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// A schedule whose cycles never fire within a test.
    fn dormant() -> RefreshSchedule {
        RefreshSchedule::new(Duration::from_secs(3_600), Duration::from_secs(3_600))
    }

    fn with_no_idps(directory: &mut MockDirectoryClient) {
        directory
            .expect_get_all_identity_providers()
            .returning(|| Ok(Vec::new()));
    }

    #[tokio::test]
    async fn miss_then_hit_calls_directory_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut directory = MockDirectoryClient::new();
        directory.expect_get_linked_service_ids().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec!["sp1".to_owned()])
            } else {
                Err(ServiceError::Unavailable("second call".into()))
            }
        });

        let cache = ProviderCache::start(Arc::new(directory), dormant());
        assert_eq!(cache.service_ids(IDP_ID).await.unwrap(), vec!["sp1"]);
        assert_eq!(cache.service_ids(IDP_ID).await.unwrap(), vec!["sp1"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn empty_answer_is_remembered() {
        let mut directory = MockDirectoryClient::new();
        directory
            .expect_get_linked_service_ids()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let cache = ProviderCache::start(Arc::new(directory), dormant());
        assert!(cache.service_ids("unknown-idp").await.unwrap().is_empty());
        assert!(cache.service_ids("unknown-idp").await.unwrap().is_empty());
        assert_eq!(cache.tracked_count(), 1);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn fill_failure_propagates_and_stores_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut directory = MockDirectoryClient::new();
        directory.expect_get_linked_service_ids().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ServiceError::Unavailable("timeout".into()))
            } else {
                Ok(vec!["sp1".to_owned()])
            }
        });

        let cache = ProviderCache::start(Arc::new(directory), dormant());
        let err = cache.service_ids(IDP_ID).await.unwrap_err();
        assert!(matches!(err, CacheError::Fill { ref key, .. } if key == IDP_ID));
        assert_eq!(cache.tracked_count(), 0);

        assert_eq!(cache.service_ids(IDP_ID).await.unwrap(), vec!["sp1"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_updates_only_keys_already_seen() {
        let linked: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec!["sp1".to_owned()]));
        let requested: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let mut directory = MockDirectoryClient::new();
        with_no_idps(&mut directory);
        let (source, log) = (linked.clone(), requested.clone());
        directory
            .expect_get_linked_service_ids()
            .returning(move |idp_id| {
                log.lock().unwrap().push(idp_id.to_owned());
                Ok(source.lock().unwrap().clone())
            });

        let cache = ProviderCache::start(
            Arc::new(directory),
            RefreshSchedule::new(ms(0), ms(1_000)),
        );

        assert_eq!(cache.service_ids(IDP_ID).await.unwrap().len(), 1);

        linked.lock().unwrap().push("sp2".to_owned());
        assert_eq!(cache.service_ids(IDP_ID).await.unwrap().len(), 1);

        tokio::time::sleep(ms(1_250)).await;
        assert_eq!(cache.service_ids(IDP_ID).await.unwrap().len(), 2);

        let requested = requested.lock().unwrap().clone();
        assert!(requested.iter().all(|id| id == IDP_ID), "{requested:?}");

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn failed_refresh_leaves_entries_untouched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut directory = MockDirectoryClient::new();
        with_no_idps(&mut directory);
        directory
            .expect_get_linked_service_ids()
            .returning(move |idp_id| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                match (n, idp_id) {
                    (0 | 1, _) => Ok(vec![format!("{idp_id}-sp")]),
                    (_, "idp-b") => Err(ServiceError::Unavailable("flaky".into())),
                    _ => Ok(vec!["changed".to_owned()]),
                }
            });

        let cache = ProviderCache::start(Arc::new(directory), dormant());
        cache.service_ids("idp-a").await.unwrap();
        cache.service_ids("idp-b").await.unwrap();

        assert!(!cache.evict_synchronously().await);
        assert_eq!(cache.service_ids("idp-a").await.unwrap(), vec!["idp-a-sp"]);
        assert_eq!(cache.service_ids("idp-b").await.unwrap(), vec!["idp-b-sp"]);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_misses_agree_on_one_value() {
        let mut directory = MockDirectoryClient::new();
        directory
            .expect_get_linked_service_ids()
            .returning(|_| Ok(vec!["sp1".to_owned()]));

        let cache = ProviderCache::start(Arc::new(directory), dormant());
        let (a, b) = tokio::join!(cache.service_ids(IDP_ID), cache.service_ids(IDP_ID));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(cache.tracked_count(), 1);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn identity_providers_come_from_snapshot_with_fallback() {
        let mut directory = MockDirectoryClient::new();
        directory
            .expect_get_all_identity_providers()
            .returning(|| Ok(vec![IdentityProvider::new("idp-1")]));
        directory
            .expect_get_identity_provider()
            .times(2)
            .returning(|idp_id| match idp_id {
                "idp-new" => Ok(Some(IdentityProvider::new("idp-new"))),
                _ => Ok(None),
            });

        let cache = ProviderCache::start(Arc::new(directory), dormant());
        assert!(cache.evict_synchronously().await);
        assert_eq!(cache.identity_provider_count(), 1);

        // Served from the snapshot: no directory call.
        assert!(cache.identity_provider("idp-1").await.unwrap().is_some());

        // Miss, fetched and added.
        assert!(cache.identity_provider("idp-new").await.unwrap().is_some());
        assert_eq!(cache.identity_provider_count(), 2);
        assert!(cache.identity_provider("idp-new").await.unwrap().is_some());

        // Unknown to the directory as well.
        assert!(cache.identity_provider("idp-gone").await.unwrap().is_none());

        cache.shutdown().await;
    }
}
