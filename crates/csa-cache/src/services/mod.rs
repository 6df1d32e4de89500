//! Bulk snapshot of the service catalog, per language.
//!
//! # Responsibilities
//!
//! - Fetch the complete catalog in one round trip each cycle and publish it
//!   as a new snapshot.
//! - Rebuild the index of services used by each identity provider.
//!
//! # Module invariants
//!
//! - Readers see either the previous or the new catalog, never a mix.
//! - A directory failure while rebuilding the usage index does not hold back
//!   the already fetched catalog.

pub mod cache;

pub use cache::ServicesCache;

use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use common::{Language, Service};
use tracing::{debug, warn};

use crate::clients::{DirectoryClient, ServiceCatalog};

/// Services per language, as published to readers.
pub type CatalogSnapshot = HashMap<Language, Vec<Service>>;

/// Service entity ids used by each identity provider, keyed by IdP id.
pub type UsageSnapshot = HashMap<String, Vec<String>>;

/// Fetch the whole catalog and key it by [`Language`].
///
/// Entries under a language code the dashboard does not support are dropped
/// with a warning.
///
/// # Errors
///
/// Returns an error if the catalog call fails.
pub async fn load_catalog(catalog: &dyn ServiceCatalog) -> Result<CatalogSnapshot> {
    let all = catalog
        .find_all()
        .await
        .context("failed to fetch service catalog")?;

    let mut snapshot = CatalogSnapshot::with_capacity(Language::ALL.len());
    for (code, services) in all {
        match code.parse::<Language>() {
            Ok(lang) => {
                debug!(lang = %lang, count = services.len(), "catalog language loaded");
                snapshot.insert(lang, services);
            }
            Err(e) => warn!(error = %e, "ignoring catalog entries for unsupported language"),
        }
    }
    Ok(snapshot)
}

/// Ask the directory which services every identity provider uses.
///
/// Calls are made one after another with `call_delay` in between so the
/// directory is not flooded.
///
/// # Errors
///
/// Returns an error on the first failing directory call.
pub async fn load_usage(directory: &dyn DirectoryClient, call_delay: Duration) -> Result<UsageSnapshot> {
    let idps = directory
        .get_all_identity_providers()
        .await
        .context("failed to list identity providers")?;

    let mut usage = UsageSnapshot::with_capacity(idps.len());
    for (i, idp) in idps.iter().enumerate() {
        if i > 0 && !call_delay.is_zero() {
            tokio::time::sleep(call_delay).await;
        }
        let linked = directory
            .get_linked_service_ids(&idp.id)
            .await
            .with_context(|| format!("failed to fetch linked services for {}", idp.id))?;
        debug!(idp_id = %idp.id, count = linked.len(), "linked services loaded");
        usage.insert(idp.id.clone(), linked);
    }
    Ok(usage)
}
