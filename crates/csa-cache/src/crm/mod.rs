//! License and article lookups derived from the licensing CRM.
//!
//! # Responsibilities
//!
//! - Fetch the institution and service identifier mappings each cycle.
//! - Query a license for every `(institution, service)` pair of the cross
//!   product, and an article for every service.
//! - Publish both tables, together with the mappings they were computed from,
//!   as one snapshot.
//!
//! # Module invariants
//!
//! - The license and article tables a reader sees always come from the same
//!   cycle.
//! - More results than expected never fail a cycle: the first one is kept and
//!   a warning is logged.
//! - A service without an article is recorded as such. A pair without a
//!   license simply has no entry; the whole cross product is recomputed every
//!   cycle.
//!
//! The license table costs `institutions × services` CRM calls per cycle, made
//! one after another. This is fine for a few hundred of each and a refresh
//! period of minutes.

pub mod cache;

pub use cache::{CrmCache, CrmSnapshot};

use std::collections::HashMap;

use anyhow::{Context, Result};
use common::{Article, License, MappingEntry};
use tracing::{debug, trace, warn};

use crate::clients::CrmClient;

/// License per `(institution id, sp entity id)` pair.
pub type LicenseTable = HashMap<MappingEntry, License>;

/// Article per sp entity id; `None` records that the CRM has none.
pub type ArticleTable = HashMap<String, Option<Article>>;

/// Query the CRM for every `(institution, service)` pair.
///
/// `institutions` maps institution id → CRM account id, `services` maps
/// sp entity id → CRM article id. Licenses are requested by institution id and
/// CRM article id and stored under `(institution id, sp entity id)`.
///
/// # Errors
///
/// Returns an error on the first failing CRM call.
pub async fn load_licenses(
    crm: &dyn CrmClient,
    institutions: &[MappingEntry],
    services: &[MappingEntry],
) -> Result<LicenseTable> {
    let mut table = LicenseTable::new();

    for institution in institutions {
        let institution_id = &institution.key;
        for service in services {
            let sp_entity_id = &service.key;
            let mut licenses = crm
                .get_licenses(institution_id, &service.value)
                .await
                .with_context(|| {
                    format!("failed to fetch licenses for {institution_id} and {sp_entity_id}")
                })?;

            if licenses.is_empty() {
                trace!(%institution_id, %sp_entity_id, "no license found");
                continue;
            }
            if licenses.len() > 1 {
                warn!(
                    %institution_id,
                    %sp_entity_id,
                    count = licenses.len(),
                    "unexpected: more than one license for institution and service; keeping the first"
                );
            }
            let license = licenses.swap_remove(0);
            debug!(%institution_id, %sp_entity_id, "license found");
            table.insert(MappingEntry::new(institution_id.as_str(), sp_entity_id.as_str()), license);
        }
    }
    Ok(table)
}

/// Query the CRM for the article of each service, one service at a time.
///
/// # Errors
///
/// Returns an error on the first failing CRM call.
pub async fn load_articles(crm: &dyn CrmClient, services: &[MappingEntry]) -> Result<ArticleTable> {
    let mut table = ArticleTable::with_capacity(services.len());

    for service in services {
        let sp_entity_id = &service.key;
        let mut articles = crm
            .get_articles(std::slice::from_ref(sp_entity_id))
            .await
            .with_context(|| format!("failed to fetch article for {sp_entity_id}"))?;

        let article = match articles.len() {
            0 => {
                debug!(%sp_entity_id, "no article found");
                None
            }
            1 => articles.pop(),
            n => {
                warn!(
                    %sp_entity_id,
                    count = n,
                    "unexpected: more than one article for service; keeping the first"
                );
                Some(articles.swap_remove(0))
            }
        };
        table.insert(sp_entity_id.clone(), article);
    }
    Ok(table)
}
