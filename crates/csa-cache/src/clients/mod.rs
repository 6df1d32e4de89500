//! Interfaces of the external systems the caches shield request handling from.
//!
//! # Responsibilities
//!
//! - [`CrmClient`]: licensing CRM (identifier mappings, licenses, articles).
//! - [`DirectoryClient`]: the service registry (identity providers and the
//!   services linked to them).
//! - [`ServiceCatalog`]: bulk listing of all services per language.
//!
//! Implementations own their own timeouts; the caches never cancel a call.

pub mod fixture;
pub mod noop;

pub use fixture::FixtureBackend;
pub use noop::NoopCrmClient;

use std::collections::HashMap;

use async_trait::async_trait;
use common::{Article, IdentityProvider, License, MappingEntry, Service, ServiceError};

/// Licensing CRM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// All institutions known to the CRM as `(institution id, CRM account id)`.
    async fn list_institution_mappings(&self) -> Result<Vec<MappingEntry>, ServiceError>;

    /// All services known to the CRM as `(sp entity id, CRM article id)`.
    async fn list_service_mappings(&self) -> Result<Vec<MappingEntry>, ServiceError>;

    /// Licenses held by `institution_id` for the service with CRM id `crm_service_id`.
    async fn get_licenses(
        &self,
        institution_id: &str,
        crm_service_id: &str,
    ) -> Result<Vec<License>, ServiceError>;

    /// Articles describing the services with the given entity ids.
    async fn get_articles(&self, sp_entity_ids: &[String]) -> Result<Vec<Article>, ServiceError>;
}

/// Service registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Entity ids of the services linked to the identity provider `idp_id`.
    async fn get_linked_service_ids(&self, idp_id: &str) -> Result<Vec<String>, ServiceError>;

    /// Every identity provider in the registry.
    async fn get_all_identity_providers(&self) -> Result<Vec<IdentityProvider>, ServiceError>;

    /// A single identity provider, or `None` if the registry does not know it.
    async fn get_identity_provider(
        &self,
        idp_id: &str,
    ) -> Result<Option<IdentityProvider>, ServiceError>;
}

/// Bulk service listing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// All services, keyed by language code (`"en"`, `"nl"`).
    async fn find_all(&self) -> Result<HashMap<String, Vec<Service>>, ServiceError>;
}
