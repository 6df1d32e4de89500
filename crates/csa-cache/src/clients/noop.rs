//! A CRM that knows nothing, for deployments without a licensing backend.

use async_trait::async_trait;
use common::{Article, License, MappingEntry, ServiceError};

use super::CrmClient;

/// [`CrmClient`] returning empty results for every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCrmClient;

#[async_trait]
impl CrmClient for NoopCrmClient {
    async fn list_institution_mappings(&self) -> Result<Vec<MappingEntry>, ServiceError> {
        Ok(Vec::new())
    }

    async fn list_service_mappings(&self) -> Result<Vec<MappingEntry>, ServiceError> {
        Ok(Vec::new())
    }

    async fn get_licenses(
        &self,
        _institution_id: &str,
        _crm_service_id: &str,
    ) -> Result<Vec<License>, ServiceError> {
        Ok(Vec::new())
    }

    async fn get_articles(&self, _sp_entity_ids: &[String]) -> Result<Vec<Article>, ServiceError> {
        Ok(Vec::new())
    }
}
