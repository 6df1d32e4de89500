//! Collaborators backed by JSON files, for development and demo environments.
//!
//! A fixture directory may contain any of the following files; a missing file
//! is treated as empty, a malformed one fails the load.
//!
//! | File                      | Shape                                              |
//! |---------------------------|----------------------------------------------------|
//! | `institutions.json`       | `[{"key": institution id, "value": CRM id}]`       |
//! | `services.json`           | `[{"key": sp entity id, "value": CRM id}]`         |
//! | `licenses.json`           | `[{"institutionId", "crmServiceId", "license"}]`   |
//! | `articles.json`           | `[Article]`, matched on `spEntityId`               |
//! | `identity-providers.json` | `[IdentityProvider]`                               |
//! | `linked-services.json`    | `{idp id: [sp entity id]}`                         |
//! | `catalog.json`            | `{language code: [Service]}`                       |

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{Article, IdentityProvider, License, MappingEntry, Service, ServiceError};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info};

use super::{CrmClient, DirectoryClient, ServiceCatalog};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseFixture {
    institution_id: String,
    crm_service_id: String,
    license: License,
}

/// CRM, directory and catalog served from one fixture directory.
#[derive(Debug, Default)]
pub struct FixtureBackend {
    institutions: Vec<MappingEntry>,
    services: Vec<MappingEntry>,
    licenses: HashMap<(String, String), Vec<License>>,
    articles: Vec<Article>,
    identity_providers: Vec<IdentityProvider>,
    linked_services: HashMap<String, Vec<String>>,
    catalog: HashMap<String, Vec<Service>>,
}

impl FixtureBackend {
    /// Read every fixture file under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be read or parsed.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let mut licenses: HashMap<(String, String), Vec<License>> = HashMap::new();
        for entry in read_fixture::<Vec<LicenseFixture>>(dir, "licenses.json").await? {
            licenses
                .entry((entry.institution_id, entry.crm_service_id))
                .or_default()
                .push(entry.license);
        }

        let backend = Self {
            institutions: read_fixture(dir, "institutions.json").await?,
            services: read_fixture(dir, "services.json").await?,
            licenses,
            articles: read_fixture(dir, "articles.json").await?,
            identity_providers: read_fixture(dir, "identity-providers.json").await?,
            linked_services: read_fixture(dir, "linked-services.json").await?,
            catalog: read_fixture(dir, "catalog.json").await?,
        };

        info!(
            dir = %dir.display(),
            institutions = backend.institutions.len(),
            services = backend.services.len(),
            identity_providers = backend.identity_providers.len(),
            "loaded collaborator fixtures"
        );
        Ok(backend)
    }
}

async fn read_fixture<T: DeserializeOwned + Default>(dir: &Path, file: &str) -> Result<T> {
    let path: PathBuf = dir.join(file);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "fixture file absent; using empty data");
            return Ok(T::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read fixture {}", path.display()))
        }
    };
    serde_json::from_str(&text).with_context(|| format!("failed to parse fixture {}", path.display()))
}

#[async_trait]
impl CrmClient for FixtureBackend {
    async fn list_institution_mappings(&self) -> Result<Vec<MappingEntry>, ServiceError> {
        Ok(self.institutions.clone())
    }

    async fn list_service_mappings(&self) -> Result<Vec<MappingEntry>, ServiceError> {
        Ok(self.services.clone())
    }

    async fn get_licenses(
        &self,
        institution_id: &str,
        crm_service_id: &str,
    ) -> Result<Vec<License>, ServiceError> {
        Ok(self
            .licenses
            .get(&(institution_id.to_owned(), crm_service_id.to_owned()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_articles(&self, sp_entity_ids: &[String]) -> Result<Vec<Article>, ServiceError> {
        Ok(self
            .articles
            .iter()
            .filter(|a| {
                a.sp_entity_id
                    .as_ref()
                    .is_some_and(|id| sp_entity_ids.contains(id))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DirectoryClient for FixtureBackend {
    async fn get_linked_service_ids(&self, idp_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.linked_services.get(idp_id).cloned().unwrap_or_default())
    }

    async fn get_all_identity_providers(&self) -> Result<Vec<IdentityProvider>, ServiceError> {
        Ok(self.identity_providers.clone())
    }

    async fn get_identity_provider(
        &self,
        idp_id: &str,
    ) -> Result<Option<IdentityProvider>, ServiceError> {
        Ok(self
            .identity_providers
            .iter()
            .find(|idp| idp.id == idp_id)
            .cloned())
    }
}

#[async_trait]
impl ServiceCatalog for FixtureBackend {
    async fn find_all(&self) -> Result<HashMap<String, Vec<Service>>, ServiceError> {
        Ok(self.catalog.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixtureDir(PathBuf);

    impl FixtureDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("csa-fixtures-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn write(&self, file: &str, content: &str) {
            std::fs::write(self.0.join(file), content).unwrap();
        }
    }

    impl Drop for FixtureDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[tokio::test]
    async fn empty_directory_loads_empty_backend() {
        let dir = FixtureDir::new();
        let backend = FixtureBackend::load(&dir.0).await.unwrap();
        assert!(backend.list_service_mappings().await.unwrap().is_empty());
        assert!(backend.find_all().await.unwrap().is_empty());
        assert!(backend.get_identity_provider("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_file_fails_the_load() {
        let dir = FixtureDir::new();
        dir.write("services.json", "{not json");
        let err = FixtureBackend::load(&dir.0).await.unwrap_err();
        assert!(format!("{err:#}").contains("services.json"));
    }

    #[tokio::test]
    async fn licenses_are_grouped_by_institution_and_service() {
        let dir = FixtureDir::new();
        dir.write(
            "licenses.json",
            r#"[
                {"institutionId": "inst-1", "crmServiceId": "crm-1", "license": {"licenseNumber": "A"}},
                {"institutionId": "inst-1", "crmServiceId": "crm-1", "license": {"licenseNumber": "B"}},
                {"institutionId": "inst-2", "crmServiceId": "crm-1", "license": {"licenseNumber": "C"}}
            ]"#,
        );
        let backend = FixtureBackend::load(&dir.0).await.unwrap();

        assert_eq!(backend.get_licenses("inst-1", "crm-1").await.unwrap().len(), 2);
        assert_eq!(backend.get_licenses("inst-2", "crm-1").await.unwrap().len(), 1);
        assert!(backend.get_licenses("inst-2", "crm-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn articles_match_on_entity_id() {
        let dir = FixtureDir::new();
        dir.write(
            "articles.json",
            r#"[{"crmId": "a1", "spEntityId": "https://sp1"}, {"crmId": "a2", "spEntityId": "https://sp2"}]"#,
        );
        let backend = FixtureBackend::load(&dir.0).await.unwrap();

        let found = backend.get_articles(&["https://sp2".to_owned()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].crm_id, "a2");
    }

    #[tokio::test]
    async fn directory_and_catalog_fixtures() {
        let dir = FixtureDir::new();
        dir.write("identity-providers.json", r#"[{"id": "idp-1", "name": "Univ"}]"#);
        dir.write("linked-services.json", r#"{"idp-1": ["sp-1", "sp-2"]}"#);
        dir.write("catalog.json", r#"{"en": [{"id": 1}], "nl": [{"id": 1}, {"id": 2}]}"#);
        let backend = FixtureBackend::load(&dir.0).await.unwrap();

        assert_eq!(backend.get_linked_service_ids("idp-1").await.unwrap(), vec!["sp-1", "sp-2"]);
        assert!(backend.get_linked_service_ids("idp-2").await.unwrap().is_empty());
        assert_eq!(
            backend.get_identity_provider("idp-1").await.unwrap().unwrap().name.as_deref(),
            Some("Univ")
        );
        assert_eq!(backend.find_all().await.unwrap()["nl"].len(), 2);
    }

    #[tokio::test]
    async fn license_dates_are_parsed() {
        use chrono::{TimeZone, Utc};

        let dir = FixtureDir::new();
        dir.write(
            "licenses.json",
            r#"[{"institutionId": "inst-1", "crmServiceId": "crm-1", "license": {
                "startDate": "2024-01-01T00:00:00Z", "endDate": "2025-01-01T00:00:00Z"
            }}]"#,
        );
        let backend = FixtureBackend::load(&dir.0).await.unwrap();

        let license = backend.get_licenses("inst-1", "crm-1").await.unwrap().remove(0);
        let inside = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(license.is_valid_at(inside));
        assert!(!license.is_valid_at(after));
    }

    #[tokio::test]
    async fn bundled_fixtures_load() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures");
        let backend = FixtureBackend::load(&dir).await.unwrap();

        let services = backend.list_service_mappings().await.unwrap();
        assert!(!services.is_empty());
        let institutions = backend.list_institution_mappings().await.unwrap();
        let licensed = backend
            .get_licenses(&institutions[0].key, &services[0].value)
            .await
            .unwrap();
        assert_eq!(licensed.len(), 1);
    }
}
