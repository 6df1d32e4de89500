//! Value types served by the caches and exchanged with external collaborators.
//!
//! All types serialise as camelCase JSON so collaborator fixtures and any
//! future HTTP layer share one representation.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identifier mapping
// ---------------------------------------------------------------------------

/// An immutable `(key, value)` pair mapping a local identifier to the
/// identifier an external system uses for the same entity
/// (e.g. institution id → CRM account id).
///
/// Equality and hashing cover both fields, so an entry is also used as the
/// composite `(institution id, service entity id)` key of the license table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingEntry {
    pub key: String,
    pub value: String,
}

impl MappingEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// License
// ---------------------------------------------------------------------------

/// A license registered in the CRM for one institution and one service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub institution_name: Option<String>,
}

impl License {
    pub fn new(
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        license_number: impl Into<String>,
        institution_name: impl Into<String>,
    ) -> Self {
        Self {
            start_date,
            end_date,
            license_number: Some(license_number.into()),
            institution_name: Some(institution_name.into()),
        }
    }

    /// Whether the license is valid right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whether the license is valid at `at`.
    ///
    /// A license without an end date never expires. Otherwise `at` must lie in
    /// `[start, end)`; a missing start date means "since forever".
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        match self.end_date {
            None => true,
            Some(end) => self.start_date.map_or(true, |start| start <= at) && at < end,
        }
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A CRM catalog entry describing one service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Identifier of the article in the CRM.
    pub crm_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sp_entity_id: Option<String>,
    #[serde(default)]
    pub service_description_nl: Option<String>,
    #[serde(default)]
    pub institution_description_nl: Option<String>,
    #[serde(default)]
    pub detail_logo: Option<String>,
    #[serde(default)]
    pub apple_app_store_url: Option<String>,
    #[serde(default)]
    pub android_play_store_url: Option<String>,
}

impl Article {
    pub fn new(crm_id: impl Into<String>) -> Self {
        Self {
            crm_id: crm_id.into(),
            ..Self::default()
        }
    }

    /// Produce an independent copy to hand out to callers.
    ///
    /// Cached articles are shared between readers; anything leaving the cache
    /// goes through this so a caller mutating its copy cannot touch the
    /// snapshot.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// Service / identity provider
// ---------------------------------------------------------------------------

/// A service (provider) as presented in the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    /// Whether the service is connected to the viewing IdP in the directory.
    #[serde(default)]
    pub connected: bool,
    /// Whether the service is linked to an entry in the CRM.
    #[serde(default)]
    pub has_crm_link: bool,
    #[serde(default)]
    pub crm_url: Option<String>,
    /// Entity id of the service in the directory. Absent for CRM-only services.
    #[serde(default)]
    pub sp_entity_id: Option<String>,
}

impl Service {
    /// A service known only by its entity id.
    pub fn with_sp_entity_id(sp_entity_id: impl Into<String>) -> Self {
        Self {
            sp_entity_id: Some(sp_entity_id.into()),
            ..Self::default()
        }
    }
}

/// An identity provider registered in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProvider {
    pub id: String,
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl IdentityProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            institution_id: None,
            name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// The languages the service catalog is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Nl,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Nl];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Nl => "nl",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when parsing a language code other than `en` or `nl`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language '{0}': only 'en' and 'nl' are supported")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("en") {
            Ok(Language::En)
        } else if s.eq_ignore_ascii_case("nl") {
            Ok(Language::Nl)
        } else {
            Err(UnsupportedLanguage(s.to_owned()))
        }
    }
}
