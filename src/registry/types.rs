//! Types for the registry API

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL for the registry HTTP API
    pub base_url: String,
    /// Project filter value (`attr:project:<project>`)
    pub project: String,
    /// Accessions requested per page
    pub page_size: u32,
    /// Maximum simultaneous requests toward the registry
    pub max_connections: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.ebi.ac.uk/biosamples".to_string(),
            project: "IMAGE".to_string(),
            page_size: 500,
            max_connections: 10,
            timeout_secs: 30,
        }
    }
}

/// One value of a characteristic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicEntry {
    /// Free-text value
    pub text: String,
    /// Ontology term IRIs attached to the value
    #[serde(rename = "ontologyTerms", default, skip_serializing_if = "Vec::is_empty")]
    pub ontology_terms: Vec<String>,
    /// Measurement unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl CharacteristicEntry {
    /// Plain text value without decorations
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Directed relationship between two samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEntry {
    /// Relationship type, e.g. "child of" or "derived from"
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub target: String,
}

/// Sample record as published by the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Registry accession (e.g. `SAMEA7044752`)
    pub accession: String,
    /// Field name → ordered values
    #[serde(default)]
    pub characteristics: BTreeMap<String, Vec<CharacteristicEntry>>,
    #[serde(default)]
    pub relationships: Vec<RelationshipEntry>,
}

impl RegistryRecord {
    /// Resolve a characteristic by its verbatim name, then its lowercase form
    pub fn characteristic(&self, name: &str) -> Option<&[CharacteristicEntry]> {
        self.characteristics
            .get(name)
            .or_else(|| self.characteristics.get(&name.to_lowercase()))
            .map(Vec::as_slice)
    }

    /// First text value of the `material` characteristic, whatever its casing
    pub fn material(&self) -> Option<&str> {
        self.characteristics
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("material"))
            .and_then(|(_, entries)| entries.first())
            .map(|entry| entry.text.as_str())
    }
}

/// Pagination block of a registry listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub number: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedAccessions {
    #[serde(default)]
    pub accessions: Vec<String>,
}

/// Response from the accessions listing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AccessionsPage {
    #[serde(rename = "_embedded", default)]
    pub embedded: EmbeddedAccessions,
    pub page: PageInfo,
}

impl AccessionsPage {
    pub fn into_accessions(self) -> Vec<String> {
        self.embedded.accessions
    }
}
