//! Ruleset loading
//!
//! The sample ruleset is a JSON document listing, per rule group, the fields
//! a record may carry and how they are decorated:
//!
//! ```text
//! { "rule_groups": [
//!     { "name": "standard",
//!       "rules": [ { "Name": "Material", "Required": "mandatory",
//!                    "Type": "ontology_id", "Allow Multiple": "no" }, ... ] },
//!     { "name": "organism", ... },
//!     { "name": "specimen from organism", ... } ] }
//! ```
//!
//! Each group becomes a [`Ruleset`]; the three groups the pipeline needs are
//! returned together as [`Rulesets`].

use reqwest::{header, Client};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::types::Category;

/// Published IMAGE sample ruleset
pub const DEFAULT_RULESET_URL: &str =
    "https://raw.githubusercontent.com/cnr-ibba/IMAGE-metadata/master/rulesets/sample_ruleset.json";

const STANDARD_GROUP: &str = "standard";
const ORGANISM_GROUP: &str = "organism";
const SPECIMEN_GROUP: &str = "specimen from organism";

// ============================================================================
// Schema document
// ============================================================================

/// Remote ruleset document
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDocument {
    pub rule_groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// One field rule of a group
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Required")]
    pub required: String,
    #[serde(rename = "Type")]
    pub kind: String,
    /// `Some` whenever the key is present, even with a null value
    #[serde(rename = "Valid units", default, deserialize_with = "present")]
    pub valid_units: Option<serde_json::Value>,
    #[serde(rename = "Allow Multiple")]
    pub allow_multiple: String,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Rule {
    fn has_ontology(&self) -> bool {
        self.kind == "ontology_id"
    }

    fn has_units(&self) -> bool {
        self.valid_units.is_some()
    }

    fn is_repeatable(&self) -> bool {
        matches!(self.allow_multiple.trim(), "yes" | "max 2")
    }
}

// ============================================================================
// Rulesets
// ============================================================================

/// Field layout of one record category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub mandatory: Vec<String>,
    pub recommended: Vec<String>,
    pub optional: Vec<String>,
    pub with_ontology: BTreeSet<String>,
    pub with_units: BTreeSet<String>,
    pub allow_multiple: BTreeSet<String>,
}

impl Ruleset {
    /// Classify the rules of one group
    pub fn from_rules(group: &str, rules: &[Rule]) -> Result<Self> {
        let mut ruleset = Ruleset::default();

        for rule in rules {
            let bucket = match rule.required.trim() {
                "mandatory" => &mut ruleset.mandatory,
                "recommended" => &mut ruleset.recommended,
                "optional" => &mut ruleset.optional,
                other => {
                    debug!(group = %group, field = %rule.name, required = %other, "Skipping rule with unknown requirement level");
                    continue;
                }
            };
            bucket.push(rule.name.clone());

            if rule.has_ontology() {
                ruleset.with_ontology.insert(rule.name.clone());
            }
            if rule.has_units() {
                ruleset.with_units.insert(rule.name.clone());
            }
            if rule.is_repeatable() {
                ruleset.allow_multiple.insert(rule.name.clone());
            }
        }

        ruleset.validate(group)?;
        Ok(ruleset)
    }

    /// Every field name, mandatory first, then recommended, then optional
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.mandatory
            .iter()
            .chain(&self.recommended)
            .chain(&self.optional)
            .map(String::as_str)
    }

    pub fn allows_multiple(&self, field: &str) -> bool {
        self.allow_multiple.contains(field)
    }

    pub fn has_ontology(&self, field: &str) -> bool {
        self.with_ontology.contains(field)
    }

    pub fn has_units(&self, field: &str) -> bool {
        self.with_units.contains(field)
    }

    /// Each field belongs to exactly one bucket, and every decorated field is
    /// one of them.
    pub fn validate(&self, group: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for field in self.fields() {
            if !seen.insert(field) {
                return Err(SyncError::Ruleset(format!(
                    "field {:?} listed twice in group {:?}",
                    field, group
                )));
            }
        }

        let decorated = self
            .with_ontology
            .iter()
            .chain(&self.with_units)
            .chain(&self.allow_multiple);
        for field in decorated {
            if !seen.contains(field.as_str()) {
                return Err(SyncError::Ruleset(format!(
                    "field {:?} in group {:?} has no requirement level",
                    field, group
                )));
            }
        }

        Ok(())
    }
}

/// The three rulesets a conversion needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rulesets {
    pub standard: Ruleset,
    pub organism: Ruleset,
    pub specimen: Ruleset,
}

impl Rulesets {
    /// Build rulesets from a parsed schema document
    ///
    /// Groups other than `standard`, `organism` and `specimen from organism`
    /// are ignored. A missing group is an error.
    pub fn from_document(document: &SchemaDocument) -> Result<Self> {
        let mut standard = None;
        let mut organism = None;
        let mut specimen = None;

        for group in &document.rule_groups {
            let slot = match group.name.as_str() {
                STANDARD_GROUP => &mut standard,
                ORGANISM_GROUP => &mut organism,
                SPECIMEN_GROUP => &mut specimen,
                other => {
                    debug!(group = %other, "Ignoring unknown rule group");
                    continue;
                }
            };
            *slot = Some(Ruleset::from_rules(&group.name, &group.rules)?);
        }

        let missing = |name: &str| SyncError::Ruleset(format!("rule group {:?} not found", name));

        Ok(Self {
            standard: standard.ok_or_else(|| missing(STANDARD_GROUP))?,
            organism: organism.ok_or_else(|| missing(ORGANISM_GROUP))?,
            specimen: specimen.ok_or_else(|| missing(SPECIMEN_GROUP))?,
        })
    }

    /// Category-specific ruleset
    pub fn for_category(&self, category: Category) -> &Ruleset {
        match category {
            Category::Organism => &self.organism,
            Category::Specimen => &self.specimen,
        }
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Fetches the ruleset document once per run
pub struct RulesetLoader {
    client: Client,
    url: String,
}

impl RulesetLoader {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch and classify the ruleset
    pub async fn load(&self) -> Result<Rulesets> {
        debug!(url = %self.url, "GET");

        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Server { status, message });
        }

        let document: SchemaDocument = response.json().await?;
        let rulesets = Rulesets::from_document(&document)?;

        info!(
            standard = rulesets.standard.fields().count(),
            organism = rulesets.organism.fields().count(),
            specimen = rulesets.specimen.fields().count(),
            "Loaded rulesets"
        );

        Ok(rulesets)
    }
}
