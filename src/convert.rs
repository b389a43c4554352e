//! Record conversion
//!
//! Maps a [`RegistryRecord`] onto the flat shape the pool stores. Conversion
//! is driven entirely by the [`Ruleset`]: every field it names produces a key
//! (defaulted when the record lacks the field), decorated fields produce
//! `<key>_ontology` / `<key>_unit` siblings, and repeatable fields hold arrays.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::registry::{CharacteristicEntry, RegistryRecord};
use crate::ruleset::{Ruleset, Rulesets};
use crate::types::Category;

/// Flat record as accepted by the pool
pub type PoolRecord = Map<String, Value>;

const CHILD_OF: &str = "child of";
const DERIVED_FROM: &str = "derived from";

/// Pool key for a ruleset field name (`Birth weight` → `birth_weight`)
pub fn underscored(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Whether `value` follows the registry accession convention
/// (`SAM` + `E`/`N`/`D` + optional `A`/`G` + digits)
pub fn is_registry_accession(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("SAM") else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(&['E', 'N', 'D'][..]) else {
        return false;
    };
    let digits = rest.strip_prefix(&['A', 'G'][..]).unwrap_or(rest);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Convert every field of `ruleset` found (or not) in `record`
pub fn parse(record: &RegistryRecord, ruleset: &Ruleset) -> Map<String, Value> {
    let mut fields = Map::new();

    for name in ruleset.fields() {
        let key = underscored(name);
        let multiple = ruleset.allows_multiple(name);
        let entries = record.characteristic(name).unwrap_or_default();

        fields.insert(key.clone(), project(entries, multiple, |e| e.text.clone()));

        if ruleset.has_ontology(name) {
            let ontology = project(entries, multiple, |e| {
                e.ontology_terms.first().cloned().unwrap_or_default()
            });
            fields.insert(format!("{}_ontology", key), ontology);
        }

        if ruleset.has_units(name) {
            let unit = project(entries, multiple, |e| e.unit.clone().unwrap_or_default());
            fields.insert(format!("{}_unit", key), unit);
        }
    }

    fields
}

/// Single value (first entry) or the whole ordered list
fn project<F>(entries: &[CharacteristicEntry], multiple: bool, pick: F) -> Value
where
    F: Fn(&CharacteristicEntry) -> String,
{
    if multiple {
        Value::Array(entries.iter().map(|e| Value::String(pick(e))).collect())
    } else {
        Value::String(entries.first().map(pick).unwrap_or_default())
    }
}

/// Convert a registry record into the pool record for its category
pub fn convert_record(record: &RegistryRecord, etag: &str, rulesets: &Rulesets) -> Result<PoolRecord> {
    let mut base = parse(record, &rulesets.standard);
    base.insert("data_source_id".into(), Value::from(record.accession.as_str()));
    base.insert("etag".into(), Value::from(etag));

    let category = Category::of_record(record)?;
    let mut fields = parse(record, rulesets.for_category(category));

    match category {
        Category::Organism => {
            fields.insert("child_of".into(), Value::from(child_of(record)));
            base.insert("organisms".into(), Value::Array(vec![Value::Object(fields)]));
        }
        Category::Specimen => {
            let parent = derived_from(record).unwrap_or_default();
            fields.insert("derived_from".into(), Value::from(parent));
            base.insert("specimens".into(), Value::Array(vec![Value::Object(fields)]));
        }
    }

    Ok(base)
}

/// Parent accessions from `child of` relationships
pub fn child_of(record: &RegistryRecord) -> Vec<String> {
    related_targets(record, CHILD_OF).map(str::to_string).collect()
}

/// Last valid target of the `derived from` relationships
pub fn derived_from(record: &RegistryRecord) -> Option<String> {
    related_targets(record, DERIVED_FROM).last().map(str::to_string)
}

fn related_targets<'a>(record: &'a RegistryRecord, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    record
        .relationships
        .iter()
        .filter(move |rel| rel.kind.eq_ignore_ascii_case(kind))
        .filter_map(move |rel| {
            if is_registry_accession(&rel.target) {
                Some(rel.target.as_str())
            } else {
                warn!(
                    accession = %record.accession,
                    kind = %kind,
                    target = %rel.target,
                    "Dropping relationship with malformed target"
                );
                None
            }
        })
}
