//! Shared types for the sync pipeline

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, SyncError};
use crate::registry::RegistryRecord;

/// Mapping from `data_source_id` to etag
pub type EtagIndex = HashMap<String, String>;

/// Record category handled by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Organism,
    Specimen,
}

impl Category {
    /// All categories, in the order indices are loaded
    pub const ALL: [Category; 2] = [Category::Organism, Category::Specimen];

    /// Pool endpoint segment (`organism` / `specimen`)
    pub fn as_path(&self) -> &'static str {
        match self {
            Category::Organism => "organism",
            Category::Specimen => "specimen",
        }
    }

    /// Registry `material` value for this category
    pub fn material(&self) -> &'static str {
        match self {
            Category::Organism => "organism",
            Category::Specimen => "specimen from organism",
        }
    }

    /// Parse a registry `material` value
    pub fn from_material(material: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.material().eq_ignore_ascii_case(material.trim()))
    }

    /// Detect the category of a registry record from its `material` characteristic
    pub fn of_record(record: &RegistryRecord) -> Result<Self> {
        let material = record
            .material()
            .ok_or_else(|| SyncError::MissingCategory {
                accession: record.accession.clone(),
            })?;

        Self::from_material(material).ok_or_else(|| SyncError::UnknownMaterial {
            accession: record.accession.clone(),
            material: material.to_string(),
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

/// Outcome of processing one accession
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ignored,
    Created,
    Updated,
    Error,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Ignored => "ignored",
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of a pool write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Pool accepted the record
    Written,
    /// Pool answered with an unexpected status
    Rejected { status: u16 },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written)
    }
}
