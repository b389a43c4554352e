//! Registry (BioSamples) access: accession listing and record retrieval

pub mod client;
pub mod types;

pub use client::RegistryClient;
pub use types::*;
