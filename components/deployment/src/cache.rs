// components/deployment/src/cache.rs
//! Results of completed steps, keyed by step kind
//!
//! Built fresh for every run and passed explicitly to the resolver. Each
//! entry keeps the raw payload that was saved on the item alongside a typed
//! `StepOutput` holding the values later steps read.

use crate::error::{ResolveError, Result};
use serde_json::Value;
use solution_model::StepKind;
use std::collections::BTreeMap;

/// Credentials a device uses to provision itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredentials {
    pub scope_id: String,
    pub device_id: String,
    pub primary_key: String,
}

/// What a completed step produced for the steps after it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    ResourceGroup { name: String },
    Application { subdomain: String },
    DeviceTemplate { template_id: String },
    Device { device_id: String },
    Attestation(DeviceCredentials),
    Deployment { name: String },
    Cluster { name: String, uri: String },
    Database { name: String },
    ExportDestination { destination_id: String },
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedStep {
    pub output: StepOutput,
    pub payload: Value,
}

#[derive(Debug, Clone, Default)]
pub struct StepResultCache {
    entries: BTreeMap<StepKind, CachedStep>,
}

impl StepResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: StepKind, step: CachedStep) {
        self.entries.insert(kind, step);
    }

    pub fn get(&self, kind: StepKind) -> Option<&CachedStep> {
        self.entries.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = StepKind> + '_ {
        self.entries.keys().copied()
    }

    fn output(&self, step: StepKind, requires: StepKind) -> Result<&StepOutput> {
        self.entries
            .get(&requires)
            .map(|cached| &cached.output)
            .ok_or(ResolveError::MissingDependency { step, requires })
    }

    pub fn resource_group(&self, step: StepKind) -> Result<&str> {
        match self.output(step, StepKind::ResourceGroup)? {
            StepOutput::ResourceGroup { name } => Ok(name.as_str()),
            _ => Err(mismatch(step, StepKind::ResourceGroup)),
        }
    }

    pub fn subdomain(&self, step: StepKind) -> Result<&str> {
        match self.output(step, StepKind::CreateApp)? {
            StepOutput::Application { subdomain } => Ok(subdomain.as_str()),
            _ => Err(mismatch(step, StepKind::CreateApp)),
        }
    }

    /// Device id registered by `from`
    pub fn device_id(&self, step: StepKind, from: StepKind) -> Result<&str> {
        match self.output(step, from)? {
            StepOutput::Device { device_id } => Ok(device_id.as_str()),
            _ => Err(mismatch(step, from)),
        }
    }

    /// Credentials fetched by the attestation step `from`
    pub fn credentials(&self, step: StepKind, from: StepKind) -> Result<&DeviceCredentials> {
        match self.output(step, from)? {
            StepOutput::Attestation(credentials) => Ok(credentials),
            _ => Err(mismatch(step, from)),
        }
    }

    /// Cluster name and query URI
    pub fn cluster(&self, step: StepKind) -> Result<(&str, &str)> {
        match self.output(step, StepKind::CreateAnalyticsCluster)? {
            StepOutput::Cluster { name, uri } => Ok((name.as_str(), uri.as_str())),
            _ => Err(mismatch(step, StepKind::CreateAnalyticsCluster)),
        }
    }

    /// Database name, when a database step has run
    pub fn database(&self) -> Option<&str> {
        match self.entries.get(&StepKind::CreateAnalyticsDatabase)?.output {
            StepOutput::Database { ref name } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn destination_id(&self, step: StepKind) -> Result<&str> {
        match self.output(step, StepKind::ConfigureExportDestination)? {
            StepOutput::ExportDestination { destination_id } => Ok(destination_id.as_str()),
            _ => Err(mismatch(step, StepKind::ConfigureExportDestination)),
        }
    }
}

fn mismatch(step: StepKind, requires: StepKind) -> ResolveError {
    ResolveError::MissingDependency { step, requires }
}
