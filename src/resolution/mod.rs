// src/resolution/mod.rs

//! Operator resolution
//!
//! [`OperatorResolver`] turns the current install requests into solver
//! variables over an [`EntitySource`] and returns the solver's selection.
//! [`bundle_for_package`] picks the chosen bundle for one package out of a
//! [`Solution`].

mod solver;
mod variable_sources;
mod variables;

pub use solver::{BacktrackingSolver, Solution, Solver};
pub use variable_sources::{
    BundlesAndDepsVariableSource, OlmVariableSource, RequiredPackageVariableSource,
    UniquenessVariableSource, VariableSource,
};
pub use variables::{Constraint, Variable};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::BundleEntity;
use crate::error::{Error, Result};
use crate::source::EntitySource;

/// A request to install one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Name of the request itself
    pub name: String,
    pub package_name: String,
    /// Version range the installed bundle must fall in
    #[serde(default)]
    pub version: Option<String>,
    /// Channel the installed bundle must come from
    #[serde(default)]
    pub channel: Option<String>,
}

impl InstallRequest {
    pub fn new(name: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_name: package_name.into(),
            version: None,
            channel: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Source of the install requests to resolve
#[async_trait]
pub trait InstallRequestStore: Send + Sync {
    async fn list(&self) -> Result<Vec<InstallRequest>>;
}

/// Install requests held in memory
#[derive(Debug, Default)]
pub struct InMemoryInstallRequestStore {
    requests: RwLock<Vec<InstallRequest>>,
}

impl InMemoryInstallRequestStore {
    pub fn new(requests: Vec<InstallRequest>) -> Self {
        Self {
            requests: RwLock::new(requests),
        }
    }

    pub fn add(&self, request: InstallRequest) {
        self.requests.write().push(request);
    }

    /// Remove every request with the given name
    pub fn remove(&self, name: &str) {
        self.requests.write().retain(|r| r.name != name);
    }
}

#[async_trait]
impl InstallRequestStore for InMemoryInstallRequestStore {
    async fn list(&self) -> Result<Vec<InstallRequest>> {
        Ok(self.requests.read().clone())
    }
}

/// Resolves install requests against an entity source
pub struct OperatorResolver {
    requests: Arc<dyn InstallRequestStore>,
    entities: Arc<dyn EntitySource>,
    solver: Arc<dyn Solver>,
}

impl OperatorResolver {
    pub fn new(
        requests: Arc<dyn InstallRequestStore>,
        entities: Arc<dyn EntitySource>,
        solver: Arc<dyn Solver>,
    ) -> Self {
        Self {
            requests,
            entities,
            solver,
        }
    }

    /// Resolver using the built-in [`BacktrackingSolver`]
    pub fn with_default_solver(
        requests: Arc<dyn InstallRequestStore>,
        entities: Arc<dyn EntitySource>,
    ) -> Self {
        Self::new(requests, entities, Arc::new(BacktrackingSolver::new()))
    }

    /// Solve for every current install request
    pub async fn resolve(&self) -> Result<Solution> {
        let requests = self.requests.list().await?;
        debug!(requests = requests.len(), "Resolving install requests");

        let variables = OlmVariableSource::new(requests);
        let solution = self.solver.solve(self.entities.as_ref(), &variables)?;

        info!(
            selected = solution.selected_variables().len(),
            "Resolution complete"
        );
        Ok(solution)
    }
}

/// The selected bundle for `package_name`, if any
///
/// Fails when more than one distinct bundle of the package was selected.
pub fn bundle_for_package(solution: &Solution, package_name: &str) -> Result<Option<BundleEntity>> {
    let mut found: Vec<&BundleEntity> = Vec::new();
    for bundle in solution.selected_variables().iter().filter_map(Variable::bundle) {
        if bundle.package_name()? == package_name && !found.iter().any(|b| b.id == bundle.id) {
            found.push(bundle);
        }
    }

    match found.as_slice() {
        [] => Ok(None),
        [bundle] => Ok(Some((*bundle).clone())),
        many => Err(Error::AmbiguousSelection {
            package: package_name.to_string(),
            bundles: many.iter().map(|b| b.id.clone()).collect(),
        }),
    }
}
