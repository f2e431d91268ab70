// src/resolution/variable_sources.rs

//! Variable sources: turning install requests and catalog content into
//! solver variables
//!
//! Sources nest: the OLM source builds one [`RequiredPackageVariableSource`]
//! per install request, feeds them to a [`BundlesAndDepsVariableSource`] that
//! walks the dependency graph, and wraps that in a
//! [`UniquenessVariableSource`] that adds the global at-most-one rules.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::InstallRequest;
use super::variables::Variable;
use crate::entity::{BundleEntity, Entity, VersionRange};
use crate::error::{Error, Result};
use crate::source::predicates::{and, in_channel, in_semver_range, provides_gvk, with_package_name};
use crate::source::sort::by_channel_and_version;
use crate::source::{EntityList, EntitySource};

type Predicate = Box<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Produces solver variables from an entity source
pub trait VariableSource: Send + Sync {
    fn get_variables(&self, entities: &dyn EntitySource) -> Result<Vec<Variable>>;
}

/// A missing list property means the bundle declares none
fn absent_as_empty<T>(values: Result<&[T]>) -> Result<&[T]> {
    match values {
        Err(Error::PropertyNotFound { .. }) => Ok(&[]),
        other => other,
    }
}

/// One requested package, optionally narrowed by version range and channel
pub struct RequiredPackageVariableSource {
    package_name: String,
    version_range: Option<String>,
    channel: Option<String>,
    predicates: Vec<Predicate>,
}

impl RequiredPackageVariableSource {
    pub fn new(package_name: &str) -> Result<Self> {
        if package_name.is_empty() {
            return Err(Error::Resolution("package name must not be empty".to_string()));
        }
        Ok(Self {
            package_name: package_name.to_string(),
            version_range: None,
            channel: None,
            predicates: vec![Box::new(with_package_name(package_name))],
        })
    }

    /// Only bundles whose version is inside `range`; empty means any
    pub fn in_version_range(mut self, range: &str) -> Result<Self> {
        if range.is_empty() {
            return Ok(self);
        }
        let parsed = VersionRange::parse(range)?;
        self.version_range = Some(range.to_string());
        self.predicates.push(Box::new(in_semver_range(parsed)));
        Ok(self)
    }

    /// Only bundles in `channel`; empty means any
    pub fn in_channel(mut self, channel: &str) -> Self {
        if !channel.is_empty() {
            self.channel = Some(channel.to_string());
            self.predicates.push(Box::new(in_channel(channel)));
        }
        self
    }

    fn not_found(&self) -> Error {
        let package = &self.package_name;
        let message = match (&self.version_range, &self.channel) {
            (Some(version), Some(channel)) => {
                format!("package '{package}' at version '{version}' in channel '{channel}' not found")
            }
            (Some(version), None) => format!("package '{package}' at version '{version}' not found"),
            (None, Some(channel)) => format!("package '{package}' in channel '{channel}' not found"),
            (None, None) => format!("package '{package}' not found"),
        };
        Error::Resolution(message)
    }
}

impl VariableSource for RequiredPackageVariableSource {
    fn get_variables(&self, entities: &dyn EntitySource) -> Result<Vec<Variable>> {
        let mut candidates =
            entities.filter(&|entity| self.predicates.iter().all(|p| p(entity)))?;
        if candidates.is_empty() {
            return Err(self.not_found());
        }
        by_channel_and_version(&mut candidates);

        let bundles = candidates.into_iter().map(BundleEntity::new).collect();
        Ok(vec![Variable::required_package(&self.package_name, bundles)])
    }
}

/// Required packages plus every bundle reachable through dependencies
pub struct BundlesAndDepsVariableSource {
    sources: Vec<Box<dyn VariableSource>>,
}

impl BundlesAndDepsVariableSource {
    pub fn new(sources: Vec<Box<dyn VariableSource>>) -> Self {
        Self { sources }
    }

    /// Candidate groups for each requirement of `bundle`
    fn dependencies(
        bundle: &BundleEntity,
        entities: &dyn EntitySource,
    ) -> Result<(Vec<BundleEntity>, Vec<Vec<String>>)> {
        let mut groups: Vec<EntityList> = Vec::new();

        for required in absent_as_empty(bundle.required_packages())? {
            let predicate = and(vec![
                Box::new(with_package_name(required.package_name.as_str())),
                Box::new(in_semver_range(required.version_range.clone())),
            ]);
            let found = entities.filter(&predicate)?;
            if found.is_empty() {
                return Err(Error::Resolution(format!(
                    "could not find package dependencies for bundle '{}'",
                    bundle.id
                )));
            }
            groups.push(found);
        }

        for required in absent_as_empty(bundle.required_gvks())? {
            let found = entities.filter(&provides_gvk(required.as_gvk()))?;
            if found.is_empty() {
                return Err(Error::Resolution(format!(
                    "could not find gvk dependencies for bundle '{}'",
                    bundle.id
                )));
            }
            groups.push(found);
        }

        let mut seen = HashSet::new();
        let mut dependencies: Vec<Arc<Entity>> = Vec::new();
        let mut dependency_groups = Vec::with_capacity(groups.len());
        for mut group in groups {
            by_channel_and_version(&mut group);
            dependency_groups.push(group.iter().map(|e| e.id.clone()).collect());
            for entity in group {
                if seen.insert(entity.id.clone()) {
                    dependencies.push(entity);
                }
            }
        }
        by_channel_and_version(&mut dependencies);

        Ok((
            dependencies.into_iter().map(BundleEntity::new).collect(),
            dependency_groups,
        ))
    }
}

impl VariableSource for BundlesAndDepsVariableSource {
    fn get_variables(&self, entities: &dyn EntitySource) -> Result<Vec<Variable>> {
        let mut variables = Vec::new();
        for source in &self.sources {
            variables.extend(source.get_variables(entities)?);
        }

        let mut queue: VecDeque<BundleEntity> = variables
            .iter()
            .filter_map(|v| match v {
                Variable::RequiredPackage { bundles, .. } => Some(bundles.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();

        let mut visited = HashSet::new();
        while let Some(head) = queue.pop_front() {
            if !visited.insert(head.id.clone()) {
                continue;
            }

            let (dependencies, dependency_groups) = Self::dependencies(&head, entities)
                .map_err(|e| {
                    Error::Resolution(format!(
                        "could not determine dependencies for entity with id '{}': {e}",
                        head.id
                    ))
                })?;

            queue.extend(dependencies.iter().cloned());
            variables.push(Variable::Bundle {
                bundle: head,
                dependencies,
                dependency_groups,
            });
        }

        debug!(variables = variables.len(), "Built bundle and dependency variables");
        Ok(variables)
    }
}

/// Adds at-most-one rules per package and per provided API kind
pub struct UniquenessVariableSource {
    input: Box<dyn VariableSource>,
}

impl UniquenessVariableSource {
    pub fn new(input: Box<dyn VariableSource>) -> Self {
        Self { input }
    }
}

impl VariableSource for UniquenessVariableSource {
    fn get_variables(&self, entities: &dyn EntitySource) -> Result<Vec<Variable>> {
        let mut variables = self.input.get_variables(entities)?;

        let mut by_package: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut by_gvk: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for variable in &variables {
            let Variable::Bundle {
                bundle,
                dependencies,
                ..
            } = variable
            else {
                continue;
            };
            for entity in std::iter::once(bundle).chain(dependencies) {
                let package = entity.package_name().map_err(|e| {
                    Error::Resolution(format!("error creating global constraints: {e}"))
                })?;
                by_package
                    .entry(package.to_string())
                    .or_default()
                    .insert(entity.id.clone());

                let provided = absent_as_empty(entity.provided_gvks()).map_err(|e| {
                    Error::Resolution(format!("error creating global constraints: {e}"))
                })?;
                for gvk in provided {
                    by_gvk
                        .entry(gvk.to_string())
                        .or_default()
                        .insert(entity.id.clone());
                }
            }
        }

        for (package, ids) in by_package {
            variables.push(Variable::Uniqueness {
                id: format!("{package} package uniqueness"),
                bundle_ids: ids.into_iter().collect(),
            });
        }
        for (gvk, ids) in by_gvk {
            variables.push(Variable::Uniqueness {
                id: format!("{gvk} gvk uniqueness"),
                bundle_ids: ids.into_iter().collect(),
            });
        }
        Ok(variables)
    }
}

/// The complete variable set for a list of install requests
pub struct OlmVariableSource {
    requests: Vec<InstallRequest>,
}

impl OlmVariableSource {
    pub fn new(requests: Vec<InstallRequest>) -> Self {
        Self { requests }
    }
}

impl VariableSource for OlmVariableSource {
    fn get_variables(&self, entities: &dyn EntitySource) -> Result<Vec<Variable>> {
        let mut required: Vec<Box<dyn VariableSource>> = Vec::with_capacity(self.requests.len());
        for request in &self.requests {
            let source = RequiredPackageVariableSource::new(&request.package_name)?
                .in_version_range(request.version.as_deref().unwrap_or_default())?
                .in_channel(request.channel.as_deref().unwrap_or_default());
            required.push(Box::new(source));
        }

        let bundles = BundlesAndDepsVariableSource::new(required);
        UniquenessVariableSource::new(Box::new(bundles)).get_variables(entities)
    }
}
