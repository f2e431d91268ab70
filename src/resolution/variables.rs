// src/resolution/variables.rs

//! Solver variables

use std::fmt;

use crate::entity::BundleEntity;

/// A rule a variable imposes on the solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// The variable must be selected
    Mandatory,
    /// If the variable is selected, at least one of these must be too
    Dependency(Vec<String>),
    /// At most `n` of these may be selected, whether or not the variable is
    AtMost(usize, Vec<String>),
}

impl Constraint {
    /// Human-readable form used in unsatisfiability explanations
    pub fn describe(&self, subject: &str) -> String {
        match self {
            Constraint::Mandatory => format!("{subject} is mandatory"),
            Constraint::Dependency(ids) if ids.is_empty() => {
                format!("{subject} has a dependency without candidates")
            }
            Constraint::Dependency(ids) => {
                format!("{subject} requires at least one of {}", ids.join(", "))
            }
            Constraint::AtMost(n, ids) => {
                format!("{subject} permits at most {n} of {}", ids.join(", "))
            }
        }
    }
}

/// One boolean decision handed to the solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    /// An install request: mandatory, satisfied by any of its candidate bundles
    RequiredPackage {
        id: String,
        package_name: String,
        /// Candidates in preference order
        bundles: Vec<BundleEntity>,
    },
    /// A bundle that may be installed
    Bundle {
        bundle: BundleEntity,
        /// Every bundle that can satisfy one of this bundle's requirements
        dependencies: Vec<BundleEntity>,
        /// One group of candidate ids per requirement, in preference order
        dependency_groups: Vec<Vec<String>>,
    },
    /// At most one bundle per package or per provided API
    Uniqueness { id: String, bundle_ids: Vec<String> },
}

impl Variable {
    /// Variable for an install request of `package_name`
    pub fn required_package(package_name: &str, bundles: Vec<BundleEntity>) -> Self {
        Variable::RequiredPackage {
            id: format!("required package {package_name}"),
            package_name: package_name.to_string(),
            bundles,
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Variable::RequiredPackage { id, .. } | Variable::Uniqueness { id, .. } => id,
            Variable::Bundle { bundle, .. } => bundle.id(),
        }
    }

    pub fn constraints(&self) -> Vec<Constraint> {
        match self {
            Variable::RequiredPackage { bundles, .. } => vec![
                Constraint::Mandatory,
                Constraint::Dependency(bundles.iter().map(|b| b.id.clone()).collect()),
            ],
            Variable::Bundle {
                dependency_groups, ..
            } => dependency_groups
                .iter()
                .cloned()
                .map(Constraint::Dependency)
                .collect(),
            Variable::Uniqueness { bundle_ids, .. } => {
                vec![Constraint::AtMost(1, bundle_ids.clone())]
            }
        }
    }

    /// The bundle, for bundle variables
    pub fn bundle(&self) -> Option<&BundleEntity> {
        match self {
            Variable::Bundle { bundle, .. } => Some(bundle),
            _ => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}
