// src/resolution/solver.rs

//! Constraint solving over resolution variables
//!
//! [`BacktrackingSolver`] selects every mandatory variable, then satisfies
//! dependency constraints depth-first, trying candidates in the order the
//! variable sources listed them. At-most constraints apply globally. The
//! first consistent assignment found is returned, so earlier candidates
//! (higher versions) win.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::variable_sources::VariableSource;
use super::variables::{Constraint, Variable};
use crate::error::{Error, Result};
use crate::source::EntitySource;

/// The variables a solver selected
#[derive(Debug, Clone, Default)]
pub struct Solution {
    selected: Vec<Variable>,
}

impl Solution {
    pub fn new(selected: Vec<Variable>) -> Self {
        Self { selected }
    }

    pub fn selected_variables(&self) -> &[Variable] {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|v| v.identifier() == id)
    }
}

/// Finds an assignment satisfying every variable's constraints
pub trait Solver: Send + Sync {
    fn solve(
        &self,
        entities: &dyn EntitySource,
        variables: &dyn VariableSource,
    ) -> Result<Solution>;
}

/// Depth-first solver with chronological backtracking
#[derive(Debug, Clone, Default)]
pub struct BacktrackingSolver;

impl BacktrackingSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for BacktrackingSolver {
    fn solve(
        &self,
        entities: &dyn EntitySource,
        variables: &dyn VariableSource,
    ) -> Result<Solution> {
        let variables = variables.get_variables(entities)?;
        let problem = Problem::new(&variables)?;

        let mut search = Search::new(&problem);
        let mandatory: Vec<usize> = (0..problem.len())
            .filter(|&i| problem.mandatory[i])
            .collect();
        for &var in &mandatory {
            if !search.select(var) {
                return Err(problem.unsatisfiable(&search.blocked));
            }
        }
        if !search.extend() {
            return Err(problem.unsatisfiable(&search.blocked));
        }

        let selected: HashSet<usize> = search.order.iter().copied().collect();
        debug!(
            variables = variables.len(),
            selected = selected.len(),
            "Resolution solved"
        );
        Ok(Solution::new(
            variables
                .into_iter()
                .enumerate()
                .filter(|(i, _)| selected.contains(i))
                .map(|(_, v)| v)
                .collect(),
        ))
    }
}

/// Variables reduced to indices
struct Problem<'a> {
    variables: &'a [Variable],
    mandatory: Vec<bool>,
    /// Dependency groups per variable; unknown ids are dropped
    dependencies: Vec<Vec<Vec<usize>>>,
    /// (limit, members, owning variable)
    at_most: Vec<(usize, Vec<usize>, usize)>,
    /// At-most constraints each variable participates in
    limits_for: Vec<Vec<usize>>,
}

impl<'a> Problem<'a> {
    fn new(variables: &'a [Variable]) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(variables.len());
        for (i, variable) in variables.iter().enumerate() {
            if index.insert(variable.identifier(), i).is_some() {
                return Err(Error::Resolution(format!(
                    "duplicate identifier \"{}\" in input",
                    variable.identifier()
                )));
            }
        }

        let resolve = |ids: &[String]| -> Vec<usize> {
            ids.iter().filter_map(|id| index.get(id.as_str()).copied()).collect()
        };

        let mut problem = Self {
            variables,
            mandatory: vec![false; variables.len()],
            dependencies: vec![Vec::new(); variables.len()],
            at_most: Vec::new(),
            limits_for: vec![Vec::new(); variables.len()],
        };

        for (i, variable) in variables.iter().enumerate() {
            for constraint in variable.constraints() {
                match constraint {
                    Constraint::Mandatory => problem.mandatory[i] = true,
                    Constraint::Dependency(ids) => problem.dependencies[i].push(resolve(&ids)),
                    Constraint::AtMost(n, ids) => {
                        let members = resolve(&ids);
                        let c = problem.at_most.len();
                        for &m in &members {
                            problem.limits_for[m].push(c);
                        }
                        problem.at_most.push((n, members, i));
                    }
                }
            }
        }
        Ok(problem)
    }

    fn len(&self) -> usize {
        self.variables.len()
    }

    fn name(&self, var: usize) -> &str {
        self.variables[var].identifier()
    }

    fn unsatisfiable(&self, blocked: &Blocked) -> Error {
        let mut reasons = Vec::new();
        for var in 0..self.len() {
            if self.mandatory[var] {
                reasons.push(Constraint::Mandatory.describe(self.name(var)));
            }
        }
        if let Some((var, group)) = blocked.dependency {
            let ids = self.dependencies[var][group]
                .iter()
                .map(|&d| self.name(d).to_string())
                .collect();
            reasons.push(Constraint::Dependency(ids).describe(self.name(var)));
        }
        let mut limits: Vec<&usize> = blocked.limits.iter().collect();
        limits.sort();
        for &c in limits {
            let (n, members, owner) = &self.at_most[c];
            let ids = members.iter().map(|&m| self.name(m).to_string()).collect();
            reasons.push(Constraint::AtMost(*n, ids).describe(self.name(*owner)));
        }
        Error::Resolution(format!("constraints not satisfiable: {}", reasons.join(", ")))
    }
}

/// What stopped the search, for the error message
#[derive(Default)]
struct Blocked {
    dependency: Option<(usize, usize)>,
    limits: HashSet<usize>,
}

struct Search<'p, 'a> {
    problem: &'p Problem<'a>,
    selected: Vec<bool>,
    order: Vec<usize>,
    blocked: Blocked,
}

impl<'p, 'a> Search<'p, 'a> {
    fn new(problem: &'p Problem<'a>) -> Self {
        Self {
            problem,
            selected: vec![false; problem.len()],
            order: Vec::new(),
            blocked: Blocked::default(),
        }
    }

    /// Select `var` unless an at-most constraint forbids it
    fn select(&mut self, var: usize) -> bool {
        if self.selected[var] {
            return true;
        }
        let problem = self.problem;
        for &c in &problem.limits_for[var] {
            let (limit, members, _) = &problem.at_most[c];
            let taken = members.iter().filter(|&&m| self.selected[m]).count();
            if taken >= *limit {
                self.blocked.limits.insert(c);
                return false;
            }
        }
        self.selected[var] = true;
        self.order.push(var);
        true
    }

    fn unselect_to(&mut self, len: usize) {
        while self.order.len() > len {
            if let Some(var) = self.order.pop() {
                self.selected[var] = false;
            }
        }
    }

    /// First dependency group of a selected variable with no selected member
    fn open_group(&self) -> Option<(usize, usize)> {
        self.order.iter().find_map(|&var| {
            self.problem.dependencies[var]
                .iter()
                .position(|group| !group.iter().any(|&d| self.selected[d]))
                .map(|g| (var, g))
        })
    }

    fn extend(&mut self) -> bool {
        let Some((var, group)) = self.open_group() else {
            return true;
        };

        let problem = self.problem;
        let mark = self.order.len();
        for &candidate in &problem.dependencies[var][group] {
            if !self.select(candidate) {
                continue;
            }
            if self.extend() {
                return true;
            }
            self.unselect_to(mark);
        }

        if self.blocked.dependency.is_none() {
            self.blocked.dependency = Some((var, group));
        }
        false
    }
}
