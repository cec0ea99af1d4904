//! The parameter state shared by every sampler in a composition.
//!
//! A [`ParameterState`] is an ordered collection of named sites, each holding
//! a numeric vector, the transform describing its natural domain, and a flag
//! recording whether the stored value currently lives in unconstrained
//! ("linked") space. The state also caches the unnormalized log-density of
//! the current values; any mutation invalidates or recomputes the cache
//! before it can be read again.
//!
//! Samplers take a deep [`ParameterState::snapshot`] before any proposal that
//! might be rejected and call [`ParameterState::restore`] to roll back
//! verbatim.

use crate::error::{Error, Result};
use crate::transforms::Transform;

#[derive(Clone, Debug, PartialEq)]
struct Site {
    name: String,
    value: Vec<f64>,
    transform: Transform,
    linked: bool,
}

/// An immutable set of site names a sampler is responsible for.
///
/// The empty set is the sentinel for "all variables". Flattened positions and
/// gradients over a group always follow the state's site insertion order,
/// regardless of the order names were listed in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableGroup {
    names: Vec<String>,
}

impl VariableGroup {
    /// The sentinel group covering every site in the state.
    pub fn all() -> Self {
        Self { names: Vec::new() }
    }

    /// A group over the named sites.
    pub fn of(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.is_all() || self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns a witness variable if the two groups share any site.
    pub fn overlap_witness(&self, other: &VariableGroup) -> Option<String> {
        if self.is_all() || other.is_all() {
            return Some("<all variables>".to_string());
        }
        self.names
            .iter()
            .find(|n| other.contains(n))
            .cloned()
    }
}

/// Ordered mapping from variable name to value, with a cached log-density.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterState {
    sites: Vec<Site>,
    log_prob: Option<f64>,
}

impl Default for ParameterState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterState {
    pub fn new() -> Self {
        Self {
            sites: Vec::new(),
            log_prob: None,
        }
    }

    /// Adds an unconstrained site. Site order is insertion order and is part
    /// of the state's contract.
    pub fn insert(&mut self, name: impl Into<String>, value: Vec<f64>) -> Result<()> {
        self.insert_transformed(name, value, Transform::Identity)
    }

    /// Adds a site whose natural domain is described by `transform`. The
    /// value is given in natural space.
    pub fn insert_transformed(
        &mut self,
        name: impl Into<String>,
        value: Vec<f64>,
        transform: Transform,
    ) -> Result<()> {
        let name = name.into();
        if self.sites.iter().any(|s| s.name == name) {
            return Err(Error::DuplicateVariable(name));
        }
        self.sites.push(Site {
            name,
            value,
            transform,
            linked: false,
        });
        self.log_prob = None;
        Ok(())
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Total number of scalars across all sites.
    pub fn dim(&self) -> usize {
        self.sites.iter().map(|s| s.value.len()).sum()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.iter().map(|s| s.name.as_str())
    }

    /// Raw stored value of a site (unconstrained if the site is linked).
    pub fn value(&self, name: &str) -> Option<&[f64]> {
        self.sites
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value.as_slice())
    }

    /// Value of a site in its natural domain, undoing the transform if the
    /// site is currently linked.
    pub fn natural_value(&self, name: &str) -> Option<Vec<f64>> {
        self.sites.iter().find(|s| s.name == name).map(|s| {
            if s.linked {
                s.value.iter().map(|&z| s.transform.to_natural(z)).collect()
            } else {
                s.value.clone()
            }
        })
    }

    pub fn is_linked(&self, name: &str) -> bool {
        self.sites
            .iter()
            .find(|s| s.name == name)
            .is_some_and(|s| s.linked)
    }

    /// Flattened natural-space values of every site, in insertion order.
    pub fn natural_position(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.dim());
        for s in &self.sites {
            if s.linked {
                out.extend(s.value.iter().map(|&z| s.transform.to_natural(z)));
            } else {
                out.extend_from_slice(&s.value);
            }
        }
        out
    }

    /// Flattened raw values of the group's sites, in insertion order.
    pub fn position(&self, group: &VariableGroup) -> Vec<f64> {
        let mut out = Vec::new();
        for s in self.group_sites(group) {
            out.extend_from_slice(&s.value);
        }
        out
    }

    /// Overwrites the group's raw values from a flattened vector and
    /// invalidates the cached log-density.
    pub fn set_position(&mut self, group: &VariableGroup, position: &[f64]) {
        let mut offset = 0;
        for s in self.sites.iter_mut().filter(|s| group.contains(&s.name)) {
            let len = s.value.len();
            assert!(
                offset + len <= position.len(),
                "position vector too short for variable group"
            );
            s.value.copy_from_slice(&position[offset..offset + len]);
            offset += len;
        }
        assert_eq!(offset, position.len(), "position vector too long for variable group");
        self.log_prob = None;
    }

    /// Number of scalars selected by the group.
    pub fn group_dim(&self, group: &VariableGroup) -> usize {
        self.group_sites(group).map(|s| s.value.len()).sum()
    }

    /// Per-scalar transforms of the group, flattened in insertion order.
    pub fn transforms(&self, group: &VariableGroup) -> Vec<Transform> {
        let mut out = Vec::new();
        for s in self.group_sites(group) {
            out.extend(std::iter::repeat(s.transform).take(s.value.len()));
        }
        out
    }

    /// Indices of the group's scalars within the full flattened vector.
    pub fn flat_indices(&self, group: &VariableGroup) -> Vec<usize> {
        let mut out = Vec::new();
        let mut offset = 0;
        for s in &self.sites {
            if group.contains(&s.name) {
                out.extend(offset..offset + s.value.len());
            }
            offset += s.value.len();
        }
        out
    }

    /// Checks that every name in the group refers to an existing site.
    pub fn resolve(&self, group: &VariableGroup) -> Result<()> {
        for name in group.names() {
            if !self.sites.iter().any(|s| &s.name == name) {
                return Err(Error::UnknownVariable(name.clone()));
            }
        }
        Ok(())
    }

    /// Cached unnormalized log-density, `None` if invalidated.
    pub fn log_prob(&self) -> Option<f64> {
        self.log_prob
    }

    pub fn set_log_prob(&mut self, log_prob: f64) {
        self.log_prob = Some(log_prob);
    }

    pub fn invalidate_log_prob(&mut self) {
        self.log_prob = None;
    }

    /// Sum of per-scalar log-Jacobian terms over the group's linked sites,
    /// evaluated at the currently stored unconstrained coordinates.
    pub fn log_jacobian(&self, group: &VariableGroup) -> f64 {
        self.group_sites(group)
            .filter(|s| s.linked)
            .map(|s| {
                let t = s.transform;
                s.value.iter().map(|&z| t.log_jacobian(z)).sum::<f64>()
            })
            .sum()
    }

    /// Maps every site in the group into unconstrained space and adds the
    /// log-Jacobian to the cached log-density. Already-linked sites are left
    /// untouched, so paired link/unlink calls are idempotent.
    pub fn link(&mut self, group: &VariableGroup) {
        let mut jacobian = 0.0;
        for s in self.sites.iter_mut().filter(|s| group.contains(&s.name)) {
            if s.linked {
                continue;
            }
            let t = s.transform;
            for v in s.value.iter_mut() {
                *v = t.to_unconstrained(*v);
            }
            jacobian += s.value.iter().map(|&z| t.log_jacobian(z)).sum::<f64>();
            s.linked = true;
        }
        if let Some(lp) = self.log_prob.as_mut() {
            *lp += jacobian;
        }
    }

    /// Exact inverse of [`ParameterState::link`]: subtracts the same
    /// log-Jacobian term and restores natural-space values.
    pub fn unlink(&mut self, group: &VariableGroup) {
        let mut jacobian = 0.0;
        for s in self.sites.iter_mut().filter(|s| group.contains(&s.name)) {
            if !s.linked {
                continue;
            }
            let t = s.transform;
            jacobian += s.value.iter().map(|&z| t.log_jacobian(z)).sum::<f64>();
            for v in s.value.iter_mut() {
                *v = t.to_natural(*v);
            }
            s.linked = false;
        }
        if let Some(lp) = self.log_prob.as_mut() {
            *lp -= jacobian;
        }
    }

    /// Deep copy of the full state, including the cached log-density.
    pub fn snapshot(&self) -> ParameterState {
        self.clone()
    }

    /// Restores a snapshot verbatim.
    pub fn restore(&mut self, snapshot: &ParameterState) {
        self.clone_from(snapshot);
    }

    fn group_sites<'a>(&'a self, group: &'a VariableGroup) -> impl Iterator<Item = &'a Site> {
        self.sites.iter().filter(move |s| group.contains(&s.name))
    }
}
