//! Defines the purely discrete factors of a hybrid graph.
//!
//! A `DiscreteFactor` is a table over a scope of discrete keys, as described in Koller &
//! Friedman. Its values are non-negative potentials; its error at an assignment is the negative
//! log of the table entry.

use crate::util::{indent, ChimeraError, Result};
use crate::variable::{all_assignments, Assignment, DiscreteKey, DiscreteKeys, KeyFormatter};

use indexmap::IndexSet;
use itertools::{iproduct, Itertools};
use ndarray::{ArrayD, IxDyn};

use std::sync::Arc;

/// Alias f64 ndarray::Array as Table
pub type Table = ArrayD<f64>;


#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteFactor {
    /// The scope of the `DiscreteFactor`. Axis `i` of the table is indexed by `scope[i]`.
    scope: DiscreteKeys,

    /// The values of the `DiscreteFactor` table.
    table: Table,
}

impl DiscreteFactor {

    /// Create a new `DiscreteFactor`
    ///
    /// # Errors
    /// * `ChimeraError::InvalidScope` if the scope is empty or does not match the table shape
    /// * `ChimeraError::DuplicateKey` if a key appears twice in the scope
    /// * `ChimeraError::NonPositiveProbability` if the table has a negative entry
    pub fn new(scope: DiscreteKeys, table: Table) -> Result<Self> {
        if scope.is_empty() {
            return Err(ChimeraError::InvalidScope(String::from("scope may not be empty")));
        } else if scope.len() != table.ndim() {
            return Err(ChimeraError::InvalidScope(
                String::from("cardinality of scope must match number of table dimensions")
            ));
        }

        for (v, t) in scope.iter().map(|k| k.cardinality).zip(table.shape().iter()) {
            if v != *t {
                return Err(ChimeraError::InvalidScope(String::from("dimensions do not match")));
            }
        }

        if let Some(dup) = scope.iter().map(|k| k.key).duplicates().next() {
            return Err(ChimeraError::DuplicateKey(dup));
        }

        // factors may not have negative values
        if table.iter().any(|&v| v < 0.0) {
            return Err(ChimeraError::NonPositiveProbability);
        }

        Ok(DiscreteFactor { scope, table })
    }

    /// Build a factor from values listed in the order of `all_assignments(scope)`.
    pub fn from_values(scope: DiscreteKeys, values: Vec<f64>) -> Result<Self> {
        let shape: Vec<usize> = scope.iter().map(|k| k.cardinality).collect();
        let table = Table::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| ChimeraError::InvalidScope(e.to_string()))?;
        DiscreteFactor::new(scope, table)
    }

    /// The scope of the `DiscreteFactor`
    pub fn discrete_keys(&self) -> &DiscreteKeys {
        &self.scope
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Retrieve the value for a complete assignment over the scope of this `DiscreteFactor`.
    ///
    /// # Args
    /// * `assignment`: a full assignment to the scope. It may be a superset of the scope.
    ///
    /// # Errors
    /// * `ChimeraError::IncompleteAssignment` if a key of the scope is not assigned
    /// * `ChimeraError::InvalidAssignment` if a value is out of range
    pub fn value(&self, assignment: &Assignment) -> Result<f64> {
        let idxs = self.scope.iter()
                             .map(|k| assignment.value_of(k))
                             .collect::<Result<Vec<usize>>>()?;
        Ok(self.table[IxDyn(&idxs)])
    }

    /// The negative log of `value`
    pub fn error(&self, assignment: &Assignment) -> Result<f64> {
        Ok(-self.value(assignment)?.ln())
    }

    /// Product of this `DiscreteFactor` and another.
    ///
    /// Defined in Koller & Friedman Section 4.2.1. Unlike the textbook definition, factors with
    /// disjoint scopes are allowed; their product is the outer product.
    ///
    /// # Returns
    /// A new `DiscreteFactor` of scope union(self.scope(), other.scope())
    ///
    /// # Errors
    /// * `ChimeraError::CardinalityMismatch` if a shared key has different cardinalities
    pub fn product(&self, other: &Self) -> Result<Self> {
        for (a, b) in iproduct!(self.scope.iter(), other.scope.iter()) {
            if a.key == b.key && a.cardinality != b.cardinality {
                return Err(ChimeraError::CardinalityMismatch {
                    key: a.key,
                    left: a.cardinality,
                    right: b.cardinality,
                });
            }
        }

        let new_scope: DiscreteKeys = self.scope.iter()
                                                .chain(other.scope.iter())
                                                .cloned()
                                                .unique()
                                                .collect();

        let values = all_assignments(&new_scope)
            .map(|assn| -> Result<f64> { Ok(self.value(&assn)? * other.value(&assn)?) })
            .collect::<Result<Vec<f64>>>()?;

        DiscreteFactor::from_values(new_scope, values)
    }

    /// Exact structural comparison
    pub fn equals(&self, other: &Self) -> bool {
        self == other
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let names = self.scope.iter()
                              .map(|k| format!("{}:{}", formatter(k.key), k.cardinality))
                              .join(" ");
        let mut out = format!("{}DiscreteFactor [{}]\n", s, names);
        for assn in all_assignments(&self.scope) {
            let idxs: Vec<usize> = assn.iter().map(|(_, v)| v).collect();
            out.push_str(&format!("  {} -> {}\n", assn.format(formatter), self.table[IxDyn(&idxs)]));
        }
        out
    }
}


/// An ordered collection of `DiscreteFactor`s.
#[derive(Clone, Debug, Default)]
pub struct DiscreteFactorGraph {
    factors: Vec<Arc<DiscreteFactor>>,
}

impl DiscreteFactorGraph {

    pub fn new() -> Self {
        DiscreteFactorGraph { factors: Vec::new() }
    }

    pub fn push_back(&mut self, factor: Arc<DiscreteFactor>) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn at(&self, i: usize) -> Option<&Arc<DiscreteFactor>> {
        self.factors.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DiscreteFactor>> {
        self.factors.iter()
    }

    /// All keys of all factors, without duplicates, in the order they are first met
    pub fn discrete_keys(&self) -> DiscreteKeys {
        let keys: IndexSet<DiscreteKey> = self.factors.iter()
                                                      .flat_map(|f| f.discrete_keys().iter().cloned())
                                                      .collect();
        keys.into_iter().collect()
    }

    /// The product of every factor in the graph, `None` for an empty graph
    pub fn product(&self) -> Result<Option<DiscreteFactor>> {
        let mut iter = self.factors.iter();
        let first = match iter.next() {
            Some(f) => f.as_ref().clone(),
            None => return Ok(None),
        };
        iter.try_fold(first, |acc, f| acc.product(f)).map(Some)
    }

    /// Sum of the errors of every factor at `assignment`
    pub fn error(&self, assignment: &Assignment) -> Result<f64> {
        self.factors.iter().map(|f| f.error(assignment)).sum()
    }

    /// Exact comparison, factor by factor
    pub fn equals(&self, other: &Self) -> bool {
        self.factors.len() == other.factors.len()
            && self.factors.iter().zip(other.factors.iter()).all(|(a, b)| a.equals(b))
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let mut out = format!("{}\nsize: {}\n", s, self.factors.len());
        for (i, f) in self.factors.iter().enumerate() {
            out.push_str(&indent(&f.format(&format!("factor {}: ", i), formatter)));
        }
        out
    }
}


// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Key;
    use ndarray::array;

    fn key(c: char, card: usize) -> DiscreteKey {
        DiscreteKey::new(Key::symbol(c, 0), card)
    }

    #[test]
    fn table_factor() {
        let vars = vec![key('a', 2), key('b', 5), key('c', 3)];
        let mut table = Table::ones(vec![2, 5, 3]);
        table[[1, 1, 1].as_ref()] = 5.;

        let f = DiscreteFactor::new(vars.clone(), table).unwrap();

        for (x, y, z) in iproduct!(0..2, 0..5, 0..3) {
            let mut assn = Assignment::new();
            assn.set(vars[0].key, x);
            assn.set(vars[1].key, y);
            assn.set(vars[2].key, z);

            let val = f.value(&assn).unwrap();
            if x == 1 && y == 1 && z == 1 {
                assert_eq!(5., val);
            } else {
                assert_eq!(1., val);
            }
        }
    }

    #[test]
    fn table_factor_errs() {
        // empty scope
        let f = DiscreteFactor::new(vec![], Table::ones(vec![2, 5, 3]));
        match f.expect_err("missing error") {
            ChimeraError::InvalidScope(_) => (),
            _ => panic!("wrong error type")
        };

        // mismatched number of dimensions
        let vars = vec![key('a', 2), key('b', 2)];
        let f = DiscreteFactor::new(vars.clone(), Table::ones(vec![2, 2, 2]));
        match f.expect_err("missing error") {
            ChimeraError::InvalidScope(_) => (),
            _ => panic!("wrong error type")
        };

        // wrong cardinality
        let f = DiscreteFactor::new(vars.clone(), Table::ones(vec![2, 3]));
        match f.expect_err("missing error") {
            ChimeraError::InvalidScope(_) => (),
            _ => panic!("wrong error type")
        };

        // negative entry
        let f = DiscreteFactor::new(vars.clone(), array![[1., -1.], [1., 1.]].into_dyn());
        assert_eq!(f.err(), Some(ChimeraError::NonPositiveProbability));

        // duplicate key
        let a = key('a', 2);
        let f = DiscreteFactor::new(vec![a, a], Table::ones(vec![2, 2]));
        assert_eq!(f.err(), Some(ChimeraError::DuplicateKey(a.key)));
    }

    #[test]
    fn value_incomplete() {
        let a = key('a', 2);
        let b = key('b', 2);
        let f = DiscreteFactor::from_values(vec![a, b], vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        let assn = Assignment::from_pairs(vec![(a.key, 1), (b.key, 0)]);
        assert_eq!(f.value(&assn).unwrap(), 0.3);
        assert!((f.error(&assn).unwrap() + 0.3f64.ln()).abs() < 1e-12);

        let assn = Assignment::from_pairs(vec![(a.key, 1)]);
        assert_eq!(f.value(&assn).err(), Some(ChimeraError::IncompleteAssignment(b.key)));
    }

    #[test]
    /// Example taken from Koller & Friedman Figure 4.3
    fn product() {
        let a = key('a', 3);
        let b = key('b', 2);
        let c = key('c', 2);

        let phi1 = DiscreteFactor::from_values(vec![a, b], vec![0.5, 0.8, 0.1, 0., 0.3, 0.9]).unwrap();
        let phi2 = DiscreteFactor::from_values(vec![b, c], vec![0.5, 0.7, 0.1, 0.2]).unwrap();

        let phi = phi1.product(&phi2).unwrap();
        assert_eq!(phi.discrete_keys(), &vec![a, b, c]);

        let expected = vec![0.25, 0.35, 0.08, 0.16, 0.05, 0.07, 0., 0., 0.15, 0.21, 0.09, 0.18];
        for (assn, val) in all_assignments(&[a, b, c]).zip(expected) {
            assert!((val - phi.value(&assn).unwrap()).abs() < 1e-12);
        }
    }

    #[test]
    fn product_cardinality_mismatch() {
        let phi1 = DiscreteFactor::from_values(vec![key('a', 2)], vec![0.5, 0.5]).unwrap();
        let phi2 = DiscreteFactor::from_values(vec![key('a', 3)], vec![0.2, 0.3, 0.5]).unwrap();

        match phi1.product(&phi2) {
            Err(ChimeraError::CardinalityMismatch { left: 2, right: 3, .. }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn graph_keys_deduplicated() {
        let a = key('a', 2);
        let b = key('b', 2);
        let c = key('c', 3);

        let mut graph = DiscreteFactorGraph::new();
        graph.push_back(Arc::new(DiscreteFactor::from_values(vec![b, a], vec![1.; 4]).unwrap()));
        graph.push_back(Arc::new(DiscreteFactor::from_values(vec![a, c], vec![1.; 6]).unwrap()));

        assert_eq!(graph.discrete_keys(), vec![b, a, c]);
        assert_eq!(graph.len(), 2);

        let joint = graph.product().unwrap().unwrap();
        assert_eq!(joint.discrete_keys(), &vec![b, a, c]);
        assert!(DiscreteFactorGraph::new().product().unwrap().is_none());
    }

    #[test]
    fn graph_error_and_equality() {
        let a = key('a', 2);
        let f = Arc::new(DiscreteFactor::from_values(vec![a], vec![0.25, 0.75]).unwrap());

        let mut g1 = DiscreteFactorGraph::new();
        g1.push_back(f.clone());
        g1.push_back(f.clone());

        let assn = Assignment::from_pairs(vec![(a.key, 1)]);
        assert!((g1.error(&assn).unwrap() + 2. * 0.75f64.ln()).abs() < 1e-12);

        let mut g2 = DiscreteFactorGraph::new();
        g2.push_back(f.clone());
        assert!(!g1.equals(&g2));
        g2.push_back(Arc::new(f.as_ref().clone()));
        assert!(g1.equals(&g2));
    }
}
