//! Defines discrete-continuous (DC) factors: factors whose continuous form is selected by an
//! assignment to a set of discrete keys.
//!
//! Components are stored in a `DecisionTree` over the discrete keys. A `DCGaussianMixtureFactor`
//! holds linear components and is the only kind that can be summed into a `Sum`; a
//! `DCMixtureFactor` holds nonlinear components and must be linearized first.

use super::gaussian::{GaussianFactorGraph, JacobianFactor};
use super::nonlinear::NonlinearFactor;
use crate::tree::DecisionTree;
use crate::util::{indent, ChimeraError, Result};
use crate::variable::{Assignment, DiscreteKey, DiscreteKeys, Key, KeyFormatter, Values};

use indexmap::IndexSet;
use itertools::Itertools;

use std::sync::Arc;

/// A decision tree of Gaussian factor graphs, one per joint discrete assignment. The result of
/// adding mixture factors together.
pub type Sum = DecisionTree<GaussianFactorGraph>;


/// A mixture of linear factors, one per joint assignment of its discrete keys.
#[derive(Clone, Debug)]
pub struct DCGaussianMixtureFactor {
    keys: Vec<Key>,
    discrete_keys: DiscreteKeys,
    factors: DecisionTree<Arc<JacobianFactor>>,
}

impl DCGaussianMixtureFactor {

    /// Create a mixture from its components, listed in the order of
    /// `all_assignments(&discrete_keys)` (the first discrete key varies slowest).
    ///
    /// # Errors
    /// * `ChimeraError::DimensionMismatch` if the number of components is wrong
    /// * `ChimeraError::DuplicateKey` if a discrete key is repeated
    pub fn new(discrete_keys: DiscreteKeys, components: Vec<JacobianFactor>) -> Result<Self> {
        let components = components.into_iter().map(Arc::new).collect();
        let factors = DecisionTree::from_leaves(&discrete_keys, components)?;
        DCGaussianMixtureFactor::from_tree(discrete_keys, factors)
    }

    /// Wrap an existing tree of components.
    ///
    /// # Errors
    /// * `ChimeraError::InvalidScope` if `discrete_keys` are not exactly the keys the tree
    ///   branches on
    pub fn from_tree(discrete_keys: DiscreteKeys, factors: DecisionTree<Arc<JacobianFactor>>) -> Result<Self> {
        let declared: IndexSet<DiscreteKey> = discrete_keys.iter().cloned().collect();
        let branched: IndexSet<DiscreteKey> = factors.discrete_keys().into_iter().collect();
        if declared != branched {
            return Err(ChimeraError::InvalidScope(String::from(
                "declared discrete keys differ from the keys the tree branches on"
            )));
        }

        let keys: IndexSet<Key> = factors.leaves()
                                         .into_iter()
                                         .flat_map(|f| f.keys().iter().cloned())
                                         .collect();
        Ok(DCGaussianMixtureFactor { keys: keys.into_iter().collect(), discrete_keys, factors })
    }

    /// The continuous keys of all components, in the order first met
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn discrete_keys(&self) -> &DiscreteKeys {
        &self.discrete_keys
    }

    pub fn factors(&self) -> &DecisionTree<Arc<JacobianFactor>> {
        &self.factors
    }

    /// The component selected by `assignment`
    pub fn component(&self, assignment: &Assignment) -> Result<&Arc<JacobianFactor>> {
        self.factors.get(assignment)
    }

    /// This mixture as a `Sum`: the same tree, each leaf a graph holding just that component
    pub fn as_sum(&self) -> Sum {
        self.factors.apply(|f| GaussianFactorGraph::from(vec![Arc::clone(f)]))
    }

    /// Add this mixture to `sum`. Every leaf of the result holds the matching leaf of `sum`
    /// followed by the matching component of this mixture.
    pub fn add(&self, sum: &Sum) -> Result<Sum> {
        sum.zip(&self.as_sum(), |acc, mine| acc.concatenated(mine))
    }

    /// The error of the component selected by `assignment`
    pub fn error(&self, values: &Values, assignment: &Assignment) -> Result<f64> {
        self.component(assignment)?.error(values)
    }

    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.discrete_keys == other.discrete_keys
            && self.factors.equals(&other.factors, |a, b| a.equals(b, tol))
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let header = format!("{}DCGaussianMixtureFactor {}", s, describe_keys(&self.keys, &self.discrete_keys, formatter));
        self.factors.format(&header, formatter, |f| f.format("", formatter).trim_end().to_string())
    }
}


/// A mixture of nonlinear factors, one per joint assignment of its discrete keys.
#[derive(Clone, Debug)]
pub struct DCMixtureFactor {
    keys: Vec<Key>,
    discrete_keys: DiscreteKeys,
    factors: DecisionTree<Arc<dyn NonlinearFactor>>,
}

impl DCMixtureFactor {

    /// Create a mixture from its components, listed in the order of
    /// `all_assignments(&discrete_keys)`.
    pub fn new(discrete_keys: DiscreteKeys, components: Vec<Arc<dyn NonlinearFactor>>) -> Result<Self> {
        let factors = DecisionTree::from_leaves(&discrete_keys, components)?;
        let keys: IndexSet<Key> = factors.leaves()
                                         .into_iter()
                                         .flat_map(|f| f.keys().iter().cloned())
                                         .collect();
        Ok(DCMixtureFactor { keys: keys.into_iter().collect(), discrete_keys, factors })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn discrete_keys(&self) -> &DiscreteKeys {
        &self.discrete_keys
    }

    pub fn factors(&self) -> &DecisionTree<Arc<dyn NonlinearFactor>> {
        &self.factors
    }

    /// Linearize every component at `values`. The first component failure is returned as is.
    pub fn linearize(&self, values: &Values) -> Result<DCGaussianMixtureFactor> {
        let linear = self.factors.try_apply(|f| f.linearize(values).map(Arc::new))?;
        DCGaussianMixtureFactor::from_tree(self.discrete_keys.clone(), linear)
    }

    /// The error of the component selected by `assignment`
    pub fn error(&self, values: &Values, assignment: &Assignment) -> Result<f64> {
        self.factors.get(assignment)?.error(values)
    }

    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.discrete_keys == other.discrete_keys
            && self.factors.equals(&other.factors, |a, b| a.equals(&**b, tol))
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let header = format!("{}DCMixtureFactor {}", s, describe_keys(&self.keys, &self.discrete_keys, formatter));
        self.factors.format(&header, formatter, |f| f.format("", formatter).trim_end().to_string())
    }
}

fn describe_keys(keys: &[Key], discrete_keys: &[DiscreteKey], formatter: &KeyFormatter) -> String {
    format!(
        "[{}; {}]",
        keys.iter().map(|&k| formatter(k)).join(" "),
        discrete_keys.iter().map(|k| format!("{}:{}", formatter(k.key), k.cardinality)).join(" ")
    )
}


/// A DC factor, tagged with its kind when it is constructed.
#[derive(Clone, Debug)]
pub enum DCFactor {
    /// Linear components, ready to be summed
    GaussianMixture(Arc<DCGaussianMixtureFactor>),

    /// Nonlinear components, which must be linearized before summation
    Mixture(Arc<DCMixtureFactor>),
}

impl DCFactor {

    /// A short name for the kind of factor, used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            DCFactor::GaussianMixture(_) => "Gaussian mixture",
            DCFactor::Mixture(_) => "nonlinear mixture",
        }
    }

    pub fn keys(&self) -> &[Key] {
        match self {
            DCFactor::GaussianMixture(f) => f.keys(),
            DCFactor::Mixture(f) => f.keys(),
        }
    }

    pub fn discrete_keys(&self) -> &DiscreteKeys {
        match self {
            DCFactor::GaussianMixture(f) => f.discrete_keys(),
            DCFactor::Mixture(f) => f.discrete_keys(),
        }
    }

    pub fn as_gaussian_mixture(&self) -> Option<&Arc<DCGaussianMixtureFactor>> {
        match self {
            DCFactor::GaussianMixture(f) => Some(f),
            DCFactor::Mixture(_) => None,
        }
    }

    /// A DC factor with linear components. Gaussian mixtures are already linear and are shared
    /// unchanged.
    pub fn linearize(&self, values: &Values) -> Result<DCFactor> {
        match self {
            DCFactor::GaussianMixture(_) => Ok(self.clone()),
            DCFactor::Mixture(f) => Ok(DCFactor::GaussianMixture(Arc::new(f.linearize(values)?))),
        }
    }

    pub fn error(&self, values: &Values, assignment: &Assignment) -> Result<f64> {
        match self {
            DCFactor::GaussianMixture(f) => f.error(values, assignment),
            DCFactor::Mixture(f) => f.error(values, assignment),
        }
    }

    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        match (self, other) {
            (DCFactor::GaussianMixture(a), DCFactor::GaussianMixture(b)) => a.equals(b, tol),
            (DCFactor::Mixture(a), DCFactor::Mixture(b)) => a.equals(b, tol),
            _ => false,
        }
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        match self {
            DCFactor::GaussianMixture(f) => f.format(s, formatter),
            DCFactor::Mixture(f) => f.format(s, formatter),
        }
    }
}

impl From<DCGaussianMixtureFactor> for DCFactor {
    fn from(f: DCGaussianMixtureFactor) -> Self {
        DCFactor::GaussianMixture(Arc::new(f))
    }
}

impl From<DCMixtureFactor> for DCFactor {
    fn from(f: DCMixtureFactor) -> Self {
        DCFactor::Mixture(Arc::new(f))
    }
}


/// An ordered collection of DC factors.
#[derive(Clone, Debug, Default)]
pub struct DCFactorGraph {
    factors: Vec<DCFactor>,
}

impl DCFactorGraph {

    pub fn new() -> Self {
        DCFactorGraph { factors: Vec::new() }
    }

    pub fn push_back(&mut self, factor: DCFactor) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn at(&self, i: usize) -> Option<&DCFactor> {
        self.factors.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DCFactor> {
        self.factors.iter()
    }

    /// The discrete keys of every factor, without duplicates, in the order first met
    pub fn discrete_keys(&self) -> DiscreteKeys {
        let keys: IndexSet<DiscreteKey> = self.factors.iter()
                                                      .flat_map(|f| f.discrete_keys().iter().cloned())
                                                      .collect();
        keys.into_iter().collect()
    }

    /// The continuous keys of every factor, in the order first met
    pub fn keys(&self) -> Vec<Key> {
        let keys: IndexSet<Key> = self.factors.iter().flat_map(|f| f.keys().iter().cloned()).collect();
        keys.into_iter().collect()
    }

    /// Linearize every factor in order. The first failure is returned as is.
    pub fn linearize(&self, values: &Values) -> Result<DCFactorGraph> {
        let mut linear = DCFactorGraph::new();
        for factor in self.factors.iter() {
            linear.push_back(factor.linearize(values)?);
        }
        Ok(linear)
    }

    pub fn error(&self, values: &Values, assignment: &Assignment) -> Result<f64> {
        self.factors.iter().map(|f| f.error(values, assignment)).sum()
    }

    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.factors.len() == other.factors.len()
            && self.factors.iter().zip(other.factors.iter()).all(|(a, b)| a.equals(b, tol))
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let mut out = format!("{}\nsize: {}\n", s, self.factors.len());
        for (i, f) in self.factors.iter().enumerate() {
            out.push_str(&indent(&f.format(&format!("factor {}: ", i), formatter)));
        }
        out
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::nonlinear::{PriorFactor, RangeFactor};
    use crate::variable::default_key_formatter;
    use ndarray::array;

    fn x(i: u64) -> Key {
        Key::symbol('x', i)
    }

    fn m(i: u64) -> DiscreteKey {
        DiscreteKey::binary(Key::symbol('m', i))
    }

    fn unary(key: Key, b: f64) -> JacobianFactor {
        JacobianFactor::new(vec![(key, array![[1.0]])], array![b]).expect("factor")
    }

    #[test]
    fn component_selection() {
        let mixture = DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 5.0)])
            .expect("mixture");

        assert_eq!(mixture.keys(), &[x(1)]);
        assert_eq!(mixture.discrete_keys(), &vec![m(1)]);

        let one = Assignment::from_pairs(vec![(m(1).key, 1)]);
        assert!(mixture.component(&one).expect("component").equals(&unary(x(1), 5.0), 0.0));

        let mut values = Values::new();
        values.insert(x(1), array![1.0]).expect("insert");
        assert!((mixture.error(&values, &one).expect("error") - 8.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_component_count() {
        let result = DCGaussianMixtureFactor::new(vec![m(1), m(2)], vec![unary(x(1), 0.0)]);
        assert_eq!(result.err(), Some(ChimeraError::DimensionMismatch { expected: 4, found: 1 }));
    }

    #[test]
    fn from_tree_checks_discrete_keys() {
        let components = vec![Arc::new(unary(x(1), 0.0)), Arc::new(unary(x(1), 1.0))];
        let tree = DecisionTree::from_leaves(&[m(1)], components).expect("tree");

        let wrong = DCGaussianMixtureFactor::from_tree(vec![m(2)], tree.clone());
        assert!(matches!(wrong, Err(ChimeraError::InvalidScope(_))));

        let extra = DCGaussianMixtureFactor::from_tree(vec![m(1), m(2)], tree.clone());
        assert!(matches!(extra, Err(ChimeraError::InvalidScope(_))));

        let ternary = DCGaussianMixtureFactor::from_tree(vec![DiscreteKey::new(m(1).key, 3)], tree.clone());
        assert!(matches!(ternary, Err(ChimeraError::InvalidScope(_))));

        let mixture = DCGaussianMixtureFactor::from_tree(vec![m(1)], tree).expect("mixture");
        assert_eq!(mixture.discrete_keys(), &mixture.factors().discrete_keys());
        assert_eq!(mixture.as_sum().discrete_keys(), vec![m(1)]);
    }

    #[test]
    fn as_sum_has_single_factor_leaves() {
        let mixture = DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 5.0)])
            .expect("mixture");
        let sum = mixture.as_sum();

        assert_eq!(sum.nr_leaves(), 2);
        for graph in sum.leaves() {
            assert_eq!(graph.len(), 1);
        }
    }

    #[test]
    fn add_appends_after_existing_leaves() {
        let first = DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 1.0)])
            .expect("mixture");
        let second = DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(2), 2.0), unary(x(2), 3.0)])
            .expect("mixture");

        let sum = first.add(&Sum::leaf(GaussianFactorGraph::new())).expect("add");
        let sum = second.add(&sum).expect("add");

        assert_eq!(sum.nr_leaves(), 2);
        for (assignment, graph) in sum.enumerate() {
            assert_eq!(graph.len(), 2);
            assert!(Arc::ptr_eq(graph.at(0).expect("at"), first.component(&assignment).expect("component")));
            assert!(Arc::ptr_eq(graph.at(1).expect("at"), second.component(&assignment).expect("component")));
        }
    }

    #[test]
    fn linearize_nonlinear_mixture() {
        let components: Vec<Arc<dyn NonlinearFactor>> = vec![
            Arc::new(PriorFactor::new(x(1), array![0.0], 1.0).expect("factor")),
            Arc::new(PriorFactor::new(x(1), array![2.0], 0.5).expect("factor")),
        ];
        let mixture = DCMixtureFactor::new(vec![m(1)], components).expect("mixture");

        let mut values = Values::new();
        values.insert(x(1), array![1.0]).expect("insert");

        let linear = mixture.linearize(&values).expect("linearize");
        assert_eq!(linear.discrete_keys(), mixture.discrete_keys());
        assert_eq!(linear.keys(), mixture.keys());

        // each linear component reproduces its nonlinear error at zero delta
        let mut zero = Values::new();
        zero.insert(x(1), array![0.0]).expect("insert");
        for assignment in crate::variable::all_assignments(mixture.discrete_keys()) {
            let expected = mixture.error(&values, &assignment).expect("error");
            let actual = linear.error(&zero, &assignment).expect("error");
            assert!((expected - actual).abs() < 1e-12);
        }
    }

    #[test]
    fn linearize_failure_propagates() {
        let components: Vec<Arc<dyn NonlinearFactor>> = vec![
            Arc::new(RangeFactor::new(x(1), x(2), 1.0, 1.0).expect("factor")),
            Arc::new(RangeFactor::new(x(1), x(2), 2.0, 1.0).expect("factor")),
        ];
        let dc = DCFactor::from(DCMixtureFactor::new(vec![m(1)], components).expect("mixture"));

        let mut values = Values::new();
        values.insert(x(1), array![0.0, 0.0]).expect("insert");
        values.insert(x(2), array![0.0, 0.0]).expect("insert");

        match dc.linearize(&values) {
            Err(ChimeraError::LinearizationFailure(_)) => (),
            other => panic!("unexpected result {:?}", other.map(|f| f.kind())),
        }
    }

    #[test]
    fn gaussian_mixture_linearize_is_shared() {
        let dc = DCFactor::from(
            DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 1.0)]).expect("mixture")
        );
        let linear = dc.linearize(&Values::new()).expect("linearize");

        match (&dc, &linear) {
            (DCFactor::GaussianMixture(a), DCFactor::GaussianMixture(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected Gaussian mixtures"),
        }
    }

    #[test]
    fn graph_discrete_keys() {
        let mut graph = DCFactorGraph::new();
        graph.push_back(DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 1.0)])
            .expect("mixture").into());
        graph.push_back(DCGaussianMixtureFactor::new(vec![m(2), m(1)], (0..4).map(|i| unary(x(2), i as f64)).collect())
            .expect("mixture").into());

        assert_eq!(graph.discrete_keys(), vec![m(1), m(2)]);
        assert_eq!(graph.keys(), vec![x(1), x(2)]);
    }

    #[test]
    fn equality_and_kind() {
        let a = DCFactor::from(
            DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 1.0)]).expect("mixture")
        );
        let b = DCFactor::from(
            DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 1.0 + 1e-7)]).expect("mixture")
        );
        let components: Vec<Arc<dyn NonlinearFactor>> = vec![
            Arc::new(PriorFactor::new(x(1), array![0.0], 1.0).expect("factor")),
            Arc::new(PriorFactor::new(x(1), array![1.0], 1.0).expect("factor")),
        ];
        let c = DCFactor::from(DCMixtureFactor::new(vec![m(1)], components).expect("mixture"));

        assert!(a.equals(&b, 1e-6));
        assert!(!a.equals(&b, 1e-9));
        assert!(!a.equals(&c, 1.0));
        assert_eq!(c.kind(), "nonlinear mixture");
        assert!(c.as_gaussian_mixture().is_none());
    }

    #[test]
    fn format() {
        let a = DCGaussianMixtureFactor::new(vec![m(1)], vec![unary(x(1), 0.0), unary(x(1), 1.0)]).expect("mixture");
        let text = a.format("", &default_key_formatter);
        assert!(text.starts_with("DCGaussianMixtureFactor [x1; m1:2]\nChoice(m1)\n"));
    }
}
