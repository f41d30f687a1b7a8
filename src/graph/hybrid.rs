//! Defines the `HybridFactorGraph`.
//!
//! Factors are routed on insertion by the kind they were tagged with (see `HybridFactor`) into
//! one of three owned sub-graphs. The graph also keeps a `FactorSlot` per insertion, so that the
//! overall insertion order survives routing.

use super::ContinuousGraph;
use crate::factor::{
    DCFactor, DCFactorGraph, DCGaussianMixtureFactor, DCMixtureFactor, DiscreteFactor, DiscreteFactorGraph,
    FactorKind, GaussianFactorGraph, HybridFactor, JacobianFactor, NonlinearFactor, NonlinearFactorGraph, Sum,
};
use crate::util::{indent, ChimeraError, Result};
use crate::variable::{Assignment, DiscreteKey, DiscreteKeys, KeyFormatter, Values};

use indexmap::IndexSet;

use std::sync::Arc;


/// Where an inserted factor was routed: its kind, and its position in that kind's sub-graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FactorSlot {
    pub kind: FactorKind,
    pub index: usize,
}


/// A factor graph over continuous, discrete and discrete-continuous (DC) factors.
///
/// `G` is the continuous sub-graph type: `NonlinearFactorGraph` before linearization and
/// `GaussianFactorGraph` after.
#[derive(Clone, Debug, Default)]
pub struct HybridFactorGraph<G: ContinuousGraph> {

    /// One slot per inserted factor, in insertion order
    factors: Vec<FactorSlot>,

    continuous: G,
    discrete: DiscreteFactorGraph,
    dc: DCFactorGraph,
}

/// A hybrid graph with nonlinear continuous factors
pub type NonlinearHybridFactorGraph = HybridFactorGraph<NonlinearFactorGraph>;

/// A hybrid graph with linear continuous factors, as produced by `linearize`
pub type GaussianHybridFactorGraph = HybridFactorGraph<GaussianFactorGraph>;


impl<G: ContinuousGraph> HybridFactorGraph<G> {

    /// Construct a new, empty `HybridFactorGraph`
    pub fn new() -> Self {
        HybridFactorGraph {
            factors: Vec::new(),
            continuous: G::default(),
            discrete: DiscreteFactorGraph::new(),
            dc: DCFactorGraph::new(),
        }
    }

    /// Add a factor to the sub-graph matching its kind.
    ///
    /// There is no de-duplication: pushing the same factor twice stores it twice.
    pub fn push_back<F: Into<HybridFactor<G::Factor>>>(&mut self, factor: F) {
        match factor.into() {
            HybridFactor::Continuous(f) => self.push_continuous(f),
            HybridFactor::Discrete(f) => self.push_discrete(f),
            HybridFactor::DC(f) => self.push_dc(f),
        }
    }

    /// Add every factor of `factors`, in order
    pub fn push_back_all<I, F>(&mut self, factors: I)
        where I: IntoIterator<Item = F>,
              F: Into<HybridFactor<G::Factor>>
    {
        for factor in factors {
            self.push_back(factor);
        }
    }

    /// Add every factor of `other`, in the order they were inserted into `other`. The factors
    /// themselves are shared, not copied.
    pub fn push_graph(&mut self, other: &HybridFactorGraph<G>) {
        for i in 0..other.size() {
            if let Some(factor) = other.factor(i) {
                self.push_back(factor);
            }
        }
    }

    pub fn push_continuous(&mut self, factor: G::Factor) {
        let index = self.continuous.len();
        self.continuous.push_back(factor);
        self.record(FactorKind::Continuous, index);
    }

    pub fn push_discrete(&mut self, factor: Arc<DiscreteFactor>) {
        let index = self.discrete.len();
        self.discrete.push_back(factor);
        self.record(FactorKind::Discrete, index);
    }

    pub fn push_dc(&mut self, factor: DCFactor) {
        let index = self.dc.len();
        self.dc.push_back(factor);
        self.record(FactorKind::DC, index);
    }

    fn record(&mut self, kind: FactorKind, index: usize) {
        tracing::trace!(%kind, index, position = self.factors.len(), "routed factor");
        self.factors.push(FactorSlot { kind, index });
    }

    /// Construct a `DiscreteFactor` from its scope and table values and add it.
    pub fn emplace_discrete(&mut self, scope: DiscreteKeys, values: Vec<f64>) -> Result<()> {
        let factor = DiscreteFactor::from_values(scope, values)?;
        self.push_discrete(Arc::new(factor));
        Ok(())
    }

    /// Construct a `DCGaussianMixtureFactor` from its discrete keys and components and add it.
    pub fn emplace_dc(&mut self, discrete_keys: DiscreteKeys, components: Vec<JacobianFactor>) -> Result<()> {
        let factor = DCGaussianMixtureFactor::new(discrete_keys, components)?;
        self.push_dc(factor.into());
        Ok(())
    }

    /// Construct a `DCMixtureFactor` from its discrete keys and nonlinear components and add it.
    pub fn emplace_dc_mixture(
        &mut self,
        discrete_keys: DiscreteKeys,
        components: Vec<Arc<dyn NonlinearFactor>>,
    ) -> Result<()> {
        let factor = DCMixtureFactor::new(discrete_keys, components)?;
        self.push_dc(factor.into());
        Ok(())
    }

    pub fn continuous_graph(&self) -> &G {
        &self.continuous
    }

    pub fn discrete_graph(&self) -> &DiscreteFactorGraph {
        &self.discrete
    }

    pub fn dc_graph(&self) -> &DCFactorGraph {
        &self.dc
    }

    /// The number of factors inserted, of every kind
    pub fn size(&self) -> usize {
        self.factors.len()
    }

    pub fn empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn nr_continuous_factors(&self) -> usize {
        self.continuous.len()
    }

    pub fn nr_discrete_factors(&self) -> usize {
        self.discrete.len()
    }

    pub fn nr_dc_factors(&self) -> usize {
        self.dc.len()
    }

    /// The slots of every inserted factor, in insertion order
    pub fn slots(&self) -> &[FactorSlot] {
        &self.factors
    }

    /// The `i`th inserted factor, tagged with its kind
    pub fn factor(&self, i: usize) -> Option<HybridFactor<G::Factor>> {
        let slot = self.factors.get(i)?;
        match slot.kind {
            FactorKind::Continuous => self.continuous.at(slot.index).cloned().map(HybridFactor::Continuous),
            FactorKind::Discrete => self.discrete.at(slot.index).cloned().map(HybridFactor::Discrete),
            FactorKind::DC => self.dc.at(slot.index).cloned().map(HybridFactor::DC),
        }
    }

    /// The discrete keys of the discrete factors followed by those of the DC factors, without
    /// duplicates, in the order first met.
    pub fn discrete_keys(&self) -> DiscreteKeys {
        let keys: IndexSet<DiscreteKey> = self.discrete.discrete_keys()
                                                       .into_iter()
                                                       .chain(self.dc.discrete_keys())
                                                       .collect();
        keys.into_iter().collect()
    }

    /// Add every DC factor together into a tree with one leaf per joint assignment of their
    /// discrete keys. Each leaf holds the matching component of every DC factor, in insertion
    /// order.
    ///
    /// # Errors
    /// * `ChimeraError::TypeMismatch` if a DC factor is not a Gaussian mixture
    /// * `ChimeraError::CardinalityMismatch` if two factors disagree on a key's cardinality
    pub fn sum(&self) -> Result<Sum> {
        let mut sum = Sum::leaf(GaussianFactorGraph::new());

        for (index, factor) in self.dc.iter().enumerate() {
            let mixture = match factor.as_gaussian_mixture() {
                Some(m) => m,
                None => return Err(ChimeraError::TypeMismatch { index, found: factor.kind() }),
            };
            sum = mixture.add(&sum)?;
        }

        tracing::debug!(factors = self.dc.len(), leaves = sum.nr_leaves(), "summed DC factors");
        Ok(sum)
    }

    /// Compare the insertion record exactly, and each sub-graph with its own comparison.
    /// Continuous and DC content is compared to within `tol`; discrete tables exactly.
    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.factors == other.factors
            && self.continuous.equals(&other.continuous, tol)
            && self.discrete.equals(&other.discrete)
            && self.dc.equals(&other.dc, tol)
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let mut out = format!("{}\nsize: {}\n", s, self.size());
        out.push_str(&indent(&self.continuous.format("continuous graph", formatter)));
        out.push_str(&indent(&self.discrete.format("discrete graph", formatter)));
        out.push_str(&indent(&self.dc.format("DC graph", formatter)));
        out
    }

    /// Print the graph to stdout, labelled `s`
    pub fn print(&self, s: &str, formatter: &KeyFormatter) {
        print!("{}", self.format(s, formatter));
    }

    /// Remove every factor
    pub fn clear(&mut self) {
        self.factors.clear();
        self.continuous = G::default();
        self.discrete = DiscreteFactorGraph::new();
        self.dc = DCFactorGraph::new();
    }
}

impl<G, F> Extend<F> for HybridFactorGraph<G>
    where G: ContinuousGraph,
          F: Into<HybridFactor<G::Factor>>
{
    fn extend<I: IntoIterator<Item = F>>(&mut self, iter: I) {
        self.push_back_all(iter);
    }
}


impl HybridFactorGraph<NonlinearFactorGraph> {

    /// Linearize the graph at `values`.
    ///
    /// The result holds the linearized continuous factors, the same discrete factors, and DC
    /// factors that are all Gaussian mixtures, with the same insertion record. `self` is not
    /// modified.
    ///
    /// # Errors
    /// The first failure from a continuous or DC factor's own linearization, unchanged.
    pub fn linearize(&self, values: &Values) -> Result<GaussianHybridFactorGraph> {
        let continuous = self.continuous.linearize(values)?;
        let dc = self.dc.linearize(values)?;

        tracing::debug!(
            continuous = continuous.len(),
            discrete = self.discrete.len(),
            dc = dc.len(),
            "linearized hybrid graph"
        );

        Ok(HybridFactorGraph {
            factors: self.factors.clone(),
            continuous,
            discrete: self.discrete.clone(),
            dc,
        })
    }
}


impl HybridFactorGraph<GaussianFactorGraph> {

    /// The total error at a continuous and discrete assignment: the continuous factors' error,
    /// plus the error of the selected component of every DC factor, plus the negative log of
    /// every discrete factor.
    pub fn error(&self, values: &Values, assignment: &Assignment) -> Result<f64> {
        Ok(self.continuous.error(values)?
            + self.dc.error(values, assignment)?
            + self.discrete.error(assignment)?)
    }
}
