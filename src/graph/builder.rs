//! Defines a builder for assembling a `HybridFactorGraph` in one expression.

use super::hybrid::HybridFactorGraph;
use super::ContinuousGraph;
use crate::factor::{DCGaussianMixtureFactor, DCMixtureFactor, DiscreteFactor, HybridFactor, JacobianFactor, NonlinearFactor};
use crate::util::{ChimeraError, Result};
use crate::variable::{DiscreteKey, DiscreteKeys};

use std::sync::Arc;


/// An implementation of the [builder pattern] for creating a `HybridFactorGraph`.
///
/// Factors are routed one at a time, exactly as `HybridFactorGraph::push_back` routes them. On
/// top of that the builder checks that every discrete key is used with a single cardinality
/// throughout the graph. The first error is kept and every later call is ignored; it is
/// returned by `build`.
///
/// [builder pattern]: https://en.wikipedia.org/wiki/Builder_pattern
pub struct HybridFactorGraphBuilder<G: ContinuousGraph> {

    /// The graph assembled so far
    graph: HybridFactorGraph<G>,

    /// The error state of the builder
    err: Option<ChimeraError>,
}


impl<G: ContinuousGraph> HybridFactorGraphBuilder<G> {

    /// Construct a new `HybridFactorGraphBuilder` representing an empty graph
    pub fn new() -> Self {
        HybridFactorGraphBuilder { graph: HybridFactorGraph::new(), err: None }
    }

    /// Add an already tagged factor
    pub fn with_factor<F: Into<HybridFactor<G::Factor>>>(mut self, factor: F) -> Self {
        if self.err.is_some() {
            return self;
        }

        let factor = factor.into();
        let keys = match &factor {
            HybridFactor::Continuous(_) => Vec::new(),
            HybridFactor::Discrete(f) => f.discrete_keys().clone(),
            HybridFactor::DC(f) => f.discrete_keys().clone(),
        };

        if let Err(e) = self.check_cardinalities(&keys) {
            self.err = Some(e);
            return self;
        }

        self.graph.push_back(factor);
        self
    }

    /// Add every factor of `factors`, in order
    pub fn with_factors<I, F>(self, factors: I) -> Self
        where I: IntoIterator<Item = F>,
              F: Into<HybridFactor<G::Factor>>
    {
        factors.into_iter().fold(self, |builder, f| builder.with_factor(f))
    }

    /// Add a discrete factor over `scope` with the given table values
    ///
    /// # Args
    /// * `scope`: the discrete keys of the factor
    /// * `values`: the table, in the order of `all_assignments(&scope)`
    pub fn with_discrete(self, scope: DiscreteKeys, values: Vec<f64>) -> Self {
        let factor = DiscreteFactor::from_values(scope, values);
        self.with_result(factor)
    }

    /// Add a Gaussian mixture over `discrete_keys`, one linear component per joint assignment
    pub fn with_dc(self, discrete_keys: DiscreteKeys, components: Vec<JacobianFactor>) -> Self {
        let factor = DCGaussianMixtureFactor::new(discrete_keys, components);
        self.with_result(factor)
    }

    /// Add a nonlinear mixture over `discrete_keys`, one component per joint assignment
    pub fn with_dc_mixture(self, discrete_keys: DiscreteKeys, components: Vec<Arc<dyn NonlinearFactor>>) -> Self {
        let factor = DCMixtureFactor::new(discrete_keys, components);
        self.with_result(factor)
    }

    /// Build the `HybridFactorGraph`, or return the first error encountered.
    ///
    /// This call consumes the `HybridFactorGraphBuilder`
    pub fn build(self) -> Result<HybridFactorGraph<G>> {
        if let Some(e) = self.err {
            Err(e)
        } else {
            Ok(self.graph)
        }
    }

    fn with_result<F: Into<HybridFactor<G::Factor>>>(mut self, factor: Result<F>) -> Self {
        if self.err.is_some() {
            return self;
        }

        match factor {
            Ok(f) => self.with_factor(f),
            Err(e) => {
                self.err = Some(e);
                self
            }
        }
    }

    /// Every key must have the cardinality it was first added with
    fn check_cardinalities(&self, keys: &[DiscreteKey]) -> Result<()> {
        let known = self.graph.discrete_keys();
        for k in keys.iter() {
            if let Some(prior) = known.iter().find(|p| p.key == k.key && p.cardinality != k.cardinality) {
                return Err(ChimeraError::CardinalityMismatch {
                    key: k.key,
                    left: prior.cardinality,
                    right: k.cardinality,
                });
            }
        }
        Ok(())
    }
}

impl<G: ContinuousGraph> Default for HybridFactorGraphBuilder<G> {
    fn default() -> Self {
        HybridFactorGraphBuilder::new()
    }
}
