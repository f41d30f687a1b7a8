//! Defines the `HybridFactorGraph`, a container for continuous, discrete and DC factors, and the
//! `ContinuousGraph` trait over the two kinds of continuous sub-graph it can hold.

pub mod builder;
pub mod hybrid;

pub use self::builder::HybridFactorGraphBuilder;
pub use self::hybrid::{FactorSlot, GaussianHybridFactorGraph, HybridFactorGraph, NonlinearHybridFactorGraph};

use crate::factor::{GaussianFactorGraph, JacobianFactor, NonlinearFactor, NonlinearFactorGraph};
use crate::variable::{Key, KeyFormatter};

use std::fmt;
use std::sync::Arc;


/// The continuous part of a `HybridFactorGraph`: either nonlinear factors, or the linear
/// factors they become after linearization.
pub trait ContinuousGraph: Clone + Default + fmt::Debug {

    /// The shared handle the graph stores its factors by
    type Factor: Clone + fmt::Debug;

    fn push_back(&mut self, factor: Self::Factor);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn at(&self, i: usize) -> Option<&Self::Factor>;

    /// The continuous keys of every factor, in the order first met
    fn keys(&self) -> Vec<Key>;

    fn equals(&self, other: &Self, tol: f64) -> bool;

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String;
}

impl ContinuousGraph for NonlinearFactorGraph {
    type Factor = Arc<dyn NonlinearFactor>;

    fn push_back(&mut self, factor: Self::Factor) {
        NonlinearFactorGraph::push_back(self, factor)
    }

    fn len(&self) -> usize {
        NonlinearFactorGraph::len(self)
    }

    fn at(&self, i: usize) -> Option<&Self::Factor> {
        NonlinearFactorGraph::at(self, i)
    }

    fn keys(&self) -> Vec<Key> {
        NonlinearFactorGraph::keys(self)
    }

    fn equals(&self, other: &Self, tol: f64) -> bool {
        NonlinearFactorGraph::equals(self, other, tol)
    }

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        NonlinearFactorGraph::format(self, s, formatter)
    }
}

impl ContinuousGraph for GaussianFactorGraph {
    type Factor = Arc<JacobianFactor>;

    fn push_back(&mut self, factor: Self::Factor) {
        GaussianFactorGraph::push_back(self, factor)
    }

    fn len(&self) -> usize {
        GaussianFactorGraph::len(self)
    }

    fn at(&self, i: usize) -> Option<&Self::Factor> {
        GaussianFactorGraph::at(self, i)
    }

    fn keys(&self) -> Vec<Key> {
        GaussianFactorGraph::keys(self)
    }

    fn equals(&self, other: &Self, tol: f64) -> bool {
        GaussianFactorGraph::equals(self, other, tol)
    }

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        GaussianFactorGraph::format(self, s, formatter)
    }
}
