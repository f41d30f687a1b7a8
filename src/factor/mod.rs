//! Definition of the factor module
//!
//! A hybrid graph holds three kinds of factor: continuous factors (nonlinear or Gaussian),
//! discrete factors over `DiscreteKey`s, and discrete-continuous (DC) mixtures. `HybridFactor`
//! tags a factor with its kind so that a graph can route it on insertion.

pub mod dc;
pub mod discrete;
pub mod gaussian;
pub mod nonlinear;

pub use self::dc::{DCFactor, DCFactorGraph, DCGaussianMixtureFactor, DCMixtureFactor, Sum};
pub use self::discrete::{DiscreteFactor, DiscreteFactorGraph, Table};
pub use self::gaussian::{GaussianFactorGraph, JacobianFactor};
pub use self::nonlinear::{BetweenFactor, NonlinearFactor, NonlinearFactorGraph, PriorFactor, RangeFactor};

use std::fmt;
use std::sync::Arc;


/// The kind of a factor, which decides the sub-graph it is stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FactorKind {
    Continuous,
    Discrete,
    DC,
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FactorKind::Continuous => "continuous",
            FactorKind::Discrete => "discrete",
            FactorKind::DC => "DC",
        };
        write!(f, "{}", name)
    }
}


/// A factor tagged with its kind. `C` is the continuous factor type of the graph it goes into.
#[derive(Clone, Debug)]
pub enum HybridFactor<C> {
    Continuous(C),
    Discrete(Arc<DiscreteFactor>),
    DC(DCFactor),
}

impl<C> HybridFactor<C> {

    pub fn kind(&self) -> FactorKind {
        match self {
            HybridFactor::Continuous(_) => FactorKind::Continuous,
            HybridFactor::Discrete(_) => FactorKind::Discrete,
            HybridFactor::DC(_) => FactorKind::DC,
        }
    }
}

impl HybridFactor<Arc<dyn NonlinearFactor>> {

    /// Tag a concrete nonlinear factor as continuous
    pub fn nonlinear<F: NonlinearFactor + 'static>(factor: F) -> Self {
        HybridFactor::Continuous(Arc::new(factor))
    }
}

impl<C> From<Arc<DiscreteFactor>> for HybridFactor<C> {
    fn from(f: Arc<DiscreteFactor>) -> Self {
        HybridFactor::Discrete(f)
    }
}

impl<C> From<DiscreteFactor> for HybridFactor<C> {
    fn from(f: DiscreteFactor) -> Self {
        HybridFactor::Discrete(Arc::new(f))
    }
}

impl<C> From<DCFactor> for HybridFactor<C> {
    fn from(f: DCFactor) -> Self {
        HybridFactor::DC(f)
    }
}

impl<C> From<DCGaussianMixtureFactor> for HybridFactor<C> {
    fn from(f: DCGaussianMixtureFactor) -> Self {
        HybridFactor::DC(f.into())
    }
}

impl<C> From<DCMixtureFactor> for HybridFactor<C> {
    fn from(f: DCMixtureFactor) -> Self {
        HybridFactor::DC(f.into())
    }
}

impl From<Arc<JacobianFactor>> for HybridFactor<Arc<JacobianFactor>> {
    fn from(f: Arc<JacobianFactor>) -> Self {
        HybridFactor::Continuous(f)
    }
}

impl From<JacobianFactor> for HybridFactor<Arc<JacobianFactor>> {
    fn from(f: JacobianFactor) -> Self {
        HybridFactor::Continuous(Arc::new(f))
    }
}

impl From<Arc<dyn NonlinearFactor>> for HybridFactor<Arc<dyn NonlinearFactor>> {
    fn from(f: Arc<dyn NonlinearFactor>) -> Self {
        HybridFactor::Continuous(f)
    }
}
