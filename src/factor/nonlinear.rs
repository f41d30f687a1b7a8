//! Defines the `NonlinearFactor` trait and a few concrete measurement factors over vector-valued
//! variables.
//!
//! A nonlinear factor exposes its residual `h(x) - z` and the Jacobians of that residual. Noise is
//! isotropic with standard deviation `sigma`, so the factor's error is `0.5 * |r / sigma|^2`.

use super::gaussian::{GaussianFactorGraph, JacobianFactor};
use crate::util::{arrays_equal, indent, ChimeraError, Result};
use crate::variable::{Key, KeyFormatter, Values};

use indexmap::IndexSet;
use ndarray::{Array1, Array2, Axis};

use std::any::Any;
use std::fmt;
use std::sync::Arc;


/// A factor that is nonlinear in its continuous variables.
///
/// Factors must be `Send + Sync` so that they can be shared read-only between graphs.
pub trait NonlinearFactor: fmt::Debug + Send + Sync {

    /// The continuous keys this factor involves, in the order of `jacobians`
    fn keys(&self) -> &[Key];

    /// The dimension of the residual
    fn dim(&self) -> usize;

    /// Standard deviation of the isotropic noise model
    fn sigma(&self) -> f64;

    /// The unwhitened residual `h(x) - z` at `values`
    fn residual(&self, values: &Values) -> Result<Array1<f64>>;

    /// The Jacobian of the residual with respect to each key, at `values`
    fn jacobians(&self, values: &Values) -> Result<Vec<Array2<f64>>>;

    /// Compare with another factor of any concrete type
    fn equals(&self, other: &dyn NonlinearFactor, tol: f64) -> bool;

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String;

    fn as_any(&self) -> &dyn Any;

    /// The whitened error `0.5 * |r / sigma|^2`
    fn error(&self, values: &Values) -> Result<f64> {
        let r = self.residual(values)? / self.sigma();
        Ok(0.5 * r.dot(&r))
    }

    /// First-order expansion at `values`. The resulting `JacobianFactor` is over deltas from
    /// `values`: `0.5 * |(J delta + r) / sigma|^2`.
    fn linearize(&self, values: &Values) -> Result<JacobianFactor> {
        let sigma = self.sigma();
        let r = self.residual(values)?;
        let jacobians = self.jacobians(values)?;

        let terms = self.keys().iter()
                               .cloned()
                               .zip(jacobians.into_iter().map(|j| j / sigma))
                               .collect();
        JacobianFactor::new(terms, r.mapv(|v| -v / sigma))
    }
}


fn check_sigma(sigma: f64) -> Result<f64> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(sigma)
    } else {
        Err(ChimeraError::InvalidNoise(sigma))
    }
}

fn check_dim(expected: usize, v: &Array1<f64>) -> Result<()> {
    if v.len() != expected {
        Err(ChimeraError::DimensionMismatch { expected, found: v.len() })
    } else {
        Ok(())
    }
}


/// A prior `x ~ N(prior, sigma^2 I)` on a single vector variable.
#[derive(Clone, Debug)]
pub struct PriorFactor {
    keys: [Key; 1],
    prior: Array1<f64>,
    sigma: f64,
}

impl PriorFactor {
    pub fn new(key: Key, prior: Array1<f64>, sigma: f64) -> Result<Self> {
        Ok(PriorFactor { keys: [key], prior, sigma: check_sigma(sigma)? })
    }
}

impl NonlinearFactor for PriorFactor {

    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        self.prior.len()
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn residual(&self, values: &Values) -> Result<Array1<f64>> {
        let x = values.at(self.keys[0])?;
        check_dim(self.dim(), x)?;
        Ok(x - &self.prior)
    }

    fn jacobians(&self, _values: &Values) -> Result<Vec<Array2<f64>>> {
        Ok(vec![Array2::eye(self.dim())])
    }

    fn equals(&self, other: &dyn NonlinearFactor, tol: f64) -> bool {
        match other.as_any().downcast_ref::<PriorFactor>() {
            Some(o) => self.keys == o.keys
                && arrays_equal(&self.prior, &o.prior, tol)
                && (self.sigma - o.sigma).abs() <= tol,
            None => false,
        }
    }

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        format!("{}PriorFactor on {}: prior {}, sigma {}\n", s, formatter(self.keys[0]), self.prior, self.sigma)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}


/// A relative measurement `x2 - x1 ~ N(measured, sigma^2 I)` between two vector variables.
#[derive(Clone, Debug)]
pub struct BetweenFactor {
    keys: [Key; 2],
    measured: Array1<f64>,
    sigma: f64,
}

impl BetweenFactor {
    pub fn new(key1: Key, key2: Key, measured: Array1<f64>, sigma: f64) -> Result<Self> {
        if key1 == key2 {
            return Err(ChimeraError::DuplicateKey(key1));
        }
        Ok(BetweenFactor { keys: [key1, key2], measured, sigma: check_sigma(sigma)? })
    }
}

impl NonlinearFactor for BetweenFactor {

    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        self.measured.len()
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn residual(&self, values: &Values) -> Result<Array1<f64>> {
        let x1 = values.at(self.keys[0])?;
        let x2 = values.at(self.keys[1])?;
        check_dim(self.dim(), x1)?;
        check_dim(self.dim(), x2)?;
        Ok(x2 - x1 - &self.measured)
    }

    fn jacobians(&self, _values: &Values) -> Result<Vec<Array2<f64>>> {
        let eye = Array2::<f64>::eye(self.dim());
        Ok(vec![-&eye, eye])
    }

    fn equals(&self, other: &dyn NonlinearFactor, tol: f64) -> bool {
        match other.as_any().downcast_ref::<BetweenFactor>() {
            Some(o) => self.keys == o.keys
                && arrays_equal(&self.measured, &o.measured, tol)
                && (self.sigma - o.sigma).abs() <= tol,
            None => false,
        }
    }

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        format!(
            "{}BetweenFactor {} -> {}: measured {}, sigma {}\n",
            s, formatter(self.keys[0]), formatter(self.keys[1]), self.measured, self.sigma
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}


/// A distance measurement `|x2 - x1| ~ N(measured, sigma^2)` between two points.
#[derive(Clone, Debug)]
pub struct RangeFactor {
    keys: [Key; 2],
    measured: f64,
    sigma: f64,
}

impl RangeFactor {
    pub fn new(key1: Key, key2: Key, measured: f64, sigma: f64) -> Result<Self> {
        if key1 == key2 {
            return Err(ChimeraError::DuplicateKey(key1));
        }
        Ok(RangeFactor { keys: [key1, key2], measured, sigma: check_sigma(sigma)? })
    }

    fn difference(&self, values: &Values) -> Result<Array1<f64>> {
        let x1 = values.at(self.keys[0])?;
        let x2 = values.at(self.keys[1])?;
        check_dim(x1.len(), x2)?;
        Ok(x2 - x1)
    }
}

impl NonlinearFactor for RangeFactor {

    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        1
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn residual(&self, values: &Values) -> Result<Array1<f64>> {
        let d = self.difference(values)?;
        Ok(Array1::from_elem(1, d.dot(&d).sqrt() - self.measured))
    }

    fn jacobians(&self, values: &Values) -> Result<Vec<Array2<f64>>> {
        let d = self.difference(values)?;
        let norm = d.dot(&d).sqrt();

        // the gradient of the distance is undefined when the points coincide
        if norm < 1e-12 {
            return Err(ChimeraError::LinearizationFailure(format!(
                "range between {} and {} is zero",
                self.keys[0], self.keys[1]
            )));
        }

        let j2 = (d / norm).insert_axis(Axis(0));
        Ok(vec![-&j2, j2])
    }

    fn equals(&self, other: &dyn NonlinearFactor, tol: f64) -> bool {
        match other.as_any().downcast_ref::<RangeFactor>() {
            Some(o) => self.keys == o.keys
                && (self.measured - o.measured).abs() <= tol
                && (self.sigma - o.sigma).abs() <= tol,
            None => false,
        }
    }

    fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        format!(
            "{}RangeFactor {} -> {}: measured {}, sigma {}\n",
            s, formatter(self.keys[0]), formatter(self.keys[1]), self.measured, self.sigma
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}


/// An ordered collection of nonlinear factors.
#[derive(Clone, Debug, Default)]
pub struct NonlinearFactorGraph {
    factors: Vec<Arc<dyn NonlinearFactor>>,
}

impl NonlinearFactorGraph {

    pub fn new() -> Self {
        NonlinearFactorGraph { factors: Vec::new() }
    }

    pub fn push_back(&mut self, factor: Arc<dyn NonlinearFactor>) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn at(&self, i: usize) -> Option<&Arc<dyn NonlinearFactor>> {
        self.factors.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NonlinearFactor>> {
        self.factors.iter()
    }

    /// The continuous keys of every factor, in the order first met
    pub fn keys(&self) -> Vec<Key> {
        let keys: IndexSet<Key> = self.factors.iter().flat_map(|f| f.keys().iter().cloned()).collect();
        keys.into_iter().collect()
    }

    pub fn error(&self, values: &Values) -> Result<f64> {
        self.factors.iter().map(|f| f.error(values)).sum()
    }

    /// Linearize every factor at `values`. The first failure is returned as is.
    pub fn linearize(&self, values: &Values) -> Result<GaussianFactorGraph> {
        let mut linear = GaussianFactorGraph::new();
        for factor in self.factors.iter() {
            linear.push_back(Arc::new(factor.linearize(values)?));
        }
        Ok(linear)
    }

    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.factors.len() == other.factors.len()
            && self.factors.iter().zip(other.factors.iter()).all(|(a, b)| a.equals(b.as_ref(), tol))
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let mut out = format!("{}\nsize: {}\n", s, self.factors.len());
        for (i, f) in self.factors.iter().enumerate() {
            out.push_str(&indent(&f.format(&format!("factor {}: ", i), formatter)));
        }
        out
    }
}
