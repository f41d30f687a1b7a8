//! Defines linear (Gaussian) factors and the `GaussianFactorGraph` that collects them.

use crate::util::{arrays_equal, indent, ChimeraError, Result};
use crate::variable::{Key, KeyFormatter, Values};

use indexmap::IndexSet;
use itertools::Itertools;
use ndarray::{Array1, Array2};

use std::sync::Arc;


/// A whitened linear factor with error `0.5 * |A_1 x_1 + ... + A_n x_n - b|^2`.
#[derive(Clone, Debug)]
pub struct JacobianFactor {
    keys: Vec<Key>,

    /// One block per key, each with `b.len()` rows
    blocks: Vec<Array2<f64>>,

    b: Array1<f64>,
}

impl JacobianFactor {

    /// Create a new `JacobianFactor` from `(key, A)` terms and a right hand side.
    ///
    /// # Errors
    /// * `ChimeraError::DimensionMismatch` if a block's row count differs from `b.len()`
    /// * `ChimeraError::DuplicateKey` if a key appears in two terms
    pub fn new(terms: Vec<(Key, Array2<f64>)>, b: Array1<f64>) -> Result<Self> {
        let mut keys = Vec::with_capacity(terms.len());
        let mut blocks = Vec::with_capacity(terms.len());

        for (key, block) in terms.into_iter() {
            if block.nrows() != b.len() {
                return Err(ChimeraError::DimensionMismatch { expected: b.len(), found: block.nrows() });
            }
            if keys.contains(&key) {
                return Err(ChimeraError::DuplicateKey(key));
            }
            keys.push(key);
            blocks.push(block);
        }

        Ok(JacobianFactor { keys, blocks, b })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The number of rows (the dimension of the error vector)
    pub fn rows(&self) -> usize {
        self.b.len()
    }

    /// The block of `A` multiplying `key`
    pub fn block(&self, key: Key) -> Option<&Array2<f64>> {
        self.keys.iter().position(|&k| k == key).map(|i| &self.blocks[i])
    }

    pub fn b(&self) -> &Array1<f64> {
        &self.b
    }

    /// The residual `A x - b`
    ///
    /// # Errors
    /// * `ChimeraError::MissingValue` if a key has no value
    /// * `ChimeraError::DimensionMismatch` if a value has the wrong length for its block
    pub fn residual(&self, values: &Values) -> Result<Array1<f64>> {
        let mut r = self.b.mapv(|v| -v);
        for (&key, block) in self.keys.iter().zip(self.blocks.iter()) {
            let x = values.at(key)?;
            if x.len() != block.ncols() {
                return Err(ChimeraError::DimensionMismatch { expected: block.ncols(), found: x.len() });
            }
            r += &block.dot(x);
        }
        Ok(r)
    }

    pub fn error(&self, values: &Values) -> Result<f64> {
        let r = self.residual(values)?;
        Ok(0.5 * r.dot(&r))
    }

    /// Compare keys exactly and matrix entries to within `tol`
    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.keys == other.keys
            && self.blocks.iter().zip(other.blocks.iter()).all(|(a, b)| arrays_equal(a, b, tol))
            && arrays_equal(&self.b, &other.b, tol)
    }

    pub fn format(&self, s: &str, formatter: &KeyFormatter) -> String {
        let names = self.keys.iter().map(|&k| formatter(k)).join(" ");
        let mut out = format!("{}JacobianFactor [{}]\n", s, names);
        for (&key, block) in self.keys.iter().zip(self.blocks.iter()) {
            out.push_str(&format!("  A[{}] = {}\n", formatter(key), block));
        }
        out.push_str(&format!("  b = {}\n", self.b));
        out
    }
}


/// An ordered collection of linear factors. Clones share the underlying factors.
#[derive(Clone, Debug, Default)]
pub struct GaussianFactorGraph {
    factors: Vec<Arc<JacobianFactor>>,
}

impl GaussianFactorGraph {

    pub fn new() -> Self {
        GaussianFactorGraph { factors: Vec::new() }
    }

    pub fn push_back(&mut self, factor: Arc<JacobianFactor>) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn at(&self, i: usize) -> Option<&Arc<JacobianFactor>> {
        self.factors.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<JacobianFactor>> {
        self.factors.iter()
    }

    /// A new graph holding the factors of `self` followed by those of `other`
    pub fn concatenated(&self, other: &Self) -> Self {
        let factors = self.factors.iter().chain(other.factors.iter()).cloned().collect();
        GaussianFactorGraph { factors }
    }

    /// The continuous keys of every factor, in the order first met
    pub fn keys(&self) -> Vec<Key> {
        let keys: IndexSet<Key> = self.factors.iter().flat_map(|f| f.keys().iter().cloned()).collect();
        keys.into_iter().collect()
    }

    pub fn error(&self, values: &Values) -> Result<f64> {
        self.factors.iter().map(|f| f.error(values)).sum()
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

impl From<Vec<Arc<JacobianFactor>>> for GaussianFactorGraph {
    fn from(factors: Vec<Arc<JacobianFactor>>) -> Self {
        GaussianFactorGraph { factors }
    }
}
