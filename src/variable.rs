//! Definition of the variable module
//!
//! Variables are identified by a `Key`. Discrete variables additionally carry a cardinality,
//! continuous variables take vector values held in a `Values` container.

use crate::util::{ChimeraError, Result};

use indexmap::IndexMap;
use ndarray::Array1;

use std::fmt;

const CHR_BITS: u64 = 8;
const INDEX_BITS: u64 = 64 - CHR_BITS;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// An opaque identifier for a variable, continuous or discrete.
///
/// Keys built with `Key::symbol` pack a character into the top byte and an index into the
/// remaining bits, so that `x1` and `m1` are distinct variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(pub u64);

impl Key {

    /// Build a symbolic key such as `x1` from a character and an index
    ///
    /// # Panics
    /// If `chr` is not ASCII or `index` does not fit in the index bits. See `Key::try_symbol`.
    pub fn symbol(chr: char, index: u64) -> Self {
        match Key::try_symbol(chr, index) {
            Ok(key) => key,
            Err(e) => panic!("{}", e),
        }
    }

    /// Build a symbolic key, failing instead of letting two symbols share a key.
    ///
    /// # Errors
    /// * `ChimeraError::InvalidScope` if `chr` is not ASCII or `index` exceeds the index bits
    pub fn try_symbol(chr: char, index: u64) -> Result<Self> {
        if !chr.is_ascii() {
            return Err(ChimeraError::InvalidScope(format!("symbol character {:?} is not ASCII", chr)));
        }
        if index > INDEX_MASK {
            return Err(ChimeraError::InvalidScope(format!("symbol index {} exceeds {} bits", index, INDEX_BITS)));
        }
        Ok(Key(((chr as u64) << INDEX_BITS) | index))
    }

    /// The character part of a symbolic key
    pub fn chr(&self) -> char {
        (self.0 >> INDEX_BITS) as u8 as char
    }

    /// The index part of a symbolic key
    pub fn index(&self) -> u64 {
        self.0 & INDEX_MASK
    }
}

impl From<u64> for Key {
    fn from(k: u64) -> Self {
        Key(k)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", default_key_formatter(*self))
    }
}

/// Maps a `Key` to a printable name. Every `format`/`print` method takes one.
pub type KeyFormatter = dyn Fn(Key) -> String;

/// Render symbolic keys as `x1`, anything else as the raw integer.
pub fn default_key_formatter(key: Key) -> String {
    let chr = key.chr();
    if chr.is_ascii_alphabetic() {
        format!("{}{}", chr, key.index())
    } else {
        format!("{}", key.0)
    }
}

/// A discrete variable: its `Key` together with the number of values it can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DiscreteKey {
    pub key: Key,
    pub cardinality: usize,
}

impl DiscreteKey {
    pub fn new(key: Key, cardinality: usize) -> Self {
        DiscreteKey { key, cardinality }
    }

    /// Convenience constructor for a two valued (switch) variable
    pub fn binary(key: Key) -> Self {
        DiscreteKey { key, cardinality: 2 }
    }
}

/// An ordered collection of discrete keys
pub type DiscreteKeys = Vec<DiscreteKey>;


/// An assignment of values to a set of discrete `Key`s.
///
/// # Note
/// Two `Assignment`s are equal when they assign the same values to the same keys, in whatever
/// order the keys were set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    values: IndexMap<Key, usize>,
}

impl Assignment {

    /// Construct an empty `Assignment`
    pub fn new() -> Self {
        Assignment { values: IndexMap::new() }
    }

    /// Construct an `Assignment` from `(key, value)` pairs
    pub fn from_pairs<I>(pairs: I) -> Self
        where I: IntoIterator<Item = (Key, usize)>
    {
        Assignment { values: pairs.into_iter().collect() }
    }

    /// Assign `value` to `key`, replacing any previous value
    pub fn set(&mut self, key: Key, value: usize) {
        self.values.insert(key, value);
    }

    /// Retrieve the value assigned to `key`
    pub fn get(&self, key: Key) -> Option<usize> {
        self.values.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove `key` from the assignment
    pub(crate) fn remove(&mut self, key: Key) {
        self.values.shift_remove(&key);
    }

    /// Iterate over `(key, value)` pairs in the order they were set
    pub fn iter(&self) -> impl Iterator<Item = (Key, usize)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    /// Look up `key` and check the value against its cardinality
    pub(crate) fn value_of(&self, key: &DiscreteKey) -> Result<usize> {
        match self.get(key.key) {
            None => Err(ChimeraError::IncompleteAssignment(key.key)),
            Some(v) if v >= key.cardinality => Err(ChimeraError::InvalidAssignment {
                key: key.key,
                value: v,
                cardinality: key.cardinality,
            }),
            Some(v) => Ok(v),
        }
    }

    pub fn format(&self, formatter: &KeyFormatter) -> String {
        let parts: Vec<String> = self.values.iter()
                                            .map(|(&k, v)| format!("{}={}", formatter(k), v))
                                            .collect();
        format!("({})", parts.join(", "))
    }
}

/// Enumerate every joint `Assignment` to `keys`.
///
/// The first key varies slowest (row-major order), matching the layout of the tables used by
/// `DiscreteFactor` and the leaves accepted by `DecisionTree::from_leaves`. An empty set of keys
/// has exactly one (empty) assignment.
pub fn all_assignments(keys: &[DiscreteKey]) -> impl Iterator<Item = Assignment> {
    let keys = keys.to_vec();
    let total: usize = keys.iter().map(|k| k.cardinality).product();

    (0..total).map(move |n| {
        let mut rem = n;
        let mut values = vec![0; keys.len()];
        for (i, k) in keys.iter().enumerate().rev() {
            values[i] = rem % k.cardinality;
            rem /= k.cardinality;
        }
        Assignment::from_pairs(keys.iter().map(|k| k.key).zip(values))
    })
}


/// A set of values for continuous variables, used as the linearization point of a nonlinear
/// graph or as the (delta) solution of a linear one.
#[derive(Clone, Debug, Default)]
pub struct Values {
    values: IndexMap<Key, Array1<f64>>,
}

impl Values {

    pub fn new() -> Self {
        Values { values: IndexMap::new() }
    }

    /// Insert a value for a new key.
    ///
    /// # Errors
    /// * `ChimeraError::DuplicateKey` if `key` already has a value
    pub fn insert(&mut self, key: Key, value: Array1<f64>) -> Result<()> {
        if self.values.contains_key(&key) {
            return Err(ChimeraError::DuplicateKey(key));
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Replace the value of an existing key.
    ///
    /// # Errors
    /// * `ChimeraError::MissingValue` if `key` has no value yet
    pub fn update(&mut self, key: Key, value: Array1<f64>) -> Result<()> {
        match self.values.get_mut(&key) {
            Some(v) => {
                *v = value;
                Ok(())
            },
            None => Err(ChimeraError::MissingValue(key)),
        }
    }

    /// Retrieve the value for `key`
    pub fn at(&self, key: Key) -> Result<&Array1<f64>> {
        self.values.get(&key).ok_or(ChimeraError::MissingValue(key))
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add `delta` to every value it mentions. Keys absent from `delta` are left unchanged.
    ///
    /// # Errors
    /// * `ChimeraError::MissingValue` if `delta` mentions a key not in `self`
    /// * `ChimeraError::DimensionMismatch` if a delta has the wrong length
    pub fn retract(&self, delta: &Values) -> Result<Values> {
        let mut result = self.clone();
        for (&key, d) in delta.values.iter() {
            let current = self.at(key)?;
            if current.len() != d.len() {
                return Err(ChimeraError::DimensionMismatch { expected: current.len(), found: d.len() });
            }
            result.values.insert(key, current + d);
        }
        Ok(result)
    }
}
