//! A hybrid factor graph: continuous, discrete and discrete-continuous (DC) factors in one
//! container, with linearization and the summation of Gaussian mixtures into a decision tree of
//! Gaussian factor graphs.

pub mod variable;
pub mod tree;
pub mod factor;
pub mod graph;
pub mod util;
pub use util::{ChimeraError, Result, DEFAULT_TOL};
