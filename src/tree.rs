//! Defines a `DecisionTree`, a persistent tree that branches on discrete variables and holds an
//! arbitrary payload at each leaf.
//!
//! Every root-to-leaf path corresponds to an assignment to the keys branched on along that path.
//! Nodes are reference counted, so cloning a tree or reusing a subtree in several places is
//! cheap and never copies leaf payloads.

use crate::util::{ChimeraError, Result};
use crate::variable::{Assignment, DiscreteKey, DiscreteKeys, Key, KeyFormatter};

use indexmap::IndexSet;

use std::result;
use std::sync::Arc;


#[derive(Debug)]
enum Node<V> {
    Leaf(V),

    /// Branches on `label`, with one child per value of the key
    Choice {
        label: DiscreteKey,
        branches: Vec<Arc<Node<V>>>,
    },
}


/// An immutable decision tree over discrete assignments.
///
/// # Invariant
/// No path from the root to a leaf branches on the same `Key` twice.
#[derive(Debug)]
pub struct DecisionTree<V> {
    root: Arc<Node<V>>,
}

impl<V> Clone for DecisionTree<V> {
    fn clone(&self) -> Self {
        DecisionTree { root: Arc::clone(&self.root) }
    }
}


impl<V> DecisionTree<V> {

    /// A tree with no discrete keys and a single leaf
    pub fn leaf(value: V) -> Self {
        DecisionTree { root: Arc::new(Node::Leaf(value)) }
    }

    /// Build a tree from its leaves, listed in the order of `all_assignments(keys)` (the first key
    /// varies slowest). `keys[0]` becomes the root.
    ///
    /// # Errors
    /// * `ChimeraError::DuplicateKey` or `ChimeraError::InvalidScope` if `keys` is not a valid
    ///   set of discrete keys
    /// * `ChimeraError::DimensionMismatch` if the number of leaves does not match the number of
    ///   joint assignments
    pub fn from_leaves(keys: &[DiscreteKey], leaves: Vec<V>) -> Result<Self> {
        check_keys(keys)?;

        let expected: usize = keys.iter().map(|k| k.cardinality).product();
        if leaves.len() != expected {
            return Err(ChimeraError::DimensionMismatch { expected, found: leaves.len() });
        }

        let mut leaves = leaves.into_iter();
        let root = build_from_iter(keys, &mut leaves)?;
        Ok(DecisionTree { root })
    }

    /// Build a tree over `keys` by evaluating `f` at every joint assignment.
    pub fn from_fn<F>(keys: &[DiscreteKey], mut f: F) -> Result<Self>
        where F: FnMut(&Assignment) -> V
    {
        check_keys(keys)?;

        let mut path = Assignment::new();
        let root = build_from_fn(keys, &mut path, &mut f);
        Ok(DecisionTree { root })
    }

    /// Select the leaf matching `assignment`. The assignment may mention keys the tree does not
    /// branch on; those are ignored.
    ///
    /// # Errors
    /// * `ChimeraError::IncompleteAssignment` if a key the tree branches on is not assigned
    /// * `ChimeraError::InvalidAssignment` if a value is out of range for its key
    pub fn get(&self, assignment: &Assignment) -> Result<&V> {
        let mut node = &self.root;
        loop {
            match node.as_ref() {
                Node::Leaf(value) => return Ok(value),
                Node::Choice { label, branches } => {
                    node = &branches[assignment.value_of(label)?];
                }
            }
        }
    }

    /// Map every leaf through `f`, keeping the tree structure.
    pub fn apply<W, F>(&self, mut f: F) -> DecisionTree<W>
        where F: FnMut(&V) -> W
    {
        DecisionTree { root: map_node(&self.root, &mut f) }
    }

    /// Map every leaf through a fallible `f`. The first error aborts the whole map.
    pub fn try_apply<W, E, F>(&self, mut f: F) -> result::Result<DecisionTree<W>, E>
        where F: FnMut(&V) -> result::Result<W, E>
    {
        Ok(DecisionTree { root: try_map_node(&self.root, &mut f)? })
    }

    /// Combine two trees leaf by leaf.
    ///
    /// The result branches on the union of both trees' keys. For every joint assignment the
    /// resulting leaf is `f(self_leaf, other_leaf)`, with `self`'s leaf always passed first. A
    /// tree that does not branch on some key contributes the same leaf for every value of it.
    ///
    /// # Errors
    /// * `ChimeraError::CardinalityMismatch` if the trees branch on the same key with different
    ///   cardinalities
    pub fn zip<U, W, F>(&self, other: &DecisionTree<U>, mut f: F) -> Result<DecisionTree<W>>
        where F: FnMut(&V, &U) -> W
    {
        Ok(DecisionTree { root: zip_nodes(&self.root, &other.root, &mut f)? })
    }

    /// The number of leaves in the tree
    pub fn nr_leaves(&self) -> usize {
        count_leaves(&self.root)
    }

    /// The leaves of the tree in depth-first order, lowest branch value first
    pub fn leaves(&self) -> Vec<&V> {
        self.enumerate().into_iter().map(|(_, v)| v).collect()
    }

    /// Every root-to-leaf path as the assignment it encodes, paired with its leaf, in depth-first
    /// order.
    pub fn enumerate(&self) -> Vec<(Assignment, &V)> {
        let mut result = Vec::new();
        let mut path = Assignment::new();
        collect_paths(&self.root, &mut path, &mut result);
        result
    }

    /// The discrete keys this tree branches on, in the order first met depth-first
    pub fn discrete_keys(&self) -> DiscreteKeys {
        let mut keys = IndexSet::new();
        collect_keys(&self.root, &mut keys);
        keys.into_iter().collect()
    }

    /// Structural equality, comparing leaves with `leaf_eq`.
    pub fn equals<F>(&self, other: &DecisionTree<V>, leaf_eq: F) -> bool
        where F: Fn(&V, &V) -> bool
    {
        nodes_equal(&self.root, &other.root, &leaf_eq)
    }

    pub fn format<F>(&self, s: &str, formatter: &KeyFormatter, leaf_fmt: F) -> String
        where F: Fn(&V) -> String
    {
        let mut out = String::new();
        if !s.is_empty() {
            out.push_str(s);
            out.push('\n');
        }
        format_node(&self.root, "", formatter, &leaf_fmt, &mut out);
        out
    }
}

impl<V: PartialEq> PartialEq for DecisionTree<V> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, |a, b| a == b)
    }
}


fn check_keys(keys: &[DiscreteKey]) -> Result<()> {
    let mut seen: IndexSet<Key> = IndexSet::new();
    for k in keys.iter() {
        if k.cardinality == 0 {
            return Err(ChimeraError::InvalidScope(format!("key {} has cardinality zero", k.key)));
        }
        if !seen.insert(k.key) {
            return Err(ChimeraError::DuplicateKey(k.key));
        }
    }
    Ok(())
}

fn build_from_iter<V, I>(keys: &[DiscreteKey], leaves: &mut I) -> Result<Arc<Node<V>>>
    where I: Iterator<Item = V>
{
    match keys.split_first() {
        None => {
            let value = leaves.next().ok_or_else(|| {
                ChimeraError::General(String::from("ran out of leaves while building a tree"))
            })?;
            Ok(Arc::new(Node::Leaf(value)))
        },
        Some((label, rest)) => {
            let mut branches = Vec::with_capacity(label.cardinality);
            for _ in 0..label.cardinality {
                branches.push(build_from_iter(rest, leaves)?);
            }
            Ok(Arc::new(Node::Choice { label: *label, branches }))
        }
    }
}

fn build_from_fn<V, F>(keys: &[DiscreteKey], path: &mut Assignment, f: &mut F) -> Arc<Node<V>>
    where F: FnMut(&Assignment) -> V
{
    match keys.split_first() {
        None => Arc::new(Node::Leaf(f(path))),
        Some((label, rest)) => {
            let mut branches = Vec::with_capacity(label.cardinality);
            for value in 0..label.cardinality {
                path.set(label.key, value);
                branches.push(build_from_fn(rest, path, f));
            }
            path.remove(label.key);
            Arc::new(Node::Choice { label: *label, branches })
        }
    }
}

fn map_node<V, W, F>(node: &Node<V>, f: &mut F) -> Arc<Node<W>>
    where F: FnMut(&V) -> W
{
    match node {
        Node::Leaf(value) => Arc::new(Node::Leaf(f(value))),
        Node::Choice { label, branches } => {
            let mut mapped = Vec::with_capacity(branches.len());
            for b in branches.iter() {
                mapped.push(map_node(b, f));
            }
            Arc::new(Node::Choice { label: *label, branches: mapped })
        }
    }
}

fn try_map_node<V, W, E, F>(node: &Node<V>, f: &mut F) -> result::Result<Arc<Node<W>>, E>
    where F: FnMut(&V) -> result::Result<W, E>
{
    match node {
        Node::Leaf(value) => Ok(Arc::new(Node::Leaf(f(value)?))),
        Node::Choice { label, branches } => {
            let mut mapped = Vec::with_capacity(branches.len());
            for b in branches.iter() {
                mapped.push(try_map_node(b, f)?);
            }
            Ok(Arc::new(Node::Choice { label: *label, branches: mapped }))
        }
    }
}

/// Fix `label` to `value` everywhere in the tree rooted at `node`. Subtrees that do not mention
/// the key are shared, not copied.
fn restrict<U>(node: &Arc<Node<U>>, label: &DiscreteKey, value: usize) -> Result<Arc<Node<U>>> {
    match node.as_ref() {
        Node::Leaf(_) => Ok(Arc::clone(node)),
        Node::Choice { label: own, branches } if own.key == label.key => {
            if own.cardinality != label.cardinality {
                return Err(ChimeraError::CardinalityMismatch {
                    key: label.key,
                    left: label.cardinality,
                    right: own.cardinality,
                });
            }
            Ok(Arc::clone(&branches[value]))
        },
        Node::Choice { label: own, branches } => {
            let mut restricted = Vec::with_capacity(branches.len());
            for b in branches.iter() {
                restricted.push(restrict(b, label, value)?);
            }
            Ok(Arc::new(Node::Choice { label: *own, branches: restricted }))
        }
    }
}

fn zip_nodes<V, U, W, F>(a: &Arc<Node<V>>, b: &Arc<Node<U>>, f: &mut F) -> Result<Arc<Node<W>>>
    where F: FnMut(&V, &U) -> W
{
    match (a.as_ref(), b.as_ref()) {
        (Node::Leaf(x), Node::Leaf(y)) => Ok(Arc::new(Node::Leaf(f(x, y)))),

        // branch on the left key first; the right tree is cut down to the matching value
        (Node::Choice { label, branches }, _) => {
            let mut zipped = Vec::with_capacity(branches.len());
            for (value, branch) in branches.iter().enumerate() {
                let other = restrict(b, label, value)?;
                zipped.push(zip_nodes(branch, &other, f)?);
            }
            Ok(Arc::new(Node::Choice { label: *label, branches: zipped }))
        },

        // the left side is a leaf, so it is reused under every branch of the right
        (Node::Leaf(_), Node::Choice { label, branches }) => {
            let mut zipped = Vec::with_capacity(branches.len());
            for branch in branches.iter() {
                zipped.push(zip_nodes(a, branch, f)?);
            }
            Ok(Arc::new(Node::Choice { label: *label, branches: zipped }))
        }
    }
}

fn count_leaves<V>(node: &Node<V>) -> usize {
    match node {
        Node::Leaf(_) => 1,
        Node::Choice { branches, .. } => branches.iter().map(|b| count_leaves(b)).sum(),
    }
}

fn collect_paths<'a, V>(node: &'a Node<V>, path: &mut Assignment, out: &mut Vec<(Assignment, &'a V)>) {
    match node {
        Node::Leaf(value) => out.push((path.clone(), value)),
        Node::Choice { label, branches } => {
            for (value, b) in branches.iter().enumerate() {
                path.set(label.key, value);
                collect_paths(b, path, out);
            }
            path.remove(label.key);
        }
    }
}

fn collect_keys<V>(node: &Node<V>, keys: &mut IndexSet<DiscreteKey>) {
    if let Node::Choice { label, branches } = node {
        keys.insert(*label);
        for b in branches.iter() {
            collect_keys(b, keys);
        }
    }
}

fn nodes_equal<V, F>(a: &Arc<Node<V>>, b: &Arc<Node<V>>, leaf_eq: &F) -> bool
    where F: Fn(&V, &V) -> bool
{
    if Arc::ptr_eq(a, b) {
        return true;
    }

    match (a.as_ref(), b.as_ref()) {
        (Node::Leaf(x), Node::Leaf(y)) => leaf_eq(x, y),
        (Node::Choice { label: la, branches: ba }, Node::Choice { label: lb, branches: bb }) => {
            la == lb && ba.iter().zip(bb.iter()).all(|(x, y)| nodes_equal(x, y, leaf_eq))
        },
        _ => false,
    }
}

fn format_node<V, F>(node: &Node<V>, prefix: &str, formatter: &KeyFormatter, leaf_fmt: &F, out: &mut String)
    where F: Fn(&V) -> String
{
    match node {
        Node::Leaf(value) => {
            out.push_str(&format!("{}Leaf {}\n", prefix, leaf_fmt(value)));
        },
        Node::Choice { label, branches } => {
            out.push_str(&format!("{}Choice({})\n", prefix, formatter(label.key)));
            for (value, b) in branches.iter().enumerate() {
                let child = format!("{} {} ", prefix, value);
                format_node(b, &child, formatter, leaf_fmt, out);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{all_assignments, default_key_formatter};
    use itertools::iproduct;

    fn key(c: char, i: u64) -> DiscreteKey {
        DiscreteKey::binary(Key::symbol(c, i))
    }

    fn assn(pairs: &[(DiscreteKey, usize)]) -> Assignment {
        Assignment::from_pairs(pairs.iter().map(|&(k, v)| (k.key, v)))
    }

    #[test]
    fn single_leaf() {
        let tree = DecisionTree::leaf(5);
        assert_eq!(tree.nr_leaves(), 1);
        assert_eq!(*tree.get(&Assignment::new()).expect("get"), 5);
        assert!(tree.discrete_keys().is_empty());
    }

    #[test]
    fn from_leaves_row_major() {
        let a = key('a', 0);
        let b = DiscreteKey::new(Key::symbol('b', 0), 3);
        let tree = DecisionTree::from_leaves(&[a, b], (0..6).collect()).expect("tree");

        assert_eq!(tree.nr_leaves(), 6);
        assert_eq!(tree.discrete_keys(), vec![a, b]);
        for (i, assignment) in all_assignments(&[a, b]).enumerate() {
            assert_eq!(*tree.get(&assignment).expect("get"), i);
        }
    }

    #[test]
    fn from_leaves_errors() {
        let a = key('a', 0);
        assert_eq!(
            DecisionTree::from_leaves(&[a], vec![1, 2, 3]).err(),
            Some(ChimeraError::DimensionMismatch { expected: 2, found: 3 })
        );
        assert_eq!(
            DecisionTree::from_leaves(&[a, a], vec![1, 2, 3, 4]).err(),
            Some(ChimeraError::DuplicateKey(a.key))
        );

        let empty = DiscreteKey::new(Key::symbol('z', 0), 0);
        assert!(DecisionTree::from_leaves(&[empty], Vec::<i32>::new()).is_err());
    }

    #[test]
    fn from_fn_matches_get() {
        let a = key('a', 0);
        let b = key('b', 0);
        let tree = DecisionTree::from_fn(&[a, b], |x| {
            10 * x.get(a.key).unwrap_or(9) + x.get(b.key).unwrap_or(9)
        }).expect("tree");

        assert_eq!(*tree.get(&assn(&[(a, 1), (b, 0)])).expect("get"), 10);
        assert_eq!(*tree.get(&assn(&[(b, 1), (a, 0)])).expect("get"), 1);
    }

    #[test]
    fn get_errors() {
        let a = key('a', 0);
        let tree = DecisionTree::from_leaves(&[a], vec![1, 2]).expect("tree");

        assert_eq!(tree.get(&Assignment::new()).err(), Some(ChimeraError::IncompleteAssignment(a.key)));
        assert!(tree.get(&assn(&[(a, 2)])).is_err());
    }

    #[test]
    fn apply_keeps_structure() {
        let a = key('a', 0);
        let tree = DecisionTree::from_leaves(&[a], vec![1, 2]).expect("tree");
        let doubled = tree.apply(|v| v * 2);
        assert_eq!(doubled.leaves(), vec![&2, &4]);
        assert_eq!(doubled.discrete_keys(), vec![a]);

        let failed: result::Result<DecisionTree<i32>, &str> = tree.try_apply(|&v| {
            if v == 2 { Err("two") } else { Ok(v) }
        });
        assert_eq!(failed.err(), Some("two"));
    }

    #[test]
    fn zip_disjoint_keys() {
        let x = key('x', 0);
        let y = key('y', 0);
        let left = DecisionTree::from_leaves(&[x], vec!["x0", "x1"]).expect("tree");
        let right = DecisionTree::from_leaves(&[y], vec!["y0", "y1"]).expect("tree");

        let zipped = left.zip(&right, |l, r| format!("{}{}", l, r)).expect("zip");
        assert_eq!(zipped.nr_leaves(), 4);
        for (vx, vy) in iproduct!(0..2, 0..2) {
            let leaf = zipped.get(&assn(&[(x, vx), (y, vy)])).expect("get");
            assert_eq!(*leaf, format!("x{}y{}", vx, vy));
        }
    }

    #[test]
    fn zip_shared_key() {
        let x = key('x', 0);
        let left = DecisionTree::from_leaves(&[x], vec![1, 2]).expect("tree");
        let right = DecisionTree::from_leaves(&[x], vec![10, 20]).expect("tree");

        let zipped = left.zip(&right, |l, r| l + r).expect("zip");
        assert_eq!(zipped.nr_leaves(), 2);
        assert_eq!(zipped.leaves(), vec![&11, &22]);
    }

    #[test]
    fn zip_partial_overlap_in_other_order() {
        let x = key('x', 0);
        let y = key('y', 0);
        let z = key('z', 0);

        // left branches x then y, right branches y then z
        let left = DecisionTree::from_fn(&[x, y], |a| (a.get(x.key), a.get(y.key))).expect("tree");
        let right = DecisionTree::from_fn(&[y, z], |a| (a.get(y.key), a.get(z.key))).expect("tree");

        let zipped = left.zip(&right, |l, r| (*l, *r)).expect("zip");
        assert_eq!(zipped.nr_leaves(), 8);

        let mut keys = zipped.discrete_keys();
        keys.sort_by_key(|k| k.key);
        assert_eq!(keys, vec![x, y, z]);

        for assignment in all_assignments(&[x, y, z]) {
            let (l, r) = zipped.get(&assignment).expect("get");
            assert_eq!(l.0, assignment.get(x.key));
            assert_eq!(l.1, assignment.get(y.key));
            assert_eq!(r.0, assignment.get(y.key));
            assert_eq!(r.1, assignment.get(z.key));
        }

        // no path branches on the same key twice
        for (path, _) in zipped.enumerate() {
            assert_eq!(path.len(), 3);
        }
    }

    #[test]
    fn zip_with_leaf_reuses_value() {
        let x = DiscreteKey::new(Key::symbol('x', 0), 3);
        let left = DecisionTree::leaf(100);
        let right = DecisionTree::from_leaves(&[x], vec![1, 2, 3]).expect("tree");

        let zipped = left.zip(&right, |l, r| l + r).expect("zip");
        assert_eq!(zipped.leaves(), vec![&101, &102, &103]);
    }

    #[test]
    fn zip_cardinality_mismatch() {
        let k = Key::symbol('x', 0);
        let left = DecisionTree::from_leaves(&[DiscreteKey::new(k, 2)], vec![1, 2]).expect("tree");
        let right = DecisionTree::from_leaves(&[DiscreteKey::new(k, 3)], vec![1, 2, 3]).expect("tree");

        match left.zip(&right, |l, r| l + r) {
            Err(ChimeraError::CardinalityMismatch { left: 2, right: 3, .. }) => (),
            other => panic!("unexpected result {:?}", other.map(|t| t.nr_leaves())),
        }
    }

    #[test]
    fn equality() {
        let a = key('a', 0);
        let t1 = DecisionTree::from_leaves(&[a], vec![1.0, 2.0]).expect("tree");
        let t2 = DecisionTree::from_leaves(&[a], vec![1.0, 2.0 + 1e-6]).expect("tree");

        assert!(t1.equals(&t1.clone(), |x, y| x == y));
        assert!(t1.equals(&t2, |x: &f64, y: &f64| (x - y).abs() < 1e-5));
        assert!(!t1.equals(&t2, |x: &f64, y: &f64| (x - y).abs() < 1e-7));
        assert!(t1 != DecisionTree::leaf(1.0));
    }

    #[test]
    fn format() {
        let a = key('m', 1);
        let tree = DecisionTree::from_leaves(&[a], vec![1, 2]).expect("tree");
        let text = tree.format("tree", &default_key_formatter, |v| v.to_string());
        assert_eq!(text, "tree\nChoice(m1)\n 0 Leaf 1\n 1 Leaf 2\n");
    }
}
