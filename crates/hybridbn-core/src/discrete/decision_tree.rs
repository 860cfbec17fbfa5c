//! # Decision Trees
//!
//! A [`DecisionTree<V>`] is an immutable function from discrete assignments to
//! values of type `V`. Internal nodes branch on a [`DiscreteKey`] and hold one
//! child per value; leaves hold a `V`.
//!
//! ## Canonical form
//!
//! - Along every root-to-leaf path, labels appear in strictly ascending key
//!   order.
//! - A choice node whose children are all identical collapses into that child,
//!   so a value that does not depend on a key never branches on it.
//! - Children are reference counted. Operations that rebuild a tree memoize
//!   per source node, so subtrees shared in the input stay shared in the
//!   output.
//!
//! Trees are never mutated after construction; every operation returns a new
//! tree that may share nodes with its operands.
//!
//! ## Combining
//!
//! [`DecisionTree::apply`] merges two trees over the union of their keys.
//! When a key is present in only one operand, the other operand is constant
//! along that axis.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::discrete::key::{
    assignment_count, canonical_keys, format_key, Assignments, DiscreteKey, DiscreteValues, Key,
};
use crate::errors::{HybridError, Result};

type Branches<V> = SmallVec<[Arc<Node<V>>; 4]>;

#[derive(Debug)]
enum Node<V> {
    Leaf(V),
    Choice {
        label: DiscreteKey,
        branches: Branches<V>,
    },
}

impl<V> Node<V> {
    fn label(&self) -> Option<DiscreteKey> {
        match self {
            Node::Leaf(_) => None,
            Node::Choice { label, .. } => Some(*label),
        }
    }
}

/// Child of `node` for `key = value`, or `node` itself when it does not branch
/// on `key` (broadcast along that axis).
fn branch_of<V>(node: &Arc<Node<V>>, key: Key, value: usize) -> &Arc<Node<V>> {
    match node.as_ref() {
        Node::Choice { label, branches } if label.key == key => &branches[value],
        _ => node,
    }
}

fn node_eq<V, W>(a: &Node<V>, b: &Node<W>, eq: &impl Fn(&V, &W) -> bool) -> bool {
    match (a, b) {
        (Node::Leaf(x), Node::Leaf(y)) => eq(x, y),
        (
            Node::Choice {
                label: la,
                branches: ba,
            },
            Node::Choice {
                label: lb,
                branches: bb,
            },
        ) => {
            la == lb
                && ba.len() == bb.len()
                && ba.iter().zip(bb.iter()).all(|(x, y)| node_eq(x, y, eq))
        }
        _ => false,
    }
}

fn same_node<V: PartialEq>(a: &Arc<Node<V>>, b: &Arc<Node<V>>) -> bool {
    Arc::ptr_eq(a, b) || node_eq(a, b, &|x: &V, y: &V| x == y)
}

/// Builds a choice node, collapsing it when every branch is identical.
fn make_choice<V: PartialEq>(label: DiscreteKey, branches: Branches<V>) -> Arc<Node<V>> {
    let collapsed = branches
        .split_first()
        .filter(|(first, rest)| rest.iter().all(|b| same_node(b, first)))
        .map(|(first, _)| first.clone());
    collapsed.unwrap_or_else(|| Arc::new(Node::Choice { label, branches }))
}

fn node_id<V>(node: &Arc<Node<V>>) -> usize {
    Arc::as_ptr(node) as usize
}

/// Immutable, structurally shared function table over discrete assignments.
#[derive(Debug)]
pub struct DecisionTree<V> {
    root: Arc<Node<V>>,
}

impl<V> Clone for DecisionTree<V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<V: PartialEq> PartialEq for DecisionTree<V> {
    fn eq(&self, other: &Self) -> bool {
        same_node(&self.root, &other.root)
    }
}

impl<V> DecisionTree<V> {
    /// A constant tree.
    pub fn leaf(value: V) -> Self {
        Self {
            root: Arc::new(Node::Leaf(value)),
        }
    }

    /// Whether the tree is a single leaf, i.e. independent of every key.
    pub fn is_leaf(&self) -> bool {
        matches!(self.root.as_ref(), Node::Leaf(_))
    }

    /// Looks up the leaf selected by `values`.
    ///
    /// Only keys on the traversed path are consulted; any other entries in
    /// `values` are ignored. O(depth).
    pub fn get(&self, values: &DiscreteValues) -> Result<&V> {
        let mut node = &self.root;
        loop {
            match node.as_ref() {
                Node::Leaf(v) => return Ok(v),
                Node::Choice { label, branches } => {
                    node = &branches[label.value_in(values)?];
                }
            }
        }
    }

    /// Distinct labels in the tree, ascending by key.
    pub fn keys(&self) -> Vec<DiscreteKey> {
        let mut labels = FxHashMap::default();
        let mut stack = vec![&self.root];
        let mut seen = FxHashSet::default();
        while let Some(node) = stack.pop() {
            if !seen.insert(node_id(node)) {
                continue;
            }
            if let Node::Choice { label, branches } = node.as_ref() {
                labels.insert(label.key, *label);
                stack.extend(branches.iter());
            }
        }
        let mut keys: Vec<DiscreteKey> = labels.into_values().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of root-to-leaf paths.
    pub fn nr_leaves(&self) -> usize {
        fn count<V>(node: &Node<V>) -> usize {
            match node {
                Node::Leaf(_) => 1,
                Node::Choice { branches, .. } => branches.iter().map(|b| count(b)).sum(),
            }
        }
        count(&self.root)
    }

    /// Visits every root-to-leaf path in canonical order. The assignment holds
    /// only the keys branched on along the path.
    pub fn for_each_leaf(&self, mut f: impl FnMut(&DiscreteValues, &V)) {
        fn walk<V>(
            node: &Node<V>,
            path: &mut DiscreteValues,
            f: &mut impl FnMut(&DiscreteValues, &V),
        ) {
            match node {
                Node::Leaf(v) => f(path, v),
                Node::Choice { label, branches } => {
                    for (value, branch) in branches.iter().enumerate() {
                        path.insert(label.key, value);
                        walk(branch, path, f);
                    }
                    path.remove(&label.key);
                }
            }
        }
        walk(&self.root, &mut DiscreteValues::new(), &mut f);
    }

    /// Leaves in path order.
    pub fn leaves(&self) -> Vec<&V> {
        fn walk<'a, V>(node: &'a Node<V>, out: &mut Vec<&'a V>) {
            match node {
                Node::Leaf(v) => out.push(v),
                Node::Choice { branches, .. } => {
                    for branch in branches {
                        walk(branch, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Compares shape, labels and leaves using a caller-supplied leaf predicate.
    pub fn equals_with<W>(&self, other: &DecisionTree<W>, eq: impl Fn(&V, &W) -> bool) -> bool {
        node_eq(&self.root, &other.root, &eq)
    }
}

impl<V: PartialEq> DecisionTree<V> {
    /// Builds a tree from row-major values over `keys`.
    ///
    /// The first key in `keys` is the most significant digit. `keys` may be in
    /// any order; the resulting tree branches in canonical order.
    pub fn from_values(keys: &[DiscreteKey], values: Vec<V>) -> Result<Self>
    where
        V: Clone,
    {
        let expected = assignment_count(keys);
        if values.len() != expected {
            return Err(HybridError::Validation(format!(
                "decision tree over {} keys needs {} values, got {}",
                keys.len(),
                expected,
                values.len()
            )));
        }
        Self::try_from_fn(keys, |assignment| {
            let mut index = 0;
            for dk in keys {
                index = index * dk.cardinality + assignment[&dk.key];
            }
            Ok(values[index].clone())
        })
    }

    /// Builds a tree by evaluating `f` at every joint assignment of `keys`.
    pub fn from_fn(keys: &[DiscreteKey], mut f: impl FnMut(&DiscreteValues) -> V) -> Result<Self> {
        let keys = canonical_keys(keys.iter().copied())?;
        let built: std::result::Result<_, Infallible> =
            build(&keys, &mut DiscreteValues::new(), &mut |a| Ok(f(a)));
        match built {
            Ok(root) => Ok(Self { root }),
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`DecisionTree::from_fn`].
    pub fn try_from_fn(
        keys: &[DiscreteKey],
        mut f: impl FnMut(&DiscreteValues) -> Result<V>,
    ) -> Result<Self> {
        let keys = canonical_keys(keys.iter().copied())?;
        let root = build(&keys, &mut DiscreteValues::new(), &mut f)?;
        Ok(Self { root })
    }

    /// Pointwise combination over the union of both trees' keys.
    ///
    /// Fails with [`HybridError::Validation`] when a key both trees branch on
    /// has different cardinalities in each.
    pub fn apply<W, U: PartialEq>(
        &self,
        other: &DecisionTree<W>,
        op: impl Fn(&V, &W) -> U,
    ) -> Result<DecisionTree<U>> {
        let mut memo = FxHashMap::default();
        Ok(DecisionTree {
            root: apply_nodes(&self.root, &other.root, &op, &mut memo)?,
        })
    }

    /// Maps every leaf, re-canonicalizing the result.
    pub fn map<U: PartialEq>(&self, f: impl Fn(&V) -> U) -> DecisionTree<U> {
        fn go<V, U: PartialEq>(
            node: &Arc<Node<V>>,
            f: &impl Fn(&V) -> U,
            memo: &mut FxHashMap<usize, Arc<Node<U>>>,
        ) -> Arc<Node<U>> {
            if let Some(done) = memo.get(&node_id(node)) {
                return done.clone();
            }
            let out = match node.as_ref() {
                Node::Leaf(v) => Arc::new(Node::Leaf(f(v))),
                Node::Choice { label, branches } => {
                    let mapped = branches.iter().map(|b| go(b, f, memo)).collect();
                    make_choice(*label, mapped)
                }
            };
            memo.insert(node_id(node), out.clone());
            out
        }
        let mut memo = FxHashMap::default();
        DecisionTree {
            root: go(&self.root, &f, &mut memo),
        }
    }

    /// Fallible variant of [`DecisionTree::map`]; stops at the first error.
    pub fn try_map<U: PartialEq>(&self, f: impl Fn(&V) -> Result<U>) -> Result<DecisionTree<U>> {
        fn go<V, U: PartialEq>(
            node: &Arc<Node<V>>,
            f: &impl Fn(&V) -> Result<U>,
            memo: &mut FxHashMap<usize, Arc<Node<U>>>,
        ) -> Result<Arc<Node<U>>> {
            if let Some(done) = memo.get(&node_id(node)) {
                return Ok(done.clone());
            }
            let out = match node.as_ref() {
                Node::Leaf(v) => Arc::new(Node::Leaf(f(v)?)),
                Node::Choice { label, branches } => {
                    let mapped = branches
                        .iter()
                        .map(|b| go(b, f, memo))
                        .collect::<Result<Branches<U>>>()?;
                    make_choice(*label, mapped)
                }
            };
            memo.insert(node_id(node), out.clone());
            Ok(out)
        }
        let mut memo = FxHashMap::default();
        Ok(DecisionTree {
            root: go(&self.root, &f, &mut memo)?,
        })
    }

    /// Maps every leaf together with the (partial) assignment leading to it.
    pub fn map_with_assignment<U: PartialEq>(
        &self,
        f: impl Fn(&DiscreteValues, &V) -> U,
    ) -> DecisionTree<U> {
        fn go<V, U: PartialEq>(
            node: &Node<V>,
            path: &mut DiscreteValues,
            f: &impl Fn(&DiscreteValues, &V) -> U,
        ) -> Arc<Node<U>> {
            match node {
                Node::Leaf(v) => Arc::new(Node::Leaf(f(path, v))),
                Node::Choice { label, branches } => {
                    let mut mapped = Branches::with_capacity(branches.len());
                    for (value, branch) in branches.iter().enumerate() {
                        path.insert(label.key, value);
                        mapped.push(go(branch, path, f));
                    }
                    path.remove(&label.key);
                    make_choice(*label, mapped)
                }
            }
        }
        DecisionTree {
            root: go(&self.root, &mut DiscreteValues::new(), &f),
        }
    }

    /// Fixes the keys present in `values`, returning the remaining subtree.
    pub fn restrict(&self, values: &DiscreteValues) -> Result<Self> {
        fn go<V: PartialEq>(node: &Arc<Node<V>>, values: &DiscreteValues) -> Result<Arc<Node<V>>> {
            match node.as_ref() {
                Node::Leaf(_) => Ok(node.clone()),
                Node::Choice { label, branches } => {
                    if values.contains_key(&label.key) {
                        go(&branches[label.value_in(values)?], values)
                    } else {
                        let kept = branches
                            .iter()
                            .map(|b| go(b, values))
                            .collect::<Result<Branches<V>>>()?;
                        Ok(make_choice(*label, kept))
                    }
                }
            }
        }
        Ok(Self {
            root: go(&self.root, values)?,
        })
    }

    /// Every full assignment over `keys` paired with its leaf, in canonical
    /// order. `keys` must cover every label of the tree.
    pub fn enumerate(&self, keys: &[DiscreteKey]) -> Result<Vec<(DiscreteValues, &V)>> {
        let keys = canonical_keys(keys.iter().copied())?;
        Assignments::new(&keys)
            .map(|assignment| {
                let leaf = self.get(&assignment)?;
                Ok((assignment, leaf))
            })
            .collect()
    }
}

fn build<V: PartialEq, E>(
    keys: &[DiscreteKey],
    assignment: &mut DiscreteValues,
    f: &mut impl FnMut(&DiscreteValues) -> std::result::Result<V, E>,
) -> std::result::Result<Arc<Node<V>>, E> {
    match keys.split_first() {
        None => Ok(Arc::new(Node::Leaf(f(assignment)?))),
        Some((label, rest)) => {
            let mut branches = Branches::with_capacity(label.cardinality);
            for value in 0..label.cardinality {
                assignment.insert(label.key, value);
                branches.push(build(rest, assignment, f)?);
            }
            assignment.remove(&label.key);
            Ok(make_choice(*label, branches))
        }
    }
}

fn apply_nodes<V, W, U: PartialEq>(
    a: &Arc<Node<V>>,
    b: &Arc<Node<W>>,
    op: &impl Fn(&V, &W) -> U,
    memo: &mut FxHashMap<(usize, usize), Arc<Node<U>>>,
) -> Result<Arc<Node<U>>> {
    let id = (node_id(a), node_id(b));
    if let Some(done) = memo.get(&id) {
        return Ok(done.clone());
    }
    let label = match (a.label(), b.label()) {
        (Some(la), Some(lb)) if la.key == lb.key && la.cardinality != lb.cardinality => {
            return Err(HybridError::Validation(format!(
                "discrete key {} has conflicting cardinalities {} and {}",
                format_key(la.key),
                la.cardinality,
                lb.cardinality
            )));
        }
        (Some(la), Some(lb)) => Some(if la.key <= lb.key { la } else { lb }),
        (Some(la), None) => Some(la),
        (None, Some(lb)) => Some(lb),
        (None, None) => None,
    };
    let out = match (label, a.as_ref(), b.as_ref()) {
        (Some(label), _, _) => {
            let mut branches = Branches::with_capacity(label.cardinality);
            for value in 0..label.cardinality {
                branches.push(apply_nodes(
                    branch_of(a, label.key, value),
                    branch_of(b, label.key, value),
                    op,
                    memo,
                )?);
            }
            make_choice(label, branches)
        }
        (None, Node::Leaf(x), Node::Leaf(y)) => Arc::new(Node::Leaf(op(x, y))),
        (None, _, _) => {
            return Err(HybridError::Validation(
                "choice node without a label".into(),
            ))
        }
    };
    memo.insert(id, out.clone());
    Ok(out)
}

impl<V: fmt::Display> fmt::Display for DecisionTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render<V: fmt::Display>(
            node: &Node<V>,
            depth: usize,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            match node {
                Node::Leaf(v) => writeln!(f, "Leaf {}", v),
                Node::Choice { label, branches } => {
                    writeln!(f, "Choice({})", format_key(label.key))?;
                    for (value, branch) in branches.iter().enumerate() {
                        write!(f, "{:indent$}{} ", "", value, indent = depth + 1)?;
                        render(branch, depth + 1, f)?;
                    }
                    Ok(())
                }
            }
        }
        render(&self.root, 0, f)
    }
}
