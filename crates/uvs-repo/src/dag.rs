//! Snapshot history as a directed acyclic graph, and common-ancestor search.
//!
//! Edges point from a snapshot to its parents. Every query here expects the
//! nodes it is given to exist; asking about an unknown node is a programming
//! error and panics.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Adjacency-list DAG that counts how many neighbor lookups it serves.
#[derive(Debug, Clone)]
pub struct Dag<N> {
    edges: HashMap<N, Vec<N>>,
    lookups: Cell<usize>,
}

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
            lookups: Cell::new(0),
        }
    }
}

impl<N: Clone + Eq + Hash + Ord + Debug> Dag<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: impl IntoIterator<Item = (N, Vec<N>)>) -> Self {
        let mut dag = Self::new();
        for (node, targets) in edges {
            dag.add(node, targets);
        }
        dag
    }

    /// Add `node` with edges to `targets`. Targets not yet known become
    /// nodes without edges of their own.
    pub fn add(&mut self, node: N, targets: Vec<N>) {
        for target in &targets {
            self.edges.entry(target.clone()).or_default();
        }
        self.edges.entry(node).or_default().extend(targets);
    }

    pub fn contains(&self, node: &N) -> bool {
        self.edges.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.edges.keys()
    }

    /// Edge targets of `node`. Panics if `node` is not in the graph.
    pub fn neighbors(&self, node: &N) -> &[N] {
        self.lookups.set(self.lookups.get() + 1);
        match self.edges.get(node) {
            Some(targets) => targets,
            None => panic!("node {node:?} is not in the graph"),
        }
    }

    /// Number of [`Dag::neighbors`] calls since creation or the last reset.
    pub fn lookup_count(&self) -> usize {
        self.lookups.get()
    }

    pub fn reset_lookup_count(&self) {
        self.lookups.set(0);
    }

    /// The same graph with every edge reversed (parents to children).
    pub fn inverted(&self) -> Dag<N> {
        let mut inverted = Dag::new();
        for node in self.edges.keys() {
            inverted.edges.entry(node.clone()).or_default();
        }
        for (node, targets) in &self.edges {
            for target in targets {
                inverted
                    .edges
                    .entry(target.clone())
                    .or_default()
                    .push(node.clone());
            }
        }
        inverted
    }

    fn assert_known(&self, node: &N) {
        assert!(self.contains(node), "node {node:?} is not in the graph");
    }
}

/// `start` and everything reachable from it.
pub fn reachable<N: Clone + Eq + Hash + Ord + Debug>(dag: &Dag<N>, start: &N) -> HashSet<N> {
    dag.assert_known(start);
    let mut seen = HashSet::from([start.clone()]);
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(node) = queue.pop_front() {
        for next in dag.neighbors(&node) {
            if seen.insert(next.clone()) {
                queue.push_back(next.clone());
            }
        }
    }
    seen
}

/// True if `candidate` can be reached from `ancestor` in the inverted
/// (parent to child) graph.
///
/// Panics if the two nodes are equal or either is missing.
pub fn is_descendant<N: Clone + Eq + Hash + Ord + Debug>(
    inverted: &Dag<N>,
    ancestor: &N,
    candidate: &N,
) -> bool {
    assert!(
        ancestor != candidate,
        "is_descendant called with identical nodes {ancestor:?}"
    );
    inverted.assert_known(candidate);
    reachable(inverted, ancestor).contains(candidate)
}

/// Full ancestor set of `a`, then a breadth-first walk up from `b` that
/// stops at the first node in that set.
pub fn find_eca_naive<N: Clone + Eq + Hash + Ord + Debug>(dag: &Dag<N>, a: &N, b: &N) -> N {
    let ancestors_a = reachable(dag, a);
    dag.assert_known(b);

    let mut seen = HashSet::from([b.clone()]);
    let mut queue = VecDeque::from([b.clone()]);
    while let Some(node) = queue.pop_front() {
        if ancestors_a.contains(&node) {
            return node;
        }
        for parent in dag.neighbors(&node) {
            if seen.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
    }
    panic!("{a:?} and {b:?} have no common ancestor");
}

/// Two breadth-first walks advanced in lockstep; the first node popped by
/// one walk that the other has already seen wins.
pub fn find_eca_fast<N: Clone + Eq + Hash + Ord + Debug>(dag: &Dag<N>, a: &N, b: &N) -> N {
    dag.assert_known(a);
    dag.assert_known(b);

    let mut seen_a = HashSet::from([a.clone()]);
    let mut seen_b = HashSet::from([b.clone()]);
    let mut queue_a = VecDeque::from([a.clone()]);
    let mut queue_b = VecDeque::from([b.clone()]);

    while !queue_a.is_empty() || !queue_b.is_empty() {
        if let Some(node) = queue_a.pop_front() {
            if seen_b.contains(&node) {
                return node;
            }
            for parent in dag.neighbors(&node) {
                if seen_a.insert(parent.clone()) {
                    queue_a.push_back(parent.clone());
                }
            }
        }
        if let Some(node) = queue_b.pop_front() {
            if seen_a.contains(&node) {
                return node;
            }
            for parent in dag.neighbors(&node) {
                if seen_b.insert(parent.clone()) {
                    queue_b.push_back(parent.clone());
                }
            }
        }
    }
    panic!("{a:?} and {b:?} have no common ancestor");
}

/// Every lowest common ancestor of `a` and `b`: common ancestors that are
/// not a strict ancestor of another common ancestor.
///
/// Nodes reachable from `a` are colored once, those also reachable from `b`
/// twice; anything strictly above a twice-colored node is then discarded.
pub fn find_eca_three_color<N: Clone + Eq + Hash + Ord + Debug>(
    dag: &Dag<N>,
    a: &N,
    b: &N,
) -> BTreeSet<N> {
    let single = reachable(dag, a);
    let double: BTreeSet<N> = reachable(dag, b)
        .into_iter()
        .filter(|n| single.contains(n))
        .collect();
    assert!(!double.is_empty(), "{a:?} and {b:?} have no common ancestor");

    let mut denied: HashSet<N> = HashSet::new();
    for node in &double {
        let mut queue: VecDeque<N> = dag.neighbors(node).iter().cloned().collect();
        while let Some(above) = queue.pop_front() {
            // Everything above an already denied node was denied with it
            if denied.insert(above.clone()) {
                queue.extend(dag.neighbors(&above).iter().cloned());
            }
        }
    }

    double.into_iter().filter(|n| !denied.contains(n)).collect()
}

/// The merge base used by the engine: the smallest lowest common ancestor.
pub fn find_merge_base<N: Clone + Eq + Hash + Ord + Debug>(dag: &Dag<N>, a: &N, b: &N) -> N {
    match find_eca_three_color(dag, a, b).into_iter().next() {
        Some(base) => base,
        None => unreachable!("three-color search never returns an empty set"),
    }
}
