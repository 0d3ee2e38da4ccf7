use crate::{ColumnOrder, Direction, Vertical};
use std::collections::HashMap;

/// What one traversal knows about an attribute set, with respect to its right-hand side.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeCategory {
    /// Not classified yet.
    Unvisited,
    /// A dependency whose immediate subsets haven't all been checked.
    CandidateMinimalDependency,
    /// A dependency with a dependency among its subsets.
    Dependency,
    /// A dependency none of whose subsets is one.
    MinimalDependency,
    /// A non-dependency whose immediate supersets haven't all been checked.
    CandidateMaximalNonDependency,
    /// A non-dependency with a non-dependency among its supersets.
    NonDependency,
    /// A non-dependency all of whose supersets are dependencies.
    MaximalNonDependency,
}

impl NodeCategory {
    /// Returns `true` for every category of attribute set which determines the right-hand side.
    pub fn is_dependency(self) -> bool {
        matches!(
            self,
            NodeCategory::CandidateMinimalDependency
                | NodeCategory::Dependency
                | NodeCategory::MinimalDependency
        )
    }

    /// Returns `true` for every category of attribute set which doesn't determine the right-hand
    /// side.
    pub fn is_non_dependency(self) -> bool {
        matches!(
            self,
            NodeCategory::CandidateMaximalNonDependency
                | NodeCategory::NonDependency
                | NodeCategory::MaximalNonDependency
        )
    }

    /// Returns `true` for the categories which no later observation can change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeCategory::MinimalDependency | NodeCategory::MaximalNonDependency
        )
    }

    /// Returns `true` for the categories still waiting on their neighbours.
    pub fn is_candidate(self) -> bool {
        matches!(
            self,
            NodeCategory::CandidateMinimalDependency | NodeCategory::CandidateMaximalNonDependency
        )
    }
}

/// The classification of every attribute set visited while searching for the left-hand sides of
/// one right-hand side.
///
/// The empty attribute set is never recorded. The traversal only runs for non-constant right-hand
/// sides, which the empty set never determines, so it's treated as a known non-dependency.
#[derive(Clone, Debug, Default)]
pub struct Observations {
    categories: HashMap<Vertical, NodeCategory>,
}

impl Observations {
    /// Creates an empty table.
    pub fn new() -> Self {
        Observations::default()
    }

    /// The number of attribute sets recorded.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Returns what is known about `node`.
    pub fn classify(&self, node: &Vertical) -> NodeCategory {
        self.categories
            .get(node)
            .copied()
            .unwrap_or(NodeCategory::Unvisited)
    }

    /// Records a category for `node`, replacing any earlier one.
    pub fn record(&mut self, node: Vertical, category: NodeCategory) {
        debug_assert!(!node.is_empty());
        if category == NodeCategory::Unvisited {
            self.categories.remove(&node);
        } else {
            self.categories.insert(node, category);
        }
    }

    fn classify_or_empty(&self, node: &Vertical) -> NodeCategory {
        if node.is_empty() {
            NodeCategory::NonDependency
        } else {
            self.classify(node)
        }
    }

    /// Classifies `node`, which is known to be a dependency, according to its immediate subsets,
    /// and records the result.
    ///
    /// If any subset is a dependency, so is `node`, but it isn't minimal. If every subset is a
    /// known non-dependency, `node` is a minimal dependency and this returns `true`. Otherwise it
    /// stays a candidate until the rest of its subsets are checked.
    pub fn try_promote_to_minimal(&mut self, node: &Vertical) -> bool {
        let mut unchecked = false;
        for subset in node.immediate_subsets() {
            let category = self.classify_or_empty(&subset);
            if category.is_dependency() {
                self.record(node.clone(), NodeCategory::Dependency);
                return false;
            }
            unchecked |= category == NodeCategory::Unvisited;
        }
        if unchecked {
            self.record(node.clone(), NodeCategory::CandidateMinimalDependency);
            false
        } else {
            self.record(node.clone(), NodeCategory::MinimalDependency);
            true
        }
    }

    /// Classifies `node`, which is known not to determine column `rhs`, according to its immediate
    /// supersets, and records the result.
    ///
    /// This mirrors [`try_promote_to_minimal`][Observations::try_promote_to_minimal]: `node` is a
    /// maximal non-dependency once every superset which doesn't contain `rhs` is known to be a
    /// dependency.
    pub fn try_promote_to_maximal(&mut self, node: &Vertical, rhs: usize) -> bool {
        let excluded = Vertical::single(node.arity(), rhs);
        let mut unchecked = false;
        for superset in node.immediate_supersets(&excluded) {
            let category = self.classify(&superset);
            if category.is_non_dependency() {
                self.record(node.clone(), NodeCategory::NonDependency);
                return false;
            }
            unchecked |= category == NodeCategory::Unvisited;
        }
        if unchecked {
            self.record(node.clone(), NodeCategory::CandidateMaximalNonDependency);
            false
        } else {
            self.record(node.clone(), NodeCategory::MaximalNonDependency);
            true
        }
    }

    /// Lists the immediate subsets of `node` that haven't been visited, removing columns in
    /// descending order of distinct count. The empty set is never listed.
    pub fn unchecked_subsets(&self, node: &Vertical, order: &ColumnOrder) -> Vec<Vertical> {
        if node.len() < 2 {
            return Vec::new();
        }
        order
            .project(node, Direction::HighDistinctCount)
            .into_iter()
            .map(|column| node.without_column(column))
            .filter(|subset| !self.categories.contains_key(subset))
            .collect()
    }

    /// Lists the immediate supersets of `node` that don't contain column `rhs` and haven't been
    /// visited, adding columns in descending order of distinct count.
    pub fn unchecked_supersets(
        &self,
        node: &Vertical,
        rhs: usize,
        order: &ColumnOrder,
    ) -> Vec<Vertical> {
        let addable = node.with_column(rhs).complement();
        order
            .project(&addable, Direction::HighDistinctCount)
            .into_iter()
            .map(|column| node.with_column(column))
            .filter(|superset| !self.categories.contains_key(superset))
            .collect()
    }
}
