use crate::{
    ColumnOrder, DependencyIndex, Direction, NodeCategory, NonDependencyIndex, Observations,
    PartitionCache, Vertical,
};
use log::{debug, trace};
use rand::Rng;
use std::collections::HashSet;

/// Counters describing the work done by one [`LatticeTraversal`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TraversalStats {
    /// Attribute sets classified for the first time.
    pub nodes_visited: usize,
    /// Classifications that needed partitions.
    pub partition_tests: usize,
    /// Classifications answered by a pruning index instead.
    pub pruned: usize,
    /// Rounds of seeds generated after the first.
    pub seed_rounds: usize,
}

/// Searches the lattice of attribute sets for every minimal left-hand side of one column.
///
/// The search is a random walk: from a seed it moves down from dependencies looking for smaller
/// ones, and up from non-dependencies looking for larger ones, backtracking along the path it
/// came. Each attribute set is classified once, either with partitions or by what the pruning
/// indices already imply. When the walks run out of seeds, new ones come from the maximal
/// non-dependencies found so far: every minimal left-hand side must escape all of them, and the
/// smallest sets that do are exactly the places left to look. Once all of those are known minimal
/// dependencies, the search is complete.
///
/// The walk order depends on the random number generator, but the result doesn't.
///
/// The right-hand side must not be constant: the traversal assumes the empty set is a
/// non-dependency.
pub struct LatticeTraversal<'a, R> {
    rhs: usize,
    cache: &'a PartitionCache,
    order: &'a ColumnOrder,
    // Every column but the right-hand side.
    universe: Vertical,
    observations: Observations,
    dependencies: DependencyIndex,
    non_dependencies: NonDependencyIndex,
    trace: Vec<Vertical>,
    minimal: HashSet<Vertical>,
    maximal: HashSet<Vertical>,
    // Popped from the end.
    seeds: Vec<Vertical>,
    rng: R,
    stats: TraversalStats,
}

impl<'a, R: Rng> LatticeTraversal<'a, R> {
    /// Prepares a search for left-hand sides of column `rhs`.
    ///
    /// Columns in `unique` determine every other column, so they're recorded as minimal
    /// dependencies up front and never visited.
    pub fn new(
        rhs: usize,
        cache: &'a PartitionCache,
        order: &'a ColumnOrder,
        unique: &Vertical,
        bucket_threshold: usize,
        rng: R,
    ) -> Self {
        let arity = unique.arity();
        let universe = Vertical::single(arity, rhs).complement();
        let mut traversal = LatticeTraversal {
            rhs,
            cache,
            order,
            observations: Observations::new(),
            dependencies: DependencyIndex::new(arity, bucket_threshold),
            non_dependencies: NonDependencyIndex::new(arity, rhs, bucket_threshold),
            trace: Vec::new(),
            minimal: HashSet::new(),
            maximal: HashSet::new(),
            seeds: Vec::new(),
            rng,
            stats: TraversalStats::default(),
            universe,
        };

        let unique = unique.intersection(&traversal.universe);
        for column in unique.iter() {
            let node = Vertical::single(arity, column);
            traversal
                .observations
                .record(node.clone(), NodeCategory::MinimalDependency);
            traversal.dependencies.add(&node);
            traversal.minimal.insert(node);
        }

        let candidates = traversal.universe.difference(&unique);
        traversal.seeds = order
            .project(&candidates, Direction::LowDistinctCount)
            .into_iter()
            .map(|column| Vertical::single(arity, column))
            .collect();
        traversal
    }

    /// The right-hand-side column.
    pub fn rhs(&self) -> usize {
        self.rhs
    }

    /// Counters for the work done so far.
    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }

    /// What this traversal has learned about each attribute set it touched.
    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    /// Runs the search to completion and returns every minimal left-hand side, sorted.
    pub fn run(&mut self) -> Vec<Vertical> {
        loop {
            while let Some(seed) = self.seeds.pop() {
                self.walk(seed);
            }
            self.seeds = self.next_seeds();
            if self.seeds.is_empty() {
                break;
            }
            self.stats.seed_rounds += 1;
            debug!(
                "rhs {}: {} new seeds after {} maximal non-dependencies",
                self.rhs,
                self.seeds.len(),
                self.maximal.len()
            );
        }

        debug!(
            "rhs {}: {} minimal dependencies, {} nodes visited, {} partition tests, {} pruned",
            self.rhs,
            self.minimal.len(),
            self.stats.nodes_visited,
            self.stats.partition_tests,
            self.stats.pruned
        );
        let mut minimal: Vec<Vertical> = self.minimal.iter().cloned().collect();
        minimal.sort();
        minimal
    }

    fn walk(&mut self, seed: Vertical) {
        let mut next = Some(seed);
        while let Some(node) = next {
            self.visit(&node);
            next = self.pick_next(&node);
        }
    }

    fn visit(&mut self, node: &Vertical) {
        match self.observations.classify(node) {
            NodeCategory::CandidateMinimalDependency => self.promote_to_minimal(node),
            NodeCategory::CandidateMaximalNonDependency => self.promote_to_maximal(node),
            NodeCategory::Unvisited => {
                self.stats.nodes_visited += 1;
                let is_dependency = if self.non_dependencies.implies(node) {
                    self.stats.pruned += 1;
                    false
                } else if self.dependencies.implies(node) {
                    self.stats.pruned += 1;
                    true
                } else {
                    self.stats.partition_tests += 1;
                    self.cache.determines(node, self.rhs)
                };
                trace!(
                    "rhs {}: {:?} is {}a dependency",
                    self.rhs,
                    node,
                    if is_dependency { "" } else { "not " }
                );

                if is_dependency {
                    self.promote_to_minimal(node);
                    self.dependencies.add(node);
                } else {
                    self.promote_to_maximal(node);
                    self.non_dependencies.add(node);
                }
            }
            _ => {}
        }
    }

    fn promote_to_minimal(&mut self, node: &Vertical) {
        if self.observations.try_promote_to_minimal(node) {
            self.minimal.insert(node.clone());
        }
    }

    fn promote_to_maximal(&mut self, node: &Vertical) {
        if self.observations.try_promote_to_maximal(node, self.rhs) {
            self.maximal.insert(node.clone());
        }
    }

    // Moves to a random unchecked neighbour that could change this node's category, or else back
    // along the trace.
    fn pick_next(&mut self, node: &Vertical) -> Option<Vertical> {
        let neighbours = match self.observations.classify(node) {
            NodeCategory::CandidateMinimalDependency => {
                self.observations.unchecked_subsets(node, self.order)
            }
            NodeCategory::CandidateMaximalNonDependency => self
                .observations
                .unchecked_supersets(node, self.rhs, self.order),
            _ => return self.trace.pop(),
        };

        let non_dependencies: HashSet<Vertical> = self
            .non_dependencies
            .implied(&neighbours)
            .into_iter()
            .cloned()
            .collect();
        let dependencies: HashSet<Vertical> = self
            .dependencies
            .implied(&neighbours)
            .into_iter()
            .cloned()
            .collect();

        let mut remaining = Vec::with_capacity(neighbours.len());
        for neighbour in neighbours {
            if non_dependencies.contains(&neighbour) {
                self.stats.pruned += 1;
                self.observations
                    .record(neighbour, NodeCategory::NonDependency);
            } else if dependencies.contains(&neighbour) {
                self.stats.pruned += 1;
                self.observations.record(neighbour, NodeCategory::Dependency);
            } else {
                remaining.push(neighbour);
            }
        }

        if remaining.is_empty() {
            // Every neighbour is classified now, so this settles the node.
            self.visit(node);
            self.trace.pop()
        } else {
            self.trace.push(node.clone());
            let choice = self.rng.random_range(0..remaining.len());
            Some(remaining.swap_remove(choice))
        }
    }

    // The minimal sets which aren't contained in any known maximal non-dependency, less the ones
    // already known to be minimal dependencies. Sorted so that popping yields the smallest first.
    fn next_seeds(&self) -> Vec<Vertical> {
        let mut maximal: Vec<&Vertical> = self.maximal.iter().collect();
        if maximal.is_empty() {
            return Vec::new();
        }
        maximal.sort();

        let arity = self.universe.arity();
        let mut hitting_sets = vec![Vertical::empty(arity)];
        for non_dependency in maximal {
            let complement = self.universe.difference(non_dependency);
            if complement.is_empty() {
                return Vec::new();
            }
            let mut extended = Vec::new();
            for set in hitting_sets {
                if set.intersects(&complement) {
                    extended.push(set);
                } else {
                    extended.extend(complement.iter().map(|column| set.with_column(column)));
                }
            }
            hitting_sets = minimize(extended);
        }

        let mut seeds: Vec<Vertical> = hitting_sets
            .into_iter()
            .filter(|seed| !self.minimal.contains(seed))
            .collect();
        seeds.sort_by(|a, b| b.cmp(a));
        seeds
    }
}

// Drops duplicates and every set that contains another one.
fn minimize(mut sets: Vec<Vertical>) -> Vec<Vertical> {
    sets.sort();
    sets.dedup();
    let mut kept: Vec<Vertical> = Vec::with_capacity(sets.len());
    // Sorting by size first means any subset of a set comes before it.
    for set in sets {
        if !kept.iter().any(|smaller| smaller.is_subset(&set)) {
            kept.push(set);
        }
    }
    kept
}
