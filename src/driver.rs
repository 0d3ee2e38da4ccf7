use crate::{
    ColumnOrder, Error, LatticeTraversal, PartitionCache, Relation, Schema, Vertical,
    DEFAULT_BUCKET_THRESHOLD,
};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Settings for a discovery run.
///
/// ```
/// use dfd::DfdConfig;
/// use std::num::NonZeroUsize;
///
/// let config = DfdConfig::default()
///     .with_threads(NonZeroUsize::new(2).unwrap())
///     .with_seed(42);
/// assert_eq!(config.seed, Some(42));
/// assert!(config.null_equals_null);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DfdConfig {
    /// How many right-hand sides to search at once.
    pub threads: NonZeroUsize,
    /// Whether nulls compare equal to each other when building a relation from text. Discovery
    /// refuses a relation built with the other policy.
    pub null_equals_null: bool,
    /// Seeds the random walks. Without one, every run draws fresh entropy. Results are the same
    /// either way; only the order of work changes.
    pub seed: Option<u64>,
    /// How many entries a pruning-index bucket may hold before it is split.
    pub bucket_threshold: usize,
}

impl Default for DfdConfig {
    fn default() -> Self {
        DfdConfig {
            threads: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            null_equals_null: true,
            seed: None,
            bucket_threshold: DEFAULT_BUCKET_THRESHOLD,
        }
    }
}

impl DfdConfig {
    /// Sets the number of worker threads.
    pub fn with_threads(mut self, threads: NonZeroUsize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the null-equality policy.
    pub fn with_null_equals_null(mut self, null_equals_null: bool) -> Self {
        self.null_equals_null = null_equals_null;
        self
    }

    /// Fixes the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the pruning-index bucket threshold.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_threshold` is zero.
    pub fn with_bucket_threshold(mut self, bucket_threshold: usize) -> Self {
        assert!(bucket_threshold > 0, "bucket threshold must be positive");
        self.bucket_threshold = bucket_threshold;
        self
    }
}

/// A functional dependency `lhs → rhs`: rows that agree on every column of `lhs` also agree on
/// column `rhs`.
///
/// Dependencies sort by right-hand side first, then by left-hand side.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FunctionalDependency {
    /// The determining columns. Never contains `rhs`.
    pub lhs: Vertical,
    /// The index of the determined column.
    pub rhs: usize,
}

impl FunctionalDependency {
    /// Formats this dependency with column names, like `[A, B] -> C`.
    pub fn display<'a>(&'a self, schema: &'a Schema) -> DisplayDependency<'a> {
        DisplayDependency {
            schema,
            dependency: self,
        }
    }
}

impl Ord for FunctionalDependency {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.rhs
            .cmp(&other.rhs)
            .then_with(|| self.lhs.cmp(&other.lhs))
    }
}

impl PartialOrd for FunctionalDependency {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Helper for [`FunctionalDependency::display`].
pub struct DisplayDependency<'a> {
    schema: &'a Schema,
    dependency: &'a FunctionalDependency,
}

impl fmt::Display for DisplayDependency<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.schema.display(&self.dependency.lhs),
            self.schema.column(self.dependency.rhs)
        )
    }
}

/// Receives dependencies as they're discovered.
///
/// Workers call `register` concurrently, so implementations synchronize internally. Each
/// dependency is registered exactly once. Returning an error stops the run, and
/// [`Dfd::discover`] returns that error. A panic stops the run too, and is resumed in the caller.
///
/// The stream is incomplete for right-hand sides whose values are all distinct: only the other
/// single-column keys are registered for them, never composite keys. Callers that need every key
/// of the relation must find them separately.
pub trait FdSink: Sync {
    /// Accepts one minimal dependency.
    fn register(&self, dependency: FunctionalDependency) -> Result<(), Error>;
}

impl<F> FdSink for F
where
    F: Fn(FunctionalDependency) -> Result<(), Error> + Sync,
{
    fn register(&self, dependency: FunctionalDependency) -> Result<(), Error> {
        self(dependency)
    }
}

/// An [`FdSink`] which keeps every dependency in memory.
#[derive(Debug, Default)]
pub struct FdCollector {
    dependencies: Mutex<Vec<FunctionalDependency>>,
}

impl FdCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        FdCollector::default()
    }

    /// The number of dependencies collected so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the collected dependencies, sorted.
    pub fn into_sorted(self) -> Vec<FunctionalDependency> {
        let mut dependencies = self
            .dependencies
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        dependencies.sort();
        dependencies
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FunctionalDependency>> {
        self.dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl FdSink for FdCollector {
    fn register(&self, dependency: FunctionalDependency) -> Result<(), Error> {
        self.lock().push(dependency);
        Ok(())
    }
}

/// Summary of a finished discovery run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DiscoveryStats {
    /// Dependencies registered with the sink.
    pub dependencies: usize,
    /// Right-hand sides that needed a lattice search.
    pub traversals: usize,
    /// Partition requests served from the cache.
    pub cache_hits: usize,
    /// Partitions computed.
    pub cache_misses: usize,
    /// Wall-clock time from start to finish.
    pub elapsed: Duration,
}

/// Discovers every minimal functional dependency of a relation.
///
/// Each column is handled as a right-hand side on its own:
///
/// - A constant column is determined by the empty set, and nothing else is minimal.
/// - A column whose values are all distinct is determined by each other such column. Composite
///   keys aren't searched for, so a minimal left-hand side like `{A, B}` for such a column is
///   never reported.
/// - Any other column gets a [`LatticeTraversal`].
///
/// Right-hand sides are spread over a pool of worker threads which share one [`PartitionCache`].
#[derive(Clone, Debug, Default)]
pub struct Dfd {
    config: DfdConfig,
}

impl Dfd {
    /// Creates a driver with the given settings.
    pub fn new(config: DfdConfig) -> Self {
        Dfd { config }
    }

    /// The settings this driver runs with.
    pub fn config(&self) -> &DfdConfig {
        &self.config
    }

    /// Runs discovery on `relation`, registering every minimal dependency with `sink`.
    ///
    /// Fails without doing any work if the relation has no columns or no rows, or if it was built
    /// with a different null policy than [`DfdConfig::null_equals_null`]. If the sink returns an
    /// error, workers stop picking up new right-hand sides and that error is returned; some
    /// dependencies may have been registered by then.
    ///
    /// # Panics
    ///
    /// If the sink panics, the other workers stop picking up right-hand sides and the panic is
    /// resumed here once they've finished.
    pub fn discover<S: FdSink + ?Sized>(
        &self,
        relation: &Relation,
        sink: &S,
    ) -> Result<DiscoveryStats, Error> {
        let start = Instant::now();
        if relation.arity() == 0 {
            return Err(Error::NoColumns);
        }
        if relation.row_count() == 0 {
            return Err(Error::NoRows);
        }
        let null_equals_null = relation.schema().null_equals_null();
        if self.config.null_equals_null != null_equals_null {
            return Err(Error::NullPolicyMismatch {
                configured: self.config.null_equals_null,
                relation: null_equals_null,
            });
        }

        let arity = relation.arity();
        let threads = self.config.threads.get().min(arity);
        info!(
            "discovering dependencies among {} columns and {} rows on {} threads",
            arity,
            relation.row_count(),
            threads
        );

        let run = Run {
            config: &self.config,
            relation,
            sink,
            cache: PartitionCache::new(relation),
            order: ColumnOrder::new(relation),
            unique: Vertical::from_columns(
                arity,
                (0..arity).filter(|&column| relation.column_partition(column).is_unique()),
            ),
            cursor: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            dependencies: AtomicUsize::new(0),
            traversals: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            error: Mutex::new(None),
        };
        debug!("unique columns: {:?}", run.unique);

        thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| run.work());
            }
        });

        let error = run.error.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(error) = error {
            return Err(error);
        }

        run.cache.log_statistics();
        let stats = DiscoveryStats {
            dependencies: run.dependencies.into_inner(),
            traversals: run.traversals.into_inner(),
            cache_hits: run.cache.hits(),
            cache_misses: run.cache.misses(),
            elapsed: start.elapsed(),
        };
        info!(
            "found {} minimal dependencies in {:.3}s",
            stats.dependencies,
            stats.elapsed.as_secs_f64()
        );
        Ok(stats)
    }
}

/// Discovers every minimal functional dependency of `relation` and returns them sorted.
///
/// Like [`Dfd::discover`], only single-column keys are reported for a column whose values are all
/// distinct.
///
/// ```
/// use dfd::{discover, DfdConfig, RelationBuilder};
///
/// let mut builder = RelationBuilder::new(["A", "B", "C"], true);
/// for row in [["1", "x", "p"], ["1", "x", "q"], ["2", "y", "p"], ["3", "y", "q"]] {
///     builder.push_row(row)?;
/// }
/// let relation = builder.build()?;
///
/// let found = discover(&relation, &DfdConfig::default().with_seed(1))?;
/// let found: Vec<String> = found
///     .iter()
///     .map(|fd| fd.display(relation.schema()).to_string())
///     .collect();
/// assert_eq!(found, ["[B, C] -> A", "[A] -> B"]);
/// # Ok::<(), dfd::Error>(())
/// ```
pub fn discover(
    relation: &Relation,
    config: &DfdConfig,
) -> Result<Vec<FunctionalDependency>, Error> {
    let collector = FdCollector::new();
    Dfd::new(config.clone()).discover(relation, &collector)?;
    Ok(collector.into_sorted())
}

// State shared by the workers of one run.
struct Run<'a, S: ?Sized> {
    config: &'a DfdConfig,
    relation: &'a Relation,
    sink: &'a S,
    cache: PartitionCache,
    order: ColumnOrder,
    unique: Vertical,
    cursor: AtomicUsize,
    finished: AtomicUsize,
    dependencies: AtomicUsize,
    traversals: AtomicUsize,
    abort: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl<S: FdSink + ?Sized> Run<'_, S> {
    fn work(&self) {
        let _guard = AbortOnPanic(&self.abort);
        while !self.abort.load(Ordering::Relaxed) {
            let rhs = self.cursor.fetch_add(1, Ordering::Relaxed);
            if rhs >= self.relation.arity() {
                break;
            }
            if let Err(error) = self.process(rhs) {
                self.abort.store(true, Ordering::Relaxed);
                self.error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(error);
                break;
            }
        }
    }

    fn process(&self, rhs: usize) -> Result<(), Error> {
        let arity = self.relation.arity();
        let partition = self.relation.column_partition(rhs);
        let lhss = if partition.is_constant() {
            vec![Vertical::empty(arity)]
        } else if partition.is_unique() {
            self.unique
                .without_column(rhs)
                .iter()
                .map(|column| Vertical::single(arity, column))
                .collect()
        } else {
            self.traversals.fetch_add(1, Ordering::Relaxed);
            let rng = match self.config.seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(rhs as u64)),
                None => ChaCha8Rng::from_os_rng(),
            };
            LatticeTraversal::new(
                rhs,
                &self.cache,
                &self.order,
                &self.unique,
                self.config.bucket_threshold,
                rng,
            )
            .run()
        };

        let count = lhss.len();
        for lhs in lhss {
            self.sink.register(FunctionalDependency { lhs, rhs })?;
        }
        self.dependencies.fetch_add(count, Ordering::Relaxed);

        let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "[{}/{}] {}: {} minimal dependencies",
            finished,
            arity,
            self.relation.schema().column(rhs),
            count
        );
        Ok(())
    }
}

// Stops the other workers if this one panics. The scope re-raises the panic afterwards.
struct AbortOnPanic<'a>(&'a AtomicBool);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelationBuilder;
    use test_log::test;

    fn relation(rows: &[[&str; 3]]) -> Relation {
        let mut builder = RelationBuilder::new(["A", "B", "C"], true);
        for row in rows {
            builder.push_row(row).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = DfdConfig::default();
        assert!(config.null_equals_null);
        assert_eq!(config.seed, None);
        assert_eq!(config.bucket_threshold, DEFAULT_BUCKET_THRESHOLD);
        assert_eq!(
            config.clone().with_null_equals_null(false).with_bucket_threshold(4),
            DfdConfig {
                null_equals_null: false,
                bucket_threshold: 4,
                ..config
            }
        );
    }

    #[test]
    fn test_dependency_order_and_display() {
        let schema = Schema::new(["A", "B", "C"], true);
        let mut fds = vec![
            FunctionalDependency {
                lhs: schema.vertical(&[0, 1]),
                rhs: 2,
            },
            FunctionalDependency {
                lhs: schema.vertical(&[2]),
                rhs: 0,
            },
            FunctionalDependency {
                lhs: schema.empty_vertical(),
                rhs: 2,
            },
        ];
        fds.sort();
        let shown: Vec<String> = fds.iter().map(|fd| fd.display(&schema).to_string()).collect();
        assert_eq!(shown, ["[C] -> A", "[] -> C", "[A, B] -> C"]);
    }

    #[test]
    fn test_constant_and_unique_columns_skip_traversal() {
        // A is a key, B is constant, C depends on A only.
        let relation = relation(&[["1", "k", "x"], ["2", "k", "x"], ["3", "k", "y"]]);
        let collector = FdCollector::new();
        let stats = Dfd::new(DfdConfig::default().with_seed(0))
            .discover(&relation, &collector)
            .unwrap();
        assert_eq!(stats.traversals, 1);
        assert_eq!(stats.dependencies, 2);

        let schema = relation.schema();
        let shown: Vec<String> = collector
            .into_sorted()
            .iter()
            .map(|fd| fd.display(schema).to_string())
            .collect();
        assert_eq!(shown, ["[] -> B", "[A] -> C"]);
    }

    #[test]
    fn test_sink_error_stops_run() {
        let relation = relation(&[["1", "a", "x"], ["1", "b", "x"], ["2", "b", "y"]]);
        let sink = |_: FunctionalDependency| -> Result<(), Error> {
            Err(Error::Sink("full".into()))
        };
        let err = Dfd::default().discover(&relation, &sink).unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }

    #[test]
    fn test_null_policy_must_match() {
        let relation = relation(&[["1", "", "x"], ["2", "", "y"]]);
        let collector = FdCollector::new();
        let err = Dfd::new(DfdConfig::default().with_null_equals_null(false))
            .discover(&relation, &collector)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NullPolicyMismatch {
                configured: false,
                relation: true
            }
        ));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_empty_relation_rejected() {
        let no_rows = RelationBuilder::new(["A"], true).build().unwrap();
        assert!(matches!(
            discover(&no_rows, &DfdConfig::default()),
            Err(Error::NoRows)
        ));

        let no_columns = RelationBuilder::new(Vec::<String>::new(), true)
            .build()
            .unwrap();
        assert!(matches!(
            discover(&no_columns, &DfdConfig::default()),
            Err(Error::NoColumns)
        ));
    }
}
