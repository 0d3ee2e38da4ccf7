use dfd::{
    discover, ColumnOrder, Dfd, DfdConfig, Error, FdCollector, FunctionalDependency,
    LatticeTraversal, NodeCategory, PartitionCache, Relation, RelationBuilder, Schema, Vertical,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

macro_rules! check_size {
    ($($name:ident)*) => {
        $(
        #[test]
        fn $name() {
            check((stringify!($name).as_bytes().last().unwrap() - b'0') as usize);
        }
        )*
    }
}

check_size! {
    random_over_1
    random_over_2
    random_over_3
    random_over_4
    random_over_5
    random_over_6
}

type Columns = Vec<Vec<Option<u8>>>;

fn random_columns(rng: &mut ChaCha8Rng, arity: usize) -> Columns {
    let rows: usize = rng.random_range(1..=20);
    (0..arity)
        .map(|_| {
            let domain = rng.random_range(1..=rows.min(6) as u8);
            let nulls = rng.random_bool(0.2);
            (0..rows)
                .map(|_| {
                    if nulls && rng.random_bool(0.3) {
                        None
                    } else {
                        Some(rng.random_range(0..domain))
                    }
                })
                .collect()
        })
        .collect()
}

fn agree(a: Option<u8>, b: Option<u8>, null_equals_null: bool) -> bool {
    match (a, b) {
        (None, None) => null_equals_null,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// Checks a dependency directly against every pair of rows.
fn holds(columns: &Columns, lhs: &Vertical, rhs: usize, null_equals_null: bool) -> bool {
    let rows = columns[0].len();
    (0..rows).all(|i| {
        (i + 1..rows).all(|j| {
            !lhs.iter()
                .all(|c| agree(columns[c][i], columns[c][j], null_equals_null))
                || agree(columns[rhs][i], columns[rhs][j], null_equals_null)
        })
    })
}

fn every_subset(arity: usize) -> Vec<Vertical> {
    let mut subsets: Vec<Vertical> = (0u32..1 << arity)
        .map(|bits| Vertical::from_columns(arity, (0..arity).filter(|&c| bits & (1 << c) != 0)))
        .collect();
    subsets.sort();
    subsets
}

fn brute_force(columns: &Columns, null_equals_null: bool) -> Vec<FunctionalDependency> {
    let arity = columns.len();
    let rows = columns[0].len();
    let is_unique = |c: usize| {
        (0..rows).all(|i| {
            (i + 1..rows).all(|j| !agree(columns[c][i], columns[c][j], null_equals_null))
        })
    };
    let is_constant = |c: usize| holds(columns, &Vertical::empty(arity), c, null_equals_null);

    let mut found = Vec::new();
    for rhs in 0..arity {
        let mut minimal: Vec<Vertical> = Vec::new();
        for lhs in every_subset(arity) {
            if lhs.contains_column(rhs) || minimal.iter().any(|m| m.is_subset(&lhs)) {
                continue;
            }
            if holds(columns, &lhs, rhs, null_equals_null) {
                minimal.push(lhs);
            }
        }
        if !is_constant(rhs) && is_unique(rhs) {
            // Only single-column keys are reported for a unique right-hand side.
            minimal.retain(|lhs| lhs.len() == 1 && lhs.iter().all(is_unique));
        }
        found.extend(minimal.into_iter().map(|lhs| FunctionalDependency { lhs, rhs }));
    }
    found.sort();
    found
}

fn relation(columns: &Columns, null_equals_null: bool) -> Relation {
    let names: Vec<String> = (0..columns.len()).map(|c| format!("c{}", c)).collect();
    Relation::from_columns(Schema::new(names, null_equals_null), columns).unwrap()
}

fn check(arity: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(arity as u64);
    for round in 0..25 {
        let columns = random_columns(&mut rng, arity);
        let null_equals_null = round % 2 == 0;
        let relation = relation(&columns, null_equals_null);
        let config = DfdConfig::default()
            .with_null_equals_null(null_equals_null)
            .with_seed(round)
            .with_bucket_threshold(1 + round as usize % 3);

        let found = discover(&relation, &config).unwrap();
        assert_eq!(
            found,
            brute_force(&columns, null_equals_null),
            "round {}: {:?}",
            round,
            columns
        );
    }
}

#[test]
fn every_visited_node_matches_partition_test() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    for _ in 0..10 {
        let columns = random_columns(&mut rng, 5);
        let relation = relation(&columns, true);
        let cache = PartitionCache::new(&relation);
        let order = ColumnOrder::new(&relation);
        let unique = Vertical::empty(5);
        for rhs in 0..5 {
            if relation.column_partition(rhs).is_constant() {
                continue;
            }
            let mut traversal =
                LatticeTraversal::new(rhs, &cache, &order, &unique, 1, rng.clone());
            let minimal = traversal.run();
            for node in every_subset(5) {
                if node.is_empty() || node.contains_column(rhs) {
                    continue;
                }
                let category = traversal.observations().classify(&node);
                if category == NodeCategory::Unvisited {
                    continue;
                }
                assert_eq!(
                    category.is_dependency(),
                    cache.determines(&node, rhs),
                    "{:?} for rhs {} classified {:?}",
                    node,
                    rhs,
                    category
                );
                assert!(!category.is_candidate(), "{:?} left as {:?}", node, category);
                assert_eq!(
                    category == NodeCategory::MinimalDependency,
                    minimal.contains(&node)
                );
            }
        }
    }
}

fn scenario() -> Relation {
    let mut builder = RelationBuilder::new(["A", "B", "C"], true);
    let a = [0, 1, 2, 3, 4, 0, 1, 2, 3, 4];
    let c = [0, 0, 1, 1, 0, 1, 0, 1, 1, 0];
    for (a, c) in a.iter().zip(&c) {
        let b = a % 2;
        builder
            .push_row([a.to_string(), b.to_string(), c.to_string()])
            .unwrap();
    }
    builder.build().unwrap()
}

fn shown(relation: &Relation, found: &[FunctionalDependency]) -> Vec<String> {
    found
        .iter()
        .map(|fd| fd.display(relation.schema()).to_string())
        .collect()
}

#[test]
fn single_dependency_scenario() {
    let relation = scenario();
    let found = discover(&relation, &DfdConfig::default()).unwrap();
    assert_eq!(shown(&relation, &found), ["[A] -> B"]);
}

#[test]
fn results_do_not_depend_on_seed_or_threads() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    for _ in 0..5 {
        let columns = random_columns(&mut rng, 6);
        let relation = relation(&columns, true);
        let expected = discover(
            &relation,
            &DfdConfig::default().with_threads(NonZeroUsize::MIN).with_seed(0),
        )
        .unwrap();
        for (threads, seed) in [(2, 1), (4, 17), (8, 12345)] {
            let config = DfdConfig::default()
                .with_threads(NonZeroUsize::new(threads).unwrap())
                .with_seed(seed);
            assert_eq!(discover(&relation, &config).unwrap(), expected);
        }
        // Fresh entropy on every right-hand side.
        assert_eq!(discover(&relation, &DfdConfig::default()).unwrap(), expected);
    }
}

#[test]
fn constant_column_is_determined_by_nothing() {
    let mut builder = RelationBuilder::new(["id", "kind", "flag"], true);
    builder.push_row(["1", "a", "on"]).unwrap();
    builder.push_row(["2", "b", "on"]).unwrap();
    builder.push_row(["3", "a", "on"]).unwrap();
    let relation = builder.build().unwrap();

    let collector = FdCollector::new();
    let stats = Dfd::new(DfdConfig::default()).discover(&relation, &collector).unwrap();
    // id is unique and flag is constant, so only kind is searched.
    assert_eq!(stats.traversals, 1);
    assert_eq!(
        shown(&relation, &collector.into_sorted()),
        ["[id] -> kind", "[] -> flag"]
    );
}

#[test]
fn unique_columns_determine_each_other() {
    let mut builder = RelationBuilder::new(["id", "email", "team"], true);
    builder.push_row(["1", "a@x", "red"]).unwrap();
    builder.push_row(["2", "b@x", "red"]).unwrap();
    builder.push_row(["3", "c@x", "blue"]).unwrap();
    builder.push_row(["4", "d@x", "blue"]).unwrap();
    let relation = builder.build().unwrap();

    let collector = FdCollector::new();
    let stats = Dfd::new(DfdConfig::default().with_seed(3))
        .discover(&relation, &collector)
        .unwrap();
    assert_eq!(stats.traversals, 1);
    assert_eq!(stats.dependencies, 4);
    assert_eq!(
        shown(&relation, &collector.into_sorted()),
        [
            "[email] -> id",
            "[id] -> email",
            "[id] -> team",
            "[email] -> team",
        ]
    );
}

#[test]
fn single_row_makes_every_column_constant() {
    let mut builder = RelationBuilder::new(["A", "B"], true);
    builder.push_row(["x", "y"]).unwrap();
    let relation = builder.build().unwrap();
    let found = discover(&relation, &DfdConfig::default()).unwrap();
    assert_eq!(shown(&relation, &found), ["[] -> A", "[] -> B"]);
}

#[test]
fn empty_relations_are_rejected() {
    let no_rows = RelationBuilder::new(["A", "B"], true).build().unwrap();
    let collector = FdCollector::new();
    assert!(matches!(
        Dfd::default().discover(&no_rows, &collector),
        Err(Error::NoRows)
    ));
    assert!(collector.is_empty());

    let no_columns = Relation::from_columns::<u8>(Schema::new(Vec::<&str>::new(), true), &[])
        .unwrap();
    assert!(matches!(
        discover(&no_columns, &DfdConfig::default()),
        Err(Error::NoColumns)
    ));
}

#[test]
fn sink_errors_stop_the_run() {
    // One row, so every column is constant and each yields a dependency.
    let relation = relation(&vec![vec![Some(1)]; 6], true);
    let accepted = AtomicUsize::new(0);
    let sink = |_: FunctionalDependency| {
        if accepted.fetch_add(1, Ordering::Relaxed) >= 1 {
            Err(Error::Sink("disk full".into()))
        } else {
            Ok(())
        }
    };

    let threads = 3;
    let config = DfdConfig::default().with_threads(NonZeroUsize::new(threads).unwrap());
    match Dfd::new(config).discover(&relation, &sink) {
        Err(Error::Sink(source)) => assert_eq!(source.to_string(), "disk full"),
        other => panic!("expected a sink error, got {:?}", other),
    }
    // One call succeeds, and each worker stops after its first failure.
    let calls = accepted.load(Ordering::Relaxed);
    assert!((2..=threads + 1).contains(&calls), "{} calls", calls);
}

#[test]
fn sink_panics_reach_the_caller() {
    let relation = relation(&vec![vec![Some(1)]; 8], true);
    let calls = AtomicUsize::new(0);
    let sink = |_: FunctionalDependency| -> Result<(), Error> {
        calls.fetch_add(1, Ordering::Relaxed);
        panic!("sink exploded");
    };

    let threads = 2;
    let config = DfdConfig::default().with_threads(NonZeroUsize::new(threads).unwrap());
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        Dfd::new(config).discover(&relation, &sink)
    }));
    assert!(result.is_err());
    // A panicking worker takes no more columns, and the others see the abort flag.
    let calls = calls.load(Ordering::Relaxed);
    assert!((1..=threads).contains(&calls), "{} calls", calls);
}
