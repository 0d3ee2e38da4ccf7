#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate discovers every minimal functional dependency of a relation, using the lattice
//! traversal described in this paper:
//!
//! - Abedjan, Schulze, Naumann, DFD: Efficient Functional Dependency Discovery, 2014
//!
//! A functional dependency `X → A` holds when any two rows which agree on every column in `X`
//! also agree on column `A`. It's minimal when no proper subset of `X` determines `A`. The search
//! runs separately for each right-hand side `A`, walking the lattice of attribute sets over the
//! other columns. Stripped partitions answer whether `X` determines `A`, and are memoized in a
//! [`PartitionCache`] shared by every walk. Pruning indices over the sets already classified
//! answer most questions without touching partitions at all.
//!
//! ```
//! use dfd::{discover, DfdConfig, RelationBuilder};
//!
//! let mut builder = RelationBuilder::new(["zip", "city", "street"], true);
//! builder.push_row(["97201", "Portland", "Main"])?;
//! builder.push_row(["97201", "Portland", "Oak"])?;
//! builder.push_row(["97301", "Salem", "Main"])?;
//! builder.push_row(["97302", "Salem", "Oak"])?;
//! let relation = builder.build()?;
//!
//! let found = discover(&relation, &DfdConfig::default())?;
//! let schema = relation.schema();
//! assert!(found
//!     .iter()
//!     .any(|fd| fd.display(schema).to_string() == "[zip] -> city"));
//! # Ok::<(), dfd::Error>(())
//! ```

pub use sorted_iter;

mod cache;
mod column_order;
mod driver;
mod error;
mod observations;
mod partition;
mod pruning;
mod relation;
mod schema;
mod traversal;
mod vertical;

pub use crate::cache::PartitionCache;
pub use crate::column_order::{ColumnOrder, Direction};
pub use crate::driver::{
    discover, DfdConfig, Dfd, DiscoveryStats, DisplayDependency, FdCollector, FdSink,
    FunctionalDependency,
};
pub use crate::error::Error;
pub use crate::observations::{NodeCategory, Observations};
pub use crate::partition::{Partition, RowIndex};
pub use crate::pruning::{
    DependencyIndex, NonDependencyIndex, SubsetIndex, DEFAULT_BUCKET_THRESHOLD,
};
pub use crate::relation::{Relation, RelationBuilder};
pub use crate::schema::{Column, DisplayVertical, Schema};
pub use crate::traversal::{LatticeTraversal, TraversalStats};
pub use crate::vertical::Vertical;
