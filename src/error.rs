use thiserror::Error;

/// Errors reported while loading a relation or discovering its dependencies.
///
/// Violated internal invariants, such as intersecting partitions of different relations, are
/// bugs rather than errors and panic instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The relation has no columns, so there is nothing to discover.
    #[error("relation has no columns: FD mining is meaningless")]
    NoColumns,

    /// The relation has no rows, so there is nothing to discover.
    #[error("relation has no rows: FD mining is meaningless")]
    NoRows,

    /// A row did not have one field per column.
    #[error("row {row} has {found} fields but the schema has {expected} columns")]
    ArityMismatch {
        /// Zero-based position of the offending row.
        row: usize,
        /// The schema's arity.
        expected: usize,
        /// The number of fields in the row.
        found: usize,
    },

    /// Column data didn't line up with the schema or with the other columns.
    #[error("column {column} has {found} values but {expected} were expected")]
    ColumnLength {
        /// Index of the offending column, or the schema arity if the number of columns was wrong.
        column: usize,
        /// The expected number of values.
        expected: usize,
        /// The number of values provided.
        found: usize,
    },

    /// The run was configured with a different null policy than the relation was built with.
    #[error("null policy mismatch: configured null_equals_null={configured} but the relation uses {relation}")]
    NullPolicyMismatch {
        /// The policy in the run's settings.
        configured: bool,
        /// The policy the relation's partitions were built with.
        relation: bool,
    },

    /// The relation has more rows than a partition can index.
    #[error("relation has {0} rows, more than a partition can index")]
    TooManyRows(usize),

    /// The result sink refused a dependency.
    #[error("result sink rejected a dependency")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
}
