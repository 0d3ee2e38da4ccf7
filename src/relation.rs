use crate::{Error, Partition, RowIndex, Schema};
use lasso::{Rodeo, Spur};
use log::debug;
use smallvec::SmallVec;
use std::hash::Hash;
use std::sync::Arc;

/// A relation in column layout: the schema, the number of rows, and the partition of every single
/// column.
///
/// The raw values are only needed to build the column partitions, so they aren't kept.
#[derive(Clone, Debug)]
pub struct Relation {
    schema: Schema,
    row_count: usize,
    partitions: Vec<Arc<Partition>>,
}

impl Relation {
    /// Builds a relation from per-column values, where `None` stands for null.
    ///
    /// Values only need to be comparable within their own column; they're typically ids from a
    /// value dictionary.
    ///
    /// ```
    /// use dfd::{Relation, Schema};
    ///
    /// let schema = Schema::new(["A", "B"], true);
    /// let relation = Relation::from_columns(
    ///     schema,
    ///     &[vec![Some(1), Some(2), Some(2)], vec![Some(0), None, None]],
    /// )?;
    /// assert_eq!(relation.row_count(), 3);
    /// assert!(relation.column_partition(0).determines(relation.column_partition(1)));
    /// # Ok::<(), dfd::Error>(())
    /// ```
    pub fn from_columns<K: Hash + Eq>(
        schema: Schema,
        columns: &[Vec<Option<K>>],
    ) -> Result<Self, Error> {
        if columns.len() != schema.arity() {
            return Err(Error::ColumnLength {
                column: schema.arity(),
                expected: schema.arity(),
                found: columns.len(),
            });
        }

        let row_count = columns.first().map_or(0, Vec::len);
        if row_count > RowIndex::MAX as usize {
            return Err(Error::TooManyRows(row_count));
        }
        if let Some((column, values)) = columns
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != row_count)
        {
            return Err(Error::ColumnLength {
                column,
                expected: row_count,
                found: values.len(),
            });
        }

        let partitions = columns
            .iter()
            .map(|values| Arc::new(Partition::build(values, schema.null_equals_null())))
            .collect();
        Ok(Relation {
            schema,
            row_count,
            partitions,
        })
    }

    /// The schema of this relation.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The number of columns.
    pub fn arity(&self) -> usize {
        self.schema.arity()
    }

    /// The number of rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// The partition of the single column at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn column_partition(&self, index: usize) -> &Arc<Partition> {
        &self.partitions[index]
    }

    /// The partitions of every column, in schema order.
    pub fn column_partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }
}

/// Builds a [`Relation`] from rows of text.
///
/// Every distinct field value is interned in a value dictionary owned by this builder, so equal
/// strings compare as equal ids without keeping every row's text around. The dictionary is
/// dropped once the relation is built. Empty fields are treated as null.
///
/// ```
/// use dfd::RelationBuilder;
///
/// let mut builder = RelationBuilder::new(["city", "zip"], true);
/// builder.push_row(["Portland", "97201"])?;
/// builder.push_row(["Portland", "97202"])?;
/// builder.push_row(["Salem", ""])?;
/// let relation = builder.build()?;
///
/// assert_eq!(relation.row_count(), 3);
/// assert!(relation.column_partition(1).is_unique());
/// # Ok::<(), dfd::Error>(())
/// ```
pub struct RelationBuilder {
    schema: Schema,
    columns: Vec<Vec<Option<Spur>>>,
    dictionary: Rodeo<Spur>,
}

impl RelationBuilder {
    /// Starts a relation with the given column names.
    pub fn new<I, S>(names: I, null_equals_null: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schema = Schema::new(names, null_equals_null);
        RelationBuilder {
            columns: vec![Vec::new(); schema.arity()],
            schema,
            dictionary: Rodeo::new(),
        }
    }

    /// The number of rows pushed so far.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Appends one row. It must have exactly one field per column.
    pub fn push_row<I, S>(&mut self, fields: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let row: SmallVec<[Option<Spur>; 16]> = fields
            .into_iter()
            .map(|field| match field.as_ref() {
                "" => None,
                value => Some(self.dictionary.get_or_intern(value)),
            })
            .collect();
        if row.len() != self.schema.arity() {
            return Err(Error::ArityMismatch {
                row: self.row_count(),
                expected: self.schema.arity(),
                found: row.len(),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// Finishes the relation, computing the partition of every column.
    pub fn build(self) -> Result<Relation, Error> {
        debug!(
            "building relation with {} columns, {} rows, {} distinct values",
            self.schema.arity(),
            self.row_count(),
            self.dictionary.len()
        );
        Relation::from_columns(self.schema, &self.columns)
    }
}
