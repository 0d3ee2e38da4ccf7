use crate::Vertical;
use std::fmt;

/// One column of a relation: its position in the schema and a display name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Column {
    index: usize,
    name: String,
    arity: usize,
}

impl Column {
    /// The position of this column in its schema.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The name this column was given when the relation was loaded.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute set containing only this column.
    pub fn vertical(&self) -> Vertical {
        Vertical::single(self.arity, self.index)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The column list of a relation, plus the policy for comparing null values.
///
/// A single `Schema` is owned by each [`Relation`][crate::Relation] for the duration of a run.
/// Attribute sets only record which column indices they contain, so anything that needs names
/// borrows the schema.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    null_equals_null: bool,
}

impl Schema {
    /// Creates a schema with the given column names, in order.
    ///
    /// ```
    /// use dfd::Schema;
    ///
    /// let schema = Schema::new(["id", "name"], true);
    /// assert_eq!(schema.arity(), 2);
    /// assert_eq!(schema.column(1).name(), "name");
    /// assert_eq!(schema.column_by_name("id").map(|c| c.index()), Some(0));
    /// ```
    pub fn new<I, S>(names: I, null_equals_null: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let arity = names.len();
        Schema {
            columns: names
                .into_iter()
                .enumerate()
                .map(|(index, name)| Column { index, name, arity })
                .collect(),
            null_equals_null,
        }
    }

    /// The number of columns.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Whether two null values count as equal when grouping rows.
    pub fn null_equals_null(&self) -> bool {
        self.null_equals_null
    }

    /// All columns, in schema order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    /// Looks a column up by name.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The empty attribute set of this schema.
    pub fn empty_vertical(&self) -> Vertical {
        Vertical::empty(self.arity())
    }

    /// The attribute set of every column in this schema.
    pub fn full_vertical(&self) -> Vertical {
        Vertical::full(self.arity())
    }

    /// Builds an attribute set of this schema from column indices.
    pub fn vertical(&self, columns: &[usize]) -> Vertical {
        Vertical::new(self.arity(), columns)
    }

    /// Returns a value which formats an attribute set using this schema's column names, like
    /// `[A, C]`.
    ///
    /// # Panics
    ///
    /// Formatting panics if the attribute set was built for a different arity.
    pub fn display<'a>(&'a self, vertical: &'a Vertical) -> DisplayVertical<'a> {
        assert_eq!(
            vertical.arity(),
            self.arity(),
            "attribute set does not belong to this schema"
        );
        DisplayVertical {
            schema: self,
            vertical,
        }
    }
}

/// Formats an attribute set with column names. See [`Schema::display`].
pub struct DisplayVertical<'a> {
    schema: &'a Schema,
    vertical: &'a Vertical,
}

impl fmt::Display for DisplayVertical<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, column) in self.vertical.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(self.schema.column(column).name())?;
        }
        f.write_str("]")
    }
}
