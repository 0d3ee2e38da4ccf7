use smallvec::{smallvec, SmallVec};
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use std::cmp::Ordering;
use std::iter;

const BITS_PER_WORD: usize = 64;

/// Most relations have at most 128 columns, so two words keep attribute sets off the heap.
type Words = SmallVec<[u64; 2]>;

/// A set of columns from one relation, represented as a bit vector.
///
/// Every `Vertical` knows the arity of the schema it was built for, and combining sets of
/// different arity is a programming error that panics. Attribute sets don't point back at their
/// schema; look column names up in the [`Schema`][crate::Schema] that owns the relation instead.
///
/// Operations never modify a set in place. They return a new one.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Vertical {
    arity: usize,
    words: Words,
}

impl Vertical {
    /// Creates the empty attribute set over `arity` columns.
    pub fn empty(arity: usize) -> Self {
        Vertical {
            arity,
            words: smallvec![0; (arity + BITS_PER_WORD - 1) / BITS_PER_WORD],
        }
    }

    /// Creates the attribute set containing every one of `arity` columns.
    ///
    /// ```
    /// use dfd::Vertical;
    ///
    /// let all = Vertical::full(70);
    /// assert_eq!(all.len(), 70);
    /// assert!(all.contains_column(69));
    /// assert_eq!(all.complement(), Vertical::empty(70));
    /// ```
    pub fn full(arity: usize) -> Self {
        let mut full = Vertical::empty(arity);
        for word in full.words.iter_mut() {
            *word = !0;
        }
        full.clear_padding();
        full
    }

    /// Creates the attribute set containing only `column`.
    pub fn single(arity: usize, column: usize) -> Self {
        Vertical::empty(arity).with_column(column)
    }

    /// Creates an attribute set containing the specified columns.
    ///
    /// It's okay if the provided columns contain duplicates.
    ///
    /// ```
    /// use dfd::Vertical;
    ///
    /// let ac = Vertical::new(3, &[2, 0, 2]);
    /// assert_eq!(ac.iter().collect::<Vec<_>>(), vec![0, 2]);
    /// ```
    pub fn new(arity: usize, columns: &[usize]) -> Self {
        Vertical::from_columns(arity, columns.iter().copied())
    }

    /// Creates an attribute set from an iterator of column indices.
    pub fn from_columns<I: IntoIterator<Item = usize>>(arity: usize, columns: I) -> Self {
        let mut set = Vertical::empty(arity);
        for column in columns {
            set.set(column);
        }
        set
    }

    /// The number of columns in the schema this set belongs to.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The number of columns in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if the set contains no columns.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns `true` if `column` is in the set.
    ///
    /// # Panics
    ///
    /// Panics if `column` is not a column of this schema.
    pub fn contains_column(&self, column: usize) -> bool {
        self.check_column(column);
        self.words[column / BITS_PER_WORD] & (1u64 << (column % BITS_PER_WORD)) != 0
    }

    /// Returns an iterator over the columns in this set, in ascending order.
    ///
    /// The iterator is marked as sorted, so it can be combined with other sorted iterators:
    ///
    /// ```
    /// use dfd::Vertical;
    /// use sorted_iter::SortedIterator;
    ///
    /// let abc = Vertical::new(4, &[0, 1, 2]);
    /// let bcd = Vertical::new(4, &[1, 2, 3]);
    /// let common: Vec<_> = abc.iter().intersection(bcd.iter()).collect();
    /// assert_eq!(common, vec![1, 2]);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = usize> + SortedByItem + Clone + '_ {
        Columns {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
        .assume_sorted_by_item()
    }

    /// The lowest-numbered column in the set, if any.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// The highest-numbered column in the set, if any.
    pub fn last(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|&(_, &w)| w != 0)
            .map(|(i, w)| i * BITS_PER_WORD + (BITS_PER_WORD - 1 - w.leading_zeros() as usize))
    }

    /// Returns a copy of this set with `column` added.
    pub fn with_column(&self, column: usize) -> Self {
        let mut result = self.clone();
        result.set(column);
        result
    }

    /// Returns a copy of this set with `column` removed.
    pub fn without_column(&self, column: usize) -> Self {
        self.check_column(column);
        let mut result = self.clone();
        result.words[column / BITS_PER_WORD] &= !(1u64 << (column % BITS_PER_WORD));
        result
    }

    /// Returns the set of columns in either set.
    pub fn union(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a | b)
    }

    /// Returns the set of columns in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a & b)
    }

    /// Returns the set of columns in `self` but not in `other`.
    ///
    /// ```
    /// use dfd::Vertical;
    ///
    /// let abc = Vertical::new(3, &[0, 1, 2]);
    /// let b = Vertical::new(3, &[1]);
    /// assert_eq!(abc.difference(&b), Vertical::new(3, &[0, 2]));
    /// assert_eq!(b.difference(&abc), Vertical::empty(3));
    /// ```
    pub fn difference(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a & !b)
    }

    /// Returns every column of the schema which is not in this set.
    pub fn complement(&self) -> Self {
        let mut result = self.clone();
        for word in result.words.iter_mut() {
            *word = !*word;
        }
        result.clear_padding();
        result
    }

    /// Returns `true` if `other` contains every column that `self` does.
    ///
    /// ```
    /// use dfd::Vertical;
    /// let nil = Vertical::empty(2);
    /// let one = Vertical::new(2, &[1]);
    ///
    /// assert!(nil.is_subset(&one));
    /// assert!(nil.is_subset(&nil));
    /// assert!(one.is_subset(&one));
    /// assert!(!one.is_subset(&nil));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.check_arity(other);
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & !b == 0)
    }

    /// Returns `true` if `self` contains every column that `other` does.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// Returns `true` if the two sets have a column in common.
    pub fn intersects(&self, other: &Self) -> bool {
        self.check_arity(other);
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Returns an iterator over every subset of this set that has one less column in it, in
    /// ascending order of the removed column.
    ///
    /// ```
    /// use dfd::Vertical;
    ///
    /// let abc = Vertical::new(3, &[0, 1, 2]);
    /// let subsets: Vec<_> = abc.immediate_subsets().collect();
    /// assert_eq!(subsets, vec![
    ///     Vertical::new(3, &[1, 2]),
    ///     Vertical::new(3, &[0, 2]),
    ///     Vertical::new(3, &[0, 1]),
    /// ]);
    /// ```
    pub fn immediate_subsets(&self) -> impl Iterator<Item = Self> + '_ {
        self.iter().map(move |column| self.without_column(column))
    }

    /// Returns an iterator over every superset of this set with one more column in it, never
    /// adding any column of `excluded`.
    pub fn immediate_supersets<'a>(
        &'a self,
        excluded: &'a Vertical,
    ) -> impl Iterator<Item = Self> + 'a {
        self.union(excluded)
            .complement()
            .iter()
            .collect::<SmallVec<[usize; 16]>>()
            .into_iter()
            .map(move |column| self.with_column(column))
    }

    fn set(&mut self, column: usize) {
        self.check_column(column);
        self.words[column / BITS_PER_WORD] |= 1u64 << (column % BITS_PER_WORD);
    }

    fn zip_with(&self, other: &Self, f: impl Fn(u64, u64) -> u64) -> Self {
        self.check_arity(other);
        Vertical {
            arity: self.arity,
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    // Bits past the arity must stay clear or derived Eq/Hash would see phantom columns.
    fn clear_padding(&mut self) {
        let used = self.arity % BITS_PER_WORD;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }

    fn check_column(&self, column: usize) {
        assert!(
            column < self.arity,
            "column {} out of range for arity {}",
            column,
            self.arity
        );
    }

    fn check_arity(&self, other: &Self) {
        assert_eq!(
            self.arity, other.arity,
            "attribute sets belong to schemas of different arity"
        );
    }
}

/// Attribute sets are ordered by size first, then by their columns in ascending order, so sorted
/// collections of dependencies list the simplest left-hand sides first.
impl Ord for Vertical {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.iter().cmp(other.iter()))
            .then_with(|| self.arity.cmp(&other.arity))
    }
}

impl PartialOrd for Vertical {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Debug for Vertical {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Clone)]
struct Columns<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for Columns<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * BITS_PER_WORD + bit);
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}

impl iter::FusedIterator for Columns<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_multi_word_sets() {
        let set = Vertical::new(130, &[0, 63, 64, 129]);
        assert_eq!(set.len(), 4);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 63, 64, 129]);
        assert_eq!(set.first(), Some(0));
        assert_eq!(set.last(), Some(129));
        assert_eq!(set.complement().len(), 126);
        assert!(!set.complement().intersects(&set));
    }

    #[test]
    fn test_complement_respects_arity() {
        let set = Vertical::new(5, &[1, 3]);
        assert_eq!(set.complement(), Vertical::new(5, &[0, 2, 4]));
        assert_eq!(set.complement().complement(), set);
        assert_eq!(Vertical::full(5).len(), 5);
    }

    #[test]
    fn test_immediate_supersets_skip_excluded() {
        let a = Vertical::new(4, &[0]);
        let rhs = Vertical::new(4, &[3]);
        let supersets: Vec<_> = a.immediate_supersets(&rhs).collect();
        assert_eq!(
            supersets,
            vec![Vertical::new(4, &[0, 1]), Vertical::new(4, &[0, 2])]
        );
    }

    #[test]
    fn test_ordering_by_size_then_columns() {
        let mut sets = vec![
            Vertical::new(3, &[0, 1]),
            Vertical::new(3, &[2]),
            Vertical::new(3, &[0]),
            Vertical::empty(3),
        ];
        sets.sort();
        assert_eq!(
            sets,
            vec![
                Vertical::empty(3),
                Vertical::new(3, &[0]),
                Vertical::new(3, &[2]),
                Vertical::new(3, &[0, 1]),
            ]
        );
    }

    #[test]
    fn test_empty_arity() {
        let nil = Vertical::empty(0);
        assert!(nil.is_empty());
        assert_eq!(nil.iter().next(), None);
        assert_eq!(nil.last(), None);
        assert_eq!(Vertical::full(0), nil);
    }

    #[test]
    #[should_panic(expected = "different arity")]
    fn test_arity_mismatch_panics() {
        Vertical::empty(3).union(&Vertical::empty(4));
    }
}
