//! Sort and filter descriptions.
//!
//! A [`SortOrder`] is an ordered list of sort keys, each a named field with an
//! extractor and a [`Direction`], composed into one comparator when the order
//! is built. A [`Filter`] is a predicate together with the names of the fields
//! it reads. The field names tell the projection which item change
//! notifications can affect ordering or visibility.

use std::{borrow::Cow, cmp::Ordering, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

/// Sort direction for one key of a [`SortOrder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    /// Apply this direction to an ascending comparison result.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Ascending),
            "desc" | "descending" => Ok(Direction::Descending),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

type KeyCompare<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

struct SortKey<T> {
    field: Cow<'static, str>,
    compare: KeyCompare<T>,
    direction: Direction,
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            compare: Arc::clone(&self.compare),
            direction: self.direction,
        }
    }
}

/// A comparator built from `(field, extractor, direction)` keys.
///
/// Keys are consulted in order; the first one that does not compare equal
/// decides. An empty order compares everything as equal.
///
/// ```
/// use sortview::{Direction, SortOrder};
///
/// struct File { name: String, size: u64 }
///
/// let order = SortOrder::by("size", |f: &File| f.size, Direction::Descending)
///     .then_by("name", |f: &File| f.name.clone(), Direction::Ascending);
///
/// let big = File { name: "b".into(), size: 10 };
/// let small = File { name: "a".into(), size: 1 };
/// assert!(order.compare(&big, &small).is_lt());
/// ```
pub struct SortOrder<T> {
    keys: Vec<SortKey<T>>,
}

impl<T> Clone for SortOrder<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<T: 'static> Default for SortOrder<T> {
    fn default() -> Self {
        Self::unsorted()
    }
}

impl<T> fmt::Debug for SortOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.keys.iter().map(|k| (&k.field, k.direction)))
            .finish()
    }
}

impl<T: 'static> SortOrder<T> {
    /// An order with no keys.
    pub fn unsorted() -> Self {
        Self { keys: Vec::new() }
    }

    /// Order by one extracted field.
    pub fn by<V, F>(field: impl Into<Cow<'static, str>>, extract: F, direction: Direction) -> Self
    where
        V: Ord,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self::unsorted().then_by(field, extract, direction)
    }

    /// Order by one field using a custom comparison.
    pub fn by_cmp<F>(field: impl Into<Cow<'static, str>>, compare: F, direction: Direction) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self::unsorted().then_by_cmp(field, compare, direction)
    }

    /// Append a key used when all previous keys compare equal.
    pub fn then_by<V, F>(self, field: impl Into<Cow<'static, str>>, extract: F, direction: Direction) -> Self
    where
        V: Ord,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.then_by_cmp(field, move |a, b| extract(a).cmp(&extract(b)), direction)
    }

    /// Append a custom-comparison key.
    pub fn then_by_cmp<F>(mut self, field: impl Into<Cow<'static, str>>, compare: F, direction: Direction) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.keys.push(SortKey {
            field: field.into(),
            compare: Arc::new(compare),
            direction,
        });
        self
    }

    /// Compare two items under this order.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        for key in &self.keys {
            let ordering = key.direction.apply((key.compare)(a, b));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Names of the fields this order reads, in key order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.field.as_ref())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A visibility predicate and the fields it depends on.
pub struct Filter<T> {
    fields: Vec<Cow<'static, str>>,
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl<T> Filter<T> {
    /// Create a filter over the named fields.
    ///
    /// Items for which `predicate` returns `false` are hidden from the view.
    pub fn new<I, S, P>(fields: I, predicate: P) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the predicate for one item.
    pub fn matches(&self, item: &T) -> bool {
        (self.predicate)(item)
    }

    /// Names of the fields the predicate reads.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.as_ref())
    }

    /// Combine two filters; an item must pass both.
    pub fn and(self, other: Filter<T>) -> Self
    where
        T: 'static,
    {
        let mut fields = self.fields;
        for field in other.fields {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        let (left, right) = (self.predicate, other.predicate);
        Self {
            fields,
            predicate: Arc::new(move |item: &T| left(item) && right(item)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Row {
        name: &'static str,
        size: u64,
    }

    #[test]
    fn test_keys_compose_in_order() {
        let order = SortOrder::by("size", |r: &Row| r.size, Direction::Descending)
            .then_by("name", |r: &Row| r.name, Direction::Ascending);

        let mut rows = vec![
            Row { name: "b", size: 1 },
            Row { name: "a", size: 1 },
            Row { name: "c", size: 9 },
        ];
        rows.sort_by(|a, b| order.compare(a, b));
        let names: Vec<_> = rows.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(order.fields().collect::<Vec<_>>(), vec!["size", "name"]);
    }

    #[test]
    fn test_unsorted_is_all_equal() {
        let order = SortOrder::<Row>::unsorted();
        let a = Row { name: "a", size: 1 };
        let b = Row { name: "b", size: 2 };
        assert_eq!(order.compare(&a, &b), Ordering::Equal);
        assert!(order.is_empty());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("desc".parse::<Direction>(), Ok(Direction::Descending));
        assert_eq!("Ascending".parse::<Direction>(), Ok(Direction::Ascending));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_filter_and_merges_fields() {
        let big = Filter::new(["size"], |r: &Row| r.size > 10);
        let named = Filter::new(["name", "size"], |r: &Row| r.name.starts_with('a'));
        let both = big.and(named);

        assert_eq!(both.fields().collect::<Vec<_>>(), vec!["size", "name"]);
        assert!(both.matches(&Row { name: "abc", size: 11 }));
        assert!(!both.matches(&Row { name: "abc", size: 1 }));
        assert!(!both.matches(&Row { name: "xyz", size: 11 }));
    }
}
