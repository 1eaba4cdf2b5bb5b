//! Flat sets of abstract values.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::analysis::{
    dataflow::{Lattice, MeetSemiLattice},
    value::AbstractValue,
};

/// A set of abstract values a storage location or stack slot may hold.
///
/// The empty set is the lattice top ("no value has flowed here yet"); a set holding
/// `Unknown` is exactly `{Unknown}` and absorbs everything merged into it. A set can never
/// contain another set, so merges of merges are flat by construction.
///
/// The backing set is shared, making clones cheap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MultiValue {
    values: Arc<BTreeSet<AbstractValue>>,
}

impl MultiValue {
    /// The empty set.
    #[must_use]
    pub fn empty() -> Self {
        MultiValue::default()
    }

    /// `{Unknown}`.
    #[must_use]
    pub fn unknown() -> Self {
        MultiValue::single(AbstractValue::Unknown)
    }

    /// A set of one value.
    #[must_use]
    pub fn single(value: AbstractValue) -> Self {
        MultiValue {
            values: Arc::new(BTreeSet::from([value])),
        }
    }

    /// Number of distinct values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` for the empty set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` for `{Unknown}`.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.values.contains(&AbstractValue::Unknown)
    }

    /// The only value, if the set holds exactly one.
    #[must_use]
    pub fn as_single(&self) -> Option<&AbstractValue> {
        if self.values.len() == 1 {
            self.values.iter().next()
        } else {
            None
        }
    }

    /// The integer constant, if the set is exactly one constant.
    #[must_use]
    pub fn as_const_int(&self) -> Option<i32> {
        self.as_single().and_then(AbstractValue::as_const_int)
    }

    /// Values in their canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &AbstractValue> + '_ {
        self.values.iter()
    }

    /// Returns `true` if `value` is a member.
    #[must_use]
    pub fn contains(&self, value: &AbstractValue) -> bool {
        self.values.contains(value)
    }

    /// Adds a value.
    pub fn insert(&mut self, value: AbstractValue) {
        if self.is_unknown() || self.values.contains(&value) {
            return;
        }
        if value.is_unknown() {
            *self = MultiValue::unknown();
            return;
        }
        Arc::make_mut(&mut self.values).insert(value);
    }

    /// Union of two sets.
    #[must_use]
    pub fn merge(&self, other: &MultiValue) -> MultiValue {
        if self.is_unknown() || other.is_empty() || self == other {
            return self.clone();
        }
        if other.is_unknown() || self.is_empty() {
            return other.clone();
        }
        let mut merged = self.clone();
        for value in other.iter() {
            merged.insert(value.clone());
        }
        merged
    }

    /// Applies `f` to every member and collects the results.
    #[must_use]
    pub fn map(&self, f: impl FnMut(&AbstractValue) -> AbstractValue) -> MultiValue {
        self.iter().map(f).collect()
    }

    /// Like [`MultiValue::map`] but each member may expand to a set.
    #[must_use]
    pub fn flat_map(&self, mut f: impl FnMut(&AbstractValue) -> MultiValue) -> MultiValue {
        let mut result = MultiValue::empty();
        for value in self.iter() {
            result = result.merge(&f(value));
            if result.is_unknown() {
                break;
            }
        }
        result
    }
}

impl From<AbstractValue> for MultiValue {
    fn from(value: AbstractValue) -> Self {
        MultiValue::single(value)
    }
}

impl FromIterator<AbstractValue> for MultiValue {
    fn from_iter<I: IntoIterator<Item = AbstractValue>>(iter: I) -> Self {
        let mut set = MultiValue::empty();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<'a> IntoIterator for &'a MultiValue {
    type Item = &'a AbstractValue;
    type IntoIter = std::collections::btree_set::Iter<'a, AbstractValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl MeetSemiLattice for MultiValue {
    fn meet(&self, other: &Self) -> Self {
        self.merge(other)
    }

    fn is_top(&self) -> bool {
        self.is_empty()
    }

    fn is_bottom(&self) -> bool {
        self.is_unknown()
    }
}

impl Lattice for MultiValue {
    fn top() -> Self {
        MultiValue::empty()
    }
}

impl fmt::Display for MultiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_single() {
            Some(value) => write!(f, "{value}"),
            None => {
                f.write_str("{")?;
                for (i, value) in self.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> MultiValue {
        MultiValue::single(AbstractValue::string(text))
    }

    #[test]
    fn unknown_absorbs() {
        let merged = s("a").merge(&MultiValue::unknown());
        assert_eq!(merged, MultiValue::unknown());
        assert_eq!(MultiValue::unknown().merge(&s("b")), MultiValue::unknown());

        let mut set = s("a").merge(&s("b"));
        set.insert(AbstractValue::Unknown);
        assert_eq!(set.len(), 1);
        assert!(set.is_unknown());
    }

    #[test]
    fn empty_is_identity() {
        assert_eq!(s("a").merge(&MultiValue::empty()), s("a"));
        assert_eq!(MultiValue::empty().merge(&s("a")), s("a"));
        assert!(MultiValue::top().is_top());
    }

    #[test]
    fn merges_are_flat() {
        let nested = s("a").merge(&s("b")).merge(&s("c"));
        let flat: MultiValue = ["a", "b", "c"].iter().map(|t| AbstractValue::string(t)).collect();
        assert_eq!(nested, flat);
        assert_eq!(nested.len(), 3);
        assert_eq!(nested.as_single(), None);
    }

    #[test]
    fn flat_map_stops_at_unknown() {
        let set = s("a").merge(&s("b"));
        let mut calls = 0;
        let mapped = set.flat_map(|_| {
            calls += 1;
            MultiValue::unknown()
        });
        assert!(mapped.is_unknown());
        assert_eq!(calls, 1);
    }
}
