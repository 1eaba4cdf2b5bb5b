//! Arrays with partially known contents.

use std::{collections::BTreeMap, sync::Arc};

use crate::analysis::{
    cfg::BlockId,
    value::{AbstractValue, ArraySite, MultiValue},
};

/// An element stored at a constant index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackedElement {
    /// Stored values
    pub value: MultiValue,
    /// Block that performed the latest store
    pub block: BlockId,
}

/// An array allocated by a `newarr` in the analyzed method.
///
/// Only stores at constant indices are tracked, and only up to a configured number of
/// distinct indices. Two arrays from the same allocation site are the same array as far as
/// the analysis is concerned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayValue {
    /// Allocation site
    pub site: ArraySite,
    /// The length operand of the `newarr`
    pub size: MultiValue,
    elements: Arc<BTreeMap<i32, TrackedElement>>,
}

impl ArrayValue {
    /// A freshly allocated array with no tracked elements.
    #[must_use]
    pub fn new(site: ArraySite, size: MultiValue) -> Self {
        ArrayValue {
            site,
            size,
            elements: Arc::default(),
        }
    }

    /// The length, when it is a single constant.
    #[must_use]
    pub fn constant_size(&self) -> Option<i32> {
        self.size.as_const_int()
    }

    /// Values stored at `index`; `{Unknown}` for untracked indices.
    #[must_use]
    pub fn element(&self, index: i32) -> MultiValue {
        self.elements
            .get(&index)
            .map_or_else(MultiValue::unknown, |e| e.value.clone())
    }

    /// Tracked elements in index order.
    pub fn elements(&self) -> impl Iterator<Item = (i32, &TrackedElement)> + '_ {
        self.elements.iter().map(|(i, e)| (*i, e))
    }

    /// Number of tracked indices.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.elements.len()
    }

    /// The array after storing `value` at a constant `index` from `block`.
    ///
    /// A store from the block that wrote the index last overwrites it; a store from
    /// another block merges with what is there, since the earlier store may still be the
    /// one observed on some path. When `capacity` indices are already tracked, a store to
    /// a new index is dropped and reads at that index stay `Unknown`.
    #[must_use]
    pub fn with_element(
        &self,
        index: i32,
        value: &MultiValue,
        block: BlockId,
        capacity: usize,
    ) -> ArrayValue {
        let stored = value.map(AbstractValue::without_array_contents);
        let mut elements = self.elements.as_ref().clone();
        let tracked = elements.len();
        match elements.get_mut(&index) {
            Some(existing) if existing.block == block => existing.value = stored,
            Some(existing) => {
                existing.value = existing.value.merge(&stored);
                existing.block = block;
            }
            None if tracked < capacity => {
                elements.insert(
                    index,
                    TrackedElement {
                        value: stored,
                        block,
                    },
                );
            }
            None => {}
        }
        ArrayValue {
            site: self.site,
            size: self.size.clone(),
            elements: Arc::new(elements),
        }
    }

    /// Two versions of the same allocation that reached one point on different paths.
    ///
    /// An index stays tracked only if both versions track it, holding the union of their
    /// values; an index tracked on one side reads `Unknown` on the other.
    #[must_use]
    pub fn merge(&self, other: &ArrayValue) -> ArrayValue {
        if self == other {
            return self.clone();
        }
        let elements = self
            .elements
            .iter()
            .filter_map(|(index, mine)| {
                let theirs = other.elements.get(index)?;
                Some((
                    *index,
                    TrackedElement {
                        value: mine.value.merge(&theirs.value),
                        block: mine.block.max(theirs.block),
                    },
                ))
            })
            .collect();
        ArrayValue {
            site: self.site,
            size: self.size.merge(&other.size),
            elements: Arc::new(elements),
        }
    }

    /// The array after a store at an unknown index: nothing stays tracked.
    #[must_use]
    pub fn cleared(&self) -> ArrayValue {
        self.without_contents()
    }

    /// The same allocation with no tracked contents.
    #[must_use]
    pub fn without_contents(&self) -> ArrayValue {
        ArrayValue::new(self.site, self.size.clone())
    }
}
