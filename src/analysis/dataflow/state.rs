//! The per-program-point dataflow state: locals, arguments and the evaluation stack.

use std::fmt;

use imbl::OrdMap;

use crate::analysis::{
    dataflow::{Lattice, MeetSemiLattice},
    value::{AbstractValue, ArraySite, ArrayValue, MultiValue},
};

/// Key of a tracked variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalKey {
    /// Argument slot, numbered as in IL (`this` is 0 in instance methods)
    Argument(u16),
    /// Local variable slot
    Local(u16),
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalKey::Argument(i) => write!(f, "A_{i}"),
            LocalKey::Local(i) => write!(f, "V_{i}"),
        }
    }
}

/// A total map from keys to value sets, stored sparsely.
///
/// Keys without an entry map to the map's default. Entries equal to the default are never
/// stored, so two maps are equal exactly when they map every key to the same set. The
/// backing map is persistent, so cloning a state at a block boundary shares structure.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalsMap<K: Ord + Clone> {
    default: MultiValue,
    entries: OrdMap<K, MultiValue>,
}

impl<K: Ord + Clone> LocalsMap<K> {
    /// An empty map with the given default.
    #[must_use]
    pub fn new(default: MultiValue) -> Self {
        LocalsMap {
            default,
            entries: OrdMap::new(),
        }
    }

    /// An empty map defaulting to `{Unknown}`, the shape of every real state.
    #[must_use]
    pub fn unknown() -> Self {
        LocalsMap::new(MultiValue::unknown())
    }

    /// Value of `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> MultiValue {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Sets `key`, dropping the entry if the value equals the default.
    pub fn set(&mut self, key: K, value: MultiValue) {
        if value == self.default {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// The default value.
    #[must_use]
    pub fn default_value(&self) -> &MultiValue {
        &self.default
    }

    /// Explicitly stored entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &MultiValue)> + '_ {
        self.entries.iter()
    }

    /// Number of explicitly stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites stored entries; `f` returns `None` to leave an entry untouched.
    pub fn update_values(&mut self, mut f: impl FnMut(&MultiValue) -> Option<MultiValue>) {
        let updates: Vec<(K, MultiValue)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| f(v).map(|nv| (k.clone(), nv)))
            .collect();
        for (key, value) in updates {
            self.set(key, value);
        }
    }
}

impl<K: Ord + Clone + fmt::Debug> MeetSemiLattice for LocalsMap<K> {
    fn meet(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }
        let mut result = LocalsMap::new(self.default.meet(&other.default));
        for key in self.entries.keys().chain(other.entries.keys()) {
            let value = self.get(key).meet(&other.get(key));
            result.set(key.clone(), value);
        }
        result
    }

    fn is_top(&self) -> bool {
        self.default.is_top() && self.entries.is_empty()
    }
}

impl<K: Ord + Clone + fmt::Debug> Lattice for LocalsMap<K> {
    fn top() -> Self {
        LocalsMap::new(MultiValue::top())
    }
}

/// The evaluation stack.
///
/// `Top` is the lattice top, distinct from an empty stack: it means no path has reached
/// the program point yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OperandStack {
    /// No state yet
    #[default]
    Top,
    /// Slots from bottom to top
    Stack(Vec<MultiValue>),
}

impl OperandStack {
    /// An empty stack.
    #[must_use]
    pub fn empty() -> Self {
        OperandStack::Stack(Vec::new())
    }

    /// Stack depth; `Top` counts as empty.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            OperandStack::Top => 0,
            OperandStack::Stack(values) => values.len(),
        }
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes a value; a `Top` stack becomes a real stack.
    pub fn push(&mut self, value: MultiValue) {
        match self {
            OperandStack::Top => *self = OperandStack::Stack(vec![value]),
            OperandStack::Stack(values) => values.push(value),
        }
    }

    /// Pops the topmost value, `None` on underflow.
    pub fn pop(&mut self) -> Option<MultiValue> {
        match self {
            OperandStack::Top => None,
            OperandStack::Stack(values) => values.pop(),
        }
    }

    /// The topmost value.
    #[must_use]
    pub fn peek(&self) -> Option<&MultiValue> {
        match self {
            OperandStack::Top => None,
            OperandStack::Stack(values) => values.last(),
        }
    }

    /// Discards every slot.
    pub fn clear(&mut self) {
        *self = OperandStack::empty();
    }

    /// Slots from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &MultiValue> + '_ {
        let slice: &[MultiValue] = match self {
            OperandStack::Top => &[],
            OperandStack::Stack(values) => values,
        };
        slice.iter()
    }

    /// Rewrites slots in place; `f` returns `None` to leave a slot untouched.
    pub fn update_values(&mut self, mut f: impl FnMut(&MultiValue) -> Option<MultiValue>) {
        if let OperandStack::Stack(values) = self {
            for slot in values.iter_mut() {
                if let Some(new) = f(slot) {
                    *slot = new;
                }
            }
        }
    }
}

impl MeetSemiLattice for OperandStack {
    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (OperandStack::Top, x) | (x, OperandStack::Top) => x.clone(),
            (OperandStack::Stack(a), OperandStack::Stack(b)) if a.len() == b.len() => {
                OperandStack::Stack(a.iter().zip(b).map(|(x, y)| x.meet(y)).collect())
            }
            (OperandStack::Stack(a), OperandStack::Stack(b)) => {
                // Inconsistent depths only occur in invalid IL. Align from the top; a slot
                // one side lacks is unknown.
                let depth = a.len().max(b.len());
                let slot = |values: &[MultiValue], from_top: usize| {
                    values
                        .len()
                        .checked_sub(from_top + 1)
                        .map_or_else(MultiValue::unknown, |i| values[i].clone())
                };
                let mut merged: Vec<MultiValue> = (0..depth)
                    .map(|from_top| slot(a, from_top).meet(&slot(b, from_top)))
                    .collect();
                merged.reverse();
                OperandStack::Stack(merged)
            }
        }
    }

    fn is_top(&self) -> bool {
        matches!(self, OperandStack::Top)
    }
}

impl Lattice for OperandStack {
    fn top() -> Self {
        OperandStack::Top
    }
}

/// Locals, arguments and evaluation stack at one program point.
#[derive(Debug, Clone, PartialEq)]
pub struct DataflowState {
    /// Argument and local variable values
    pub locals: LocalsMap<LocalKey>,
    /// Evaluation stack
    pub stack: OperandStack,
}

impl DataflowState {
    /// A real state with every variable unknown and an empty stack.
    #[must_use]
    pub fn new() -> Self {
        DataflowState {
            locals: LocalsMap::unknown(),
            stack: OperandStack::empty(),
        }
    }

    /// Every distinct version of the array allocated at `site` held on the stack or in a
    /// variable.
    #[must_use]
    pub fn array_versions(&self, site: ArraySite) -> Vec<ArrayValue> {
        let mut versions: Vec<ArrayValue> = Vec::new();
        for value in self
            .stack
            .iter()
            .chain(self.locals.iter().map(|(_, value)| value))
            .flat_map(MultiValue::iter)
        {
            if let AbstractValue::Array(array) = value {
                if array.site == site && !versions.contains(array) {
                    versions.push(array.clone());
                }
            }
        }
        versions
    }

    /// Replaces `versions` with `updated` wherever one of them is held.
    ///
    /// Other arrays from the same allocation site, such as an earlier allocation kept in
    /// another variable by a loop, are left alone.
    pub fn replace_array(&mut self, versions: &[ArrayValue], updated: &ArrayValue) {
        let rewrite = |set: &MultiValue| {
            let held = set
                .iter()
                .any(|v| matches!(v, AbstractValue::Array(a) if versions.contains(a)));
            held.then(|| {
                let mut rewritten = MultiValue::empty();
                for value in set.iter() {
                    match value {
                        AbstractValue::Array(a) if versions.contains(a) => {}
                        other => rewritten.insert(other.clone()),
                    }
                }
                rewritten.insert(AbstractValue::Array(updated.clone()));
                rewritten
            })
        };
        self.stack.update_values(rewrite);
        self.locals.update_values(rewrite);
    }
}

impl Default for DataflowState {
    fn default() -> Self {
        DataflowState::new()
    }
}

impl MeetSemiLattice for DataflowState {
    fn meet(&self, other: &Self) -> Self {
        if self.is_top() {
            return other.clone();
        }
        if other.is_top() {
            return self.clone();
        }
        DataflowState {
            locals: self.locals.meet(&other.locals),
            stack: self.stack.meet(&other.stack),
        }
    }

    fn is_top(&self) -> bool {
        self.stack.is_top() && self.locals.is_top()
    }
}

impl Lattice for DataflowState {
    fn top() -> Self {
        DataflowState {
            locals: LocalsMap::top(),
            stack: OperandStack::Top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::cfg::BlockId, metadata::token::Token};

    fn s(text: &str) -> MultiValue {
        MultiValue::single(AbstractValue::string(text))
    }

    #[test]
    fn default_entries_are_not_stored() {
        let mut map: LocalsMap<LocalKey> = LocalsMap::unknown();
        map.set(LocalKey::Local(0), s("a"));
        assert_eq!(map.len(), 1);
        map.set(LocalKey::Local(0), MultiValue::unknown());
        assert!(map.is_empty());
        assert_eq!(map, LocalsMap::unknown());
    }

    #[test]
    fn map_meet_uses_defaults_for_missing_keys() {
        let mut left: LocalsMap<LocalKey> = LocalsMap::unknown();
        left.set(LocalKey::Local(0), s("a"));
        let mut right: LocalsMap<LocalKey> = LocalsMap::unknown();
        right.set(LocalKey::Local(0), s("b"));
        right.set(LocalKey::Local(1), s("c"));

        let merged = left.meet(&right);
        assert_eq!(merged.get(&LocalKey::Local(0)), s("a").merge(&s("b")));
        assert!(merged.get(&LocalKey::Local(1)).is_unknown());
        assert_eq!(merged.len(), 1);
        assert_eq!(left.meet(&LocalsMap::top()), left);
    }

    #[test]
    fn stack_meet_mismatched_depths() {
        let short = OperandStack::Stack(vec![s("x")]);
        let long = OperandStack::Stack(vec![s("y"), s("z")]);
        let merged = short.meet(&long);
        assert_eq!(
            merged,
            OperandStack::Stack(vec![MultiValue::unknown(), s("x").merge(&s("z"))])
        );
        assert_eq!(merged, long.meet(&short));
    }

    #[test]
    fn top_is_identity_for_states() {
        let mut state = DataflowState::new();
        state.stack.push(s("a"));
        assert_eq!(state.meet(&DataflowState::top()), state);
        assert_eq!(DataflowState::top().meet(&state), state);
        assert!(DataflowState::top().is_top());
        assert!(!DataflowState::new().is_top());
    }

    #[test]
    fn array_aliases_are_updated() {
        let site = ArraySite {
            method: Token::new(0x0600_0001),
            offset: 0,
        };
        let array = ArrayValue::new(site, MultiValue::single(AbstractValue::ConstInt(1)));
        let mut state = DataflowState::new();
        let original = MultiValue::single(AbstractValue::Array(array.clone()));
        state.locals.set(LocalKey::Local(0), original.clone());
        state.stack.push(original);

        let stored = array.with_element(0, &s("a"), BlockId::new(1), 32);
        state.replace_array(&[array], &stored);

        let expected = MultiValue::single(AbstractValue::Array(stored));
        assert_eq!(state.locals.get(&LocalKey::Local(0)), expected);
        assert_eq!(state.stack.peek(), Some(&expected));
    }

    #[test]
    fn other_allocations_from_the_same_site_are_kept() {
        let site = ArraySite {
            method: Token::new(0x0600_0001),
            offset: 0,
        };
        let fresh = ArrayValue::new(site, MultiValue::single(AbstractValue::ConstInt(1)));
        let earlier = fresh.with_element(0, &s("old"), BlockId::new(1), 32);
        let mut state = DataflowState::new();
        state
            .locals
            .set(LocalKey::Local(0), MultiValue::single(AbstractValue::Array(earlier.clone())));
        state
            .locals
            .set(LocalKey::Local(1), MultiValue::single(AbstractValue::Array(fresh.clone())));
        assert_eq!(state.array_versions(site).len(), 2);

        let stored = fresh.with_element(0, &s("new"), BlockId::new(2), 32);
        state.replace_array(&[fresh], &stored);

        assert_eq!(
            state.locals.get(&LocalKey::Local(0)),
            MultiValue::single(AbstractValue::Array(earlier))
        );
        assert_eq!(
            state.locals.get(&LocalKey::Local(1)),
            MultiValue::single(AbstractValue::Array(stored))
        );
    }
}
