//! Lattice traits for dataflow analysis.
//!
//! The analysis domain is oriented the way ILLink's is: the *top* element means "no value
//! has reached this point yet" and is the identity of meet, while combining information
//! from several paths moves *down* towards less precise values. Meet on value sets is
//! therefore union, and the absorbing `Unknown` value sits at the bottom.
//!
//! # Laws
//!
//! Every implementation must satisfy, for all `x`, `y`, `z`:
//!
//! - **Idempotent**: `x.meet(x) == x`
//! - **Commutative**: `x.meet(y) == y.meet(x)`
//! - **Associative**: `x.meet(y.meet(z)) == x.meet(y).meet(z)`
//! - **Identity**: `x.meet(top) == x`
//!
//! The solver relies on these to reach the same fixpoint regardless of visiting order.

use std::fmt::Debug;

/// A meet semi-lattice.
///
/// # Examples
///
/// ```rust,ignore
/// use dotreach::analysis::MeetSemiLattice;
///
/// impl MeetSemiLattice for Reached {
///     fn meet(&self, other: &Self) -> Self {
///         Reached(self.0 || other.0)
///     }
///
///     fn is_top(&self) -> bool {
///         !self.0
///     }
/// }
/// ```
pub trait MeetSemiLattice: Clone + Debug + PartialEq {
    /// Combines the information of two paths that merge.
    #[must_use]
    fn meet(&self, other: &Self) -> Self;

    /// Returns `true` if this is the top element, i.e. nothing has flowed here yet.
    fn is_top(&self) -> bool;

    /// Returns `true` if this element absorbs everything it is met with.
    ///
    /// Lattices without a useful bottom keep the default.
    fn is_bottom(&self) -> bool {
        false
    }
}

/// A meet semi-lattice with a constructible top element.
pub trait Lattice: MeetSemiLattice {
    /// The top element, identity of [`MeetSemiLattice::meet`].
    fn top() -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Reached(bool);

    impl MeetSemiLattice for Reached {
        fn meet(&self, other: &Self) -> Self {
            Reached(self.0 || other.0)
        }

        fn is_top(&self) -> bool {
            !self.0
        }

        fn is_bottom(&self) -> bool {
            self.0
        }
    }

    impl Lattice for Reached {
        fn top() -> Self {
            Reached(false)
        }
    }

    #[test]
    fn laws_hold_for_example_lattice() {
        let values = [Reached(false), Reached(true)];
        for x in &values {
            assert_eq!(x.meet(x), *x);
            assert_eq!(x.meet(&Reached::top()), *x);
            for y in &values {
                assert_eq!(x.meet(y), y.meet(x));
            }
        }
        assert!(Reached(true).is_bottom());
    }
}
