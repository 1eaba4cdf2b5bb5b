//! The abstract value domain.
//!
//! [`AbstractValue`] is a single possible runtime value: a constant, a reflected type or
//! method, a symbolic placeholder for a parameter, return value, field or generic
//! parameter, an array, or an address. [`MultiValue`] is the set of values a location may
//! hold and is what the dataflow state stores.

mod abstract_value;
mod array;
mod multi;

pub use abstract_value::{
    AbstractValue, ArraySite, FieldValue, GenericOwner, GenericParameterValue, ParameterValue,
    ReferenceKind, ReturnValue, SourceKind, ThisValue,
};
pub use array::{ArrayValue, TrackedElement};
pub use multi::MultiValue;
