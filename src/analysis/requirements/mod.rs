//! Member requirements and their propagation.
//!
//! A requirement is a [`MemberTypes`] set attached to a location: a parameter, a return
//! value, a field, `this`, or a generic parameter. Whatever value flows into the location
//! must keep those members reachable on the type it denotes. This module enumerates the
//! members a requirement selects ([`select_members`]), parses reflection type names
//! ([`TypeName`]), and applies requirements to abstract values ([`Effects`]).

mod member_types;
mod members;
mod propagation;
mod type_name;

pub use member_types::MemberTypes;
pub use members::{select_members, MemberFilter};
pub use propagation::{Effects, RequirementTarget};
pub use type_name::TypeName;
