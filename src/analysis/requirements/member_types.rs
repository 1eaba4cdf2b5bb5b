//! Member category bitset (`DynamicallyAccessedMemberTypes`).

use bitflags::bitflags;

bitflags! {
    /// Categories of members that must stay reachable on whatever type a value denotes.
    ///
    /// The bit values match `System.Diagnostics.CodeAnalysis.DynamicallyAccessedMemberTypes`,
    /// so annotations read from custom attribute blobs can be converted with
    /// [`MemberTypes::from_bits_retain`]. [`MemberTypes::PUBLIC_CONSTRUCTORS`] includes the
    /// parameterless constructor bit, and [`MemberTypes::ALL`] covers every current and
    /// future category.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct MemberTypes: u32 {
        /// Public instance constructor without parameters
        const PUBLIC_PARAMETERLESS_CONSTRUCTOR = 0x0001;
        /// All public instance constructors
        const PUBLIC_CONSTRUCTORS = 0x0003;
        /// All non-public instance constructors
        const NON_PUBLIC_CONSTRUCTORS = 0x0004;
        /// Public methods, including inherited ones
        const PUBLIC_METHODS = 0x0008;
        /// Non-public methods declared on the type
        const NON_PUBLIC_METHODS = 0x0010;
        /// Public fields, including inherited ones
        const PUBLIC_FIELDS = 0x0020;
        /// Non-public fields declared on the type
        const NON_PUBLIC_FIELDS = 0x0040;
        /// Public nested types
        const PUBLIC_NESTED_TYPES = 0x0080;
        /// Non-public nested types
        const NON_PUBLIC_NESTED_TYPES = 0x0100;
        /// Public properties, including inherited ones
        const PUBLIC_PROPERTIES = 0x0200;
        /// Non-public properties declared on the type
        const NON_PUBLIC_PROPERTIES = 0x0400;
        /// Public events, including inherited ones
        const PUBLIC_EVENTS = 0x0800;
        /// Non-public events declared on the type
        const NON_PUBLIC_EVENTS = 0x1000;
        /// All implemented interfaces
        const INTERFACES = 0x2000;
        /// Everything
        const ALL = 0xFFFF_FFFF;
    }
}

impl MemberTypes {
    /// The categories `Type.BaseType` carries over to the base type.
    ///
    /// Constructors and nested types are not inherited, and non-public members of a base
    /// type are not visible through reflection on a derived type.
    #[must_use]
    pub fn for_base_type(self) -> MemberTypes {
        if self == MemberTypes::ALL {
            return MemberTypes::ALL;
        }
        self & (MemberTypes::PUBLIC_EVENTS
            | MemberTypes::PUBLIC_FIELDS
            | MemberTypes::PUBLIC_METHODS
            | MemberTypes::PUBLIC_PROPERTIES
            | MemberTypes::INTERFACES)
    }

    /// Returns `true` if a value annotated with `self` satisfies a target requiring
    /// `required`.
    #[must_use]
    pub fn satisfies(self, required: MemberTypes) -> bool {
        self.contains(required)
    }

    /// Returns `true` if any of the bits of `category` are requested.
    ///
    /// Unlike `intersects`, this treats [`MemberTypes::PUBLIC_CONSTRUCTORS`] as a category of
    /// its own: the parameterless bit alone does not request all public constructors.
    #[must_use]
    pub fn requests(self, category: MemberTypes) -> bool {
        self.contains(category)
    }
}
