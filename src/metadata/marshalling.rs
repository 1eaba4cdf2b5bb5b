//! Marshalling descriptors for p/invoke signatures.
//!
//! Only the shape of the `FieldMarshal` blob matters to the analysis: whether a parameter or
//! return value is marshalled as a COM interface. Size and index parameters are kept so a
//! host can carry the full descriptor, but the interop heuristic ignores them.

/// Native representation of a marshalled value (ECMA-335 II.23.4 `NATIVE_TYPE_*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeType {
    /// `NATIVE_TYPE_BOOLEAN`
    Boolean,
    /// Signed or unsigned integer of the given byte width
    Integer {
        /// Width in bytes
        size: u8,
        /// Whether the integer is signed
        signed: bool,
    },
    /// `NATIVE_TYPE_R4` / `NATIVE_TYPE_R8`
    Float {
        /// Width in bytes
        size: u8,
    },
    /// Pointer-sized integer
    Int,
    /// `NATIVE_TYPE_BSTR`
    BStr,
    /// `NATIVE_TYPE_LPSTR`
    LPStr,
    /// `NATIVE_TYPE_LPWSTR`
    LPWStr,
    /// `NATIVE_TYPE_LPUTF8STR`
    LPUtf8Str,
    /// `NATIVE_TYPE_IUNKNOWN`
    IUnknown,
    /// `NATIVE_TYPE_IDISPATCH`
    IDispatch,
    /// `NATIVE_TYPE_IINSPECTABLE`
    IInspectable,
    /// `NATIVE_TYPE_INTF`
    Interface {
        /// Parameter index supplying the interface id, if any
        iid_param_index: Option<u32>,
    },
    /// `NATIVE_TYPE_STRUCT`
    Struct,
    /// `NATIVE_TYPE_LPARRAY`
    Array {
        /// Element representation
        element_type: Box<NativeType>,
        /// Parameter index supplying the element count
        num_param: Option<u32>,
    },
    /// `NATIVE_TYPE_SAFEARRAY`
    SafeArray,
    /// `NATIVE_TYPE_FUNC`
    Func,
    /// `NATIVE_TYPE_ASANY`
    AsAny,
    /// `NATIVE_TYPE_CUSTOMMARSHALER`
    CustomMarshaler {
        /// Name of the marshaller type
        type_name: String,
    },
}

impl NativeType {
    /// Returns `true` if the descriptor marshals the value as a COM interface pointer.
    #[must_use]
    pub fn is_com_interface(&self) -> bool {
        matches!(
            self,
            NativeType::IUnknown | NativeType::IDispatch | NativeType::Interface { .. }
        )
    }
}
