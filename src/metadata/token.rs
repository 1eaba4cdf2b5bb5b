//! Metadata tokens.
//!
//! A token is the 32-bit handle CIL instructions use to reference metadata: the high byte
//! selects the metadata table, the low 24 bits the row. The analysis treats tokens as opaque
//! identities; resolving them to descriptors is the job of the
//! [`MetadataResolver`](crate::host::MetadataResolver).

use std::fmt;

/// Metadata table identifiers that can appear in the high byte of a [`Token`].
pub mod table {
    /// `TypeRef` table
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table (method or field references)
    pub const MEMBER_REF: u8 = 0x0A;
    /// `StandAloneSig` table (used by `calli`)
    pub const STANDALONE_SIG: u8 = 0x11;
    /// `Event` table
    pub const EVENT: u8 = 0x14;
    /// `Property` table
    pub const PROPERTY: u8 = 0x17;
    /// `TypeSpec` table (instantiated generic types, arrays, generic parameters)
    pub const TYPE_SPEC: u8 = 0x1B;
    /// `MethodSpec` table (instantiated generic methods)
    pub const METHOD_SPEC: u8 = 0x2B;
    /// Pseudo-table for `#US` heap entries referenced by `ldstr`
    pub const USER_STRING: u8 = 0x70;
}

/// A metadata token: table id in the high byte, 1-based row in the lower 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Creates a token from its raw 32-bit value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a row number.
    ///
    /// # Arguments
    ///
    /// * `table` - One of the [`table`] constants
    /// * `row` - The row, truncated to 24 bits
    #[must_use]
    pub const fn from_parts(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw 32-bit value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table id.
    #[must_use]
    pub const fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the row number.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the nil token.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the token references a type (`TypeDef`, `TypeRef` or `TypeSpec`).
    #[must_use]
    pub const fn is_type(&self) -> bool {
        matches!(
            self.table(),
            table::TYPE_DEF | table::TYPE_REF | table::TYPE_SPEC
        )
    }

    /// Returns `true` if the token can reference a method.
    ///
    /// `MemberRef` tokens may reference fields as well; resolution decides.
    #[must_use]
    pub const fn is_method_like(&self) -> bool {
        matches!(
            self.table(),
            table::METHOD_DEF | table::MEMBER_REF | table::METHOD_SPEC
        )
    }

    /// Returns `true` if the token can reference a field.
    #[must_use]
    pub const fn is_field_like(&self) -> bool {
        matches!(self.table(), table::FIELD | table::MEMBER_REF)
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(0x{:08x})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_roundtrip() {
        let token = Token::from_parts(table::METHOD_DEF, 0x1234);
        assert_eq!(token.value(), 0x0600_1234);
        assert_eq!(token.table(), table::METHOD_DEF);
        assert_eq!(token.row(), 0x1234);
    }

    #[test]
    fn row_is_truncated() {
        let token = Token::from_parts(table::FIELD, 0x1FF_FFFF);
        assert_eq!(token.table(), table::FIELD);
        assert_eq!(token.row(), 0x00FF_FFFF);
    }

    #[test]
    fn classification() {
        assert!(Token::from_parts(table::TYPE_SPEC, 1).is_type());
        assert!(!Token::from_parts(table::FIELD, 1).is_type());
        assert!(Token::from_parts(table::MEMBER_REF, 1).is_method_like());
        assert!(Token::from_parts(table::MEMBER_REF, 1).is_field_like());
        assert!(!Token::from_parts(table::METHOD_SPEC, 1).is_field_like());
        assert!(Token::default().is_null());
    }

    #[test]
    fn formatting() {
        let token = Token(0x0200_0005);
        assert_eq!(token.to_string(), "0x02000005");
        assert_eq!(format!("{token:?}"), "Token(0x02000005)");
    }
}
