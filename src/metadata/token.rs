//! Metadata token representation.
//!
//! A token is a packed 32-bit reference into a resolution scope: the high
//! byte selects the table, the low 24 bits the row. [`TokenKind`] classifies
//! the tables the decoder and resolvers care about.

use std::fmt;

/// A metadata token representing a reference into a resolution scope's symbol table.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Classifies the token by the symbol table it points into.
    ///
    /// Returns `None` for tables that hold no resolvable entity.
    #[must_use]
    pub fn kind(&self) -> Option<TokenKind> {
        match self.table() {
            0x01 | 0x02 | 0x1B => Some(TokenKind::Type),
            0x04 => Some(TokenKind::Field),
            0x06 | 0x2B => Some(TokenKind::Method),
            0x0A => Some(TokenKind::Member),
            0x11 => Some(TokenKind::Signature),
            0x70 => Some(TokenKind::String),
            _ => None,
        }
    }
}

/// The shape of entity a token resolves to.
///
/// `Member` is the ambiguous shape: a member-reference table row can hold
/// either a field or a method, and a token operand declared with this shape
/// may fail to classify at all (the relaxed-decoding fallback case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TokenKind {
    /// A type reference or definition
    Type,
    /// A field
    Field,
    /// A method or constructor
    Method,
    /// A user string literal
    String,
    /// A standalone signature blob
    Signature,
    /// An arbitrary member (field, method, or unclassifiable)
    Member,
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
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
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
    fn test_token_parts() {
        let token = Token::new(0x0600_0001);
        assert_eq!(token.value(), 0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(!token.is_null());
        assert!(Token::new(0).is_null());
    }

    #[test]
    fn test_token_kind() {
        assert_eq!(Token::new(0x0200_0001).kind(), Some(TokenKind::Type));
        assert_eq!(Token::new(0x1B00_0002).kind(), Some(TokenKind::Type));
        assert_eq!(Token::new(0x0400_0001).kind(), Some(TokenKind::Field));
        assert_eq!(Token::new(0x0600_0003).kind(), Some(TokenKind::Method));
        assert_eq!(Token::new(0x0A00_0001).kind(), Some(TokenKind::Member));
        assert_eq!(Token::new(0x7000_0001).kind(), Some(TokenKind::String));
        assert_eq!(Token::new(0x1100_0001).kind(), Some(TokenKind::Signature));
        assert_eq!(Token::new(0xFF00_0001).kind(), None);
    }

    #[test]
    fn test_token_display() {
        let token = Token::new(0x0400_0001);
        assert_eq!(format!("{token}"), "0x04000001");
    }

    #[test]
    fn test_token_conversions() {
        let token: Token = 0x0600_0010.into();
        let raw: u32 = token.into();
        assert_eq!(raw, 0x0600_0010);
    }
}
