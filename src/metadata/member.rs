//! Resolved entity model for token resolution.
//!
//! These descriptors stand in for the host runtime's reflection objects: the
//! interception engine never inspects managed objects directly, it works with
//! the identities recorded here when a module was registered. All descriptors
//! are immutable once constructed and shared via [`std::sync::Arc`].

use std::sync::Arc;

use crate::metadata::{method::MethodRef, token::Token};

/// A resolved entity behind a token.
///
/// `String` and `Signature` are the non-member shapes: asking a resolver for
/// an arbitrary member and landing on one of these is a shape mismatch.
#[derive(Debug, Clone)]
pub enum Member {
    /// A type reference
    Type(Arc<TypeRef>),
    /// A field reference
    Field(Arc<FieldRef>),
    /// A method or constructor reference
    Method(Arc<MethodRef>),
    /// A user string literal
    String(Arc<str>),
    /// A standalone signature blob
    Signature(Arc<[u8]>),
}

impl Member {
    /// The token under which this entity was declared, if it carries one.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            Member::Type(t) => Some(t.token),
            Member::Field(f) => Some(f.token),
            Member::Method(m) => Some(m.token),
            Member::String(_) | Member::Signature(_) => None,
        }
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Member::Type(a), Member::Type(b)) => Arc::ptr_eq(a, b),
            (Member::Field(a), Member::Field(b)) => Arc::ptr_eq(a, b),
            (Member::Method(a), Member::Method(b)) => Arc::ptr_eq(a, b),
            (Member::String(a), Member::String(b)) => a == b,
            (Member::Signature(a), Member::Signature(b)) => a == b,
            _ => false,
        }
    }
}

/// A type declared or referenced within a resolution scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Token under which the type is declared
    pub token: Token,
    /// Fully qualified type name
    pub name: String,
}

impl TypeRef {
    /// Create a new type reference.
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>) -> Self {
        TypeRef {
            token,
            name: name.into(),
        }
    }
}

/// A field declared or referenced within a resolution scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Token under which the field is declared
    pub token: Token,
    /// Field name
    pub name: String,
}

impl FieldRef {
    /// Create a new field reference.
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>) -> Self {
        FieldRef {
            token,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::MethodRef;

    #[test]
    fn member_token_passthrough() {
        let field = Arc::new(FieldRef::new(Token::new(0x0400_0001), "_value"));
        assert_eq!(
            Member::Field(field).token(),
            Some(Token::new(0x0400_0001))
        );

        let string: Arc<str> = Arc::from("hello");
        assert_eq!(Member::String(string).token(), None);
    }

    #[test]
    fn member_identity_equality() {
        let method = Arc::new(MethodRef::parameterless(
            Token::new(0x0600_0001),
            "M",
            0x1000,
        ));
        let a = Member::Method(method.clone());
        let b = Member::Method(method);
        assert_eq!(a, b);

        let other = Member::Method(Arc::new(MethodRef::parameterless(
            Token::new(0x0600_0001),
            "M",
            0x1000,
        )));
        assert_ne!(a, other);
    }
}
