//! Token resolution scopes.
//!
//! A resolver binds to exactly one resolution scope at construction and is
//! stateless thereafter: resolution is a pure function from token to entity
//! for the lifetime of that scope. Two scopes exist: a static module's full
//! declared-member table, and the finite private reference table embedded in
//! a single dynamically built method.

use std::sync::Arc;

use crate::{
    metadata::{
        member::{FieldRef, Member, TypeRef},
        method::MethodRef,
        module::Module,
        token::Token,
    },
    Error, Result,
};

/// Capability to resolve scope-relative tokens to concrete entities.
///
/// Every operation fails with [`Error::ScopeResolution`] when the token is
/// not found in the bound scope, or when the entity it names does not have
/// the requested shape.
pub trait TokenResolver {
    /// Resolve a type token.
    fn resolve_type(&self, token: Token) -> Result<Arc<TypeRef>>;
    /// Resolve a field token.
    fn resolve_field(&self, token: Token) -> Result<Arc<FieldRef>>;
    /// Resolve a method or constructor token.
    fn resolve_method(&self, token: Token) -> Result<Arc<MethodRef>>;
    /// Resolve a user string token.
    fn resolve_string(&self, token: Token) -> Result<Arc<str>>;
    /// Resolve a standalone signature token to its blob.
    fn resolve_signature(&self, token: Token) -> Result<Arc<[u8]>>;
    /// Resolve an arbitrary member token (field, method or type).
    fn resolve_member(&self, token: Token) -> Result<Member>;
}

fn member_shaped(member: &Member) -> bool {
    matches!(
        member,
        Member::Type(_) | Member::Field(_) | Member::Method(_)
    )
}

/// Resolver over a static module's full declared-member table.
pub struct ModuleTokenResolver {
    module: Arc<Module>,
}

impl ModuleTokenResolver {
    /// Bind a resolver to a module.
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        ModuleTokenResolver { module }
    }

    fn lookup(&self, token: Token) -> Result<&Member> {
        self.module
            .member(token)
            .ok_or(Error::ScopeResolution(token))
    }
}

impl TokenResolver for ModuleTokenResolver {
    fn resolve_type(&self, token: Token) -> Result<Arc<TypeRef>> {
        match self.lookup(token)? {
            Member::Type(ty) => Ok(ty.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_field(&self, token: Token) -> Result<Arc<FieldRef>> {
        match self.lookup(token)? {
            Member::Field(field) => Ok(field.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_method(&self, token: Token) -> Result<Arc<MethodRef>> {
        match self.lookup(token)? {
            Member::Method(method) => Ok(method.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_string(&self, token: Token) -> Result<Arc<str>> {
        match self.lookup(token)? {
            Member::String(content) => Ok(content.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_signature(&self, token: Token) -> Result<Arc<[u8]>> {
        match self.lookup(token)? {
            Member::Signature(blob) => Ok(blob.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_member(&self, token: Token) -> Result<Member> {
        let member = self.lookup(token)?;
        if member_shaped(member) {
            Ok(member.clone())
        } else {
            Err(Error::ScopeResolution(token))
        }
    }
}

/// Resolver over the private reference table of one dynamically built method.
///
/// Dynamic methods do not resolve against a module: only the entities that
/// were interned while the method body was constructed are reachable, in
/// interning order. Token rows index that table; out-of-range rows fail.
pub struct DynamicTokenResolver {
    table: Vec<Member>,
}

impl DynamicTokenResolver {
    /// Bind a resolver to a dynamic method's reference table.
    #[must_use]
    pub fn new(table: Vec<Member>) -> Self {
        DynamicTokenResolver { table }
    }

    fn lookup(&self, token: Token) -> Result<&Member> {
        let row = token.row() as usize;
        if row == 0 {
            return Err(Error::ScopeResolution(token));
        }
        self.table
            .get(row - 1)
            .ok_or(Error::ScopeResolution(token))
    }
}

impl TokenResolver for DynamicTokenResolver {
    fn resolve_type(&self, token: Token) -> Result<Arc<TypeRef>> {
        match self.lookup(token)? {
            Member::Type(ty) => Ok(ty.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_field(&self, token: Token) -> Result<Arc<FieldRef>> {
        match self.lookup(token)? {
            Member::Field(field) => Ok(field.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_method(&self, token: Token) -> Result<Arc<MethodRef>> {
        match self.lookup(token)? {
            Member::Method(method) => Ok(method.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_string(&self, token: Token) -> Result<Arc<str>> {
        match self.lookup(token)? {
            Member::String(content) => Ok(content.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_signature(&self, token: Token) -> Result<Arc<[u8]>> {
        match self.lookup(token)? {
            Member::Signature(blob) => Ok(blob.clone()),
            _ => Err(Error::ScopeResolution(token)),
        }
    }

    fn resolve_member(&self, token: Token) -> Result<Member> {
        let member = self.lookup(token)?;
        if member_shaped(member) {
            Ok(member.clone())
        } else {
            Err(Error::ScopeResolution(token))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    fn sample_module() -> Arc<Module> {
        Module::build("sample")
            .with_type(TypeRef::new(Token::new(0x0200_0001), "Sample.Widget"))
            .with_field(FieldRef::new(Token::new(0x0400_0001), "_count"))
            .with_method(MethodRef::parameterless(
                Token::new(0x0600_0001),
                "Run",
                0x2000,
            ))
            .with_string(Token::new(0x7000_0001), "hello")
            .with_signature(Token::new(0x1100_0001), vec![0x07, 0x01, 0x08])
            .finish()
    }

    #[test]
    fn module_scope_resolves_each_shape() {
        let resolver = ModuleTokenResolver::new(sample_module());

        assert_eq!(
            resolver.resolve_type(Token::new(0x0200_0001)).unwrap().name,
            "Sample.Widget"
        );
        assert_eq!(
            resolver
                .resolve_field(Token::new(0x0400_0001))
                .unwrap()
                .name,
            "_count"
        );
        assert_eq!(
            resolver
                .resolve_method(Token::new(0x0600_0001))
                .unwrap()
                .name,
            "Run"
        );
        assert_eq!(
            &*resolver.resolve_string(Token::new(0x7000_0001)).unwrap(),
            "hello"
        );
        assert_eq!(
            &*resolver
                .resolve_signature(Token::new(0x1100_0001))
                .unwrap(),
            &[0x07, 0x01, 0x08]
        );
    }

    #[test]
    fn module_scope_shape_mismatch() {
        let resolver = ModuleTokenResolver::new(sample_module());

        // a string token is not member-shaped
        let result = resolver.resolve_member(Token::new(0x7000_0001));
        assert!(matches!(result, Err(Error::ScopeResolution(_))));

        // a field token is not a method
        let result = resolver.resolve_method(Token::new(0x0400_0001));
        assert!(matches!(result, Err(Error::ScopeResolution(_))));
    }

    #[test]
    fn dynamic_scope_is_row_indexed() {
        let resolver = DynamicTokenResolver::new(vec![
            Member::Method(Arc::new(MethodRef::parameterless(
                Token::new(0x0600_0001),
                "Target",
                0x3000,
            ))),
            Member::String(Arc::from("inline")),
        ]);

        let method = resolver.resolve_method(Token::new(0x0600_0001)).unwrap();
        assert_eq!(method.name, "Target");

        let string = resolver.resolve_string(Token::new(0x7000_0002)).unwrap();
        assert_eq!(&*string, "inline");

        // rows beyond the embedded table fail
        let result = resolver.resolve_member(Token::new(0x0600_0003));
        assert!(matches!(result, Err(Error::ScopeResolution(_))));

        // row zero is never valid
        let result = resolver.resolve_member(Token::new(0x0600_0000));
        assert!(matches!(result, Err(Error::ScopeResolution(_))));
    }
}
