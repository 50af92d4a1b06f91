//! Static compilation units and the process-wide scope registry.
//!
//! A [`Module`] holds the declared-member table of one static compilation
//! unit. The host runtime identifies compilation units by opaque scope
//! handles; [`ModuleRegistry`] maps those raw handles back to registered
//! modules so the interception engine can recover managed identities.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::{
    metadata::{
        member::{FieldRef, Member, TypeRef},
        method::MethodRef,
        token::Token,
    },
    Result,
};

/// A static compilation unit's declared-member table.
///
/// Built once via [`ModuleBuilder`] and immutable afterwards: token
/// resolution against a module is a pure function for the lifetime of the
/// scope.
#[derive(Debug)]
pub struct Module {
    /// Module name
    pub name: String,
    members: HashMap<Token, Member>,
}

impl Module {
    /// Start building a module with the given name.
    #[must_use]
    pub fn build(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    /// Look up the entity declared under `token`, if any.
    #[must_use]
    pub fn member(&self, token: Token) -> Option<&Member> {
        self.members.get(&token)
    }

    /// Resolve a method or constructor declared under `token`.
    ///
    /// # Errors
    /// [`crate::Error::ScopeResolution`] if the token is absent or does not
    /// hold a method.
    pub fn resolve_method(&self, token: Token) -> Result<Arc<MethodRef>> {
        match self.members.get(&token) {
            Some(Member::Method(method)) => Ok(method.clone()),
            _ => Err(crate::Error::ScopeResolution(token)),
        }
    }

    /// Number of declared members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if no members are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Builder accumulating a module's declared members.
pub struct ModuleBuilder {
    name: String,
    members: HashMap<Token, Member>,
}

impl ModuleBuilder {
    /// Declare a type.
    #[must_use]
    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.members.insert(ty.token, Member::Type(Arc::new(ty)));
        self
    }

    /// Declare a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldRef) -> Self {
        self.members
            .insert(field.token, Member::Field(Arc::new(field)));
        self
    }

    /// Declare a method or constructor.
    #[must_use]
    pub fn with_method(mut self, method: MethodRef) -> Self {
        self.members
            .insert(method.token, Member::Method(Arc::new(method)));
        self
    }

    /// Declare a user string literal.
    #[must_use]
    pub fn with_string(mut self, token: Token, content: impl Into<Arc<str>>) -> Self {
        self.members.insert(token, Member::String(content.into()));
        self
    }

    /// Declare a standalone signature blob.
    #[must_use]
    pub fn with_signature(mut self, token: Token, blob: impl Into<Arc<[u8]>>) -> Self {
        self.members.insert(token, Member::Signature(blob.into()));
        self
    }

    /// Finish the module.
    #[must_use]
    pub fn finish(self) -> Arc<Module> {
        Arc::new(Module {
            name: self.name,
            members: self.members,
        })
    }
}

/// Process-wide map from raw scope handles to registered modules.
pub struct ModuleRegistry {
    by_scope: DashMap<usize, Arc<Module>>,
}

static REGISTRY: OnceLock<ModuleRegistry> = OnceLock::new();

impl ModuleRegistry {
    /// The process-wide registry instance.
    pub fn global() -> &'static ModuleRegistry {
        REGISTRY.get_or_init(|| ModuleRegistry {
            by_scope: DashMap::new(),
        })
    }

    /// Associate a raw scope handle with a module. Re-registering a handle
    /// replaces the previous association.
    pub fn register(&self, scope_handle: usize, module: Arc<Module>) {
        self.by_scope.insert(scope_handle, module);
    }

    /// Remove the association for a scope handle.
    pub fn unregister(&self, scope_handle: usize) {
        self.by_scope.remove(&scope_handle);
    }

    /// The module registered for a scope handle, if any.
    #[must_use]
    pub fn by_scope(&self, scope_handle: usize) -> Option<Arc<Module>> {
        self.by_scope.get(&scope_handle).map(|m| m.clone())
    }
}
