//! Observer-facing views of an in-flight compilation or resolution.

use std::sync::Arc;

use crate::il::body::MethodBody;
use crate::metadata::method::MethodRef;
use crate::metadata::token::Token;

/// How a compilation was resolved by the observer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// No observer claimed the compilation.
    Unmodified,
    /// An observer supplied a replacement bytecode body.
    BytecodeSubstituted,
    /// An observer supplied raw machine code to install over the
    /// compiled output.
    NativeCodeSubstituted,
}

/// Context handed to each method observer during a compilation.
///
/// The first observer to call [`MethodContext::resolve_body`] or
/// [`MethodContext::resolve_native`] wins; the chain stops there.
#[derive(Debug)]
pub struct MethodContext {
    method: Arc<MethodRef>,
    mode: ResolveMode,
    body: Option<MethodBody>,
    native: Option<Vec<u8>>,
}

impl MethodContext {
    pub(crate) fn new(method: Arc<MethodRef>) -> Self {
        MethodContext {
            method,
            mode: ResolveMode::Unmodified,
            body: None,
            native: None,
        }
    }

    /// The method being compiled.
    #[must_use]
    pub fn method(&self) -> &Arc<MethodRef> {
        &self.method
    }

    /// How the compilation has been resolved so far.
    #[must_use]
    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// True once an observer has claimed the compilation.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.mode != ResolveMode::Unmodified
    }

    /// Replace the body about to be compiled.
    pub fn resolve_body(&mut self, body: MethodBody) {
        self.mode = ResolveMode::BytecodeSubstituted;
        self.body = Some(body);
        self.native = None;
    }

    /// Replace the compiled output with raw machine code.
    pub fn resolve_native(&mut self, code: Vec<u8>) {
        self.mode = ResolveMode::NativeCodeSubstituted;
        self.native = Some(code);
        self.body = None;
    }

    pub(crate) fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    pub(crate) fn native(&self) -> Option<&[u8]> {
        self.native.as_deref()
    }
}

/// What a token observer was asked to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequestKind {
    /// An ordinary metadata token resolution.
    Token,
    /// Construction of an inline string literal.
    InlineString,
}

/// Context handed to each token observer.
#[derive(Debug)]
pub struct TokenContext {
    source: Option<Arc<MethodRef>>,
    kind: TokenRequestKind,
    scope_handle: usize,
    token: Token,
    resolved: bool,
    override_token: Option<Token>,
    content: Option<String>,
}

impl TokenContext {
    pub(crate) fn new(
        source: Option<Arc<MethodRef>>,
        kind: TokenRequestKind,
        scope_handle: usize,
        token: Token,
    ) -> Self {
        TokenContext {
            source,
            kind,
            scope_handle,
            token,
            resolved: false,
            override_token: None,
            content: None,
        }
    }

    /// The method whose compilation triggered this resolution, when the
    /// trigger is known.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<MethodRef>> {
        self.source.as_ref()
    }

    /// Whether this is a token or inline string request.
    #[must_use]
    pub fn kind(&self) -> TokenRequestKind {
        self.kind
    }

    /// Handle of the scope the token resolves in.
    #[must_use]
    pub fn scope_handle(&self) -> usize {
        self.scope_handle
    }

    /// The token under resolution.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// True once an observer has claimed the resolution.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Rewrite the token the host will resolve.
    pub fn resolve_token(&mut self, token: Token) {
        self.resolved = true;
        self.override_token = Some(token);
    }

    /// Replace the content of the string literal being constructed.
    pub fn resolve_content(&mut self, content: impl Into<String>) {
        self.resolved = true;
        self.content = Some(content.into());
    }

    pub(crate) fn override_token(&self) -> Option<Token> {
        self.override_token
    }

    pub(crate) fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::body::MethodBody;

    fn method() -> Arc<MethodRef> {
        Arc::new(MethodRef::parameterless(
            Token::new(0x0600_0001),
            "Sample",
            0x100,
        ))
    }

    #[test]
    fn body_resolution_wins_over_native() {
        let mut context = MethodContext::new(method());
        assert!(!context.is_resolved());

        context.resolve_native(vec![0x90]);
        context.resolve_body(MethodBody::new(vec![0x2A]));

        assert_eq!(context.mode(), ResolveMode::BytecodeSubstituted);
        assert!(context.native().is_none());
        assert!(context.body().is_some());
    }

    #[test]
    fn token_override_marks_resolved() {
        let mut context =
            TokenContext::new(None, TokenRequestKind::Token, 0x20, Token::new(0x0A00_0001));
        assert!(!context.is_resolved());

        context.resolve_token(Token::new(0x0600_0009));
        assert!(context.is_resolved());
        assert_eq!(context.override_token(), Some(Token::new(0x0600_0009)));
    }
}
