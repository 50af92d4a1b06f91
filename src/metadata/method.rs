//! Managed method identity.
//!
//! [`MethodRef`] is the descriptor the whole crate revolves around: the
//! interception engine resolves compiling handles to it, trampolines are
//! synthesized from its signature, and thunks derive their calling convention
//! from its attributes.

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Attribute set of a managed method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAttributes: u8 {
        /// Method has no implicit receiver
        const STATIC = 1 << 0;
        /// Method is an instance or type constructor
        const CONSTRUCTOR = 1 << 1;
        /// Method declares its own generic parameters
        const GENERIC = 1 << 2;
        /// Method is declared on a generic enclosing type
        const GENERIC_TYPE = 1 << 3;
    }
}

/// Primitive value categories that pass by value through thunks and box to
/// their own boxed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[allow(missing_docs)]
pub enum Primitive {
    Bool,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    IPtr,
    UPtr,
}

/// Coarse classification of a parameter or result slot.
///
/// Interception only needs to know whether a slot passes by value with a
/// known primitive width; everything else is handled as an opaque address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    /// A primitive value of the given category
    Primitive(Primitive),
    /// Any reference or value type, represented as an opaque address
    Opaque,
}

impl SlotType {
    /// True for slots that participate in the fast-inline result path.
    #[must_use]
    pub fn can_inline(&self) -> bool {
        matches!(self, SlotType::Primitive(_))
    }
}

/// One declared parameter of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    /// Value classification of the parameter
    pub ty: SlotType,
    /// True for `in`/`out`/by-reference parameters, which are already
    /// addresses in the caller's frame
    pub by_ref: bool,
}

impl Param {
    /// A by-value parameter of the given slot type.
    #[must_use]
    pub fn value(ty: SlotType) -> Self {
        Param { ty, by_ref: false }
    }

    /// A by-reference parameter of the given slot type.
    #[must_use]
    pub fn by_ref(ty: SlotType) -> Self {
        Param { ty, by_ref: true }
    }
}

/// The return contract of a method, as interception needs to see it.
///
/// `Task` and `ValueTask` are the two recognized asynchronous no-value
/// shapes; their generic variants carry the awaited result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// No return value
    Void,
    /// Pointer-typed return, handled as an opaque address
    Pointer,
    /// By-reference return, handled as an opaque address
    ByRef,
    /// An ordinary value of the given slot type
    Value(SlotType),
    /// Asynchronous, no value
    Task,
    /// Asynchronous value-typed wrapper, no value
    ValueTask,
    /// Asynchronous with an awaited result
    TaskOf(SlotType),
    /// Asynchronous value-typed wrapper with an awaited result
    ValueTaskOf(SlotType),
}

impl ReturnKind {
    /// Whether the method yields a meaningful value to its caller.
    ///
    /// Excludes `void` and the two asynchronous no-value shapes; pointer and
    /// by-reference returns count as meaningful (they surface as addresses).
    #[must_use]
    pub fn has_return(&self) -> bool {
        !matches!(self, ReturnKind::Void | ReturnKind::Task | ReturnKind::ValueTask)
    }

    /// Whether the return type is one of the awaitable shapes.
    #[must_use]
    pub fn is_awaitable(&self) -> bool {
        matches!(
            self,
            ReturnKind::Task
                | ReturnKind::ValueTask
                | ReturnKind::TaskOf(_)
                | ReturnKind::ValueTaskOf(_)
        )
    }

    /// The slot the interception entry point traffics in for this return.
    ///
    /// Void, pointer and by-reference methods funnel through an opaque
    /// address slot; awaitable shapes use their awaited result slot.
    #[must_use]
    pub fn intercept_slot(&self) -> SlotType {
        match self {
            ReturnKind::Void | ReturnKind::Pointer | ReturnKind::ByRef => {
                SlotType::Primitive(Primitive::IPtr)
            }
            ReturnKind::Value(slot) => *slot,
            ReturnKind::Task | ReturnKind::ValueTask => SlotType::Primitive(Primitive::IPtr),
            ReturnKind::TaskOf(slot) | ReturnKind::ValueTaskOf(slot) => *slot,
        }
    }

    /// True when results of this shape can take the typed fast-inline entry.
    #[must_use]
    pub fn can_inline(&self) -> bool {
        matches!(self, ReturnKind::Value(slot) if slot.can_inline())
    }
}

/// Identity and signature of a managed method.
#[derive(Debug, Clone)]
pub struct MethodRef {
    /// Token under which the method is declared in its scope
    pub token: Token,
    /// Method name
    pub name: String,
    /// Opaque runtime handle identifying the method across the native boundary
    pub handle: usize,
    /// Attribute set
    pub attributes: MethodAttributes,
    /// Declared parameters, excluding the implicit receiver
    pub params: Vec<Param>,
    /// Return contract
    pub returns: ReturnKind,
}

impl MethodRef {
    /// Create a method reference with an explicit signature.
    #[must_use]
    pub fn new(
        token: Token,
        name: impl Into<String>,
        handle: usize,
        attributes: MethodAttributes,
        params: Vec<Param>,
        returns: ReturnKind,
    ) -> Self {
        MethodRef {
            token,
            name: name.into(),
            handle,
            attributes,
            params,
            returns,
        }
    }

    /// A static, parameterless, void method. Convenient for tests and for
    /// entities whose signature interception never inspects.
    #[must_use]
    pub fn parameterless(token: Token, name: impl Into<String>, handle: usize) -> Self {
        MethodRef::new(
            token,
            name,
            handle,
            MethodAttributes::STATIC,
            Vec::new(),
            ReturnKind::Void,
        )
    }

    /// Whether the method has an implicit receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Whether the method is a constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.attributes.contains(MethodAttributes::CONSTRUCTOR)
    }

    /// Whether the method declares its own generic parameters.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.attributes.contains(MethodAttributes::GENERIC)
    }

    /// Whether the method or its enclosing type is generic: such methods
    /// carry an opaque instantiation handle through interception.
    #[must_use]
    pub fn needs_instantiation(&self) -> bool {
        self.attributes
            .intersects(MethodAttributes::GENERIC | MethodAttributes::GENERIC_TYPE)
    }
}
