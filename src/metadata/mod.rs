//! Tokens, resolved entities and resolution scopes.
//!
//! This module models the symbolic side of the bytecode machine: integer
//! [`token::Token`]s referencing a scope's symbol tables, the entities they
//! resolve to ([`member::Member`]), and the two resolver variants: a static
//! module's declared-member table and a dynamic method's private reference
//! table.

pub mod member;
pub mod method;
pub mod module;
pub mod resolver;
pub mod token;
