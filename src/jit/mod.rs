//! Compiler-side integration: host ABI, vtable hooks and the dispatch engine.
//!
//! The central type is [`engine::JitEngine`], which patches the resident
//! compiler's entry points and routes each compilation through registered
//! [`engine::MethodObserver`]s before delegating to the host. The raw
//! structures the host hands across the boundary live in [`host`], and the
//! version-specific interpretation of the runtime's info object in
//! [`cee_info`].

pub mod cee_info;
pub mod context;
pub mod engine;
pub mod hook;
pub mod host;
pub mod strings;
