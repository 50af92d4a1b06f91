// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
//#![deny(unsafe_code)]
// - 'jit/hook.rs' patches function pointer slots with volatile writes
// - 'jit/engine.rs' transmutes stored slot values back into the host's entry points
// - 'jit/strings.rs' rebuilds a runtime string object behind a raw handle

//! # jitscope
//!
//! In-process instrumentation for a managed runtime's just-in-time compiler.
//! `jitscope` locates the resident compiler inside its own process, patches its
//! dispatch table, and routes every method compilation, token resolution and
//! string construction through user-registered observers before handing the
//! request back to the host. Observers can inspect a method, swap its bytecode
//! body, or pin its native code to a pre-built blob, all without restarting the
//! process or touching the runtime's own configuration.
//!
//! ## Features
//!
//! - **🪝 Compiler hooking** - Patch the resident JIT's vtable in place and restore it on shutdown
//! - **👁 Compilation observers** - Inspect and rewrite any method the instant it is compiled
//! - **🔀 Token overrides** - Redirect metadata token resolution and inline string literals
//! - **📜 Bytecode tooling** - Decode, inspect and assemble method bodies with full operand support
//! - **📞 Call interception** - Generate trampoline and thunk bodies that reroute live call sites
//! - **🛡️ Reentrancy safe** - Per-thread depth tracking keeps nested compilations transparent
//!
//! ## Quick Start
//!
//! Add `jitscope` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! jitscope = "0.1"
//! ```
//!
//! ### Using the Prelude
//!
//! For convenient access to the most commonly used types, import the prelude:
//!
//! ```rust,no_run
//! use jitscope::prelude::*;
//! use std::sync::Arc;
//!
//! struct Tracer;
//!
//! impl MethodObserver for Tracer {
//!     fn on_compile(&self, context: &mut MethodContext) {
//!         println!("compiling {}", context.method().name);
//!     }
//! }
//!
//! let engine = JitEngine::instance()?;
//! engine.add_method_observer(Arc::new(Tracer))?;
//! # Ok::<(), jitscope::Error>(())
//! ```
//!
//! ### Decoding a Method Body
//!
//! ```rust
//! use jitscope::il::decoder::decode_stream;
//!
//! let bytecode = [0x16, 0x2A]; // ldc.i4.0, ret
//! let operations = decode_stream(&bytecode, None, false)?;
//!
//! for op in &operations {
//!     println!("{}", op);
//! }
//! # Ok::<(), jitscope::Error>(())
//! ```
//!
//! ### Replacing a Body at Compile Time
//!
//! ```rust,no_run
//! use jitscope::prelude::*;
//!
//! struct ShortCircuit;
//!
//! impl MethodObserver for ShortCircuit {
//!     fn on_compile(&self, context: &mut MethodContext) {
//!         if context.method().name == "Answer" {
//!             // ldc.i4 42, ret
//!             let body = MethodBody::new(vec![0x20, 0x2A, 0x00, 0x00, 0x00, 0x2A]);
//!             context.resolve_body(body);
//!         }
//!     }
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`], and every failure mode is a
//! variant of [`Error`]:
//!
//! ```rust,no_run
//! use jitscope::{Error, JitEngine};
//!
//! match JitEngine::instance() {
//!     Ok(engine) => println!("hooked, {} slots patched", engine.hook_count()),
//!     Err(Error::UnsupportedHostVersion(v)) => println!("unknown host: {}", v),
//!     Err(e) => println!("error: {}", e),
//! }
//! ```
//!
//! ## Testing
//!
//! The engine dispatch path is fully exercisable without a live host: build an
//! engine over a mock [`jit::host::HostJit`] and feed it synthetic requests.
//!
//! ```bash
//! cargo test
//! cargo bench            # bytecode decoding benchmarks
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the jitscope library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust,no_run
/// use jitscope::prelude::*;
///
/// let engine = JitEngine::instance()?;
/// # Ok::<(), jitscope::Error>(())
/// ```
pub mod prelude;

/// Bytecode model: opcode tables, stream decoding and body emission.
///
/// This module covers both directions of the bytecode boundary. On the read
/// side it decodes raw method bodies into structured operations, resolving
/// metadata tokens to their entities when a resolver is attached. On the write
/// side it assembles new bodies byte by byte with automatic local and stack
/// bookkeeping.
///
/// # Key Types
///
/// - [`il::decoder::IlDecoder`] - Streaming decoder over a raw body
/// - [`il::operation::Operation`] - A decoded instruction with its operand
/// - [`il::body::MethodBody`] - A body ready to hand to the compiler
/// - [`il::assembler::BodyAssembler`] - Incremental body construction
///
/// # Main Functions
///
/// - [`il::decoder::decode_stream`] - Decode a complete body in one call
/// - [`il::opcode::lookup`] - Look up a one-byte opcode descriptor
///
/// # Examples
///
/// ```rust
/// use jitscope::il::decoder::decode_stream;
///
/// let bytecode = [0x00, 0x2A]; // nop, ret
/// let ops = decode_stream(&bytecode, None, false)?;
///
/// assert_eq!(ops[0].opcode.mnemonic, "nop");
/// assert_eq!(ops[1].opcode.mnemonic, "ret");
/// # Ok::<(), jitscope::Error>(())
/// ```
pub mod il;

/// Call interception: trampoline and thunk body generation.
///
/// Generates the two bodies needed to reroute a live call site:
/// the trampoline that packages a call's arguments into a dispatchable state
/// object, and the thunk that re-enters the original native entry point
/// through an indirect call.
///
/// # Key Types
///
/// - [`intercept::builder::InterceptBuilder`] - Emits the replacement trampoline body
/// - [`intercept::thunk::ThunkBuilder`] - Emits the indirect-call continuation body
/// - [`il::assembler::TokenScope`] - Mints the metadata tokens both builders need
pub mod intercept;

/// Compiler-side integration: host ABI, vtable hooks and the dispatch engine.
///
/// The heart of the crate. [`jit::engine::JitEngine`] installs itself into the
/// resident compiler's dispatch table and routes every compilation through the
/// registered observers before delegating to the host.
///
/// # Key Types
///
/// - [`jit::engine::JitEngine`] - Hook installation, observer registry, dispatch
/// - [`jit::engine::MethodObserver`] - Callback invoked for each compilation
/// - [`jit::engine::TokenObserver`] - Callback invoked for each token resolution
/// - [`jit::context::MethodContext`] - Mutable view of one compilation request
/// - [`jit::host::HostJit`] - Abstraction over the host compiler's entry points
///
/// # Examples
///
/// ```rust,no_run
/// use jitscope::prelude::*;
/// use std::sync::Arc;
///
/// struct Nop;
/// impl MethodObserver for Nop {
///     fn on_compile(&self, _context: &mut MethodContext) {}
/// }
///
/// let engine = JitEngine::instance()?;
/// let observer: Arc<dyn MethodObserver> = Arc::new(Nop);
/// engine.add_method_observer(observer.clone())?;
/// engine.remove_method_observer(&observer);
/// # Ok::<(), jitscope::Error>(())
/// ```
pub mod jit;

/// Tokens, resolved entities and resolution scopes.
///
/// Models the symbolic side of the bytecode machine: integer tokens
/// referencing a scope's symbol tables, the entities they resolve to, and the
/// registry that maps a host scope handle back to its module.
///
/// # Key Types
///
/// - [`metadata::token::Token`] - A scope-relative metadata token
/// - [`metadata::member::Member`] - A resolved type, field, method, string or signature
/// - [`metadata::method::MethodRef`] - A method's shape as the builders see it
/// - [`metadata::module::ModuleRegistry`] - Scope handle to module mapping
/// - [`metadata::resolver::TokenResolver`] - Token to entity resolution
pub mod metadata;

/// Host runtime discovery: version probing and compiler library loading.
///
/// Locates the compiler library already resident in the current process,
/// loads it, and extracts the dispatch table the hook layer patches.
///
/// # Key Types
///
/// - [`runtime::HostRuntime`] - The discovered compiler and its dispatch table
/// - [`runtime::HostVersion`] - Parsed host version, drives the vtable layout
pub mod runtime;

/// `jitscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. This is used consistently throughout the crate for all
/// fallible operations.
///
/// # Examples
///
/// ```rust,no_run
/// use jitscope::{Result, JitEngine};
/// use std::sync::Arc;
///
/// fn hook() -> Result<Arc<JitEngine>> {
///     JitEngine::instance()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `jitscope` Error type
///
/// The main error type for all operations in this crate. Provides detailed
/// error information for bytecode decoding, host discovery, hook installation
/// and dispatch failures.
///
/// # Examples
///
/// ```rust
/// use jitscope::{il::decoder::decode_stream, Error};
///
/// use jitscope::metadata::resolver::DynamicTokenResolver;
///
/// // ldfld over an empty resolution scope
/// let resolver = DynamicTokenResolver::new(Vec::new());
/// match decode_stream(&[0x7B, 0x01, 0x00, 0x00, 0x04], Some(&resolver), false) {
///     Ok(_) => unreachable!(),
///     Err(Error::ScopeResolution(token)) => println!("unresolved: {}", token),
///     Err(e) => println!("error: {}", e),
/// }
/// ```
pub use error::Error;

/// Main entry point for hooking the resident compiler.
///
/// See [`jit::engine::JitEngine`] for hook installation, observer registration
/// and teardown.
///
/// # Example
///
/// ```rust,no_run
/// use jitscope::JitEngine;
/// let engine = JitEngine::instance()?;
/// engine.shutdown();
/// # Ok::<(), jitscope::Error>(())
/// ```
pub use jit::engine::JitEngine;

/// Observer traits invoked from the compiler's dispatch path.
///
/// Implement [`MethodObserver`] to see each compilation and [`TokenObserver`]
/// to see each token resolution. Both run on the compiling thread, outermost
/// request only.
pub use jit::engine::{MethodObserver, TokenObserver};

/// Mutable views handed to observers during dispatch.
///
/// [`MethodContext`] carries one compilation request and records the chosen
/// resolution; [`TokenContext`] does the same for token and inline-string
/// requests.
pub use jit::context::{MethodContext, ResolveMode, TokenContext, TokenRequestKind};

/// Provides access to low-level bytecode parsing utilities.
///
/// The [`Parser`] type is the little-endian cursor the decoder is built on.
///
/// # Example
///
/// ```rust
/// use jitscope::Parser;
/// let mut parser = Parser::new(&[0x2A, 0x00, 0x00, 0x00]);
/// let value: u32 = parser.read_le()?;
/// assert_eq!(value, 0x2A);
/// # Ok::<(), jitscope::Error>(())
/// ```
pub use il::parser::Parser;
