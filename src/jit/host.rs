//! Host compiler ABI surface.
//!
//! The structures here mirror the records the host runtime passes across
//! the compilation boundary. They are consumed, never produced: layout is
//! fixed by the host and must not be reordered.
//!
//! [`HostJit`] narrows the surface the engine actually needs down to four
//! operations. The production implementation wraps raw function pointers
//! read out of the compiler and runtime-info vtables; tests substitute an
//! in-process fake.

use std::ffi::c_void;

use crate::metadata::token::Token;

/// Result code returned by the host compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorJitResult(pub i32);

impl CorJitResult {
    /// Compilation succeeded.
    pub const OK: CorJitResult = CorJitResult(0);
    /// Internal failure inside the compiler or a hook.
    pub const INTERNAL_ERROR: CorJitResult = CorJitResult(3);

    /// True for the success code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

/// Generic instantiation handles inside a signature record.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SigInstRaw {
    /// Class instantiation argument count.
    pub class_inst_count: u32,
    /// Class instantiation arguments.
    pub class_inst: *mut usize,
    /// Method instantiation argument count.
    pub method_inst_count: u32,
    /// Method instantiation arguments.
    pub method_inst: *mut usize,
}

/// Mirror of the host's signature descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SigInfoRaw {
    /// Calling convention.
    pub call_conv: u32,
    /// Return type class handle.
    pub ret_type_class: usize,
    /// Exact return type class handle.
    pub ret_type_sig_class: usize,
    /// Return element type.
    pub ret_type: u8,
    /// Signature flags.
    pub flags: u8,
    /// Number of arguments or locals described.
    pub num_args: u16,
    /// Generic instantiation.
    pub sig_inst: SigInstRaw,
    /// Cursor into the signature blob just past the count.
    pub args: *mut u8,
    /// Pointer to the signature blob past the length prefix.
    pub p_sig: *mut u8,
    /// Signature blob length.
    pub cb_sig: u32,
    /// Declaring scope handle.
    pub scope: usize,
    /// Token of the signature, when minted from metadata.
    pub token: u32,
}

/// Mirror of the host's per-compilation method record.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MethodInfoRaw {
    /// Handle of the compiling method.
    pub ftn: usize,
    /// Handle of the declaring scope.
    pub scope: usize,
    /// Bytecode pointer.
    pub il_code: *mut u8,
    /// Bytecode length in bytes.
    pub il_code_size: u32,
    /// Required operand stack depth.
    pub max_stack: u32,
    /// Exception handling clause count.
    pub eh_count: u32,
    /// Compilation option bits.
    pub options: u32,
    /// Hot or cold region the method belongs to.
    pub region_kind: u32,
    /// Argument signature.
    pub args: SigInfoRaw,
    /// Local variable signature.
    pub locals: SigInfoRaw,
}

/// Mirror of the host's token resolution record.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTokenRaw {
    /// Handle of the method containing the token reference.
    pub context: usize,
    /// Handle of the scope the token resolves in.
    pub scope: usize,
    /// The token value under resolution.
    pub token: u32,
    /// Kind of resolution the host is performing.
    pub token_type: u32,
    /// Resolved type handle, out.
    pub type_handle: usize,
    /// Resolved field handle, out.
    pub field_handle: usize,
    /// Resolved method handle, out.
    pub method_handle: usize,
    /// Type spec blob length, out.
    pub cb_type_spec: u32,
    /// Type spec blob, out.
    pub p_type_spec: *mut u8,
    /// Method spec blob length, out.
    pub cb_method_spec: u32,
    /// Method spec blob, out.
    pub p_method_spec: *mut u8,
}

/// Machine code produced by a delegated compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompiledCode {
    /// Entry point of the produced code, null when compilation failed.
    pub entry: *mut u8,
    /// Produced code size in bytes.
    pub size: u32,
}

impl CompiledCode {
    /// The empty outcome of a failed or skipped compilation.
    #[must_use]
    pub fn none() -> Self {
        CompiledCode {
            entry: std::ptr::null_mut(),
            size: 0,
        }
    }
}

/// Result of delegating a compilation to the host.
#[derive(Debug, Clone, Copy)]
pub struct CompileOutcome {
    /// The host's result code, forwarded unchanged.
    pub result: CorJitResult,
    /// Produced machine code.
    pub native: CompiledCode,
}

/// Result of delegating a string literal construction to the host.
#[derive(Debug, Clone, Copy)]
pub struct StringConstruction {
    /// The host's access-type code, forwarded unchanged.
    pub access: i32,
    /// Slot holding the handle of the materialized string object.
    pub entry: *mut *mut u8,
}

/// A string literal construction request in flight.
#[derive(Debug, Clone, Copy)]
pub struct StringRequest {
    /// Handle of the scope declaring the literal.
    pub scope_handle: usize,
    /// Token of the literal.
    pub token: Token,
    /// The runtime-info object the callback was invoked on, null for
    /// synthetic requests.
    pub info_this: *mut c_void,
    /// The host-provided entry slot, null for synthetic requests.
    pub entry: *mut *mut u8,
}

impl StringRequest {
    /// Build a request not backed by a host callback.
    #[must_use]
    pub fn synthetic(scope_handle: usize, token: Token) -> Self {
        StringRequest {
            scope_handle,
            token,
            info_this: std::ptr::null_mut(),
            entry: std::ptr::null_mut(),
        }
    }
}

unsafe impl Send for StringRequest {}

/// Raw arguments of the host's compile callback, threaded through to the
/// passthrough so out-params are written where the host expects them.
#[derive(Debug, Clone, Copy)]
pub struct RawCompileCall {
    /// The compiler object the callback was invoked on.
    pub jit_this: *mut c_void,
    /// The per-compilation runtime-info object.
    pub runtime_info: *mut c_void,
    /// Compilation flag bits.
    pub flags: u32,
    /// Out-param receiving the produced entry point.
    pub native_entry: *mut *mut u8,
    /// Out-param receiving the produced code size.
    pub native_size: *mut u32,
}

/// A compilation request in flight.
///
/// Holds a copy of the header fields for inspection plus the raw record
/// pointer, so substitutions write through to what the host will compile.
/// Synthetic requests built by tests carry a null raw pointer and only
/// update the copies.
#[derive(Debug)]
pub struct CompileRequest {
    /// Handle of the compiling method.
    pub method_handle: usize,
    /// Handle of the declaring scope.
    pub scope_handle: usize,
    /// Bytecode pointer.
    pub il: *const u8,
    /// Bytecode length.
    pub il_len: u32,
    /// Required stack depth.
    pub max_stack: u32,
    raw: *mut MethodInfoRaw,
    raw_call: Option<RawCompileCall>,
}

impl CompileRequest {
    /// Wrap the host's record.
    ///
    /// # Safety
    /// `raw` must point to a live, writable record for the duration of
    /// the request.
    #[must_use]
    pub unsafe fn from_raw(raw: *mut MethodInfoRaw) -> Self {
        let info = &*raw;
        CompileRequest {
            method_handle: info.ftn,
            scope_handle: info.scope,
            il: info.il_code,
            il_len: info.il_code_size,
            max_stack: info.max_stack,
            raw,
            raw_call: None,
        }
    }

    /// Build a request not backed by a host record.
    #[must_use]
    pub fn synthetic(method_handle: usize, scope_handle: usize, il: &[u8]) -> Self {
        CompileRequest {
            method_handle,
            scope_handle,
            il: il.as_ptr(),
            il_len: il.len() as u32,
            max_stack: 8,
            raw: std::ptr::null_mut(),
            raw_call: None,
        }
    }

    /// Attach the raw callback arguments for the passthrough.
    #[must_use]
    pub fn with_raw_call(mut self, call: RawCompileCall) -> Self {
        self.raw_call = Some(call);
        self
    }

    /// The raw callback arguments, when this request came from the host.
    #[must_use]
    pub fn raw_call(&self) -> Option<&RawCompileCall> {
        self.raw_call.as_ref()
    }

    /// The raw record pointer, null for synthetic requests.
    #[must_use]
    pub fn raw(&self) -> *mut MethodInfoRaw {
        self.raw
    }

    /// The bytecode the host was asked to compile, as currently set.
    ///
    /// # Safety
    /// The pointed-to bytes must outlive the returned slice.
    #[must_use]
    pub unsafe fn il_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.il, self.il_len as usize)
    }

    /// Replace the bytecode and stack depth the host will compile.
    pub fn apply_body(&mut self, il: *mut u8, il_len: u32, max_stack: u32) {
        self.il = il;
        self.il_len = il_len;
        self.max_stack = max_stack;

        if !self.raw.is_null() {
            unsafe {
                (*self.raw).il_code = il;
                (*self.raw).il_code_size = il_len;
                (*self.raw).max_stack = max_stack;
            }
        }
    }

    /// Point the local variable signature at a blob laid out as
    /// `[length, conv, count, type...]`.
    pub fn apply_locals(&mut self, blob: *mut u8, count: u16) {
        if !self.raw.is_null() {
            unsafe {
                (*self.raw).locals.p_sig = blob.add(1);
                (*self.raw).locals.args = blob.add(3);
                (*self.raw).locals.num_args = count;
            }
        }
    }
}

// The raw pointer only ever targets the record of the thread currently
// inside the compile callback.
unsafe impl Send for CompileRequest {}

/// A token resolution request in flight.
#[derive(Debug)]
pub struct TokenRequest {
    /// Handle of the scope the token resolves in.
    pub scope_handle: usize,
    /// The token under resolution, as currently set.
    pub token: Token,
    raw: *mut ResolvedTokenRaw,
    info_this: *mut c_void,
}

impl TokenRequest {
    /// Wrap the host's record.
    ///
    /// # Safety
    /// `raw` must point to a live, writable record for the duration of
    /// the request.
    #[must_use]
    pub unsafe fn from_raw(raw: *mut ResolvedTokenRaw) -> Self {
        let record = &*raw;
        TokenRequest {
            scope_handle: record.scope,
            token: Token::new(record.token),
            raw,
            info_this: std::ptr::null_mut(),
        }
    }

    /// Build a request not backed by a host record.
    #[must_use]
    pub fn synthetic(scope_handle: usize, token: Token) -> Self {
        TokenRequest {
            scope_handle,
            token,
            raw: std::ptr::null_mut(),
            info_this: std::ptr::null_mut(),
        }
    }

    /// Attach the runtime-info object the callback was invoked on.
    #[must_use]
    pub fn with_info_this(mut self, this: *mut c_void) -> Self {
        self.info_this = this;
        self
    }

    /// The runtime-info object, null for synthetic requests.
    #[must_use]
    pub fn info_this(&self) -> *mut c_void {
        self.info_this
    }

    /// The raw record pointer, null for synthetic requests.
    #[must_use]
    pub fn raw(&self) -> *mut ResolvedTokenRaw {
        self.raw
    }

    /// Rewrite the token the host will resolve.
    pub fn set_token(&mut self, token: Token) {
        self.token = token;
        if !self.raw.is_null() {
            unsafe {
                (*self.raw).token = token.value();
            }
        }
    }
}

unsafe impl Send for TokenRequest {}

/// The host operations interception consumes.
pub trait HostJit: Send + Sync {
    /// Delegate a compilation to the real compiler.
    fn compile(&self, request: &mut CompileRequest) -> CompileOutcome;

    /// Delegate a token resolution to the real resolver.
    fn resolve_token(&self, request: &mut TokenRequest);

    /// Delegate a string literal construction to the real runtime.
    fn construct_string(&self, request: &StringRequest) -> StringConstruction;

    /// Ask the runtime for the definition token of a method handle.
    fn method_def_token(&self, method_handle: usize) -> Token;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_request_updates_copies_only() {
        let il = [0x2Au8];
        let mut request = CompileRequest::synthetic(0x10, 0x20, &il);
        assert_eq!(request.il_len, 1);

        let mut body = vec![0x17u8, 0x2A];
        request.apply_body(body.as_mut_ptr(), 2, 9);
        assert_eq!(request.il_len, 2);
        assert_eq!(request.max_stack, 9);
        assert_eq!(unsafe { request.il_slice() }, &[0x17, 0x2A]);
    }

    #[test]
    fn raw_request_writes_through() {
        let mut il = [0x2Au8];
        let mut info: MethodInfoRaw = unsafe { std::mem::zeroed() };
        info.ftn = 0x10;
        info.scope = 0x20;
        info.il_code = il.as_mut_ptr();
        info.il_code_size = 1;
        info.max_stack = 2;

        let mut request = unsafe { CompileRequest::from_raw(&mut info) };
        let mut body = vec![0x17u8, 0x17, 0x5F, 0x2A];
        request.apply_body(body.as_mut_ptr(), 4, 8);

        assert_eq!(info.il_code_size, 4);
        assert_eq!(info.max_stack, 8);

        let mut blob = vec![4u8, 0x07, 2, 0x08, 0x08];
        request.apply_locals(blob.as_mut_ptr(), 2);
        assert_eq!(info.locals.num_args, 2);
        assert_eq!(unsafe { *info.locals.p_sig }, 0x07);
        assert_eq!(unsafe { *info.locals.args }, 0x08);
    }

    #[test]
    fn token_rewrite_writes_through() {
        let mut record: ResolvedTokenRaw = unsafe { std::mem::zeroed() };
        record.scope = 0x30;
        record.token = 0x0A00_0001;

        let mut request = unsafe { TokenRequest::from_raw(&mut record) };
        request.set_token(Token::new(0x0600_0002));
        assert_eq!(record.token, 0x0600_0002);
    }
}
