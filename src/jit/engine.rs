//! The interception engine.
//!
//! A process hosts at most one [`JitEngine`]. The production instance
//! hooks the host compiler's vtable and reaches the real compiler through
//! the displaced slot values; test instances are built over a fake
//! [`HostJit`] and never touch a vtable.
//!
//! Dispatch is reentrancy-aware: the host compiler re-enters itself for
//! inlinees and helper compilations, and only the outermost entry on each
//! thread consults observers. Inner entries pass straight through, so an
//! observer that triggers compilation of its own code cannot recurse into
//! itself.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::LocalKey;

use crate::il::opcode::codes;
use crate::jit::cee_info::{CeeInfo, DescriptorOffsets};
use crate::jit::context::{MethodContext, ResolveMode, TokenContext, TokenRequestKind};
use crate::jit::hook::HookManager;
use crate::jit::host::{
    CompiledCode, CompileOutcome, CompileRequest, CorJitResult, HostJit, MethodInfoRaw,
    RawCompileCall, ResolvedTokenRaw, StringConstruction, StringRequest, TokenRequest,
};
use crate::jit::strings;
use crate::metadata::method::MethodRef;
use crate::metadata::module::ModuleRegistry;
use crate::metadata::token::Token;
use crate::runtime::{HostRuntime, HostVersion};
use crate::Result;

/// Observer of method compilations.
///
/// Observers run in registration order on the outermost compile entry;
/// the first to resolve the context stops the chain.
pub trait MethodObserver: Send + Sync {
    /// Called once per observed compilation.
    fn on_compile(&self, context: &mut MethodContext);
}

/// Observer of token and string literal resolutions.
pub trait TokenObserver: Send + Sync {
    /// Called once per observed resolution.
    fn on_resolve(&self, context: &mut TokenContext);
}

/// Insertion-ordered observer list with snapshot reads.
///
/// The hot path clones an `Arc` to the current vector; mutation replaces
/// the vector under the write lock, so running observers never blocks
/// registration.
struct ObserverList<T: ?Sized> {
    items: RwLock<Arc<Vec<Arc<T>>>>,
}

fn identity<T: ?Sized>(item: &Arc<T>) -> *const () {
    Arc::as_ptr(item) as *const ()
}

impl<T: ?Sized> ObserverList<T> {
    fn new() -> Self {
        ObserverList {
            items: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        read_lock!(self.items).clone()
    }

    fn is_empty(&self) -> bool {
        read_lock!(self.items).is_empty()
    }

    fn add(&self, item: Arc<T>) {
        let mut items = write_lock!(self.items);
        if items.iter().any(|existing| identity(existing) == identity(&item)) {
            return;
        }
        let mut next = items.as_ref().clone();
        next.push(item);
        *items = Arc::new(next);
    }

    fn remove(&self, item: &Arc<T>) {
        let mut items = write_lock!(self.items);
        if !items.iter().any(|existing| identity(existing) == identity(item)) {
            return;
        }
        let next = items
            .iter()
            .filter(|existing| identity(existing) != identity(item))
            .cloned()
            .collect();
        *items = Arc::new(next);
    }

    fn contains(&self, item: &Arc<T>) -> bool {
        read_lock!(self.items)
            .iter()
            .any(|existing| identity(existing) == identity(item))
    }

    fn clear(&self) {
        *write_lock!(self.items) = Arc::new(Vec::new());
    }
}

/// Heap scratch freed on drop, so cleanup runs on every path out of
/// delegation.
struct ScratchBuffer {
    ptr: *mut u8,
    layout: std::alloc::Layout,
}

impl ScratchBuffer {
    fn from_slice(bytes: &[u8]) -> Self {
        let layout = std::alloc::Layout::array::<u8>(bytes.len().max(1))
            .unwrap_or_else(|_| std::alloc::Layout::new::<u8>());
        let ptr = unsafe { std::alloc::alloc(layout) };
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
        ScratchBuffer { ptr, layout }
    }

    fn ptr(&self) -> *mut u8 {
        self.ptr
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        unsafe {
            std::alloc::dealloc(self.ptr, self.layout);
        }
    }
}

unsafe impl Send for ScratchBuffer {}

/// Native code a `ldc.i4.1` / `and` pair compiles down to, empirically.
const NATIVE_BYTES_PER_PAIR: usize = 3;

/// Synthesize a body whose compiled output is at least `native_len` bytes,
/// so raw machine code can be written over it after compilation.
///
/// The body is `ldc.i4.1, ldc.i4.1, and`, padding `ldc.i4.1, and` pairs,
/// then `ret`; always an even number of bytes.
#[must_use]
pub fn placeholder_body(native_len: usize) -> Vec<u8> {
    let next_min = native_len + NATIVE_BYTES_PER_PAIR + native_len % NATIVE_BYTES_PER_PAIR;
    let mut il_len = 2 * next_min.div_ceil(NATIVE_BYTES_PER_PAIR);
    if il_len % 2 != 0 {
        il_len += 1;
    }
    il_len = il_len.max(4);

    let mut body = vec![codes::LDC_I4_1; il_len];
    body[2] = codes::AND;
    let mut index = 3;
    while index + 2 < il_len {
        body[index] = codes::LDC_I4_1;
        body[index + 1] = codes::AND;
        index += 2;
    }
    body[il_len - 1] = codes::RET;
    body
}

thread_local! {
    static COMPILE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static TOKEN_DEPTH: Cell<usize> = const { Cell::new(0) };
    static COMPILING: RefCell<Option<Arc<MethodRef>>> = const { RefCell::new(None) };
}

/// Per-thread reentrancy counter, decremented on drop.
struct DepthGuard {
    key: &'static LocalKey<Cell<usize>>,
    outermost: bool,
}

impl DepthGuard {
    fn enter(key: &'static LocalKey<Cell<usize>>) -> Self {
        let depth = key.with(|cell| {
            let depth = cell.get() + 1;
            cell.set(depth);
            depth
        });
        DepthGuard {
            key,
            outermost: depth == 1,
        }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.key.with(|cell| cell.set(cell.get() - 1));
    }
}

/// Clears the compiling-method marker when the outermost compile unwinds.
struct CompilingGuard {
    outermost: bool,
}

impl Drop for CompilingGuard {
    fn drop(&mut self) {
        if self.outermost {
            COMPILING.with(|current| current.borrow_mut().take());
        }
    }
}

fn current_compiling() -> Option<Arc<MethodRef>> {
    COMPILING.with(|current| current.borrow().clone())
}

/// `compileMethod` slot signature of the host compiler vtable.
type CompileMethodFn = unsafe extern "C" fn(
    this: *mut c_void,
    runtime_info: *mut c_void,
    info: *mut MethodInfoRaw,
    flags: u32,
    native_entry: *mut *mut u8,
    native_size: *mut u32,
) -> i32;

/// Production [`HostJit`] reaching the real host through displaced slot
/// values. Slot originals are recorded as they are hooked; zero means the
/// hook is not installed yet.
struct RawHostJit {
    version: HostVersion,
    compile_original: AtomicUsize,
    resolve_original: AtomicUsize,
    construct_original: AtomicUsize,
    cee: std::sync::OnceLock<CeeInfo>,
}

impl RawHostJit {
    fn new(version: HostVersion) -> Self {
        RawHostJit {
            version,
            compile_original: AtomicUsize::new(0),
            resolve_original: AtomicUsize::new(0),
            construct_original: AtomicUsize::new(0),
            cee: std::sync::OnceLock::new(),
        }
    }
}

impl HostJit for RawHostJit {
    fn compile(&self, request: &mut CompileRequest) -> CompileOutcome {
        let original = self.compile_original.load(Ordering::Acquire);
        let Some(call) = request.raw_call().copied() else {
            return CompileOutcome {
                result: CorJitResult::INTERNAL_ERROR,
                native: CompiledCode::none(),
            };
        };
        if original == 0 {
            return CompileOutcome {
                result: CorJitResult::INTERNAL_ERROR,
                native: CompiledCode::none(),
            };
        }

        unsafe {
            let compile: CompileMethodFn = std::mem::transmute(original);
            let result = compile(
                call.jit_this,
                call.runtime_info,
                request.raw(),
                call.flags,
                call.native_entry,
                call.native_size,
            );
            let native = CompiledCode {
                entry: if call.native_entry.is_null() {
                    std::ptr::null_mut()
                } else {
                    *call.native_entry
                },
                size: if call.native_size.is_null() {
                    0
                } else {
                    *call.native_size
                },
            };
            CompileOutcome {
                result: CorJitResult(result),
                native,
            }
        }
    }

    fn resolve_token(&self, request: &mut TokenRequest) {
        let original = self.resolve_original.load(Ordering::Acquire);
        if original == 0 || request.raw().is_null() {
            return;
        }
        unsafe {
            CeeInfo::call_resolve_token(original, request.info_this(), request.raw());
        }
    }

    fn construct_string(&self, request: &StringRequest) -> StringConstruction {
        let original = self.construct_original.load(Ordering::Acquire);
        if original == 0 || request.entry.is_null() {
            return StringConstruction {
                access: 0,
                entry: request.entry,
            };
        }
        let access = unsafe {
            CeeInfo::call_construct_string(
                original,
                request.info_this,
                request.scope_handle,
                request.token.value(),
                request.entry,
            )
        };
        StringConstruction {
            access,
            entry: request.entry,
        }
    }

    fn method_def_token(&self, method_handle: usize) -> Token {
        match self.cee.get() {
            Some(cee) => Token::new(cee.method_def_token(method_handle)),
            None => Token::new(0),
        }
    }
}

static ACTIVE: RwLock<Option<Arc<JitEngine>>> = RwLock::new(None);

/// The process-wide compilation interception engine.
pub struct JitEngine {
    host: Arc<dyn HostJit>,
    raw: Option<Arc<RawHostJit>>,
    method_observers: ObserverList<dyn MethodObserver>,
    token_observers: ObserverList<dyn TokenObserver>,
    hooks: Mutex<HookManager>,
    torn_down: AtomicBool,
}

impl JitEngine {
    /// The installed engine, or create and install one over the real
    /// host compiler.
    ///
    /// # Errors
    /// Propagates discovery failures and
    /// [`crate::Error::UnsupportedHostVersion`] when the host has no
    /// known descriptor layout.
    pub fn instance() -> Result<Arc<JitEngine>> {
        let mut active = write_lock!(ACTIVE);
        if let Some(engine) = active.as_ref() {
            return Ok(engine.clone());
        }

        let runtime = HostRuntime::discover()?;
        // Unknown layouts must fail before any slot is touched.
        DescriptorOffsets::for_version(&runtime.version)?;

        let raw = Arc::new(RawHostJit::new(runtime.version));
        let engine = Arc::new(JitEngine {
            host: raw.clone() as Arc<dyn HostJit>,
            raw: Some(raw.clone()),
            method_observers: ObserverList::new(),
            token_observers: ObserverList::new(),
            hooks: Mutex::new(HookManager::new()),
            torn_down: AtomicBool::new(false),
        });

        {
            let mut hooks = lock!(engine.hooks);
            let slot = runtime.compile_method_slot();
            unsafe {
                hooks.install(slot, compile_method_shim as *const () as usize);
            }
            raw.compile_original
                .store(hooks.original(slot).unwrap_or(0), Ordering::Release);
        }
        tracing::debug!(version = %runtime.version, "compile hook installed");

        *active = Some(engine.clone());
        Ok(engine)
    }

    /// Build an engine over a caller-supplied host, without installing
    /// any hook. The engine is not registered as the process instance.
    #[must_use]
    pub fn with_host(host: Arc<dyn HostJit>) -> Arc<JitEngine> {
        Arc::new(JitEngine {
            host,
            raw: None,
            method_observers: ObserverList::new(),
            token_observers: ObserverList::new(),
            hooks: Mutex::new(HookManager::new()),
            torn_down: AtomicBool::new(false),
        })
    }

    /// The currently installed engine, if any.
    #[must_use]
    pub fn active() -> Option<Arc<JitEngine>> {
        read_lock!(ACTIVE).clone()
    }

    /// Tear the engine down: restore every hooked slot, drop all
    /// observers and unregister the process instance. A torn-down engine
    /// rejects further registrations.
    pub fn shutdown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        unsafe {
            lock!(self.hooks).restore_all();
        }
        self.method_observers.clear();
        self.token_observers.clear();

        let mut active = write_lock!(ACTIVE);
        if active
            .as_ref()
            .is_some_and(|engine| std::ptr::eq(Arc::as_ptr(engine), self))
        {
            *active = None;
        }
        tracing::debug!("interception engine shut down");
    }

    /// True once [`JitEngine::shutdown`] has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Number of host entry points currently patched.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        lock!(self.hooks).len()
    }

    /// Register a method observer. Re-adding the same observer is a
    /// no-op.
    ///
    /// # Errors
    /// [`crate::Error::EngineShutdown`] on a torn-down engine.
    pub fn add_method_observer(&self, observer: Arc<dyn MethodObserver>) -> Result<()> {
        if self.is_torn_down() {
            return Err(crate::Error::EngineShutdown);
        }
        self.method_observers.add(observer);
        Ok(())
    }

    /// Unregister a method observer. Unknown observers are ignored.
    pub fn remove_method_observer(&self, observer: &Arc<dyn MethodObserver>) {
        self.method_observers.remove(observer);
    }

    /// Whether this exact observer is registered.
    #[must_use]
    pub fn has_method_observer(&self, observer: &Arc<dyn MethodObserver>) -> bool {
        self.method_observers.contains(observer)
    }

    /// Register a token observer. Re-adding the same observer is a no-op.
    ///
    /// # Errors
    /// [`crate::Error::EngineShutdown`] on a torn-down engine.
    pub fn add_token_observer(&self, observer: Arc<dyn TokenObserver>) -> Result<()> {
        if self.is_torn_down() {
            return Err(crate::Error::EngineShutdown);
        }
        self.token_observers.add(observer);
        Ok(())
    }

    /// Unregister a token observer. Unknown observers are ignored.
    pub fn remove_token_observer(&self, observer: &Arc<dyn TokenObserver>) {
        self.token_observers.remove(observer);
    }

    /// Whether this exact observer is registered.
    #[must_use]
    pub fn has_token_observer(&self, observer: &Arc<dyn TokenObserver>) -> bool {
        self.token_observers.contains(observer)
    }

    /// Bind the runtime-info descriptor and hook its resolution slots,
    /// once, on the first observed compilation.
    pub(crate) fn ensure_info_hooks(&self, runtime_info: *mut c_void) {
        let Some(raw) = &self.raw else { return };
        if raw.cee.get().is_some() {
            return;
        }
        if self.method_observers.is_empty() && self.token_observers.is_empty() {
            return;
        }

        let mut hooks = lock!(self.hooks);
        if raw.cee.get().is_some() {
            return;
        }

        let cee = match unsafe { CeeInfo::bind(runtime_info, &raw.version) } {
            Ok(cee) => cee,
            Err(error) => {
                tracing::error!(%error, "runtime-info descriptor rejected");
                return;
            }
        };

        unsafe {
            let slot = cee.resolve_token_slot();
            hooks.install(slot, resolve_token_shim as *const () as usize);
            raw.resolve_original
                .store(hooks.original(slot).unwrap_or(0), Ordering::Release);

            let slot = cee.construct_string_slot();
            hooks.install(slot, construct_string_shim as *const () as usize);
            raw.construct_original
                .store(hooks.original(slot).unwrap_or(0), Ordering::Release);
        }

        let _ = raw.cee.set(cee);
        tracing::debug!("resolution hooks installed");
    }

    /// Compile dispatch. Always delegates to the host and forwards its
    /// result code unchanged; the only locally produced failure is an
    /// unmappable method identity.
    pub fn dispatch_compile(&self, request: &mut CompileRequest) -> CompileOutcome {
        let depth = DepthGuard::enter(&COMPILE_DEPTH);
        let _compiling = CompilingGuard {
            outermost: depth.outermost,
        };

        let mut context = None;
        // Scratch lives until after delegation on every path.
        let mut _scratch_il = None;
        let mut _scratch_sig = None;

        if depth.outermost {
            match self.observe_compile(request) {
                Ok(observed) => context = observed,
                Err(error) => {
                    tracing::error!(
                        method_handle = request.method_handle,
                        %error,
                        "aborting compilation"
                    );
                    return CompileOutcome {
                        result: CorJitResult::INTERNAL_ERROR,
                        native: CompiledCode::none(),
                    };
                }
            }

            if let Some(resolved) = &context {
                match resolved.mode() {
                    ResolveMode::BytecodeSubstituted => {
                        if let Some(body) = resolved.body() {
                            let il = ScratchBuffer::from_slice(&body.il);
                            request.apply_body(il.ptr(), body.il.len() as u32, body.max_stack);
                            _scratch_il = Some(il);

                            if let Some(blob) = body.locals_signature() {
                                let sig = ScratchBuffer::from_slice(&blob);
                                request.apply_locals(sig.ptr(), body.locals.len() as u16);
                                _scratch_sig = Some(sig);
                            }
                        }
                    }
                    ResolveMode::NativeCodeSubstituted => {
                        if let Some(code) = resolved.native() {
                            let body = placeholder_body(code.len());
                            let il = ScratchBuffer::from_slice(&body);
                            request.apply_body(
                                il.ptr(),
                                body.len() as u32,
                                request.max_stack.max(8),
                            );
                            _scratch_il = Some(il);
                        }
                    }
                    ResolveMode::Unmodified => {}
                }
            }
        }

        let outcome = self.host.compile(request);

        if let Some(resolved) = &context {
            if resolved.mode() == ResolveMode::NativeCodeSubstituted {
                if let Some(code) = resolved.native() {
                    if !outcome.native.entry.is_null() && !code.is_empty() {
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                code.as_ptr(),
                                outcome.native.entry,
                                code.len(),
                            );
                        }
                    }
                }
            }
        }

        outcome
    }

    /// Resolve the compiling method's identity and run the observer
    /// chain. `Ok(None)` means the compilation is not observed: no
    /// observers, or a scope no module is registered for.
    fn observe_compile(&self, request: &mut CompileRequest) -> Result<Option<MethodContext>> {
        let observers = self.method_observers.snapshot();
        if observers.is_empty() {
            return Ok(None);
        }

        let Some(module) = ModuleRegistry::global().by_scope(request.scope_handle) else {
            return Ok(None);
        };

        let token = self.host.method_def_token(request.method_handle);
        let method = module
            .resolve_method(token)
            .map_err(|_| crate::Error::MethodNotFound(request.method_handle))?;

        COMPILING.with(|current| *current.borrow_mut() = Some(method.clone()));

        let mut context = MethodContext::new(method);
        for observer in observers.iter() {
            observer.on_compile(&mut context);
            if context.is_resolved() {
                break;
            }
        }
        Ok(Some(context))
    }

    /// Token resolution dispatch. Always delegates after observers had
    /// their chance to rewrite the request.
    pub fn dispatch_resolve_token(&self, request: &mut TokenRequest) {
        let depth = DepthGuard::enter(&TOKEN_DEPTH);

        if depth.outermost {
            let observers = self.token_observers.snapshot();
            if !observers.is_empty() {
                let mut context = TokenContext::new(
                    current_compiling(),
                    TokenRequestKind::Token,
                    request.scope_handle,
                    request.token,
                );
                for observer in observers.iter() {
                    observer.on_resolve(&mut context);
                    if context.is_resolved() {
                        break;
                    }
                }
                if let Some(token) = context.override_token() {
                    request.set_token(token);
                }
            }
        }

        self.host.resolve_token(request);
    }

    /// String literal construction dispatch. The host materializes the
    /// literal first; an observer-supplied replacement is then patched
    /// over the published object.
    ///
    /// # Errors
    /// [`crate::Error::ReplacementContentInvalid`] when an observer
    /// resolved the construction with empty content.
    pub fn dispatch_construct_string(&self, request: &StringRequest) -> Result<i32> {
        let depth = DepthGuard::enter(&TOKEN_DEPTH);

        if depth.outermost {
            let observers = self.token_observers.snapshot();
            if !observers.is_empty() {
                let mut context = TokenContext::new(
                    current_compiling(),
                    TokenRequestKind::InlineString,
                    request.scope_handle,
                    request.token,
                );
                for observer in observers.iter() {
                    observer.on_resolve(&mut context);
                    if context.is_resolved() {
                        break;
                    }
                }

                if context.is_resolved() {
                    let content = context.content().unwrap_or_default();
                    if content.is_empty() {
                        return Err(crate::Error::ReplacementContentInvalid);
                    }

                    let construction = self.host.construct_string(request);
                    if !construction.entry.is_null() {
                        unsafe {
                            strings::overwrite_string_entry(construction.entry, content)?;
                        }
                    }
                    return Ok(construction.access);
                }
            }
        }

        Ok(self.host.construct_string(request).access)
    }
}

unsafe extern "C" fn compile_method_shim(
    this: *mut c_void,
    runtime_info: *mut c_void,
    info: *mut MethodInfoRaw,
    flags: u32,
    native_entry: *mut *mut u8,
    native_size: *mut u32,
) -> i32 {
    if this.is_null() {
        if !native_entry.is_null() {
            *native_entry = std::ptr::null_mut();
        }
        if !native_size.is_null() {
            *native_size = 0;
        }
        return CorJitResult::OK.0;
    }

    let Some(engine) = JitEngine::active() else {
        return CorJitResult::INTERNAL_ERROR.0;
    };

    engine.ensure_info_hooks(runtime_info);

    let mut request = CompileRequest::from_raw(info).with_raw_call(RawCompileCall {
        jit_this: this,
        runtime_info,
        flags,
        native_entry,
        native_size,
    });
    engine.dispatch_compile(&mut request).result.0
}

unsafe extern "C" fn resolve_token_shim(this: *mut c_void, resolved: *mut ResolvedTokenRaw) {
    if this.is_null() {
        return;
    }
    let Some(engine) = JitEngine::active() else {
        return;
    };

    let mut request = TokenRequest::from_raw(resolved).with_info_this(this);
    engine.dispatch_resolve_token(&mut request);
}

unsafe extern "C" fn construct_string_shim(
    this: *mut c_void,
    scope: usize,
    token: u32,
    entry: *mut *mut u8,
) -> i32 {
    if this.is_null() {
        return 0;
    }
    let Some(engine) = JitEngine::active() else {
        return 0;
    };

    let request = StringRequest {
        scope_handle: scope,
        token: Token::new(token),
        info_this: this,
        entry,
    };
    match engine.dispatch_construct_string(&request) {
        Ok(access) => access,
        Err(error) => {
            // Never unwind across the host boundary.
            tracing::error!(token = %Token::new(token), %error, "string construction override failed");
            0
        }
    }
}
