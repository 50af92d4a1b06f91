//! Version-keyed access to the per-compilation runtime-info object.
//!
//! The host hands every compilation a runtime-info object whose vtable
//! layout shifts between host versions. The slots interception needs are
//! pinned here per supported version; an unknown version is fatal at
//! engine construction since no entry point can be reached safely.

use std::ffi::c_void;

use crate::jit::host::ResolvedTokenRaw;
use crate::runtime::HostVersion;
use crate::Result;

/// `getMethodModule` slot.
type GetMethodModuleFn = unsafe extern "C" fn(this: *mut c_void, method: usize) -> usize;
/// `getMethodDefFromMethod` slot.
type GetMethodDefFn = unsafe extern "C" fn(this: *mut c_void, method: usize) -> u32;
/// `resolveToken` slot.
pub(crate) type ResolveTokenFn =
    unsafe extern "C" fn(this: *mut c_void, resolved: *mut ResolvedTokenRaw);
/// `constructStringLiteral` slot.
pub(crate) type ConstructStringFn = unsafe extern "C" fn(
    this: *mut c_void,
    scope: usize,
    token: u32,
    entry: *mut *mut u8,
) -> i32;

/// Vtable slot indexes for one host version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorOffsets {
    /// Index of the module lookup slot.
    pub module: usize,
    /// Index of the token resolution slot.
    pub resolve_token: usize,
    /// Index of the string literal construction slot.
    pub construct_string: usize,
    /// Index of the method definition token slot.
    pub method_def: usize,
}

impl DescriptorOffsets {
    /// Look up the slot layout for a host version.
    ///
    /// # Errors
    /// [`crate::Error::UnsupportedHostVersion`] when no layout is known
    /// for `version`.
    pub fn for_version(version: &HostVersion) -> Result<Self> {
        match (version.major, version.minor) {
            (3, 1) => Ok(DescriptorOffsets {
                module: 10,
                resolve_token: 28,
                construct_string: 146,
                method_def: 116,
            }),
            _ => Err(crate::Error::UnsupportedHostVersion(version.to_string())),
        }
    }
}

/// A bound runtime-info object together with its version's slot layout.
pub struct CeeInfo {
    info: *mut c_void,
    table: *mut usize,
    offsets: DescriptorOffsets,
}

// Bound once per process; the host guarantees the object stays live for
// the lifetime of the compiler.
unsafe impl Send for CeeInfo {}
unsafe impl Sync for CeeInfo {}

impl CeeInfo {
    /// Bind the runtime-info object passed to a compilation.
    ///
    /// # Errors
    /// [`crate::Error::UnsupportedHostVersion`] when `version` has no
    /// known slot layout.
    ///
    /// # Safety
    /// `info` must point to a live runtime-info object whose first word
    /// is its vtable.
    pub unsafe fn bind(info: *mut c_void, version: &HostVersion) -> Result<Self> {
        let offsets = DescriptorOffsets::for_version(version)?;
        let table = *(info as *mut *mut usize);
        Ok(CeeInfo {
            info,
            table,
            offsets,
        })
    }

    /// Address of a vtable slot by index.
    #[must_use]
    pub fn slot_address(&self, index: usize) -> *mut usize {
        unsafe { self.table.add(index) }
    }

    /// Address of the token resolution slot, for hook installation.
    #[must_use]
    pub fn resolve_token_slot(&self) -> *mut usize {
        self.slot_address(self.offsets.resolve_token)
    }

    /// Address of the string construction slot, for hook installation.
    #[must_use]
    pub fn construct_string_slot(&self) -> *mut usize {
        self.slot_address(self.offsets.construct_string)
    }

    /// Scope handle of the method's declaring module.
    #[must_use]
    pub fn method_module(&self, method_handle: usize) -> usize {
        unsafe {
            let entry: GetMethodModuleFn = std::mem::transmute(*self.slot_address(self.offsets.module));
            entry(self.info, method_handle)
        }
    }

    /// Definition token of a method handle.
    #[must_use]
    pub fn method_def_token(&self, method_handle: usize) -> u32 {
        unsafe {
            let entry: GetMethodDefFn =
                std::mem::transmute(*self.slot_address(self.offsets.method_def));
            entry(self.info, method_handle)
        }
    }

    /// Delegate a token resolution through the currently installed slot
    /// value at `entry`.
    pub(crate) unsafe fn call_resolve_token(
        entry: usize,
        this: *mut c_void,
        resolved: *mut ResolvedTokenRaw,
    ) {
        let f: ResolveTokenFn = std::mem::transmute(entry);
        f(this, resolved);
    }

    /// Delegate a string construction through the slot value at `entry`.
    pub(crate) unsafe fn call_construct_string(
        entry: usize,
        this: *mut c_void,
        scope: usize,
        token: u32,
        out: *mut *mut u8,
    ) -> i32 {
        let f: ConstructStringFn = std::mem::transmute(entry);
        f(this, scope, token, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_version_has_layout() {
        let offsets = DescriptorOffsets::for_version(&HostVersion::new(3, 1, 1)).unwrap();
        assert_eq!(offsets.module, 10);
        assert_eq!(offsets.resolve_token, 28);
        assert_eq!(offsets.method_def, 116);
    }

    #[test]
    fn patch_level_does_not_matter() {
        assert!(DescriptorOffsets::for_version(&HostVersion::new(3, 1, 32)).is_ok());
    }

    #[test]
    fn unknown_version_is_fatal() {
        let error = DescriptorOffsets::for_version(&HostVersion::new(9, 0, 0)).unwrap_err();
        assert!(matches!(error, crate::Error::UnsupportedHostVersion(_)));
    }
}
