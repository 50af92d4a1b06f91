//! Host runtime discovery.
//!
//! Identifies the running host by version and locates its compiler: the
//! `getJit` export of the compiler library yields the compiler object,
//! whose vtable begins with the compile-method slot. Discovery happens
//! once per process.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use libloading::Library;

use crate::Result;

/// Name of the host compiler library, platform decoration excluded.
#[cfg(target_os = "windows")]
const COMPILER_LIBRARY: &str = "clrjit.dll";
#[cfg(target_os = "macos")]
const COMPILER_LIBRARY: &str = "libclrjit.dylib";
#[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
const COMPILER_LIBRARY: &str = "libclrjit.so";

/// Path segment the host version follows in the runtime install layout.
const RUNTIME_DIR: &str = "Microsoft.NETCore.App";

/// The host runtime version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl HostVersion {
    /// Build a version triple.
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        HostVersion {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` string.
    ///
    /// # Errors
    /// [`crate::Error::UnsupportedHostVersion`] when the string does not
    /// form a three-part numeric version.
    pub fn parse(version: &str) -> Result<Self> {
        let mut parts = version.split('.');
        let mut next = || -> Option<u32> { parts.next()?.parse().ok() };

        match (next(), next(), next()) {
            (Some(major), Some(minor), Some(patch)) => Ok(HostVersion::new(major, minor, patch)),
            _ => Err(crate::Error::UnsupportedHostVersion(version.to_string())),
        }
    }

    /// Extract the version from a path inside the runtime install layout,
    /// where the component after the runtime directory names the version.
    ///
    /// # Errors
    /// [`crate::Error::UnsupportedHostVersion`] when the path does not
    /// contain the runtime directory followed by a parseable version.
    pub fn from_install_path(path: &Path) -> Result<Self> {
        let mut components = path
            .components()
            .filter_map(|component| component.as_os_str().to_str());

        while let Some(component) = components.next() {
            if component == RUNTIME_DIR {
                let Some(version) = components.next() else {
                    break;
                };
                return HostVersion::parse(version);
            }
        }

        Err(crate::Error::UnsupportedHostVersion(
            path.display().to_string(),
        ))
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Signature of the compiler library's `getJit` export.
type GetJitFn = unsafe extern "C" fn() -> *mut *mut usize;

/// The discovered host compiler.
pub struct HostRuntime {
    /// The version the host reported.
    pub version: HostVersion,
    /// Address of the compiler object.
    pub compiler: *mut *mut usize,
    /// Address of the compiler vtable.
    pub vtable: *mut usize,
    // Keeps the compiler library resident.
    _library: Library,
}

// Discovery produces process-global addresses; the library handle is
// never used for further symbol lookups after construction.
unsafe impl Send for HostRuntime {}
unsafe impl Sync for HostRuntime {}

static RUNTIME: OnceLock<HostRuntime> = OnceLock::new();

impl HostRuntime {
    /// Discover the host compiler, once per process.
    ///
    /// # Errors
    /// [`crate::Error::Loading`] when the compiler library or its
    /// `getJit` export cannot be found, and
    /// [`crate::Error::UnsupportedHostVersion`] when the library path
    /// does not reveal a known install layout.
    pub fn discover() -> Result<&'static HostRuntime> {
        if let Some(runtime) = RUNTIME.get() {
            return Ok(runtime);
        }

        let (library, path) = Self::load_compiler_library()?;
        let version = HostVersion::from_install_path(&path)?;

        let compiler = unsafe {
            let get_jit: libloading::Symbol<GetJitFn> = library.get(b"getJit\0")?;
            get_jit()
        };
        if compiler.is_null() {
            return Err(crate::Error::Error(
                "host compiler export returned no compiler object".to_string(),
            ));
        }
        let vtable = unsafe { *compiler };

        let runtime = HostRuntime {
            version,
            compiler,
            vtable,
            _library: library,
        };
        Ok(RUNTIME.get_or_init(|| runtime))
    }

    /// Address of the compile-method slot, the first vtable entry.
    #[must_use]
    pub fn compile_method_slot(&self) -> *mut usize {
        self.vtable
    }

    fn load_compiler_library() -> Result<(Library, std::path::PathBuf)> {
        let path = Self::resident_compiler_path()
            .ok_or_else(|| crate::Error::Error(format!("{COMPILER_LIBRARY} is not loaded")))?;
        let library = unsafe { Library::new(&path)? };
        Ok((library, path))
    }

    /// Find the already-loaded compiler library in this process.
    #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
    fn resident_compiler_path() -> Option<std::path::PathBuf> {
        let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
        maps.lines()
            .filter_map(|line| line.split_whitespace().nth(5))
            .find(|mapped| mapped.ends_with(COMPILER_LIBRARY))
            .map(std::path::PathBuf::from)
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    fn resident_compiler_path() -> Option<std::path::PathBuf> {
        // Resolved through the loader's default search order.
        Some(std::path::PathBuf::from(COMPILER_LIBRARY))
    }
}
