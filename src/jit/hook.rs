//! Vtable slot hooking.
//!
//! [`HookManager`] swaps function pointers in host vtable slots and
//! remembers the displaced values so every hook can be undone. Slots are
//! plain pointer-sized words; the host's vtables live in writable memory.

/// One hooked slot and the value it held before.
#[derive(Debug, Clone, Copy)]
struct HookedSlot {
    slot: *mut usize,
    original: usize,
}

/// Records and reverses vtable slot replacements.
#[derive(Debug, Default)]
pub struct HookManager {
    installed: Vec<HookedSlot>,
}

// Slots target process-global vtables.
unsafe impl Send for HookManager {}

impl HookManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        HookManager::default()
    }

    /// Write `replacement` into `slot`, recording the displaced value.
    /// Installing over an already-hooked slot is a no-op.
    ///
    /// # Safety
    /// `slot` must point to a live, writable, pointer-sized slot, and
    /// `replacement` must be a function pointer compatible with the
    /// slot's callers.
    pub unsafe fn install(&mut self, slot: *mut usize, replacement: usize) {
        if self.installed.iter().any(|hooked| hooked.slot == slot) {
            return;
        }

        let original = std::ptr::read_volatile(slot);
        std::ptr::write_volatile(slot, replacement);
        self.installed.push(HookedSlot { slot, original });
    }

    /// The value a slot held before hooking, if it is hooked.
    #[must_use]
    pub fn original(&self, slot: *mut usize) -> Option<usize> {
        self.installed
            .iter()
            .find(|hooked| hooked.slot == slot)
            .map(|hooked| hooked.original)
    }

    /// Restore one slot, forgetting the record. Unknown slots are ignored.
    ///
    /// # Safety
    /// The slot must still be live and writable.
    pub unsafe fn remove(&mut self, slot: *mut usize) {
        if let Some(index) = self.installed.iter().position(|hooked| hooked.slot == slot) {
            let hooked = self.installed.swap_remove(index);
            std::ptr::write_volatile(hooked.slot, hooked.original);
        }
    }

    /// Restore every hooked slot, in reverse installation order.
    ///
    /// # Safety
    /// All recorded slots must still be live and writable.
    pub unsafe fn restore_all(&mut self) {
        while let Some(hooked) = self.installed.pop() {
            std::ptr::write_volatile(hooked.slot, hooked.original);
        }
    }

    /// Number of currently hooked slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.installed.len()
    }

    /// True when nothing is hooked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}
