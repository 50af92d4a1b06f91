//! In-place string literal replacement.
//!
//! After the host materializes a string literal it publishes the object
//! through an entry slot. The object layout is a method table pointer,
//! a 32-bit UTF-16 code unit count and the inline character data. The
//! override allocates a replacement object with the same method table
//! and the new content and repoints the entry's handle at it. The
//! replacement is deliberately never freed; the host owns the reference
//! from here on.

use std::alloc::{alloc, handle_alloc_error, Layout};

use widestring::U16String;

use crate::Result;

/// Byte offset of the code unit count inside a string object.
const LENGTH_OFFSET: usize = std::mem::size_of::<usize>();
/// Byte offset of the character data inside a string object.
const CHARS_OFFSET: usize = LENGTH_OFFSET + std::mem::size_of::<i32>();

/// Replace the string object published through `entry` with one holding
/// `content`.
///
/// # Errors
/// [`crate::Error::ReplacementContentInvalid`] when `content` is empty.
///
/// # Safety
/// `entry` must be the entry slot produced by the host's string
/// construction: a pointer to the slot holding the handle of a live
/// string object.
pub unsafe fn overwrite_string_entry(entry: *mut *mut u8, content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(crate::Error::ReplacementContentInvalid);
    }

    let encoded = U16String::from_str(content);
    let units = encoded.as_slice();

    let handle_slot = *entry as *mut *mut u8;
    let object = *handle_slot;
    let method_table = *(object as *const usize);

    let size = CHARS_OFFSET + units.len() * 2;
    let layout = Layout::from_size_align(size, std::mem::align_of::<usize>())
        .map_err(|e| crate::Error::Error(e.to_string()))?;
    let replacement = alloc(layout);
    if replacement.is_null() {
        handle_alloc_error(layout);
    }

    (replacement as *mut usize).write(method_table);
    (replacement.add(LENGTH_OFFSET) as *mut i32).write(units.len() as i32);
    std::ptr::copy_nonoverlapping(
        units.as_ptr(),
        replacement.add(CHARS_OFFSET) as *mut u16,
        units.len(),
    );

    *handle_slot = replacement;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn read_string_object(object: *const u8) -> (usize, String) {
        let method_table = *(object as *const usize);
        let length = *(object.add(LENGTH_OFFSET) as *const i32) as usize;
        let units = std::slice::from_raw_parts(object.add(CHARS_OFFSET) as *const u16, length);
        (method_table, U16String::from_vec(units.to_vec()).to_string_lossy())
    }

    fn fake_string_object(method_table: usize, content: &str) -> Vec<u8> {
        let units: Vec<u16> = content.encode_utf16().collect();
        let mut object = vec![0u8; CHARS_OFFSET + units.len() * 2];
        object[..LENGTH_OFFSET].copy_from_slice(&method_table.to_ne_bytes());
        object[LENGTH_OFFSET..CHARS_OFFSET].copy_from_slice(&(units.len() as i32).to_ne_bytes());
        for (index, unit) in units.iter().enumerate() {
            object[CHARS_OFFSET + index * 2..CHARS_OFFSET + index * 2 + 2]
                .copy_from_slice(&unit.to_ne_bytes());
        }
        object
    }

    #[test]
    fn rewrites_entry_with_new_content() {
        let mut object = fake_string_object(0xABCD, "before");
        let mut handle_slot: *mut u8 = object.as_mut_ptr();
        let mut entry: *mut u8 = (&mut handle_slot as *mut *mut u8) as *mut u8;

        unsafe {
            overwrite_string_entry(&mut entry, "after!").unwrap();
            let (method_table, content) = read_string_object(handle_slot);
            assert_eq!(method_table, 0xABCD);
            assert_eq!(content, "after!");
        }
    }

    #[test]
    fn empty_replacement_is_rejected() {
        let mut object = fake_string_object(1, "x");
        let mut handle_slot: *mut u8 = object.as_mut_ptr();
        let mut entry: *mut u8 = (&mut handle_slot as *mut *mut u8) as *mut u8;

        let result = unsafe { overwrite_string_entry(&mut entry, "") };
        assert!(matches!(
            result,
            Err(crate::Error::ReplacementContentInvalid)
        ));
        // Entry untouched.
        assert_eq!(handle_slot, object.as_mut_ptr());
    }
}
