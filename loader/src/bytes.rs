/*
 * This file is part of elfloader.
 *
 * elfloader is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free
 * Software Foundation, either version 3 of the License, or (at your option)
 * any later version.
 *
 * elfloader is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
 * FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
 * more details.
 *
 * You should have received a copy of the GNU General Public License along
 * with elfloader. If not, see <https://www.gnu.org/licenses/>.
 */

//! Safe casts between byte slices and `#[repr(C)]` structures.

use core::mem::{align_of, size_of};

/// Marker for types with no invalid bit pattern that may be safely cast
/// from an arbitrary byte slice of the right size and alignment.
///
/// # Safety
///
/// The implementor must be `#[repr(C)]` (or `#[repr(transparent)]`), have
/// no padding-sensitive invariants, and every possible bit pattern of its
/// size must be a valid value (no enums, `bool`, references, etc.).
pub unsafe trait AnyRepr {}

unsafe impl AnyRepr for u8 {}
unsafe impl AnyRepr for u16 {}
unsafe impl AnyRepr for u32 {}
unsafe impl AnyRepr for u64 {}
unsafe impl AnyRepr for i32 {}
unsafe impl AnyRepr for i64 {}
unsafe impl<T: AnyRepr, const N: usize> AnyRepr for [T; N] {}

/// Casts a prefix of `data` to `&T`, if `data` is at least `size_of::<T>()`
/// bytes long and correctly aligned for `T`.
///
/// Returns `None` on a short slice or misaligned pointer rather than
/// panicking or aligning/copying, since ELF headers may be read directly
/// from an arbitrarily-aligned file buffer.
pub fn from_bytes<T: AnyRepr>(data: &[u8]) -> Option<&T> {
	if data.len() < size_of::<T>() {
		return None;
	}
	let ptr = data.as_ptr();
	if (ptr as usize) % align_of::<T>() != 0 {
		return None;
	}
	// Safety: `T: AnyRepr` guarantees any bit pattern of the right size is a
	// valid `T`; the length and alignment checks above uphold the rest of
	// `&*ptr.cast()`'s preconditions, and the returned reference's lifetime
	// is tied to `data`.
	Some(unsafe { &*ptr.cast::<T>() })
}

/// Casts `data` (which must be *exactly* `size_of::<T>()` bytes) to `&T`.
pub fn from_bytes_exact<T: AnyRepr>(data: &[u8]) -> Option<&T> {
	if data.len() != size_of::<T>() {
		return None;
	}
	from_bytes(data)
}
