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

//! The loader's central record, [`LoadedProgram`], and the CPU execution
//! context it is eventually used to populate.

use crate::{load::materialize::Strategy, memory::VirtAddr};
use alloc::{boxed::Box, string::String, vec::Vec};

/// Where the program header table lives once the image is materialised:
/// an offset relative to `va_base`, an entry count, and an entry size.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhdrLocation {
	/// Offset of the table relative to `va_base`.
	pub off: usize,
	/// Number of entries (`AT_PHNUM`).
	pub num: u16,
	/// Size of one entry in bytes (`AT_PHENT`).
	pub entsize: u16,
}

/// The dynamic-linker chain for a loaded program: whether one is required,
/// its path once discovered, and the loaded interpreter image itself.
#[derive(Debug, Default)]
pub struct Interp {
	/// Set as soon as a `PT_INTERP` header is observed during parsing.
	pub required: bool,
	/// The interpreter's path, read out of the `PT_INTERP` segment.
	pub path: Option<String>,
	/// The interpreter's own loaded image, once [`crate::load::interp`] has
	/// run.
	pub prog: Option<Box<LoadedProgram>>,
}

/// A loaded ELF image: a validated, materialised, protected region of the
/// single address space, plus everything needed to hand off to it.
///
/// See the crate-level invariants list for what must hold of every
/// instance returned by [`crate::loader::load`].
#[derive(Debug)]
pub struct LoadedProgram {
	/// Display name, used as `AT_EXECFN` when no `path` is set.
	pub name: String,
	/// Canonical path, if loaded from the VFS; preferred over `name` for
	/// `AT_EXECFN`.
	pub path: Option<String>,
	/// A NUL-terminated copy of `execfn()`'s bytes, for `AT_EXECFN`'s
	/// pointer: the loaded program's libc `strlen`s it, so unlike `name`/
	/// `path` (plain Rust strings with no trailing NUL of their own) this
	/// one must carry one.
	pub(crate) execfn_nul: Vec<u8>,
	/// Base of the reserved virtual region.
	pub va_base: VirtAddr,
	/// Length of that region, page-aligned.
	pub va_len: usize,
	/// Maximum `p_align` over all `PT_LOAD` headers; at least the page
	/// size.
	pub align: usize,
	/// Lowest loaded byte address relative to `va_base` (pre-relocation);
	/// always `0`, since only PIE images are accepted.
	pub lowerl: u64,
	/// Highest loaded byte address relative to `va_base` (pre-relocation,
	/// pre-page-align).
	pub upperl: u64,
	/// Lowest loaded byte address after relocation to `va_base`.
	pub start: VirtAddr,
	/// Program entry point after relocation to `va_base`.
	pub entry: VirtAddr,
	/// Where the program header table ended up in memory.
	pub phdr: PhdrLocation,
	/// The dynamic-linker chain, if any.
	pub interp: Interp,
	/// Which strategy [`crate::load::materialize`] used to fill `va_base`,
	/// so [`crate::loader::unload`] knows how to give the region back.
	pub strategy: Strategy,
	/// Reserved region length, as returned by materialisation (distinct
	/// from `va_len` for [`Strategy::Mapped`], which rounds up to a page).
	pub region_len: usize,
	/// Reservation alignment, needed by [`Strategy::Copy`]'s
	/// `Allocator::free`.
	pub region_align: usize,
}

impl LoadedProgram {
	/// Builds the NUL-terminated `execfn_nul` copy backing
	/// [`LoadedProgram::execfn_addr`] from `path`/`name`.
	pub(crate) fn make_execfn_nul(name: &str, path: Option<&str>) -> Vec<u8> {
		let s = path.unwrap_or(name);
		let mut buf = Vec::with_capacity(s.len() + 1);
		buf.extend_from_slice(s.as_bytes());
		buf.push(0);
		buf
	}

	/// Returns the `AT_EXECFN` string: `path` if set, else `name`.
	pub fn execfn(&self) -> &str {
		self.path.as_deref().unwrap_or(&self.name)
	}

	/// Returns the address of a NUL-terminated copy of [`Self::execfn`],
	/// for `AT_EXECFN`'s pointer (spec §9, "`AT_EXECFN` lifetime"): the
	/// loaded program's libc treats it as a `const char*` and `strlen`s
	/// it, so unlike `execfn()`'s plain `&str` this must carry a trailing
	/// NUL byte. The backing buffer is owned by `self`, matching the
	/// design note that this pointer must stay valid for the application
	/// thread's lifetime.
	pub fn execfn_addr(&self) -> VirtAddr {
		VirtAddr::from(self.execfn_nul.as_ptr())
	}

	/// Returns the address of the program header table in memory
	/// (`va_base + phdr.off`, i.e. `AT_PHDR`).
	pub fn phdr_addr(&self) -> VirtAddr {
		self.va_base + self.phdr.off
	}

	/// Returns the interpreter's `va_base`, or the null address if none is
	/// loaded (`AT_BASE`).
	pub fn interp_base(&self) -> VirtAddr {
		self.interp
			.prog
			.as_ref()
			.map(|p| p.va_base)
			.unwrap_or_default()
	}

	/// Returns the initial instruction pointer: the interpreter's entry if
	/// one was loaded, else this program's own entry.
	pub fn initial_entry(&self) -> VirtAddr {
		self.interp
			.prog
			.as_ref()
			.map(|p| p.entry)
			.unwrap_or(self.entry)
	}
}

/// An opaque CPU execution context: a stack pointer, an instruction
/// pointer, and the promise that general-purpose registers are cleared on
/// entry.
///
/// Created by the caller (who owns the backing stack allocation) and
/// populated by [`crate::stack::ctx_init`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecContext {
	/// Stack pointer at handoff.
	pub sp: VirtAddr,
	/// Instruction pointer at handoff.
	pub ip: VirtAddr,
}
