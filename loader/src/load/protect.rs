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

//! The protection applier (§4.2, tail): after materialisation, set each
//! `PT_LOAD` segment's page protections from `p_flags`.
//!
//! A failure here is a [`crate::error::Kind::ProtectionWarning`] — it is
//! logged and the load continues, since the segment keeps whatever
//! protection materialisation left it with.

use crate::{
	elf::{parser::ParsedElf, PT_LOAD},
	memory::{Paging, VirtAddr, PAGE_SIZE},
};

/// Applies final per-page protections to every `PT_LOAD` segment of
/// `parsed`, relocated to `va_base`.
pub fn apply(parsed: &ParsedElf, va_base: VirtAddr, paging: &dyn Paging) {
	for phdr in parsed.phdrs.iter().filter(|p| p.p_type == PT_LOAD) {
		let start = (va_base + phdr.p_paddr as usize).page_align_down();
		let end = (va_base + phdr.p_paddr as usize + phdr.p_memsz as usize).page_align_up();
		let page_count = (*end - *start) / PAGE_SIZE;
		if let Err(err) = paging.page_set_attr(start, page_count, phdr.mmap_prot()) {
			crate::elferr_warn!(err, "failed to set final protection on segment at {start:?}");
		}
	}
}

/// Restores read+write protection over the whole reserved region, so the
/// backing memory can be returned to the allocator on [`crate::loader::unload`].
pub fn restore_rw(va_base: VirtAddr, va_len: usize, paging: &dyn Paging) {
	let page_count = va_len / PAGE_SIZE;
	let _ = paging.page_set_attr(
		va_base,
		page_count,
		crate::memory::prot::READ | crate::memory::prot::WRITE,
	);
}

