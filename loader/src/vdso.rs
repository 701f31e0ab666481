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

//! vDSO mapping (grounded on `vdso/interface.c`/`vdso/vsyscall.c`): if the
//! embedding kernel provides a vDSO image, map it and report its base so the
//! stack builder can publish `AT_SYSINFO_EHDR` (spec §4.4). Absent a vDSO
//! image, [`ctx_init`](crate::stack::ctx_init) simply omits that auxv entry.
//!
//! Time and CPU vDSO functions (`__vdso_clock_gettime`, `__vdso_getcpu`, ...)
//! are explicitly not reimplemented here (spec.md §1 non-goals; SPEC_FULL.md
//! calls these out as unrelated external collaborators) — this module only
//! covers the mapping step the auxv vector needs to know about.

use crate::{
	error::LResult,
	memory::{prot, Mmap, Paging, VirtAddr},
};

/// A vDSO image mapped into the address space, ready to be reported through
/// `AT_SYSINFO_EHDR`.
#[derive(Clone, Copy, Debug)]
pub struct MappedVdso {
	/// Base address of the mapped vDSO ELF image (`AT_SYSINFO_EHDR`).
	pub base: VirtAddr,
	/// Length of the mapped region, for [`MappedVdso::unmap`].
	len: usize,
}

/// Maps `image` (a small, statically-linked vDSO ELF blob owned by the
/// embedding kernel) read+execute via `mmap`, at whatever address the
/// backend chooses — unlike the main program and interpreter, the vDSO
/// carries no alignment requirement beyond the page size because it is
/// always accessed PC-relative to the base auxv reports.
///
/// The region is reserved read+write to receive the copy, then narrowed to
/// read+execute through `paging` — the same two-step materialise-then-protect
/// sequence as [`crate::load::protect::apply`] for `PT_LOAD` segments.
pub fn map(mmap: &dyn Mmap, paging: &dyn Paging, image: &[u8]) -> LResult<MappedVdso> {
	let len = crate::memory::page_align_up(image.len());
	let base = mmap.mmap_anon(len, prot::READ | prot::WRITE)?;
	// Safety: `base` was just reserved by `mmap_anon` for exactly `len`
	// bytes.
	let dst = unsafe { core::slice::from_raw_parts_mut(base.as_ptr::<u8>(), image.len()) };
	dst.copy_from_slice(image);
	let page_count = len / crate::memory::PAGE_SIZE;
	if let Err(err) = paging.page_set_attr(base, page_count, prot::READ | prot::EXEC) {
		crate::elferr_warn!(err, "failed to set vDSO protection at {base:?}");
	}
	Ok(MappedVdso {
		base,
		len,
	})
}

impl MappedVdso {
	/// Returns the vDSO's own entry point, reading `e_entry` back out of the
	/// mapped header — used if the embedding kernel also wants `AT_SYSINFO`
	/// (the call-gate entry, distinct from `AT_SYSINFO_EHDR`'s image base).
	pub fn entry(&self) -> LResult<VirtAddr> {
		// Safety: `self.base` was mapped for at least `size_of::<Elf64Ehdr>()`
		// readable bytes by `map`.
		let hdr = unsafe {
			core::slice::from_raw_parts(self.base.as_ptr::<u8>(), core::mem::size_of::<crate::elf::Elf64Ehdr>())
		};
		let ehdr: &crate::elf::Elf64Ehdr =
			crate::bytes::from_bytes_exact(hdr).ok_or(crate::lerr!(NotElf))?;
		Ok(self.base + ehdr.e_entry as usize)
	}

	/// Unmaps the vDSO image.
	pub fn unmap(&self, mmap: &dyn Mmap) {
		mmap.munmap(self.base, self.len);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{build_static_pie, MockMmap, MockPaging};

	#[test]
	fn map_copies_image_and_reports_entry() {
		let image = build_static_pie();
		let mmap = MockMmap::default();
		let paging = MockPaging::default();
		let vdso = map(&mmap, &paging, &image).unwrap();
		assert_eq!(vdso.entry().unwrap(), vdso.base + 0x100);
		vdso.unmap(&mmap);
		assert_eq!(mmap.outstanding(), 0);
	}

	#[test]
	fn unmap_releases_the_reservation() {
		let image = build_static_pie();
		let mmap = MockMmap::default();
		let paging = MockPaging::default();
		let vdso = map(&mmap, &paging, &image).unwrap();
		assert_eq!(mmap.outstanding(), 1);
		vdso.unmap(&mmap);
		assert_eq!(mmap.outstanding(), 0);
	}
}
