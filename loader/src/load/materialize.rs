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

//! Image materialisation (§4.2): reserve a contiguous region sized and
//! aligned to the parsed image's requirements, then fill each `PT_LOAD`
//! segment, either by copying file bytes into an allocated region
//! (strategy A) or by mapping them in directly (strategy B).

use crate::{
	elf::{parser::ParsedElf, PT_LOAD},
	error::{Kind, LResult, LoaderError},
	image::ImageSource,
	memory::{prot, Allocator, Mmap, VirtAddr},
};
use core::slice;

/// Which materialisation strategy produced a [`Materialized`] region, so
/// [`release`] and the unload path know whether to give the region back to
/// `alloc` or `mmap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
	/// Filled by copying file bytes into an `Allocator`-owned region.
	Copy,
	/// Filled by mapping file- and anonymous-backed pages directly.
	Mapped,
}

/// The outcome of materialising an image: its base address, the lowest
/// loaded byte address (`start`), and enough bookkeeping to release the
/// region later.
pub struct Materialized {
	pub va_base: VirtAddr,
	pub start: VirtAddr,
	pub strategy: Strategy,
	/// Total reserved length, for [`release`]: `parsed.va_len` for
	/// [`Strategy::Copy`], the rounded-up hole size for [`Strategy::Mapped`].
	pub region_len: usize,
	/// Alignment the region was reserved with; only meaningful for
	/// [`Strategy::Copy`], whose `Allocator::free` requires it back.
	pub region_align: usize,
}

/// Releases a materialised region back to whichever backend produced it.
pub fn release(m: &Materialized, alloc: &dyn Allocator, mmap: Option<&dyn Mmap>) {
	match m.strategy {
		Strategy::Copy => {
			if let Some(ptr) = core::ptr::NonNull::new(unsafe { m.va_base.as_ptr::<u8>() }) {
				// Safety: `va_base` was returned by this same `alloc` with
				// `region_len`/`region_align` in `materialize_copy`.
				unsafe { alloc.free(ptr, m.region_len, m.region_align) };
			}
		}
		Strategy::Mapped => {
			if let Some(mmap) = mmap {
				mmap.munmap(m.va_base, m.region_len);
			}
		}
	}
}

/// Materialises `parsed` from `image`, preferring strategy B (mmap) when
/// both `mmap` is supplied and `image` supports it, falling back to
/// strategy A (copy into an allocated region) otherwise.
pub fn materialize(
	parsed: &ParsedElf,
	image: &dyn ImageSource,
	alloc: &dyn Allocator,
	mmap: Option<&dyn Mmap>,
) -> LResult<Materialized> {
	if image.supports_mmap() {
		if let Some(mmap) = mmap {
			return materialize_mapped(parsed, image, mmap);
		}
	}
	materialize_copy(parsed, image, alloc)
}

fn lowest_start(parsed: &ParsedElf, va_base: VirtAddr) -> VirtAddr {
	parsed
		.phdrs
		.iter()
		.filter(|p| p.p_type == PT_LOAD)
		.map(|p| va_base + p.p_paddr as usize)
		.min()
		.unwrap_or(va_base)
}

/// Strategy A: copy file bytes into a heap-allocated region.
fn materialize_copy(
	parsed: &ParsedElf,
	image: &dyn ImageSource,
	alloc: &dyn Allocator,
) -> LResult<Materialized> {
	let region = alloc
		.alloc(parsed.va_len, parsed.align)
		.map_err(|_| LoaderError::new(Kind::ResourceExhausted))?;
	let va_base = VirtAddr::from(region.as_ptr());

	for phdr in parsed.phdrs.iter().filter(|p| p.p_type == PT_LOAD) {
		let seg_addr = va_base + phdr.p_paddr as usize;
		let filesz = phdr.p_filesz as usize;
		let memsz = phdr.p_memsz as usize;
		// The allocator does not zero its memory, so the tail must be
		// zeroed up to the page boundary, not just up to `memsz`: a
		// partial `.bss` page otherwise keeps whatever garbage the
		// allocator handed back (§4.2 invariant 6).
		let region_off = phdr.p_paddr as usize;
		let zero_end = crate::memory::page_align_up(region_off + memsz).min(parsed.va_len);
		let seg_len = zero_end - region_off;
		// Safety: `region` was just allocated with `va_len` bytes and
		// `zero_end <= va_len`, so `[seg_addr, seg_addr + seg_len)` lies
		// within it.
		let dst = unsafe { slice::from_raw_parts_mut(seg_addr.as_ptr::<u8>(), seg_len) };
		image.pread_exact(phdr.p_offset, &mut dst[..filesz])?;
		dst[filesz..].fill(0);
	}

	Ok(Materialized {
		va_base,
		start: lowest_start(parsed, va_base),
		strategy: Strategy::Copy,
		region_len: parsed.va_len,
		region_align: parsed.align,
	})
}

/// Strategy B: reserve an anonymous hole large enough to guarantee an
/// `align`-aligned base, then map each segment's file-backed and
/// zero-filled portions directly.
///
/// Because ELF requires `p_offset ≡ p_vaddr (mod p_align)`, each segment's
/// file mapping starts at `delta = p_vaddr - page_align_down(p_vaddr)`
/// bytes before its first byte so that the mapping itself lands on a page
/// boundary.
fn materialize_mapped(
	parsed: &ParsedElf,
	image: &dyn ImageSource,
	mmap: &dyn Mmap,
) -> LResult<Materialized> {
	let hole_len = parsed.va_len + parsed.align;
	let hole = mmap.mmap_anon(hole_len, prot::READ | prot::WRITE)?;
	mmap.munmap(hole, hole_len);
	let va_base = VirtAddr(crate::memory::align_up(*hole, parsed.align));

	for phdr in parsed.phdrs.iter().filter(|p| p.p_type == PT_LOAD) {
		let seg_vaddr = va_base + phdr.p_paddr as usize;
		let filesz = phdr.p_filesz as usize;
		let memsz = phdr.p_memsz as usize;
		let seg_mem_end = (seg_vaddr + memsz).page_align_up();

		let page_start = seg_vaddr.page_align_down();
		let delta = *seg_vaddr - *page_start;
		mmap.mmap_fixed_file(
			page_start,
			filesz + delta,
			phdr.mmap_prot() | prot::WRITE,
			image,
			phdr.p_offset - delta as u64,
		)?;

		let tail_start = seg_vaddr + filesz;
		if seg_mem_end > tail_start {
			let tail_len = *seg_mem_end - *tail_start;
			let mapped_end = (page_start + (filesz + delta)).page_align_up();
			if tail_start < mapped_end {
				// The tail partially lands on a page already covered by the
				// file mapping above: memset just that part.
				let in_page_len = (*mapped_end - *tail_start).min(tail_len);
				// Safety: `mmap_fixed_file` above maps `[page_start,
				// mapped_end)` read-write.
				let dst =
					unsafe { slice::from_raw_parts_mut(tail_start.as_ptr::<u8>(), in_page_len) };
				dst.fill(0);
			}
			if mapped_end < seg_mem_end {
				let anon_start = mapped_end;
				let anon_len = *seg_mem_end - *anon_start;
				mmap.mmap_fixed_anon(anon_start, anon_len, phdr.mmap_prot() | prot::WRITE)?;
			}
		}
	}

	Ok(Materialized {
		va_base,
		start: lowest_start(parsed, va_base),
		strategy: Strategy::Mapped,
		region_len: crate::memory::page_align_up(parsed.va_len),
		region_align: parsed.align,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		elf::parser,
		test_support::{build_pie_with_bss, build_static_pie, MockAllocator},
	};

	#[test]
	fn bss_tail_is_zero_filled() {
		let bss_len = 256u64;
		let bytes = build_pie_with_bss(bss_len);
		let image = crate::image::SliceImage::new(&bytes);
		let parsed = parser::parse(&bytes).unwrap();
		let alloc = MockAllocator::default();
		let m = materialize(&parsed, &image, &alloc, None).unwrap();
		let filesz = bytes.len();
		let memsz = filesz + bss_len as usize;
		// The zero-fill law covers the whole page-aligned tail, not just
		// up to `memsz`: the allocator does not zero its memory, so a
		// partial trailing page would otherwise keep allocator garbage.
		let page_aligned_end = crate::memory::page_align_up(memsz);
		assert!(page_aligned_end > memsz, "test must exercise a partial tail page");
		// Safety: `page_aligned_end <= va_len`, which the region covers.
		let region =
			unsafe { core::slice::from_raw_parts(m.va_base.as_ptr::<u8>(), page_aligned_end) };
		assert!(region[filesz..page_aligned_end].iter().all(|&b| b == 0));
		release(&m, &alloc, None);
	}

	#[test]
	fn copy_strategy_preserves_file_bytes() {
		let bytes = build_static_pie();
		let image = crate::image::SliceImage::new(&bytes);
		let parsed = parser::parse(&bytes).unwrap();
		let alloc = MockAllocator::default();
		let m = materialize(&parsed, &image, &alloc, None).unwrap();
		assert_eq!(m.strategy, Strategy::Copy);
		// Safety: the region covers at least `bytes.len()` bytes.
		let region = unsafe { core::slice::from_raw_parts(m.va_base.as_ptr::<u8>(), bytes.len()) };
		assert_eq!(region, &bytes[..]);
		release(&m, &alloc, None);
	}
}
