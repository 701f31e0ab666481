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

//! In-memory mocks of every consumed interface, plus synthetic minimal PIE
//! ELF64 byte builders, shared by the `#[cfg(test)]` modules across the
//! crate so each one isn't rebuilding its own fixtures.

use crate::{
	elf::{Elf64Ehdr, Elf64Phdr, EM_TARGET, ET_DYN, PF_R, PF_X, PT_INTERP, PT_LOAD},
	error::{Kind, LResult, LoaderError},
	image::{FileDescriptor, ImageSource, Vfs},
	memory::{Allocator, Mmap, Paging, VirtAddr},
};
use alloc::{boxed::Box, vec::Vec};
use core::{
	alloc::Layout,
	mem::size_of,
	ptr::NonNull,
	sync::atomic::{AtomicUsize, Ordering},
};

const PAGE_SIZE: usize = crate::memory::PAGE_SIZE;

fn write_u16(buf: &mut [u8], off: usize, v: u16) {
	buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut [u8], off: usize, v: u32) {
	buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn write_u64(buf: &mut [u8], off: usize, v: u64) {
	buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

/// Builds a minimal valid PIE ELF64 image: one `PT_LOAD` spanning the whole
/// file, entry point at offset `0x100`. If `interp_path` is given, a second
/// `PT_INTERP` header names it.
fn build_pie(interp_path: Option<&[u8]>) -> Vec<u8> {
	let ehdr_size = size_of::<Elf64Ehdr>();
	let phdr_size = size_of::<Elf64Phdr>();
	let num_phdrs = if interp_path.is_some() { 2 } else { 1 };
	let phoff = ehdr_size;
	let header_len = phoff + num_phdrs * phdr_size;
	let mut total_len = header_len;
	if let Some(p) = interp_path {
		total_len += p.len();
	}
	total_len = total_len.max(PAGE_SIZE / 8);
	let entry = 0x100u64;

	let mut buf = alloc::vec![0u8; total_len];

	// e_ident
	buf[0..4].copy_from_slice(&crate::elf::ELFMAG);
	buf[crate::elf::EI_CLASS] = crate::elf::ELFCLASS64;
	buf[crate::elf::EI_DATA] = crate::elf::ELFDATA2LSB;
	buf[crate::elf::EI_OSABI] = crate::elf::ELFOSABI_NONE;
	// e_type, e_machine, e_version
	write_u16(&mut buf, 16, ET_DYN);
	write_u16(&mut buf, 18, EM_TARGET);
	write_u32(&mut buf, 20, 1);
	// e_entry, e_phoff, e_shoff
	write_u64(&mut buf, 24, entry);
	write_u64(&mut buf, 32, phoff as u64);
	write_u64(&mut buf, 40, 0);
	// e_flags, e_ehsize, e_phentsize, e_phnum, e_shentsize, e_shnum, e_shstrndx
	write_u32(&mut buf, 48, 0);
	write_u16(&mut buf, 52, ehdr_size as u16);
	write_u16(&mut buf, 54, phdr_size as u16);
	write_u16(&mut buf, 56, num_phdrs as u16);
	write_u16(&mut buf, 58, 0);
	write_u16(&mut buf, 60, 0);
	write_u16(&mut buf, 62, 0);

	// PT_LOAD covering the whole file.
	let load_off = phoff;
	write_u32(&mut buf, load_off, PT_LOAD);
	write_u32(&mut buf, load_off + 4, PF_R | PF_X);
	write_u64(&mut buf, load_off + 8, 0); // p_offset
	write_u64(&mut buf, load_off + 16, 0); // p_vaddr
	write_u64(&mut buf, load_off + 24, 0); // p_paddr
	write_u64(&mut buf, load_off + 32, total_len as u64); // p_filesz
	write_u64(&mut buf, load_off + 40, total_len as u64); // p_memsz
	write_u64(&mut buf, load_off + 48, PAGE_SIZE as u64); // p_align

	if let Some(path) = interp_path {
		let interp_off = phoff + phdr_size;
		write_u32(&mut buf, interp_off, PT_INTERP);
		write_u32(&mut buf, interp_off + 4, PF_R);
		write_u64(&mut buf, interp_off + 8, header_len as u64); // p_offset
		write_u64(&mut buf, interp_off + 16, 0); // p_vaddr
		write_u64(&mut buf, interp_off + 24, 0); // p_paddr
		write_u64(&mut buf, interp_off + 32, path.len() as u64); // p_filesz
		write_u64(&mut buf, interp_off + 40, path.len() as u64); // p_memsz
		write_u64(&mut buf, interp_off + 48, 1); // p_align
		buf[header_len..header_len + path.len()].copy_from_slice(path);
	}

	buf
}

/// A statically-linked PIE image whose single `PT_LOAD` has `p_memsz`
/// `bss_len` bytes larger than `p_filesz`, to exercise the zero-fill law
/// over the tail the file does not cover.
pub fn build_pie_with_bss(bss_len: u64) -> Vec<u8> {
	let mut buf = build_pie(None);
	let ehdr_size = size_of::<Elf64Ehdr>();
	let load_off = ehdr_size;
	let filesz = u64::from_le_bytes(buf[load_off + 32..load_off + 40].try_into().unwrap());
	write_u64(&mut buf, load_off + 40, filesz + bss_len);
	buf
}

/// A statically-linked PIE image with no `PT_INTERP`.
pub fn build_static_pie() -> Vec<u8> {
	build_pie(None)
}

/// A dynamically-linked PIE image naming `libc.so\0` as its interpreter.
pub fn build_dynamic_pie() -> Vec<u8> {
	build_pie(Some(b"libc.so\0"))
}

/// A bump-ish heap backend tracking outstanding allocations, so tests can
/// assert that every error path releases what it acquired.
#[derive(Default)]
pub struct MockAllocator {
	outstanding: AtomicUsize,
}

impl MockAllocator {
	pub fn outstanding(&self) -> usize {
		self.outstanding.load(Ordering::SeqCst)
	}
}

impl Allocator for MockAllocator {
	fn alloc(&self, size: usize, align: usize) -> LResult<NonNull<u8>> {
		let layout =
			Layout::from_size_align(size, align).map_err(|_| LoaderError::new(Kind::ResourceExhausted))?;
		// Safety: `layout` has non-zero size for every call this crate makes.
		let ptr = unsafe { alloc::alloc::alloc(layout) };
		let ptr = NonNull::new(ptr).ok_or_else(|| LoaderError::new(Kind::ResourceExhausted))?;
		self.outstanding.fetch_add(1, Ordering::SeqCst);
		Ok(ptr)
	}

	unsafe fn free(&self, ptr: NonNull<u8>, size: usize, align: usize) {
		let layout = Layout::from_size_align_unchecked(size, align);
		alloc::alloc::dealloc(ptr.as_ptr(), layout);
		self.outstanding.fetch_sub(1, Ordering::SeqCst);
	}
}

/// A paging backend that always succeeds, recording how many times
/// `page_set_attr` was called and the flags of the most recent call, so
/// tests can assert that protection was restored to R+W before a region
/// was released on a teardown path.
#[derive(Default)]
pub struct MockPaging {
	calls: AtomicUsize,
	last_flags: core::sync::atomic::AtomicU8,
}

impl MockPaging {
	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last_flags(&self) -> u8 {
		self.last_flags.load(Ordering::SeqCst)
	}
}

impl Paging for MockPaging {
	fn page_set_attr(&self, _vaddr: VirtAddr, _page_count: usize, flags: u8) -> LResult<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.last_flags.store(flags, Ordering::SeqCst);
		Ok(())
	}
}

/// An `mmap` backend over real heap pages, for tests that only need a
/// single anonymous reservation filled in place (never a reserve-then-narrow
/// sequence, which would use-after-free through this backend's `munmap`).
#[derive(Default)]
pub struct MockMmap {
	outstanding: AtomicUsize,
}

impl MockMmap {
	pub fn outstanding(&self) -> usize {
		self.outstanding.load(Ordering::SeqCst)
	}
}

impl Mmap for MockMmap {
	fn mmap_anon(&self, len: usize, _prot: u8) -> LResult<VirtAddr> {
		let layout =
			Layout::from_size_align(len, PAGE_SIZE).map_err(|_| LoaderError::new(Kind::ResourceExhausted))?;
		// Safety: `layout` has non-zero size for every call this crate makes.
		let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
		let ptr = NonNull::new(ptr).ok_or_else(|| LoaderError::new(Kind::ResourceExhausted))?;
		self.outstanding.fetch_add(1, Ordering::SeqCst);
		Ok(VirtAddr::from(ptr.as_ptr()))
	}

	fn mmap_fixed_file(
		&self,
		addr: VirtAddr,
		len: usize,
		_prot: u8,
		fd: &dyn ImageSource,
		offset: u64,
	) -> LResult<()> {
		// Safety: `addr` was reserved by `mmap_anon` for at least `len` bytes.
		let dst = unsafe { core::slice::from_raw_parts_mut(addr.as_ptr::<u8>(), len) };
		fd.pread_exact(offset, dst)
	}

	fn mmap_fixed_anon(&self, addr: VirtAddr, len: usize, _prot: u8) -> LResult<()> {
		// Safety: same precondition as `mmap_fixed_file`.
		let dst = unsafe { core::slice::from_raw_parts_mut(addr.as_ptr::<u8>(), len) };
		dst.fill(0);
		Ok(())
	}

	fn munmap(&self, addr: VirtAddr, len: usize) {
		if len == 0 {
			return;
		}
		if let Some(ptr) = NonNull::new(unsafe { addr.as_ptr::<u8>() }) {
			// Safety: `len`/`PAGE_SIZE` match the layout `mmap_anon` used for
			// this same address.
			let layout = unsafe { Layout::from_size_align_unchecked(len, PAGE_SIZE) };
			unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) };
			self.outstanding.fetch_sub(1, Ordering::SeqCst);
		}
	}
}

/// A file descriptor backed by an owned copy of some bytes.
pub struct MockFileDescriptor {
	data: Vec<u8>,
}

impl MockFileDescriptor {
	pub fn new(data: &[u8]) -> Self {
		Self {
			data: data.to_vec(),
		}
	}
}

impl FileDescriptor for MockFileDescriptor {
	fn size(&self) -> u64 {
		self.data.len() as u64
	}

	fn pread(&self, offset: u64, buf: &mut [u8]) -> LResult<usize> {
		let offset = usize::try_from(offset).unwrap_or(usize::MAX);
		if offset >= self.data.len() {
			return Ok(0);
		}
		let end = (offset + buf.len()).min(self.data.len());
		let n = end - offset;
		buf[..n].copy_from_slice(&self.data[offset..end]);
		Ok(n)
	}
}

/// A VFS that serves every `open` call with the same fixed image, ignoring
/// the requested path — enough to exercise interpreter chain-loading
/// without modelling a real filesystem.
pub struct MockVfs<'a> {
	data: &'a [u8],
}

impl<'a> MockVfs<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		Self {
			data,
		}
	}
}

impl Vfs for MockVfs<'_> {
	fn open(&self, _path: &str) -> LResult<Box<dyn FileDescriptor>> {
		Ok(Box::new(MockFileDescriptor::new(self.data)))
	}
}
