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

//! ELF64 constants and raw, on-disk structure layouts.
//!
//! Only the ELF64 class is modelled: the loader's accepted file format is
//! fixed to 64-bit little-endian PIE binaries (§6), so there is no 32-bit
//! counterpart to carry around.

pub mod parser;

use loader_macros::AnyRepr;

/// Number of identification bytes in the ELF header.
pub const EI_NIDENT: usize = 16;

/// Identification bytes offset: file class.
pub const EI_CLASS: usize = 4;
/// Identification bytes offset: data encoding.
pub const EI_DATA: usize = 5;
/// Identification bytes offset: ELF version.
pub const EI_VERSION: usize = 6;
/// Identification bytes offset: OS ABI.
pub const EI_OSABI: usize = 7;

/// Magic bytes at the start of `e_ident`.
pub const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// File's class: invalid.
pub const ELFCLASSNONE: u8 = 0;
/// File's class: 32-bit objects.
pub const ELFCLASS32: u8 = 1;
/// File's class: 64-bit objects.
pub const ELFCLASS64: u8 = 2;

/// Data encoding: invalid.
pub const ELFDATANONE: u8 = 0;
/// Data encoding: little endian.
pub const ELFDATA2LSB: u8 = 1;
/// Data encoding: big endian.
pub const ELFDATA2MSB: u8 = 2;

/// OS/ABI: System V / unspecified.
pub const ELFOSABI_NONE: u8 = 0;
/// OS/ABI: Linux.
pub const ELFOSABI_LINUX: u8 = 3;

/// Object file type: no file type.
pub const ET_NONE: u16 = 0;
/// Object file type: relocatable file.
pub const ET_REL: u16 = 1;
/// Object file type: executable file.
pub const ET_EXEC: u16 = 2;
/// Object file type: shared object / PIE.
pub const ET_DYN: u16 = 3;
/// Object file type: core file.
pub const ET_CORE: u16 = 4;

/// Required architecture: x86-64.
pub const EM_X86_64: u16 = 62;
/// Required architecture: AArch64.
pub const EM_AARCH64: u16 = 183;

/// The machine this build targets, per the spec's "machine matching the
/// build target" requirement.
#[cfg(target_arch = "x86_64")]
pub const EM_TARGET: u16 = EM_X86_64;
#[cfg(target_arch = "aarch64")]
pub const EM_TARGET: u16 = EM_AARCH64;

/// Program header type: ignored.
pub const PT_NULL: u32 = 0;
/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;
/// Program header type: dynamic linking information.
pub const PT_DYNAMIC: u32 = 2;
/// Program header type: interpreter path.
pub const PT_INTERP: u32 = 3;
/// Program header type: auxiliary information.
pub const PT_NOTE: u32 = 4;
/// Program header type: the program header table itself.
pub const PT_PHDR: u32 = 6;
/// Program header type: thread-local storage template.
pub const PT_TLS: u32 = 7;
/// Program header type (GNU): executable-stack marker.
pub const PT_GNU_STACK: u32 = 0x6474_e551;

/// Segment flag: execute.
pub const PF_X: u32 = 0x1;
/// Segment flag: write.
pub const PF_W: u32 = 0x2;
/// Segment flag: read.
pub const PF_R: u32 = 0x4;

/// 64-bit ELF header.
#[derive(AnyRepr, Clone, Debug)]
#[repr(C)]
pub struct Elf64Ehdr {
	pub e_ident: [u8; EI_NIDENT],
	pub e_type: u16,
	pub e_machine: u16,
	pub e_version: u32,
	pub e_entry: u64,
	pub e_phoff: u64,
	pub e_shoff: u64,
	pub e_flags: u32,
	pub e_ehsize: u16,
	pub e_phentsize: u16,
	pub e_phnum: u16,
	pub e_shentsize: u16,
	pub e_shnum: u16,
	pub e_shstrndx: u16,
}

/// 64-bit ELF program header.
#[derive(AnyRepr, Clone, Copy, Debug)]
#[repr(C)]
pub struct Elf64Phdr {
	pub p_type: u32,
	pub p_flags: u32,
	pub p_offset: u64,
	pub p_vaddr: u64,
	pub p_paddr: u64,
	pub p_filesz: u64,
	pub p_memsz: u64,
	pub p_align: u64,
}

impl Elf64Phdr {
	/// Returns the page protection flags (see [`crate::memory::prot`])
	/// corresponding to `p_flags`.
	pub fn mmap_prot(&self) -> u8 {
		let mut flags = 0;
		if self.p_flags & PF_R != 0 {
			flags |= crate::memory::prot::READ;
		}
		if self.p_flags & PF_W != 0 {
			flags |= crate::memory::prot::WRITE;
		}
		if self.p_flags & PF_X != 0 {
			flags |= crate::memory::prot::EXEC;
		}
		flags
	}
}
