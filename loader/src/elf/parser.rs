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

//! The ELF validator (§4.1): checks magic, class, machine, ABI, `ET_DYN`;
//! scans program headers once; computes the lowest/highest virtual
//! address span, alignment, and the in-memory offset of the phdr table.

use super::*;
use crate::{
	bytes,
	data::PhdrLocation,
	error::{Kind, LResult, LoaderError},
	memory::page_align_up,
};
use alloc::vec::Vec;
use core::mem::size_of;

/// The result of validating and scanning an ELF64 image: everything
/// [`crate::load::materialize`] needs to reserve and fill a region,
/// without yet committing to any `va_base`.
#[derive(Debug)]
pub struct ParsedElf {
	/// The raw program headers, in file order.
	pub phdrs: Vec<Elf64Phdr>,
	/// The file's own entry point (pre-relocation).
	pub e_entry: u64,
	/// Maximum `p_align` over all `PT_LOAD` headers; at least the page
	/// size.
	pub align: usize,
	/// Lowest loaded VA (pre-relocation); must be `0`.
	pub lowerl: u64,
	/// Highest loaded VA (pre-relocation, pre-page-align).
	pub upperl: u64,
	/// The reserved region's required length (`page_align_up(upperl)`).
	pub va_len: usize,
	/// Where the phdr table lands once the region is materialised.
	pub phdr: PhdrLocation,
	/// Whether a `PT_INTERP` header was observed.
	pub interp_required: bool,
	/// Index of the `PT_INTERP` header in `phdrs`, if any.
	pub interp_index: Option<usize>,
}

/// Validates `image`'s ELF header and scans its program headers.
///
/// `image` need not be the whole file: only the bytes up to and including
/// the program header table are read (the caller has already read at
/// least the ELF header to decide how much more to fetch).
pub fn parse(image: &[u8]) -> LResult<ParsedElf> {
	let ehdr: &Elf64Ehdr =
		bytes::from_bytes(image).ok_or(LoaderError::new(Kind::NotElf))?;
	validate_ident(&ehdr.e_ident)?;
	if ehdr.e_machine != EM_TARGET {
		return Err(LoaderError::new(Kind::WrongTarget));
	}
	if ehdr.e_type != ET_DYN {
		return Err(LoaderError::new(Kind::WrongTarget));
	}

	let phnum = ehdr.e_phnum as usize;
	let phentsize = ehdr.e_phentsize as usize;
	if phentsize < size_of::<Elf64Phdr>() {
		return Err(LoaderError::new(Kind::NotElf));
	}
	let phoff = ehdr.e_phoff as usize;

	let mut phdrs = Vec::with_capacity(phnum);
	let mut align = PAGE_SIZE_MIN_ALIGN;
	let mut lowerl = u64::MAX;
	let mut upperl = 0u64;
	let mut phdr_loc = PhdrLocation {
		off: 0,
		num: ehdr.e_phnum,
		entsize: ehdr.e_phentsize,
	};
	let mut interp_required = false;
	let mut interp_index = None;
	let mut found_phdr_off = false;

	for i in 0..phnum {
		let start = phoff
			.checked_add(i * phentsize)
			.ok_or(LoaderError::new(Kind::NotElf))?;
		let end = start
			.checked_add(size_of::<Elf64Phdr>())
			.ok_or(LoaderError::new(Kind::NotElf))?;
		let raw = image.get(start..end).ok_or(LoaderError::new(Kind::NotElf))?;
		let phdr: &Elf64Phdr = bytes::from_bytes(raw).ok_or(LoaderError::new(Kind::NotElf))?;
		let phdr = *phdr;

		match phdr.p_type {
			PT_INTERP => {
				if interp_required {
					return Err(LoaderError::new(Kind::UnsupportedFeature));
				}
				interp_required = true;
				interp_index = Some(i);
			}
			PT_LOAD => {
				align = align.max(phdr.p_align.max(1) as usize);
				let seg_lo = phdr.p_paddr;
				let seg_hi = phdr
					.p_paddr
					.checked_add(phdr.p_memsz)
					.ok_or(LoaderError::new(Kind::NotElf))?;
				lowerl = lowerl.min(seg_lo);
				upperl = upperl.max(seg_hi);
				let file_off = ehdr.e_phoff;
				let seg_file_end = phdr
					.p_offset
					.checked_add(phdr.p_filesz)
					.ok_or(LoaderError::new(Kind::NotElf))?;
				if phdr.p_offset <= file_off && file_off < seg_file_end {
					phdr_loc.off = (file_off - phdr.p_offset + phdr.p_paddr) as usize;
					found_phdr_off = true;
				}
			}
			_ => {}
		}
		phdrs.push(phdr);
	}

	if phnum == 0 {
		lowerl = 0;
	}
	if lowerl != 0 {
		return Err(LoaderError::new(Kind::NotElf));
	}
	if !found_phdr_off || phdr_loc.off == 0 {
		return Err(LoaderError::new(Kind::NotElf));
	}

	let va_len = page_align_up(upperl as usize);
	Ok(ParsedElf {
		phdrs,
		e_entry: ehdr.e_entry,
		align,
		lowerl,
		upperl,
		va_len,
		phdr: phdr_loc,
		interp_required,
		interp_index,
	})
}

const PAGE_SIZE_MIN_ALIGN: usize = crate::memory::PAGE_SIZE;

fn validate_ident(e_ident: &[u8; EI_NIDENT]) -> LResult<()> {
	if e_ident[0..4] != ELFMAG {
		return Err(LoaderError::new(Kind::NotElf));
	}
	if e_ident[EI_CLASS] != ELFCLASS64 {
		return Err(LoaderError::new(Kind::WrongTarget));
	}
	if e_ident[EI_DATA] != ELFDATA2LSB {
		return Err(LoaderError::new(Kind::WrongTarget));
	}
	let osabi = e_ident[EI_OSABI];
	if osabi != ELFOSABI_LINUX && osabi != ELFOSABI_NONE {
		return Err(LoaderError::new(Kind::WrongTarget));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{build_dynamic_pie, build_static_pie};

	#[test]
	fn accepts_minimal_static_pie() {
		let bytes = build_static_pie();
		let parsed = parse(&bytes).unwrap();
		assert!(!parsed.interp_required);
		assert_eq!(parsed.lowerl, 0);
		assert_eq!(parsed.e_entry, 0x100);
		assert!(parsed.align >= crate::memory::PAGE_SIZE);
	}

	#[test]
	fn accepts_dynamic_pie_and_flags_interpreter() {
		let bytes = build_dynamic_pie();
		let parsed = parse(&bytes).unwrap();
		assert!(parsed.interp_required);
		assert!(parsed.interp_index.is_some());
	}

	#[test]
	fn rejects_bad_magic() {
		let mut bytes = build_static_pie();
		bytes[0] = 0;
		assert_eq!(parse(&bytes).unwrap_err().kind, Kind::NotElf);
	}

	#[test]
	fn rejects_32_bit_class() {
		let mut bytes = build_static_pie();
		bytes[EI_CLASS] = ELFCLASS32;
		assert_eq!(parse(&bytes).unwrap_err().kind, Kind::WrongTarget);
	}

	#[test]
	fn rejects_wrong_machine() {
		let mut bytes = build_static_pie();
		bytes[18..20].copy_from_slice(&0xBEEFu16.to_le_bytes());
		assert_eq!(parse(&bytes).unwrap_err().kind, Kind::WrongTarget);
	}

	#[test]
	fn rejects_non_pie_et_exec() {
		let mut bytes = build_static_pie();
		bytes[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
		assert_eq!(parse(&bytes).unwrap_err().kind, Kind::WrongTarget);
	}

	#[test]
	fn rejects_second_pt_interp() {
		let ehdr_size = size_of::<Elf64Ehdr>();
		let phdr_size = size_of::<Elf64Phdr>();
		let phoff = ehdr_size;
		// One PT_LOAD and two PT_INTERP headers, each naming the same
		// trailing path bytes.
		let header_len = phoff + 3 * phdr_size;
		let path = b"libc.so\0";
		let total_len = header_len + path.len();
		let mut buf = build_static_pie();
		buf.resize(total_len.max(buf.len()), 0);

		write_u16_test(&mut buf, 56, 3); // e_phnum
		write_u64_test(&mut buf, 32, phoff as u64); // e_phoff unchanged

		// PT_LOAD covering the whole file (index 0, already present).
		let load_off = phoff;
		write_u64_test(&mut buf, load_off + 32, total_len as u64); // p_filesz
		write_u64_test(&mut buf, load_off + 40, total_len as u64); // p_memsz

		for idx in [1usize, 2] {
			let off = phoff + idx * phdr_size;
			write_u32_test(&mut buf, off, PT_INTERP);
			write_u32_test(&mut buf, off + 4, PF_R);
			write_u64_test(&mut buf, off + 8, header_len as u64); // p_offset
			write_u64_test(&mut buf, off + 32, path.len() as u64); // p_filesz
			write_u64_test(&mut buf, off + 40, path.len() as u64); // p_memsz
			write_u64_test(&mut buf, off + 48, 1); // p_align
		}
		buf[header_len..header_len + path.len()].copy_from_slice(path);

		assert_eq!(parse(&buf).unwrap_err().kind, Kind::UnsupportedFeature);
	}

	fn write_u16_test(buf: &mut [u8], off: usize, v: u16) {
		buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
	}

	fn write_u32_test(buf: &mut [u8], off: usize, v: u32) {
		buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
	}

	fn write_u64_test(buf: &mut [u8], off: usize, v: u64) {
		buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
	}
}
