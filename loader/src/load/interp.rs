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

//! Interpreter discovery and chain-loading (§4.3): when a `PT_INTERP` was
//! observed, read the referenced dynamic-linker path out of the image and
//! load it as a second, independent [`crate::data::LoadedProgram`].

use crate::{
	elf::parser::ParsedElf,
	error::{Kind, LResult, LoaderError},
	image::ImageSource,
};
use alloc::string::String;
use core::str;

/// Reads the `PT_INTERP` segment's content as a NUL-terminated path.
///
/// Returns [`Kind::UnsupportedFeature`] if no `PT_INTERP` was observed —
/// the caller is expected to check `parsed.interp_required` first; this
/// exists so "in-memory image requiring an interpreter" (which has no VFS
/// to resolve the path against) can be rejected uniformly by its caller.
pub fn read_interp_path(parsed: &ParsedElf, image: &dyn ImageSource) -> LResult<String> {
	let idx = parsed
		.interp_index
		.ok_or(LoaderError::new(Kind::UnsupportedFeature))?;
	let phdr = &parsed.phdrs[idx];
	let len = phdr.p_filesz as usize;
	if len == 0 {
		return Err(LoaderError::new(Kind::NotElf));
	}
	let mut buf = alloc::vec![0u8; len];
	image.pread_exact(phdr.p_offset, &mut buf)?;
	// Enforce a terminating NUL, as the original loader does, rather than
	// trusting `p_filesz` to already exclude it.
	let nul_at = buf.iter().position(|&b| b == 0).unwrap_or(len);
	let path = str::from_utf8(&buf[..nul_at]).map_err(|_| LoaderError::new(Kind::NotElf))?;
	Ok(String::from(path))
}
