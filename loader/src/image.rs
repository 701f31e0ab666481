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

//! Obtaining a byte-addressable ELF image, whether it lives in an initrd
//! region already in memory or is read on demand from a VFS file
//! descriptor.

use crate::error::{LResult, LoaderError};
use alloc::{boxed::Box, vec::Vec};

/// A source of ELF bytes: an in-memory initrd region or a VFS file
/// descriptor (`open`/`fstat`/`pread`/`close`, per the loader's *VFS*
/// consumed interface).
pub trait ImageSource {
	/// Returns the total length of the image in bytes.
	fn len(&self) -> u64;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Reads `buf.len()` bytes at file offset `offset`, failing with
	/// [`crate::error::Kind::Io`] on a short read — the loader has no use
	/// for partial headers.
	fn pread_exact(&self, offset: u64, buf: &mut [u8]) -> LResult<()>;

	/// Whether this source can be `mmap`-ed (only true for a VFS-backed
	/// file descriptor); an in-memory initrd image has no descriptor to
	/// map from and always uses the copy materialisation strategy.
	fn supports_mmap(&self) -> bool {
		false
	}
}

/// An [`ImageSource`] backed by a byte slice already resident in memory
/// (the initrd case; `INITRD_EXEC`).
pub struct SliceImage<'a> {
	data: &'a [u8],
}

impl<'a> SliceImage<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		Self {
			data,
		}
	}

	/// Returns the backing slice, e.g. for strategy A's direct `memcpy`.
	pub fn as_slice(&self) -> &'a [u8] {
		self.data
	}
}

impl ImageSource for SliceImage<'_> {
	fn len(&self) -> u64 {
		self.data.len() as u64
	}

	fn pread_exact(&self, offset: u64, buf: &mut [u8]) -> LResult<()> {
		let offset = usize::try_from(offset).map_err(|_| LoaderError::io(crate::error::EIO))?;
		let end = offset
			.checked_add(buf.len())
			.ok_or(LoaderError::io(crate::error::EIO))?;
		let src = self
			.data
			.get(offset..end)
			.ok_or(LoaderError::io(crate::error::EIO))?;
		buf.copy_from_slice(src);
		Ok(())
	}
}

/// A file descriptor abstraction, supplied by the embedding kernel's VFS
/// (`open`, `fstat`, `pread`, `close`).
pub trait FileDescriptor {
	fn size(&self) -> u64;
	fn pread(&self, offset: u64, buf: &mut [u8]) -> LResult<usize>;
}

/// An [`ImageSource`] backed by an open VFS file descriptor
/// (`VFS_EXEC`).
pub struct FileImage<'a> {
	fd: &'a dyn FileDescriptor,
}

impl<'a> FileImage<'a> {
	pub fn new(fd: &'a dyn FileDescriptor) -> Self {
		Self {
			fd,
		}
	}

	pub fn fd(&self) -> &dyn FileDescriptor {
		self.fd
	}
}

impl ImageSource for FileImage<'_> {
	fn len(&self) -> u64 {
		self.fd.size()
	}

	fn pread_exact(&self, offset: u64, buf: &mut [u8]) -> LResult<()> {
		let n = self.fd.pread(offset, buf)?;
		if n != buf.len() {
			return Err(LoaderError::io(crate::error::EIO));
		}
		Ok(())
	}

	fn supports_mmap(&self) -> bool {
		true
	}
}

/// The VFS boundary the top-level driver needs to chain-load an interpreter
/// by path (§4.3, *interpreter chain loading*): `VFS_EXEC` resolves the
/// `PT_INTERP` string to a file descriptor the same way it resolves the
/// initial program's path.
pub trait Vfs {
	/// Opens `path` for reading, failing with [`crate::error::Kind::Io`] if
	/// it does not exist or cannot be opened.
	fn open(&self, path: &str) -> LResult<Box<dyn FileDescriptor>>;
}

/// Reads the whole of `src` into a freshly allocated buffer.
///
/// Used when the caller needs a contiguous slice to hand to the parser
/// (e.g. to read the ELF header and scan program headers before the
/// backing allocator is sized).
pub fn read_all(src: &dyn ImageSource) -> LResult<Vec<u8>> {
	let len = usize::try_from(src.len()).map_err(|_| LoaderError::io(crate::error::EIO))?;
	let mut buf = alloc::vec![0u8; len];
	src.pread_exact(0, &mut buf)?;
	Ok(buf)
}
