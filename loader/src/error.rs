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

//! Error handling.
//!
//! The loader reports semantic error kinds rather than raw platform codes
//! (the ELF record is invalid, the target does not match the running
//! machine, an allocation failed, ...). Where the underlying cause is a
//! platform error (a failed read, a failed `mmap`), that platform code is
//! kept around on [`LoaderError::errno`] for the caller's diagnostics.

use core::fmt;

/// A Unix-style error number, used only to carry through an underlying I/O
/// failure's platform code; the loader itself never returns one of these on
/// its own.
pub type Errno = i32;

pub const EIO: Errno = 5;
pub const ENOEXEC: Errno = 8;
pub const ENOMEM: Errno = 12;
pub const EACCES: Errno = 13;
pub const ENODEV: Errno = 19;
pub const EINVAL: Errno = 22;
pub const ENOSYS: Errno = 38;

/// Semantic error kinds a load can fail with.
///
/// These map directly onto the error taxonomy the loader is specified
/// against: each variant is a *trigger*, not a platform code, and each is
/// surfaced to the caller as one of the fixed outcomes below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
	/// `e_ident` does not identify a readable ELF record (bad magic, wrong
	/// class/endianness, truncated header).
	NotElf,
	/// The record is well-formed ELF but does not target this machine:
	/// wrong `e_machine`/`e_ident[EI_OSABI]`, or not `ET_DYN`.
	WrongTarget,
	/// The record asks for something this loader does not implement: more
	/// than one `PT_INTERP`, an interpreter requested for an in-memory
	/// image, or a non-PIE base address.
	UnsupportedFeature,
	/// An allocation or mapping operation failed.
	ResourceExhausted,
	/// A read from the image source failed or returned fewer bytes than
	/// requested; `errno` carries the underlying platform code.
	Io,
	/// Setting a segment's final protection bits failed. Unlike every
	/// other kind, this one does not abort the load: it is logged and the
	/// segment keeps its materialisation-time protection.
	ProtectionWarning,
	/// The caller supplied no program name, or an empty argument vector.
	BadInvocation,
}

impl Kind {
	/// Returns whether this kind aborts the load, as opposed to being a
	/// logged-and-continue warning.
	pub const fn is_fatal(self) -> bool {
		!matches!(self, Self::ProtectionWarning)
	}
}

impl fmt::Display for Kind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::NotElf => "not an ELF image",
			Self::WrongTarget => "ELF image does not target this machine",
			Self::UnsupportedFeature => "unsupported ELF feature",
			Self::ResourceExhausted => "out of memory",
			Self::Io => "I/O error reading image",
			Self::ProtectionWarning => "failed to set final segment protection",
			Self::BadInvocation => "bad invocation",
		};
		f.write_str(s)
	}
}

/// A loader error: a semantic [`Kind`] plus, for [`Kind::Io`], the
/// underlying platform errno.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoaderError {
	pub kind: Kind,
	pub errno: Option<Errno>,
}

impl LoaderError {
	/// Builds an error carrying only a semantic kind.
	pub const fn new(kind: Kind) -> Self {
		Self {
			kind,
			errno: None,
		}
	}

	/// Builds an [`Kind::Io`] error carrying the platform code that caused
	/// it.
	pub const fn io(errno: Errno) -> Self {
		Self {
			kind: Kind::Io,
			errno: Some(errno),
		}
	}
}

impl fmt::Display for LoaderError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.errno {
			Some(e) => write!(f, "{}: errno {e}", self.kind),
			None => write!(f, "{}", self.kind),
		}
	}
}

/// Shorthand alias for a result that fails with a [`LoaderError`].
pub type LResult<T> = Result<T, LoaderError>;

/// Builds a [`LoaderError`] from a [`Kind`], or from an `(errno expr)` for
/// [`Kind::Io`].
///
/// ```ignore
/// return Err(lerr!(NotElf));
/// return Err(lerr!(io: raw_errno));
/// ```
#[macro_export]
macro_rules! lerr {
	(io: $errno:expr) => {
		$crate::error::LoaderError::io($errno)
	};
	($kind:ident) => {
		$crate::error::LoaderError::new($crate::error::Kind::$kind)
	};
}

/// Logs a recoverable-looking condition tied to `$err` at warning level.
///
/// Mirrors how the original image loader's `elferr_*` helpers append the
/// underlying `libelf` message to a log line only when one exists.
#[macro_export]
macro_rules! elferr_warn {
	($err:expr, $($arg:tt)*) => {{
		$crate::print!("[warn] ");
		$crate::println!($($arg)*);
		$crate::println!("  caused by: {}", $err);
	}};
}

/// Logs a load-aborting condition tied to `$err` at error level.
#[macro_export]
macro_rules! elferr_err {
	($err:expr, $($arg:tt)*) => {{
		$crate::print!("[error] ");
		$crate::println!($($arg)*);
		$crate::println!("  caused by: {}", $err);
	}};
}

/// Logs an unrecoverable condition tied to `$err` at critical level.
#[macro_export]
macro_rules! elferr_crit {
	($err:expr, $($arg:tt)*) => {{
		$crate::print!("[crit] ");
		$crate::println!($($arg)*);
		$crate::println!("  caused by: {}", $err);
	}};
}
