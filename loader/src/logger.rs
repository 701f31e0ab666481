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

//! Loader logging.
//!
//! The loader has no TTY of its own — it is a library linked into a
//! unikernel image — so logs are kept in a ring buffer that the embedding
//! kernel can drain (e.g. onto its own console) and, on a hosted build, are
//! also mirrored to stderr so `cargo test` output is readable.

use core::{
	cmp::{min, Ordering},
	fmt,
	fmt::Write,
};

/// Size of the in-memory log ring buffer, in bytes.
const LOGS_SIZE: usize = 16384;

/// The loader's logger.
///
/// Unlike the kernel's own logger (which the embedding unikernel owns), this
/// one has no concept of "silent": the caller decides what to do with
/// [`Logger::get_content`].
pub struct Logger {
	buf: [u8; LOGS_SIZE],
	read_head: usize,
	write_head: usize,
}

impl Logger {
	/// Creates a new, empty logger.
	pub const fn new() -> Self {
		Self {
			buf: [0; LOGS_SIZE],
			read_head: 0,
			write_head: 0,
		}
	}

	fn available_space(&self) -> usize {
		match self.write_head.cmp(&self.read_head) {
			Ordering::Equal => self.buf.len(),
			Ordering::Greater => self.buf.len() - (self.write_head - self.read_head),
			Ordering::Less => self.read_head - self.write_head - 1,
		}
	}

	/// Returns the logger's backing buffer, including stale bytes past the
	/// write head.
	pub fn get_content(&self) -> &[u8] {
		&self.buf
	}

	/// Pushes `s` onto the ring buffer, evicting the oldest bytes if full.
	pub fn push(&mut self, s: &[u8]) {
		if self.available_space() < s.len() {
			self.pop(s.len() - self.available_space());
		}
		let len = min(self.available_space(), s.len());
		let end = (self.write_head + len) % self.buf.len();
		if end < self.write_head {
			self.buf[self.write_head..].copy_from_slice(&s[0..(self.buf.len() - self.write_head)]);
			self.buf[0..end].copy_from_slice(&s[(self.buf.len() - self.write_head)..len]);
		} else {
			self.buf[self.write_head..end].copy_from_slice(&s[0..len]);
		}
		self.write_head = end;
	}

	fn pop(&mut self, n: usize) {
		self.read_head = (self.read_head + n) % self.buf.len();
	}
}

impl Default for Logger {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Write for Logger {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		self.push(s.as_bytes());
		#[cfg(any(test, feature = "hosted-test"))]
		{
			use std::io::Write as _;
			let _ = std::io::stderr().write_all(s.as_bytes());
		}
		Ok(())
	}
}

#[cfg(not(any(test, feature = "hosted-test")))]
use crate::sync::IntMutex;
#[cfg(any(test, feature = "hosted-test"))]
use std::sync::Mutex as IntMutex;

/// The loader's global logger instance.
pub static LOGGER: IntMutex<Logger> = IntMutex::new(Logger::new());
