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

//! `brk` heap-growth state (spec §9, "Open question — `brk` heap grow").
//!
//! The original loader refuses to grow the heap past its initial
//! reservation and aborts; that behaviour is preserved literally here, just
//! surfaced as an error return instead of a crash. Unlike the original's
//! file-scope `static void *base`, this is a per-application-thread object
//! created on first `brk(None)` and threaded through the syscall context
//! (spec §9, "Global mutable process-wide state for `brk`").

use crate::{
	error::{Kind, LResult, LoaderError},
	memory::{Allocator, VirtAddr, PAGE_SIZE},
};

/// One application thread's `brk` heap: a fixed-size reservation that is
/// zeroed on demand as the break advances, and never grown past its initial
/// size.
pub struct BrkState {
	base: VirtAddr,
	cap: usize,
	/// How much of `[base, base + cap)` has been zeroed so far.
	zeroed_len: usize,
	/// Current break offset from `base` (`len` in the original).
	len: usize,
}

impl BrkState {
	/// Reserves `page_count` pages from `alloc` for a fresh heap, matching
	/// `brk.c`'s lazily-allocated-on-first-call `base`.
	fn reserve(alloc: &dyn Allocator, page_count: usize) -> LResult<Self> {
		let cap = page_count * PAGE_SIZE;
		let region = alloc
			.alloc(cap, PAGE_SIZE)
			.map_err(|_| LoaderError::new(Kind::ResourceExhausted))?;
		Ok(Self {
			base: VirtAddr::from(region.as_ptr()),
			cap,
			zeroed_len: 0,
			len: 0,
		})
	}

	/// Implements the `brk` syscall contract: `state` is `None` until the
	/// first call, which allocates the heap and returns its base; every
	/// subsequent call either advances or shrinks the break within the
	/// reservation.
	///
	/// `addr: None` means "tell me the current break" (first call: allocate
	/// and return `base`; later calls: equivalent to `brk(current)`).
	pub fn brk(
		state: &mut Option<Self>,
		alloc: &dyn Allocator,
		page_count: usize,
		addr: Option<VirtAddr>,
	) -> LResult<VirtAddr> {
		if addr.is_none() {
			if state.is_some() {
				// "Cannot handle multiple user space heaps": the original
				// aborts here; we refuse instead.
				return Err(LoaderError::new(Kind::ResourceExhausted));
			}
			*state = Some(Self::reserve(alloc, page_count)?);
			return Ok(state.as_ref().expect("just initialised above").base);
		}
		// "Failed to increase heap": requesting a specific break with no
		// heap reserved yet is equally unsupported.
		let this = state
			.as_mut()
			.ok_or(LoaderError::new(Kind::ResourceExhausted))?;
		let target = addr.expect("checked above");
		let offset = *target as isize - *this.base as isize;
		if offset < 0 || offset as usize > this.cap {
			return Err(LoaderError::new(Kind::ResourceExhausted));
		}
		let offset = offset as usize;
		if offset > this.zeroed_len {
			// Safety: `[base, base + cap)` is this state's own allocation,
			// and `offset <= cap` was just checked.
			let dst = unsafe {
				core::slice::from_raw_parts_mut(
					(this.base + this.zeroed_len).as_ptr::<u8>(),
					offset - this.zeroed_len,
				)
			};
			dst.fill(0);
			this.zeroed_len = offset;
		}
		this.len = offset;
		Ok(target)
	}

	/// Returns the current break address (`base + len`).
	pub fn current(&self) -> VirtAddr {
		self.base + self.len
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::MockAllocator;

	#[test]
	fn first_call_reserves_and_returns_base() {
		let alloc = MockAllocator::default();
		let mut state = None;
		let base = BrkState::brk(&mut state, &alloc, 1, None).unwrap();
		assert!(state.is_some());
		assert_eq!(base, state.as_ref().unwrap().base);
	}

	#[test]
	fn grow_within_reservation_zero_fills_new_pages() {
		let alloc = MockAllocator::default();
		let mut state = None;
		let base = BrkState::brk(&mut state, &alloc, 1, None).unwrap();
		let target = base + 128;
		let got = BrkState::brk(&mut state, &alloc, 1, Some(target)).unwrap();
		assert_eq!(got, target);
		assert_eq!(state.as_ref().unwrap().current(), target);
	}

	#[test]
	fn grow_past_reservation_is_refused() {
		let alloc = MockAllocator::default();
		let mut state = None;
		let base = BrkState::brk(&mut state, &alloc, 1, None).unwrap();
		let past_end = base + (PAGE_SIZE + 1);
		let err = BrkState::brk(&mut state, &alloc, 1, Some(past_end)).unwrap_err();
		assert_eq!(err.kind, Kind::ResourceExhausted);
	}

	#[test]
	fn double_reservation_is_refused() {
		let alloc = MockAllocator::default();
		let mut state = None;
		BrkState::brk(&mut state, &alloc, 1, None).unwrap();
		let err = BrkState::brk(&mut state, &alloc, 1, None).unwrap_err();
		assert_eq!(err.kind, Kind::ResourceExhausted);
	}
}
