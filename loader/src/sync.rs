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

//! A minimal spinlock.
//!
//! The loader runs once per task creation and does not itself run under
//! interrupts, so unlike a full kernel's spinlock this does not need to mask
//! interrupts while held — it only needs to protect [`crate::logger::LOGGER`]
//! from being observed half-written if the embedding kernel logs from more
//! than one hart/core.

use core::{
	cell::UnsafeCell,
	fmt::{self, Formatter},
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{AtomicBool, Ordering::Acquire, Ordering::Release},
};

/// Unlocks the associated [`IntMutex`] when dropped.
pub struct IntMutexGuard<'m, T: ?Sized> {
	mutex: &'m IntMutex<T>,
}

impl<T: ?Sized> Deref for IntMutexGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.mutex.data.get() }
	}
}

impl<T: ?Sized> DerefMut for IntMutexGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.mutex.data.get() }
	}
}

impl<T: ?Sized> Drop for IntMutexGuard<'_, T> {
	fn drop(&mut self) {
		self.mutex.locked.store(false, Release);
	}
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for IntMutexGuard<'_, T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

/// A spinlock-protected value.
pub struct IntMutex<T: ?Sized> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

impl<T> IntMutex<T> {
	/// Creates a new, unlocked instance wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}
}

impl<T: ?Sized> IntMutex<T> {
	/// Acquires the lock, spinning until it becomes available.
	pub fn lock(&self) -> IntMutexGuard<T> {
		while self.locked.swap(true, Acquire) {
			hint::spin_loop();
		}
		IntMutexGuard {
			mutex: self,
		}
	}
}

unsafe impl<T: ?Sized + Send> Sync for IntMutex<T> {}
unsafe impl<T: ?Sized + Send> Send for IntMutex<T> {}
