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

//! The scheduler boundary (§6, *Scheduler* consumed interface): narrow traits
//! the embedding kernel implements so [`crate::loader::launch`] can create a
//! thread container, attach a built [`crate::data::ExecContext`], and publish
//! it as runnable, without this crate knowing anything about the scheduler's
//! own data structures.
//!
//! Modelled after `main.c`'s `uk_thread_create_container` /
//! `uk_sched_thread_add` sequence, generalised to a trait so the loader
//! itself never names a concrete thread type.

use crate::{data::ExecContext, error::LResult, memory::VirtAddr};

/// Creates application thread containers and publishes them to the run
/// queue.
pub trait Scheduler {
	/// An embedding-kernel thread container, not yet runnable.
	type Thread;
	/// Whatever the embedding kernel hands back once a thread has been
	/// queued (e.g. a thread ID, or `()`).
	type Handle;

	/// Allocates a new thread container named `name` with a stack of
	/// `stack_pages` pages.
	fn create_thread_container(&self, name: &str, stack_pages: usize) -> LResult<Self::Thread>;

	/// Returns `(top, floor)` of `thread`'s stack, the bounds
	/// [`crate::stack::ctx_init`] is allowed to write within.
	fn stack_bounds(&self, thread: &Self::Thread) -> (VirtAddr, VirtAddr);

	/// Installs `ctx` as `thread`'s initial execution context.
	fn attach_context(&self, thread: &mut Self::Thread, ctx: ExecContext);

	/// Marks `thread` runnable. Per §5's ordering guarantee, the caller must
	/// not call this until materialisation and protection have both
	/// completed.
	fn set_runnable(&self, thread: &mut Self::Thread);

	/// Adds `thread` to the scheduler's run queue, consuming it.
	fn add_to_run_queue(&self, thread: Self::Thread) -> Self::Handle;

	/// Releases a thread container that was created but never queued (a
	/// failed load after `create_thread_container` succeeded).
	fn release(&self, thread: Self::Thread);
}

/// The `exit_group` adapter (§1, "thin adapter treated as an external
/// collaborator"): the embedding kernel implements this to tear down a
/// thread's container and halt or report a status, mirroring `exit.c`'s
/// `ukplat_halt`/`ukplat_crash` pair.
///
/// Out of scope for this crate's core (§1 non-goals); this trait only
/// specifies the boundary the top-level driver hands control across after a
/// load failure.
pub trait ExitNotify {
	/// Notifies the embedding kernel that the named thread has exited (or
	/// failed to launch) with `status`. A non-negative `status` is a clean
	/// exit; negative is a semantic error kind cast to its errno-like value.
	fn notify_exit(&self, status: i32);
}
