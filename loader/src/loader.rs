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

//! The top-level driver (C9): composes the validator, materialiser,
//! protection applier and interpreter loader into one recursive `load`, then
//! `launch`es the result onto a scheduler, and `unload`s it symmetrically.
//!
//! Modelled on `main.c`'s `do_elf_load_vfs`/`elf_load_vfs` pair: a single
//! recursive entry point threading a `nointerp` flag so an interpreter can
//! never itself request one.

use crate::{
	data::{ExecContext, Interp, LoadedProgram},
	elf,
	error::{LResult, LoaderError},
	image::{self, FileImage, ImageSource, Vfs},
	lerr,
	load::{interp, materialize, protect},
	memory::{Allocator, Mmap, Paging, VirtAddr},
	sched::Scheduler,
	stack,
};
use alloc::{boxed::Box, string::String};

/// The narrow set of backends one `load`/`unload` call needs, bundled so
/// recursive interpreter loads don't have to thread four parameters by hand.
pub struct Deps<'a> {
	pub alloc: &'a dyn Allocator,
	pub paging: &'a dyn Paging,
	/// Present only when the embedding kernel offers `mmap`; absent, every
	/// load falls back to materialisation strategy A.
	pub mmap: Option<&'a dyn Mmap>,
	/// Present only when the image source can be a VFS path; absent, any
	/// image that requires an interpreter is rejected (no path to resolve
	/// it against).
	pub vfs: Option<&'a dyn Vfs>,
}

/// Loads `image` as `name` (and, if it came from a VFS, `path`), validating,
/// materialising, protecting, and — unless `nointerp` — chain-loading its
/// interpreter.
///
/// `nointerp` is `false` for the initial call and forced to `true` for every
/// recursive interpreter load, per §9's "interpreter cycle" design note: an
/// interpreter requesting its own `PT_INTERP` is rejected rather than
/// followed.
pub fn load(
	image: &dyn ImageSource,
	name: &str,
	path: Option<&str>,
	nointerp: bool,
	deps: &Deps,
) -> LResult<LoadedProgram> {
	if name.is_empty() {
		return Err(lerr!(BadInvocation));
	}

	let buf = image::read_all(image)?;
	let parsed = elf::parser::parse(&buf)?;
	let materialized = materialize::materialize(&parsed, image, deps.alloc, deps.mmap)?;
	protect::apply(&parsed, materialized.va_base, deps.paging);

	let interp = match build_interp(&parsed, image, nointerp, deps) {
		Ok(interp) => interp,
		Err(err) => {
			// Mirrors `unload`'s teardown order: `protect::apply` above may
			// have left segments read-only/exec, so restore R+W before
			// giving the region back (§4.2, §5's reverse-order undo).
			protect::restore_rw(materialized.va_base, parsed.va_len, deps.paging);
			materialize::release(&materialized, deps.alloc, deps.mmap);
			return Err(err);
		}
	};

	Ok(LoadedProgram {
		name: String::from(name),
		path: path.map(String::from),
		execfn_nul: LoadedProgram::make_execfn_nul(name, path),
		va_base: materialized.va_base,
		va_len: parsed.va_len,
		align: parsed.align,
		lowerl: parsed.lowerl,
		upperl: parsed.upperl,
		start: materialized.start,
		entry: materialized.va_base + parsed.e_entry as usize,
		phdr: parsed.phdr,
		interp,
		strategy: materialized.strategy,
		region_len: materialized.region_len,
		region_align: materialized.region_align,
	})
}

/// Resolves and recursively loads the interpreter named by `parsed`'s
/// `PT_INTERP`, if any.
fn build_interp(
	parsed: &elf::parser::ParsedElf,
	image: &dyn ImageSource,
	nointerp: bool,
	deps: &Deps,
) -> LResult<Interp> {
	if !parsed.interp_required {
		return Ok(Interp::default());
	}
	if nointerp {
		return Err(lerr!(UnsupportedFeature));
	}
	let path = interp::read_interp_path(parsed, image)?;
	// An in-memory image (no VFS) requiring an interpreter cannot be
	// resolved: §7, Unsupported-feature.
	let vfs = deps.vfs.ok_or_else(|| lerr!(UnsupportedFeature))?;
	let fd = vfs.open(&path)?;
	let interp_image = FileImage::new(fd.as_ref());
	let prog = load(&interp_image, &path, Some(&path), true, deps)?;
	Ok(Interp {
		required: true,
		path: Some(path),
		prog: Some(Box::new(prog)),
	})
}

/// Creates a thread container sized `stack_pages`, builds its initial stack
/// with [`stack::ctx_init`], and publishes it to `sched`'s run queue.
///
/// Per §5's ordering guarantee, this must only be called once `prog` (and
/// its interpreter, if any) has already been materialised and protected —
/// which `load` guarantees for anything it returns.
#[allow(clippy::too_many_arguments)]
pub fn launch<S: Scheduler>(
	prog: &LoadedProgram,
	sched: &S,
	stack_pages: usize,
	argv0: Option<&str>,
	argv: &[&str],
	envp: &[&str],
	rand: &[u8; 16],
	vdso_base: Option<VirtAddr>,
) -> LResult<S::Handle> {
	let mut thread = sched.create_thread_container(prog.execfn(), stack_pages)?;
	let (top, floor) = sched.stack_bounds(&thread);
	let mut ctx = ExecContext::default();
	if let Err(err) = stack::ctx_init(&mut ctx, top, floor, prog, argv0, argv, envp, rand, vdso_base) {
		sched.release(thread);
		return Err(err);
	}
	sched.attach_context(&mut thread, ctx);
	sched.set_runnable(&mut thread);
	Ok(sched.add_to_run_queue(thread))
}

/// Releases `prog`: recursively unloads its interpreter, restores R+W over
/// the whole region, and gives the region back to whichever backend
/// materialised it.
pub fn unload(prog: LoadedProgram, deps: &Deps) {
	if let Some(interp_prog) = prog.interp.prog {
		unload(*interp_prog, deps);
	}
	protect::restore_rw(prog.va_base, prog.va_len, deps.paging);
	let materialized = materialize::Materialized {
		va_base: prog.va_base,
		start: prog.start,
		strategy: prog.strategy,
		region_len: prog.region_len,
		region_align: prog.region_align,
	};
	materialize::release(&materialized, deps.alloc, deps.mmap);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{build_dynamic_pie, build_static_pie, MockAllocator, MockPaging, MockVfs};

	fn deps<'a>(alloc: &'a MockAllocator, paging: &'a MockPaging) -> Deps<'a> {
		Deps {
			alloc,
			paging,
			mmap: None,
			vfs: None,
		}
	}

	#[test]
	fn loads_static_pie_without_interpreter() {
		let bytes = build_static_pie();
		let image = crate::image::SliceImage::new(&bytes);
		let alloc = MockAllocator::default();
		let paging = MockPaging::default();
		let d = deps(&alloc, &paging);
		let prog = load(&image, "hello", None, false, &d).unwrap();
		assert!(!prog.interp.required);
		assert_eq!(prog.initial_entry(), prog.entry);
		assert!(*prog.entry >= *prog.va_base && *prog.entry < *prog.va_base + prog.va_len);
		unload(prog, &d);
	}

	#[test]
	fn rejects_empty_name() {
		let bytes = build_static_pie();
		let image = crate::image::SliceImage::new(&bytes);
		let alloc = MockAllocator::default();
		let paging = MockPaging::default();
		let d = deps(&alloc, &paging);
		let err = load(&image, "", None, false, &d).unwrap_err();
		assert_eq!(err.kind, crate::error::Kind::BadInvocation);
	}

	#[test]
	fn missing_interp_without_vfs_is_unsupported_and_leaks_nothing() {
		let bytes = build_dynamic_pie();
		let image = crate::image::SliceImage::new(&bytes);
		let alloc = MockAllocator::default();
		let paging = MockPaging::default();
		let d = deps(&alloc, &paging);
		let err = load(&image, "hello", None, false, &d).unwrap_err();
		assert_eq!(err.kind, crate::error::Kind::UnsupportedFeature);
		assert_eq!(alloc.outstanding(), 0);
		// `protect::apply` set the PT_LOAD segment's final protection, then
		// the interpreter-load failure must restore R+W before the region
		// is released back to `alloc` (§4.2, §5's reverse-order undo).
		assert_eq!(paging.call_count(), 2);
		assert_eq!(
			paging.last_flags(),
			crate::memory::prot::READ | crate::memory::prot::WRITE
		);
	}

	#[test]
	fn nointerp_recursion_is_rejected() {
		let bytes = build_dynamic_pie();
		let image = crate::image::SliceImage::new(&bytes);
		let alloc = MockAllocator::default();
		let paging = MockPaging::default();
		let d = deps(&alloc, &paging);
		let err = build_interp(
			&elf::parser::parse(&bytes).unwrap(),
			&image,
			true,
			&d,
		)
		.unwrap_err();
		assert_eq!(err.kind, crate::error::Kind::UnsupportedFeature);
	}

	#[test]
	fn chain_loads_interpreter_via_vfs() {
		let prog_bytes = build_dynamic_pie();
		let interp_bytes = build_static_pie();
		let image = crate::image::SliceImage::new(&prog_bytes);
		let alloc = MockAllocator::default();
		let paging = MockPaging::default();
		let vfs = MockVfs::new(&interp_bytes);
		let d = Deps {
			alloc: &alloc,
			paging: &paging,
			mmap: None,
			vfs: Some(&vfs),
		};
		let prog = load(&image, "hello", None, false, &d).unwrap();
		assert!(prog.interp.required);
		assert!(prog.interp.prog.is_some());
		assert_eq!(prog.initial_entry(), prog.interp.prog.as_ref().unwrap().entry);
		unload(prog, &d);
		assert_eq!(alloc.outstanding(), 0);
	}
}
