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

//! The stack builder, `ctx_init` (§4.4): lays out the information block and
//! the System V startup vectors (`argc`, `argv[]`, `envp[]`, `auxv[]`)
//! below a correctly aligned stack pointer.

use crate::{
	data::{ExecContext, LoadedProgram},
	error::{Kind, LResult, LoaderError},
	memory::VirtAddr,
};
use alloc::vec::Vec;
use core::mem::size_of;

/// Required stack pointer alignment on both supported architectures.
const SP_ALIGN: usize = 16;

/// Auxiliary vector key/value pair.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct AuxEntry {
	pub a_type: u64,
	pub a_val: u64,
}

impl AuxEntry {
	const fn new(a_type: u64, a_val: u64) -> Self {
		Self {
			a_type,
			a_val,
		}
	}
}

pub const AT_NULL: u64 = 0;
pub const AT_IGNORE: u64 = 1;
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_PAGESZ: u64 = 6;
pub const AT_BASE: u64 = 7;
pub const AT_FLAGS: u64 = 8;
pub const AT_ENTRY: u64 = 9;
pub const AT_NOTELF: u64 = 10;
pub const AT_UID: u64 = 11;
pub const AT_EUID: u64 = 12;
pub const AT_GID: u64 = 13;
pub const AT_EGID: u64 = 14;
pub const AT_PLATFORM: u64 = 15;
pub const AT_HWCAP: u64 = 16;
pub const AT_CLKTCK: u64 = 17;
pub const AT_ICACHEBSIZE: u64 = 19;
pub const AT_DCACHEBSIZE: u64 = 20;
pub const AT_UCACHEBSIZE: u64 = 21;
pub const AT_SECURE: u64 = 23;
pub const AT_RANDOM: u64 = 25;
pub const AT_EXECFN: u64 = 31;
pub const AT_SYSINFO_EHDR: u64 = 33;

/// The platform literal written into `AT_PLATFORM`.
#[cfg(target_arch = "x86_64")]
const PLATFORM: &str = "x86_64";
#[cfg(target_arch = "aarch64")]
const PLATFORM: &str = "aarch64";

const PAGE_SIZE: u64 = crate::memory::PAGE_SIZE as u64;
const CLOCKS_PER_SEC: u64 = 100;

/// A cursor decrementing through a caller-owned stack region, tracking the
/// lowest address it may still write to.
struct Cursor {
	sp: usize,
	floor: usize,
}

impl Cursor {
	/// Decrements the cursor by `len` bytes and copies `data` to the new
	/// position, returning that position.
	fn push_bytes(&mut self, data: &[u8]) -> LResult<usize> {
		let new_sp = self
			.sp
			.checked_sub(data.len())
			.filter(|&sp| sp >= self.floor)
			.ok_or(LoaderError::new(Kind::ResourceExhausted))?;
		// Safety: `new_sp >= self.floor` and `self.sp` was itself a valid
		// address within the caller's stack allocation, so `[new_sp,
		// self.sp)` lies within that allocation.
		unsafe {
			core::ptr::copy_nonoverlapping(data.as_ptr(), new_sp as *mut u8, data.len());
		}
		self.sp = new_sp;
		Ok(new_sp)
	}

	fn push_word(&mut self, word: usize) -> LResult<()> {
		self.push_bytes(&word.to_ne_bytes())?;
		Ok(())
	}

	fn push_aux(&mut self, entry: AuxEntry) -> LResult<()> {
		self.push_word(entry.a_val as usize)?;
		self.push_word(entry.a_type as usize)?;
		Ok(())
	}

	fn align_down(&mut self, align: usize) {
		self.sp &= !(align - 1);
	}
}

/// Builds the initial stack frame for `prog` (or, when present, its loaded
/// interpreter) at the top of the stack held by `ctx`, and updates `ctx`
/// in place to the resulting `(sp, ip)`.
///
/// - `stack_top`/`stack_floor` bound the caller-allocated stack region.
/// - `argv0` overrides `argv[0]` (`CUSTOMAPPNAME`'s consumed value) without
///   being counted again in `argv`.
/// - `rand` is a caller-owned 16-byte random blob; its address (not a copy)
///   becomes `AT_RANDOM`, so it must outlive the loaded program.
/// - `vdso_base`, when `Some`, becomes `AT_SYSINFO_EHDR`; when `None` that
///   entry is simply omitted, per §4.4.
#[allow(clippy::too_many_arguments)]
pub fn ctx_init(
	ctx: &mut ExecContext,
	stack_top: VirtAddr,
	stack_floor: VirtAddr,
	prog: &LoadedProgram,
	argv0: Option<&str>,
	argv: &[&str],
	envp: &[&str],
	rand: &[u8; 16],
	vdso_base: Option<VirtAddr>,
) -> LResult<()> {
	let mut cur = Cursor {
		sp: *stack_top,
		floor: *stack_floor,
	};

	// Step 1: information block. Platform literal, then environ
	// last-to-first, then argv last-to-first, then argv0 if present.
	let platform_addr = push_cstr(&mut cur, PLATFORM.as_bytes())?;
	let mut envp_addrs = Vec::with_capacity(envp.len());
	for s in envp.iter().rev() {
		envp_addrs.push(push_cstr(&mut cur, s.as_bytes())?);
	}
	envp_addrs.reverse();
	let mut argv_addrs = Vec::with_capacity(argv.len() + 1);
	for s in argv.iter().rev() {
		argv_addrs.push(push_cstr(&mut cur, s.as_bytes())?);
	}
	argv_addrs.reverse();
	if let Some(argv0) = argv0 {
		let addr = push_cstr(&mut cur, argv0.as_bytes())?;
		argv_addrs.insert(0, addr);
	}

	// Step 2.
	cur.push_bytes(&[0u8])?;
	cur.align_down(SP_ALIGN);

	// Build the fixed auxv entries (everything but the AT_NULL terminator
	// and the information-block-pointer AT_PLATFORM entry) up front so the
	// pre-alignment reservation below can size itself exactly.
	let execfn_addr = *prog.execfn_addr() as u64;
	let mut fixed = Vec::with_capacity(21);
	fixed.push(AuxEntry::new(AT_EXECFN, execfn_addr));
	fixed.push(AuxEntry::new(AT_ENTRY, *prog.entry as u64));
	fixed.push(AuxEntry::new(AT_BASE, *prog.interp_base() as u64));
	fixed.push(AuxEntry::new(AT_PHDR, *prog.phdr_addr() as u64));
	fixed.push(AuxEntry::new(AT_PHENT, prog.phdr.entsize as u64));
	fixed.push(AuxEntry::new(AT_PHNUM, prog.phdr.num as u64));
	fixed.push(AuxEntry::new(AT_RANDOM, rand.as_ptr() as u64));
	fixed.push(AuxEntry::new(AT_PAGESZ, PAGE_SIZE));
	fixed.push(AuxEntry::new(AT_CLKTCK, CLOCKS_PER_SEC));
	fixed.push(AuxEntry::new(AT_UID, 0));
	fixed.push(AuxEntry::new(AT_EUID, 0));
	fixed.push(AuxEntry::new(AT_GID, 0));
	fixed.push(AuxEntry::new(AT_EGID, 0));
	fixed.push(AuxEntry::new(AT_SECURE, 0));
	fixed.push(AuxEntry::new(AT_FLAGS, 0));
	fixed.push(AuxEntry::new(AT_HWCAP, 0));
	fixed.push(AuxEntry::new(AT_NOTELF, 0));
	fixed.push(AuxEntry::new(AT_ICACHEBSIZE, 0));
	fixed.push(AuxEntry::new(AT_DCACHEBSIZE, 0));
	fixed.push(AuxEntry::new(AT_UCACHEBSIZE, 0));
	if let Some(vdso) = vdso_base {
		fixed.push(AuxEntry::new(AT_SYSINFO_EHDR, *vdso as u64));
	}
	fixed.push(AuxEntry::new(AT_IGNORE, 0));

	// Step 3: pre-alignment reservation.
	let argc_total = argv_addrs.len();
	let envc = envp_addrs.len();
	let aux_count = fixed.len() + 1 /* AT_PLATFORM */ + 1 /* AT_NULL */;
	let vec_bytes = aux_count * size_of::<AuxEntry>()
		+ (envc + 1) * size_of::<usize>()
		+ (argc_total + 1) * size_of::<usize>()
		+ size_of::<usize>();
	let reserved_floor = cur
		.sp
		.checked_sub(vec_bytes)
		.ok_or(LoaderError::new(Kind::ResourceExhausted))?;
	cur.sp = (reserved_floor & !(SP_ALIGN - 1)) + vec_bytes;

	// Step 4: auxv, terminator first (ends up at the highest address, so
	// it is the last entry a forward scan encounters).
	cur.push_aux(AuxEntry::new(AT_NULL, 0))?;
	for aux in fixed.into_iter().rev() {
		cur.push_aux(aux)?;
	}
	cur.push_aux(AuxEntry::new(AT_PLATFORM, platform_addr as u64))?;

	// Step 5: envp.
	cur.push_word(0)?;
	for &addr in envp_addrs.iter().rev() {
		cur.push_word(addr)?;
	}

	// Step 6: argv.
	cur.push_word(0)?;
	for &addr in argv_addrs.iter().rev() {
		cur.push_word(addr)?;
	}

	// Step 7: argc.
	cur.push_word(argc_total)?;

	// Step 8: assert alignment.
	debug_assert_eq!(cur.sp % SP_ALIGN, 0, "stack pointer misaligned after ctx_init");

	// Step 9.
	ctx.sp = VirtAddr(cur.sp);
	ctx.ip = prog.initial_entry();
	Ok(())
}

/// Pushes `bytes` followed by a trailing NUL onto the information block,
/// returning the resulting address.
fn push_cstr(cur: &mut Cursor, bytes: &[u8]) -> LResult<usize> {
	let mut buf = Vec::with_capacity(bytes.len() + 1);
	buf.extend_from_slice(bytes);
	buf.push(0);
	cur.push_bytes(&buf)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		loader::{self, Deps},
		test_support::{build_static_pie, MockAllocator, MockPaging},
	};

	/// Builds a loaded program plus a caller-owned stack big enough to hold
	/// a handful of argv/envp entries, and returns `(program, stack, top,
	/// floor)`.
	///
	/// The mock allocator/paging backends only need to outlive the `load`
	/// call itself: `LoadedProgram` does not borrow from either, it only
	/// owns the region they handed back.
	fn setup() -> (LoadedProgram, Vec<u8>, VirtAddr, VirtAddr) {
		let bytes = build_static_pie();
		let image = crate::image::SliceImage::new(&bytes);
		let alloc = MockAllocator::default();
		let paging = MockPaging::default();
		let deps = Deps {
			alloc: &alloc,
			paging: &paging,
			mmap: None,
			vfs: None,
		};
		let prog = loader::load(&image, "hello", None, false, &deps).unwrap();
		let mut stack = alloc::vec![0u8; 4096];
		let floor = VirtAddr::from(stack.as_mut_ptr());
		let top = floor + stack.len();
		(prog, stack, top, floor)
	}

	#[test]
	fn stack_pointer_is_sixteen_byte_aligned_and_holds_argc() {
		let (prog, _stack, top, floor) = setup();
		let mut ctx = ExecContext::default();
		let rand = [7u8; 16];
		ctx_init(&mut ctx, top, floor, &prog, None, &["a", "b"], &[], &rand, None).unwrap();
		assert_eq!(*ctx.sp % SP_ALIGN, 0);
		// Safety: `ctx.sp` lies within the stack buffer `setup` allocated.
		let argc = unsafe { *ctx.sp.as_ptr::<usize>() };
		assert_eq!(argc, 2);
	}

	#[test]
	fn argv0_override_shifts_argc_and_leading_entry() {
		let (prog, _stack, top, floor) = setup();
		let mut ctx = ExecContext::default();
		let rand = [0u8; 16];
		ctx_init(
			&mut ctx,
			top,
			floor,
			&prog,
			Some("custom"),
			&["a", "b"],
			&[],
			&rand,
			None,
		)
		.unwrap();
		// Safety: within `setup`'s stack buffer.
		unsafe {
			let argc = *ctx.sp.as_ptr::<usize>();
			assert_eq!(argc, 3);
			let argv_base = ctx.sp + size_of::<usize>();
			let argv: *const usize = argv_base.as_ptr();
			let a0 = *argv.add(0) as *const u8;
			let a3 = *argv.add(3);
			assert_eq!(a3, 0, "argv must be NULL-terminated");
			let s0 = core::ffi::CStr::from_ptr(a0.cast());
			assert_eq!(s0.to_str().unwrap(), "custom");
		}
	}

	#[test]
	fn at_execfn_is_nul_terminated() {
		let (prog, _stack, top, floor) = setup();
		let mut ctx = ExecContext::default();
		let rand = [0u8; 16];
		ctx_init(&mut ctx, top, floor, &prog, None, &["a"], &[], &rand, None).unwrap();
		unsafe {
			let argc = *ctx.sp.as_ptr::<usize>();
			let mut p: *const usize = (*ctx.sp + size_of::<usize>()) as *const usize;
			p = p.add(argc).add(1); // skip argv[], its NULL terminator
			p = p.add(1); // skip envp's NULL terminator (no envp entries)
			let mut aux = p as *const AuxEntry;
			let mut execfn_ptr = None;
			for _ in 0..64 {
				let entry = *aux;
				if entry.a_type == AT_EXECFN {
					execfn_ptr = Some(entry.a_val as *const u8);
				}
				if entry.a_type == AT_NULL {
					break;
				}
				aux = aux.add(1);
			}
			let execfn_ptr = execfn_ptr.expect("AT_EXECFN must be present");
			let s = core::ffi::CStr::from_ptr(execfn_ptr.cast());
			assert_eq!(s.to_str().unwrap(), prog.execfn());
		}
	}

	#[test]
	fn envp_and_auxv_are_null_and_at_null_terminated() {
		let (prog, _stack, top, floor) = setup();
		let mut ctx = ExecContext::default();
		let rand = [0u8; 16];
		ctx_init(&mut ctx, top, floor, &prog, None, &["a"], &["X=1"], &rand, None).unwrap();
		unsafe {
			let argc = *ctx.sp.as_ptr::<usize>();
			let mut p: *const usize = (*ctx.sp + size_of::<usize>()) as *const usize;
			// Skip argv[0..argc], landing on the NULL argv terminator.
			p = p.add(argc);
			assert_eq!(*p, 0);
			p = p.add(1);
			// envp has exactly one entry before its own NULL terminator.
			assert_ne!(*p, 0);
			p = p.add(1);
			assert_eq!(*p, 0);
			p = p.add(1);
			// Walk the auxv entries until AT_NULL.
			let mut aux = p as *const AuxEntry;
			let mut saw_null = false;
			for _ in 0..64 {
				let entry = *aux;
				if entry.a_type == AT_NULL {
					saw_null = true;
					break;
				}
				aux = aux.add(1);
			}
			assert!(saw_null, "auxv must be AT_NULL-terminated");
		}
	}
}
