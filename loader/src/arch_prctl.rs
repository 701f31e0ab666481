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

//! The `arch_prctl` handler (spec §4.5, C8): lets the loaded program's libc
//! install TLS by reading/writing the thread's FS/GS base through
//! [`crate::sysregs::SysRegs`].
//!
//! Grounded on `arch_prctl.c` (bare-metal MSR backend) and carried, at the
//! dispatch level, the way the teacher's own `syscall::arch_prctl::arch_prctl`
//! is written: one `match` over the `ARCH_*` codes, GET variants rejecting a
//! null output pointer.

use crate::{error::LResult, lerr, sysregs::SysRegs};

/// Set 64-bit base for the GS register.
pub const ARCH_SET_GS: i64 = 0x1001;
/// Set 64-bit base for the FS register.
pub const ARCH_SET_FS: i64 = 0x1002;
/// Get 64-bit base for the FS register.
pub const ARCH_GET_FS: i64 = 0x1003;
/// Get 64-bit base for the GS register.
pub const ARCH_GET_GS: i64 = 0x1004;
/// Whether the `cpuid` instruction is enabled for the thread.
pub const ARCH_GET_CPUID: i64 = 0x1011;
/// Enable/disable the `cpuid` instruction for the thread.
pub const ARCH_SET_CPUID: i64 = 0x1012;
/// Map an x32-mode vDSO.
pub const ARCH_MAP_VDSO_X32: i64 = 0x2001;
/// Map a 32-bit vDSO.
pub const ARCH_MAP_VDSO_32: i64 = 0x2002;
/// Map a 64-bit vDSO.
pub const ARCH_MAP_VDSO_64: i64 = 0x2003;

/// Dispatches one `arch_prctl(code, addr)` call against `sysregs`.
///
/// `addr` is a raw address within the unikernel's single address space: for
/// `ARCH_GET_{FS,GS}` it is written through directly rather than copied
/// to/from a separate user address space, since there is only one.
pub fn arch_prctl(sysregs: &mut dyn SysRegs, code: i64, addr: u64) -> LResult<()> {
	match code {
		ARCH_SET_FS => {
			sysregs.set_fs(addr);
			Ok(())
		}
		ARCH_SET_GS => {
			sysregs.set_gs(addr);
			Ok(())
		}
		ARCH_GET_FS => write_out(addr, sysregs.get_fs()),
		ARCH_GET_GS => write_out(addr, sysregs.get_gs()),
		ARCH_GET_CPUID | ARCH_SET_CPUID => Err(lerr!(BadInvocation)),
		ARCH_MAP_VDSO_X32 | ARCH_MAP_VDSO_32 | ARCH_MAP_VDSO_64 => Err(lerr!(BadInvocation)),
		_ => Err(lerr!(BadInvocation)),
	}
}

fn write_out(addr: u64, val: u64) -> LResult<()> {
	if addr == 0 {
		return Err(lerr!(BadInvocation));
	}
	// Safety: `addr` is a caller-supplied address within the single address
	// space; the syscall contract requires it to designate a live `u64`.
	unsafe {
		*(addr as *mut u64) = val;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sysregs::SavedSysRegs;

	#[test]
	fn set_then_get_fs_round_trips() {
		let mut regs = SavedSysRegs::default();
		let mut out: u64 = 0;
		arch_prctl(&mut regs, ARCH_SET_FS, 0xCAFE_0000).unwrap();
		arch_prctl(&mut regs, ARCH_GET_FS, &mut out as *mut u64 as u64).unwrap();
		assert_eq!(out, 0xCAFE_0000);
	}

	#[test]
	fn set_then_get_gs_round_trips() {
		let mut regs = SavedSysRegs::default();
		let mut out: u64 = 0;
		arch_prctl(&mut regs, ARCH_SET_GS, 0x1234).unwrap();
		arch_prctl(&mut regs, ARCH_GET_GS, &mut out as *mut u64 as u64).unwrap();
		assert_eq!(out, 0x1234);
	}

	#[test]
	fn get_fs_with_null_addr_is_bad_invocation() {
		let regs = SavedSysRegs::default();
		let err = arch_prctl(&mut { regs }, ARCH_GET_FS, 0).unwrap_err();
		assert_eq!(err.kind, crate::error::Kind::BadInvocation);
	}

	#[test]
	fn unimplemented_codes_are_rejected() {
		let mut regs = SavedSysRegs::default();
		for code in [
			ARCH_GET_CPUID,
			ARCH_SET_CPUID,
			ARCH_MAP_VDSO_X32,
			ARCH_MAP_VDSO_32,
			ARCH_MAP_VDSO_64,
			0x9999,
		] {
			assert_eq!(
				arch_prctl(&mut regs, code, 0xdead).unwrap_err().kind,
				crate::error::Kind::BadInvocation
			);
		}
	}
}
