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

//! Build-time configuration utilities.
//!
//! The boolean toggles of spec §6 (`VFSEXEC_ENVPATH`, `VFSEXEC_EXECBIT`,
//! `VFSEXEC_ENVPWD`, `CUSTOMAPPNAME`, and the `INITRD_EXEC`/`VFS_EXEC` image
//! source choice) are compiled-in `cfg` flags produced by `build.rs` from
//! `build-config.toml`; see that file for the source of truth. The two
//! numeric toggles (`STACK_NBPAGES`, `BRK_NBPAGES`) are generated constants
//! pulled in through [`build_cfg!`].

/// Includes a build-generated config constant from `OUT_DIR`.
#[macro_export]
macro_rules! build_cfg {
	($config_name:ident) => {{
		include!(concat!(
			env!("OUT_DIR"),
			"/",
			stringify!($config_name),
			".rs"
		))
	}};
}

/// Page count reserved for the application thread's stack (`STACK_NBPAGES`).
pub const STACK_NBPAGES: usize = build_cfg!(stack_nbpages);
/// Page count reserved for the application thread's initial `brk` region
/// (`BRK_NBPAGES`).
pub const BRK_NBPAGES: usize = build_cfg!(brk_nbpages);

/// Whether the image is sourced from an initrd region rather than the VFS
/// (spec §6, `INITRD_EXEC` vs `VFS_EXEC`).
pub const fn initrd_exec() -> bool {
	cfg!(config_initrd_exec)
}

/// Whether a bare name with no slash should be resolved against `$PATH`
/// (`VFSEXEC_ENVPATH`). Only meaningful when the image source is the VFS.
pub const fn vfsexec_envpath() -> bool {
	cfg!(config_vfsexec_envpath)
}

/// Whether a file lacking `S_IXUSR` should be refused (`VFSEXEC_EXECBIT`).
pub const fn vfsexec_execbit() -> bool {
	cfg!(config_vfsexec_execbit)
}

/// Whether to `chdir` to `$PWD` before launch (`VFSEXEC_ENVPWD`).
pub const fn vfsexec_envpwd() -> bool {
	cfg!(config_vfsexec_envpwd)
}

/// Whether `argv[1]` is consumed as the program name/path (`CUSTOMAPPNAME`).
pub const fn custom_app_name() -> bool {
	cfg!(config_customappname)
}
