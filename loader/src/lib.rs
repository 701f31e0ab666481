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

//! An ELF application loader for a single-address-space unikernel.
//!
//! This crate parses a PIE ELF64 image, materialises it into virtual
//! memory, optionally chain-loads its interpreter, builds a System V
//! initial stack (`argv`/`envp`/`auxv`), and hands back an [`ExecContext`]
//! ready for the embedding kernel's scheduler to run. It does not resolve
//! symbols, relocate, apply TLS templates, fork, or tear down an address
//! space — see `loader::load` for the top-level entry point and
//! `data::LoadedProgram` for the record it produces.
//!
//! The crate is `no_std` plus `alloc`: it is linked directly into the
//! unikernel image and has no libc or OS of its own to lean on. Everything
//! it needs from the embedding kernel — an allocator, page table control,
//! a VFS, a scheduler — is consumed through the narrow traits in
//! [`memory`], [`image`] and [`sched`]; this crate never assumes a concrete
//! backend.
//!
//! `cargo test` (or any build with the `hosted-test` feature) links `std`
//! instead, so the parser, stack builder and `arch_prctl` handler can be
//! exercised against the in-memory mocks in [`test_support`] without
//! hardware or a real kernel underneath.

#![cfg_attr(not(any(test, feature = "hosted-test")), no_std)]

extern crate alloc;

pub mod arch_prctl;
pub mod brk;
pub mod bytes;
pub mod config;
pub mod data;
pub mod elf;
pub mod error;
pub mod image;
pub mod load;
pub mod loader;
pub mod logger;
pub mod memory;
pub mod print;
pub mod sched;
pub mod stack;
pub mod sync;
pub mod sysregs;
#[cfg(any(test, feature = "hosted-test"))]
pub mod test_support;
pub mod vdso;

pub use data::{ExecContext, LoadedProgram};
pub use error::{Kind, LResult, LoaderError};
