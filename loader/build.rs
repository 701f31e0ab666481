//! Build-time configuration for the ELF loader.
//!
//! Reads `build-config.toml` (falling back to `default.build-config.toml`),
//! deserialises it with `serde`, and emits `cargo:rustc-cfg=` flags plus a
//! small generated Rust file of `const` items consumed through the
//! `build_cfg!` macro (see `src/config.rs`). This mirrors how the teacher
//! project turns its `build-config.toml` into `config_debug_*` cfg flags.

use serde::Deserialize;
use std::{env, fs, io, path::Path};

#[derive(Deserialize)]
struct ImageSource {
	kind: String,
	#[serde(default)]
	env_path: bool,
	#[serde(default = "default_true")]
	exec_bit: bool,
	#[serde(default)]
	env_pwd: bool,
}

#[derive(Deserialize)]
struct Invocation {
	#[serde(default = "default_true")]
	custom_app_name: bool,
}

#[derive(Deserialize)]
struct Memory {
	stack_nbpages: u32,
	brk_nbpages: u32,
}

#[derive(Deserialize)]
struct Config {
	image_source: ImageSource,
	invocation: Invocation,
	memory: Memory,
}

fn default_true() -> bool {
	true
}

impl Config {
	fn read() -> io::Result<Self> {
		const FILE: &str = "build-config.toml";
		const FILE_DEFAULT: &str = "default.build-config.toml";

		println!("cargo:rerun-if-changed={FILE}");
		println!("cargo:rerun-if-changed={FILE_DEFAULT}");

		let config_str = match fs::read_to_string(FILE) {
			Ok(s) => s,
			Err(e) if e.kind() == io::ErrorKind::NotFound => fs::read_to_string(FILE_DEFAULT)?,
			Err(e) => return Err(e),
		};
		toml::from_str(&config_str).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
	}

	fn set_cfg(&self) {
		match self.image_source.kind.as_str() {
			"vfs" => {
				println!("cargo:rustc-cfg=config_vfs_exec");
				if self.image_source.env_path {
					println!("cargo:rustc-cfg=config_vfsexec_envpath");
				}
				if self.image_source.exec_bit {
					println!("cargo:rustc-cfg=config_vfsexec_execbit");
				}
				if self.image_source.env_pwd {
					println!("cargo:rustc-cfg=config_vfsexec_envpwd");
				}
			}
			_ => println!("cargo:rustc-cfg=config_initrd_exec"),
		}
		if self.invocation.custom_app_name {
			println!("cargo:rustc-cfg=config_customappname");
		}
	}

	fn write_constants(&self, out_dir: &str) -> io::Result<()> {
		fs::write(
			Path::new(out_dir).join("stack_nbpages.rs"),
			format!("{}", self.memory.stack_nbpages),
		)?;
		fs::write(
			Path::new(out_dir).join("brk_nbpages.rs"),
			format!("{}", self.memory.brk_nbpages),
		)?;
		Ok(())
	}
}

fn main() {
	let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set by cargo");
	let config = Config::read().expect("failed to read build-config.toml");
	config.set_cfg();
	config
		.write_constants(&out_dir)
		.expect("failed to write generated config constants");
}
