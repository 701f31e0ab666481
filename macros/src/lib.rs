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

//! Procedural macros for the loader crate.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Derives `AnyRepr`, a marker trait asserting a `#[repr(C)]` type has no
/// invalid bit pattern and may be cast from an arbitrary, correctly-sized
/// and -aligned byte slice.
///
/// Only plain structs whose fields are themselves `AnyRepr` (integers,
/// arrays of them, ...) may derive this; the derive does not itself check
/// field types, mirroring the unsafety already inherent to `#[repr(C)]`
/// layout casts — it is on the author to keep such structs free of enums,
/// references, or other types with invalid bit patterns.
#[proc_macro_derive(AnyRepr)]
pub fn derive_any_repr(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	let name = input.ident;
	let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
	if let Data::Struct(s) = &input.data {
		if !matches!(s.fields, Fields::Named(_)) {
			return syn::Error::new_spanned(name, "AnyRepr requires a struct with named fields")
				.to_compile_error()
				.into();
		}
	} else {
		return syn::Error::new_spanned(name, "AnyRepr can only be derived for structs")
			.to_compile_error()
			.into();
	}
	let expanded = quote! {
		unsafe impl #impl_generics crate::bytes::AnyRepr for #name #ty_generics #where_clause {}
	};
	expanded.into()
}
