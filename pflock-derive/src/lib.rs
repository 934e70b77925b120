//! Derive macros for the pflock flocking simulator.
//!
//! This crate provides one derive macro:
//!
//! - [`Wire`] - Generates a plain-old-data companion struct so a record can be
//!   shipped between ranks as an opaque byte block
//!
//! # Usage
//!
//! The macro is re-exported from the main `pflock` crate. You don't need
//! to add this crate directly:
//!
//! ```ignore
//! use pflock::{Vec2d, Wire};
//!
//! #[derive(Wire, Clone, Copy)]
//! struct Boid {
//!     position: Vec2d,
//!     velocity: Vec2d,
//!     id: u64,
//! }
//! ```
//!
//! # Wire Layout
//!
//! Message payloads are raw bytes, so the companion struct must be
//! `#[repr(C)]` with no implicit padding. The macro:
//!
//! - Lays fields out in declaration order
//! - Inserts explicit zeroed `_padN` fields wherever a field would be misaligned
//! - Pads the struct tail so its size is a multiple of 8 bytes, keeping the
//!   stride of a record array stable when `f64` fields are present

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, Type};

/// Derive macro for records exchanged between ranks.
///
/// Transforms a struct into a byte-transferable record. Generates:
///
/// - A companion `{Name}Wire` struct with `#[repr(C)]` and explicit padding
/// - `Pod`/`Zeroable` implementations for the companion struct
/// - An implementation of [`WireRecord`](pflock::WireRecord)
///
/// # Supported Types
///
/// | Rust Type | Wire Type | Size | Alignment |
/// |-----------|-----------|------|-----------|
/// | `DVec2` / `Vec2d` | `[f64; 2]` | 16 bytes | 8 bytes |
/// | `Vec2` | `[f32; 2]` | 8 bytes | 4 bytes |
/// | `f64` | `f64` | 8 bytes | 8 bytes |
/// | `u64` | `u64` | 8 bytes | 8 bytes |
/// | `i64` | `i64` | 8 bytes | 8 bytes |
/// | `f32` | `f32` | 4 bytes | 4 bytes |
/// | `u32` | `u32` | 4 bytes | 4 bytes |
/// | `i32` | `i32` | 4 bytes | 4 bytes |
///
/// # Generated Code
///
/// For a record `Marker { id: u32, position: DVec2 }` the macro generates:
///
/// ```ignore
/// #[repr(C)]
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// pub struct MarkerWire {
///     pub id: u32,
///     pub _pad0: u32,           // Alignment padding
///     pub position: [f64; 2],
/// }
///
/// impl WireRecord for Marker {
///     type Wire = MarkerWire;
///     const FIELD_NAMES: &'static [&'static str] = &["id", "position"];
///     // ...
/// }
/// ```
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to an enum instead of a struct
/// - Struct uses tuple fields instead of named fields
/// - Struct has no fields
/// - Any field has an unsupported type
#[proc_macro_derive(Wire)]
pub fn derive_wire(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let wire_name = Ident::new(&format!("{}Wire", name), Span::call_site());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("Wire derive only supports structs with named fields"),
        },
        _ => panic!("Wire derive only supports structs"),
    };

    if fields.is_empty() {
        panic!("Wire derive requires at least one field");
    }

    let mut wire_struct_fields = Vec::new();
    let mut to_wire_conversions = Vec::new();
    let mut from_wire_conversions = Vec::new();
    let mut field_names = Vec::new();
    let mut field_offset = 0u32;
    let mut padding_count = 0u32;

    for field in fields.iter() {
        let field_name = field.ident.as_ref().expect("named field");
        let field_type = &field.ty;
        let type_info = rust_type_info(field_type);

        let padding_needed = (type_info.align - (field_offset % type_info.align)) % type_info.align;
        if padding_needed > 0 {
            push_padding(
                padding_needed,
                &mut padding_count,
                &mut wire_struct_fields,
                &mut to_wire_conversions,
            );
            field_offset += padding_needed;
        }

        let wire_field_type = type_info.wire_type;
        wire_struct_fields.push(quote! { #field_name: #wire_field_type });
        to_wire_conversions.push(generate_conversion(field_name, field_type));
        from_wire_conversions.push(generate_reverse_conversion(field_name, field_type));
        field_names.push(field_name.to_string());

        field_offset += type_info.size;
    }

    let final_padding = (8 - (field_offset % 8)) % 8;
    if final_padding > 0 {
        push_padding(
            final_padding,
            &mut padding_count,
            &mut wire_struct_fields,
            &mut to_wire_conversions,
        );
        field_offset += final_padding;
    }

    let wire_size = field_offset as usize;

    let expanded = quote! {
        #[repr(C)]
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub struct #wire_name {
            #(pub #wire_struct_fields),*
        }

        // SAFETY: `#[repr(C)]`, every field is itself `Pod`, and all padding
        // is spelled out as explicit zeroed fields.
        unsafe impl ::pflock::bytemuck::Zeroable for #wire_name {}
        unsafe impl ::pflock::bytemuck::Pod for #wire_name {}

        const _: () = assert!(::core::mem::size_of::<#wire_name>() == #wire_size);

        impl ::pflock::WireRecord for #name {
            type Wire = #wire_name;

            const FIELD_NAMES: &'static [&'static str] = &[#(#field_names),*];

            fn to_wire(&self) -> Self::Wire {
                #wire_name {
                    #(#to_wire_conversions),*
                }
            }

            fn from_wire(wire: &Self::Wire) -> Self {
                Self {
                    #(#from_wire_conversions),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Append an explicit zeroed padding field of `bytes` length.
fn push_padding(
    bytes: u32,
    padding_count: &mut u32,
    wire_struct_fields: &mut Vec<proc_macro2::TokenStream>,
    to_wire_conversions: &mut Vec<proc_macro2::TokenStream>,
) {
    let pad_name = Ident::new(&format!("_pad{}", padding_count), Span::call_site());
    *padding_count += 1;

    if bytes == 4 {
        wire_struct_fields.push(quote! { #pad_name: u32 });
        to_wire_conversions.push(quote! { #pad_name: 0 });
    } else {
        let count = (bytes / 4) as usize;
        wire_struct_fields.push(quote! { #pad_name: [u32; #count] });
        to_wire_conversions.push(quote! { #pad_name: [0; #count] });
    }
}

/// Type metadata for wire layout calculations.
struct TypeInfo {
    /// Rust type for the wire struct (e.g., `[f64; 2]`)
    wire_type: proc_macro2::TokenStream,
    /// Size in bytes
    size: u32,
    /// Required alignment in bytes
    align: u32,
}

fn type_key(ty: &Type) -> String {
    quote!(#ty).to_string().replace(' ', "")
}

fn is_dvec2(key: &str) -> bool {
    matches!(
        key,
        "DVec2" | "glam::DVec2" | "Vec2d" | "pflock::Vec2d" | "::pflock::Vec2d"
    )
}

fn is_vec2(key: &str) -> bool {
    matches!(key, "Vec2" | "glam::Vec2")
}

/// Get type information for a Rust type.
fn rust_type_info(ty: &Type) -> TypeInfo {
    let key = type_key(ty);

    if is_dvec2(&key) {
        return TypeInfo {
            wire_type: quote! { [f64; 2] },
            size: 16,
            align: 8,
        };
    }
    if is_vec2(&key) {
        return TypeInfo {
            wire_type: quote! { [f32; 2] },
            size: 8,
            align: 4,
        };
    }

    match key.as_str() {
        "f64" => TypeInfo {
            wire_type: quote! { f64 },
            size: 8,
            align: 8,
        },
        "u64" => TypeInfo {
            wire_type: quote! { u64 },
            size: 8,
            align: 8,
        },
        "i64" => TypeInfo {
            wire_type: quote! { i64 },
            size: 8,
            align: 8,
        },
        "f32" => TypeInfo {
            wire_type: quote! { f32 },
            size: 4,
            align: 4,
        },
        "u32" => TypeInfo {
            wire_type: quote! { u32 },
            size: 4,
            align: 4,
        },
        "i32" => TypeInfo {
            wire_type: quote! { i32 },
            size: 4,
            align: 4,
        },
        _ => panic!("Unsupported type in Wire struct: {}", key),
    }
}

/// Generate the `Name -> NameWire` conversion for one field.
fn generate_conversion(field_name: &Ident, ty: &Type) -> proc_macro2::TokenStream {
    let key = type_key(ty);

    if is_dvec2(&key) || is_vec2(&key) {
        quote! { #field_name: self.#field_name.to_array() }
    } else {
        quote! { #field_name: self.#field_name }
    }
}

/// Generate the `NameWire -> Name` conversion for one field.
fn generate_reverse_conversion(field_name: &Ident, ty: &Type) -> proc_macro2::TokenStream {
    let key = type_key(ty);

    if is_dvec2(&key) {
        quote! { #field_name: ::pflock::glam::DVec2::from_array(wire.#field_name) }
    } else if is_vec2(&key) {
        quote! { #field_name: ::pflock::glam::Vec2::from_array(wire.#field_name) }
    } else {
        quote! { #field_name: wire.#field_name }
    }
}
