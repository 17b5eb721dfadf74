// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rust compiler backend.

use crate::bits::Expr;
use crate::layout::{FieldOp, Identifier, Layout};
use crate::quantize::Codec;
use crate::types::ScalarType;
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};
use std::path::Path;

mod command;
mod decoder;
mod encoder;
mod preamble;

pub trait ToIdent {
    /// Generate a sanitized rust identifier.
    /// Rust specific keywords are renamed for validity.
    fn to_ident(self) -> proc_macro2::Ident;
}

impl ToIdent for &'_ str {
    fn to_ident(self) -> proc_macro2::Ident {
        match self {
            "as" | "break" | "const" | "continue" | "else" | "enum" | "extern" | "false"
            | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "match" | "mod" | "move"
            | "mut" | "pub" | "ref" | "return" | "static" | "struct" | "trait" | "true"
            | "type" | "unsafe" | "use" | "where" | "while" | "async" | "await" | "dyn"
            | "abstract" | "become" | "box" | "do" | "final" | "macro" | "override" | "priv"
            | "typeof" | "unsized" | "virtual" | "yield" | "try" => format_ident!("r#{}", self),
            _ => format_ident!("{}", self),
        }
    }
}

fn hex(value: u64) -> syn::LitInt {
    syn::LitInt::new(&format!("{:#x}", value), proc_macro2::Span::call_site())
}

/// Float literal. Negative values are emitted as a negation, which
/// binds tighter than the binary operators it is used with.
fn float(value: f64) -> TokenStream {
    let literal = Literal::f64_unsuffixed(value.abs());
    if value.is_sign_negative() {
        quote!(-#literal)
    } else {
        quote!(#literal)
    }
}

fn type_ident(name: &str) -> proc_macro2::Ident {
    format_ident!("{}", name)
}

/// Identifier compared or sent by the generated code.
fn identifier(id: &Identifier, offset: TokenStream) -> TokenStream {
    let value = hex(id.value as u64);
    if id.dynamic {
        quote!(#offset.wrapping_add(#value))
    } else {
        quote!(#value)
    }
}

/// Render an expression, parenthesized unless it is a plain byte or
/// value reference.
fn operand(expr: &Expr, buf: &TokenStream, value: &TokenStream) -> TokenStream {
    let tokens = expr_tokens(expr, buf, value);
    match expr {
        Expr::Byte(_) | Expr::Value(_) => tokens,
        _ => quote!((#tokens)),
    }
}

fn expr_tokens(expr: &Expr, buf: &TokenStream, value: &TokenStream) -> TokenStream {
    match expr {
        Expr::Byte(index) => {
            let index = Literal::usize_unsuffixed(*index);
            quote!(#buf[#index])
        }
        Expr::Value(_) => value.clone(),
        Expr::Mask(expr, mask) => {
            let expr = operand(expr, buf, value);
            let mask = hex(*mask);
            quote!(#expr & #mask)
        }
        Expr::Shl(expr, shift) => {
            let expr = operand(expr, buf, value);
            let shift = Literal::usize_unsuffixed(*shift);
            quote!(#expr << #shift)
        }
        Expr::Shr(expr, shift) => {
            let expr = operand(expr, buf, value);
            let shift = Literal::usize_unsuffixed(*shift);
            quote!(#expr >> #shift)
        }
        Expr::Cast(expr, ty) => {
            let expr = operand(expr, buf, value);
            let ty = type_ident(&ty.rust());
            quote!(#expr as #ty)
        }
        Expr::Or(terms) => {
            let terms = terms.iter().map(|term| operand(term, buf, value));
            quote!(#(#terms)|*)
        }
    }
}

/// Expression converting the window read of `field` into its member
/// value.
fn decode_value(field: &FieldOp, buf: &TokenStream) -> TokenStream {
    let read = field.window.read();
    let raw = field.window.integer();
    let rendered = expr_tokens(&read, buf, &quote!());
    let ty = type_ident(field.ty.rust_type());
    match field.codec {
        Codec::Integer if field.ty.rust_type() == raw.rust() => rendered,
        Codec::Integer => {
            let read = operand(&read, buf, &quote!());
            quote!(#read as #ty)
        }
        Codec::Bool => {
            let read = operand(&read, buf, &quote!());
            quote!(#read != 0)
        }
        Codec::BitCast => quote!(#ty::from_bits(#rendered)),
        Codec::Zoom { scale } => {
            let read = operand(&read, buf, &quote!());
            let signed = type_ident(&raw.rust_signed());
            let scale = float(scale);
            match field.ty {
                ScalarType::Double => quote!(#read as #signed as f64 * #scale),
                _ => quote!((#read as #signed as f64 * #scale) as #ty),
            }
        }
        Codec::Range { min, max, bits } => {
            let (min, max) = (float(min), float(max));
            let bits = Literal::u32_unsuffixed(bits as u32);
            let value =
                quote!(canpack_runtime::range_to_float(u64::from(#rendered), #min, #max, #bits));
            match field.ty {
                ScalarType::Double => value,
                ScalarType::Float => quote!(#value as f32),
                _ => quote!(#value.round() as #ty),
            }
        }
    }
}

/// Expression converting the member value of `field` into the raw
/// integer written into its window.
fn encode_value(field: &FieldOp, record: &TokenStream) -> TokenStream {
    let raw = field.window.integer();
    let raw_ty = type_ident(&raw.rust());
    let member = field.member.as_str().to_ident();
    let member = quote!(#record.#member);
    let as_f64 = match field.ty {
        ScalarType::Double => member.clone(),
        ScalarType::Float => quote!(f64::from(#member)),
        _ => quote!(#member as f64),
    };
    match field.codec {
        Codec::Integer if field.ty.rust_type() == raw.rust() => member,
        Codec::Integer | Codec::Bool => quote!(#member as #raw_ty),
        Codec::BitCast => quote!(#member.to_bits()),
        Codec::Zoom { scale } => {
            let signed = type_ident(&raw.rust_signed());
            let scale = float(scale);
            quote!((#as_f64 / #scale).round() as #signed as #raw_ty)
        }
        Codec::Range { min, max, bits } => {
            let (min, max) = (float(min), float(max));
            let bits = Literal::u32_unsuffixed(bits as u32);
            let value = quote!(canpack_runtime::float_to_range(#as_f64, #min, #max, #bits));
            if raw.width == 64 {
                value
            } else {
                quote!(#value as #raw_ty)
            }
        }
    }
}

fn default_value(ty: ScalarType, len: Option<usize>) -> TokenStream {
    match (ty, len) {
        (_, Some(len)) => {
            let len = Literal::usize_unsuffixed(len);
            quote!([0; #len])
        }
        (ScalarType::Bool, None) => quote!(false),
        (ScalarType::Float | ScalarType::Double, None) => quote!(0.0),
        _ => quote!(0),
    }
}

/// Generate the record struct and its `Default` implementation.
fn generate_record(layout: &Layout) -> TokenStream {
    let name = type_ident(&layout.name);
    let docs = layout.members.iter().map(|member| {
        member.description.as_ref().map(|description| {
            let description = format!(" {}", description);
            quote!(#[doc = #description])
        })
    });
    let names: Vec<_> = layout.members.iter().map(|member| member.name.as_str().to_ident()).collect();
    let types = layout.members.iter().map(|member| {
        let ty = type_ident(member.ty.rust_type());
        match member.len {
            Some(len) => {
                let len = Literal::usize_unsuffixed(len);
                quote!([#ty; #len])
            }
            None => quote!(#ty),
        }
    });
    let defaults = layout.members.iter().map(|member| default_value(member.ty, member.len));
    let doc = format!(" Fields of the {} message set.", layout.name);

    quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, PartialEq)]
        pub struct #name {
            #(#docs pub #names: #types,)*
        }

        impl Default for #name {
            fn default() -> Self {
                #name {
                    #(#names: #defaults,)*
                }
            }
        }
    }
}

/// Generate the Rust token stream for a sequenced layout.
pub fn generate_tokens(layout: &Layout, source_name: &str) -> TokenStream {
    let preamble = preamble::generate(Path::new(source_name));
    let record = generate_record(layout);
    let decoder = decoder::generate(layout);
    let encoder = encoder::generate(layout);
    let commands = command::generate(layout);
    quote! {
        #preamble

        #record
        #decoder
        #encoder
        #commands
    }
}

/// Generate formatted Rust code from a sequenced layout.
pub fn generate(layout: &Layout, source_name: &str) -> String {
    let syntax_tree =
        syn::parse2(generate_tokens(layout, source_name)).expect("Could not parse code");
    prettyplease::unparse(&syntax_tree)
}
